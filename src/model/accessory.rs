//! A complete addressable device: an `aid`, a category, and the services
//! it exposes.

use uuid::Uuid;

use crate::categories::Category;

use super::iid::{IidManager, ObjectKey};
use super::service::Service;

#[derive(Clone, Debug)]
pub struct Accessory {
    pub aid: u64,
    pub category: Category,
    services: Vec<Service>,
    service_iids: Vec<u64>,
    char_iids: Vec<Vec<u64>>,
    iids: IidManager,
}

impl Accessory {
    #[must_use]
    pub fn new(aid: u64, category: Category) -> Self {
        Self {
            aid,
            category,
            services: Vec::new(),
            service_iids: Vec::new(),
            char_iids: Vec::new(),
            iids: IidManager::new(),
        }
    }

    /// Adds a service, assigning it and every characteristic it currently
    /// holds a dense, stable IID. IIDs assigned here never change for the
    /// lifetime of the accessory, even if later services are removed.
    pub fn add_service(&mut self, service: Service) -> u64 {
        let service_index = self.services.len();
        let service_iid = self
            .iids
            .iid_for(ObjectKey::Service(service_index), service.type_id);

        let char_iids = service
            .characteristics()
            .iter()
            .enumerate()
            .map(|(char_index, characteristic)| {
                self.iids.iid_for(
                    ObjectKey::Characteristic(service_index, char_index),
                    characteristic.type_id,
                )
            })
            .collect();

        self.services.push(service);
        self.service_iids.push(service_iid);
        self.char_iids.push(char_iids);
        service_iid
    }

    #[must_use]
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    #[must_use]
    pub fn service_iid(&self, service_index: usize) -> Option<u64> {
        self.service_iids.get(service_index).copied()
    }

    #[must_use]
    pub fn characteristic_iid(&self, service_index: usize, char_index: usize) -> Option<u64> {
        self.char_iids.get(service_index)?.get(char_index).copied()
    }

    /// Resolves an IID to the `(service_index, char_index)` pair a handler
    /// needs to reach the live characteristic, or `None` if `iid` names a
    /// service rather than a characteristic, or is unknown.
    #[must_use]
    pub fn locate(&self, iid: u64) -> Option<(usize, usize)> {
        for (service_index, char_iids) in self.char_iids.iter().enumerate() {
            if let Some(char_index) = char_iids.iter().position(|&i| i == iid) {
                return Some((service_index, char_index));
            }
        }
        None
    }

    pub fn characteristic_mut(
        &mut self,
        service_index: usize,
        char_index: usize,
    ) -> Option<&mut super::characteristic::Characteristic> {
        self.services.get_mut(service_index)?.characteristic_mut(char_index)
    }

    #[must_use]
    pub fn type_of(&self, iid: u64) -> Option<Uuid> {
        self.iids.type_of(iid)
    }
}
