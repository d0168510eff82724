//! A named grouping of characteristics exposed under one type UUID.

use uuid::Uuid;

use super::characteristic::Characteristic;

#[derive(Clone, Debug)]
pub struct Service {
    pub type_id: Uuid,
    pub primary: bool,
    pub hidden: bool,
    characteristics: Vec<Characteristic>,
    linked_services: Vec<u64>,
}

impl Service {
    #[must_use]
    pub fn new(type_id: Uuid) -> Self {
        Self {
            type_id,
            primary: false,
            hidden: false,
            characteristics: Vec::new(),
            linked_services: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    #[must_use]
    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    /// Links to another service by its already-assigned IID. Linked
    /// services compose behavior (e.g. a Television's linked Input
    /// Source services) without nesting the object graph.
    pub fn link(&mut self, service_iid: u64) {
        self.linked_services.push(service_iid);
    }

    #[must_use]
    pub fn linked_services(&self) -> &[u64] {
        &self.linked_services
    }

    #[must_use]
    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.characteristics
    }

    pub fn characteristic_mut(&mut self, index: usize) -> Option<&mut Characteristic> {
        self.characteristics.get_mut(index)
    }
}
