//! Dense, stable instance-id assignment.

use std::collections::HashMap;

use uuid::Uuid;

/// A service or characteristic, identified by its position within the
/// owning accessory. Used as the IID manager's lookup key so that two
/// distinct objects of the same type never collide.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub(crate) enum ObjectKey {
    Service(usize),
    Characteristic(usize, usize),
}

/// Assigns a dense, monotonically increasing IID to each service and
/// characteristic the first time it is seen, and never reuses an IID once
/// assigned, even if the underlying object is later removed.
#[derive(Clone, Debug, Default)]
pub struct IidManager {
    next: u64,
    assigned: HashMap<ObjectKey, u64>,
    owners: HashMap<u64, Uuid>,
}

impl IidManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            assigned: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Returns the IID for `key`, assigning a fresh one on first use and
    /// recording `type_id` for that IID.
    pub(crate) fn iid_for(&mut self, key: ObjectKey, type_id: Uuid) -> u64 {
        if let Some(&iid) = self.assigned.get(&key) {
            return iid;
        }
        let iid = self.next;
        self.next += 1;
        self.assigned.insert(key, iid);
        self.owners.insert(iid, type_id);
        iid
    }

    #[must_use]
    pub fn type_of(&self, iid: u64) -> Option<Uuid> {
        self.owners.get(&iid).copied()
    }
}
