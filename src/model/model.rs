//! The accessory/service/characteristic data model.
//!
//! Accessories own services, services own characteristics, and every
//! service and characteristic is assigned a stable instance id (IID) the
//! first time it is added to an accessory. The IID manager guarantees
//! IIDs never repeat within an accessory and never change once assigned.

pub use accessory::Accessory;
pub use capability::{Identify, Run, SnapshotAsync, SnapshotSync, Stop};
pub use characteristic::{Characteristic, CharacteristicBuilder, Format, Perms, Value, ValidationError};
pub use iid::IidManager;
pub use service::Service;

mod accessory;
pub mod capability;
pub mod catalog;
mod characteristic;
mod iid;
pub mod json;
mod service;

/// Bridges contain other accessories. A standalone accessory is `aid = 1`;
/// bridged accessories start at `aid = 2`.
pub const STANDALONE_AID: u64 = 1;
pub const FIRST_BRIDGED_AID: u64 = 2;
