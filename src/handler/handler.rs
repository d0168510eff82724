//! Dispatch logic for the paired-connection HTTP endpoints, plus the
//! unauthenticated `/identify` route.
//!
//! Connection routing hands off to `accessories`, `characteristics`,
//! `prepare`, and `resource` once pair-verify has completed; `identify` is
//! reachable before pairing too. None of it knows how bytes arrived on the
//! wire — that's `http.rs` and `connection.rs`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::capability::{Identify, Run, SnapshotAsync, Stop};

pub mod accessories;
pub mod characteristics;
pub mod identify;
pub mod prepare;
pub mod resource;

/// Maps an accessory id to the snapshot capability it was registered
/// with, if any. Owned by the driver and shared read-only with every
/// connection.
pub type SnapshotRegistry = HashMap<u64, Arc<dyn SnapshotAsync>>;

/// Maps an accessory id to its `Identify` capability, if any.
pub type IdentifyRegistry = HashMap<u64, Arc<dyn Identify>>;

/// Maps an accessory id to its long-running `Run` capability, if any.
pub type RunRegistry = HashMap<u64, Arc<dyn Run>>;

/// Maps an accessory id to its `Stop` capability, if any.
pub type StopRegistry = HashMap<u64, Arc<dyn Stop>>;

/// Every accessory-behavior registry the driver owns, keyed by aid. An
/// accessory registers only the capabilities it actually implements; most
/// entries in most maps are absent.
#[derive(Default, Clone)]
pub struct Capabilities {
    pub snapshot: SnapshotRegistry,
    pub identify: IdentifyRegistry,
    pub run: RunRegistry,
    pub stop: StopRegistry,
}
