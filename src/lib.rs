//! HomeKit Accessory Protocol (HAP) server core.
//!
//! Implements the protocol engine between the raw TCP socket and the
//! accessory model: the pair-setup and pair-verify handshakes, the framed
//! ChaCha20-Poly1305 secure channel, the per-connection HTTP/1.1 request
//! dispatcher, the characteristic read/write/event subsystem, the identity
//! and pairing store, the accessory/service/characteristic data model, and
//! the mDNS advertisement state.
//!
//! Concrete device integrations, the camera media pipeline, and process
//! entry points are external collaborators; this crate only defines the
//! capability traits they implement (see [`model::capability`]).

#![warn(unused_crate_dependencies)]

pub use config::Config;
pub use error::{ConnectionError, CryptoError, HandlerError, PairingError, PersistError, TlvError};
pub use state::{Permissions, State};

pub mod categories;
pub mod channel;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod events;
#[path = "handler/handler.rs"]
pub mod handler;
mod http;
pub mod mdns;
#[path = "model/model.rs"]
pub mod model;
#[path = "pairing/pairing.rs"]
pub mod pairing;
pub mod persist;
pub mod state;
pub mod tlv;

pub(crate) type SyncMutex<T> = parking_lot::Mutex<T>;
pub(crate) type AsyncMutex<T> = tokio::sync::Mutex<T>;
pub(crate) type AsyncRwLock<T> = tokio::sync::RwLock<T>;
