//! Cryptographic toolbox for the HomeKit Accessory Protocol pairing and
//! session-establishment handshakes.
//!
//! Covers HKDF-SHA512 key derivation, ChaCha20-Poly1305 AEAD framing,
//! Ed25519 long-term-key signatures, X25519 key agreement, and the SRP-6a
//! server used by pair-setup.

#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]

pub use aead::{decrypt, encrypt, nonce_for_counter, nonce_for_label, AeadError};
pub use ed25519::{Ed25519KeyPair, Ed25519Error};
pub use hkdf::hkdf_sha512;
pub use srp::{SrpServer, SrpVerifyError, SRP_N_BYTES};
pub use x25519::X25519KeyPair;

mod aead;
mod ed25519;
mod hkdf;
mod srp;
mod x25519;
