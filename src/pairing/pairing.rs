//! The pair-setup and pair-verify handshakes, and the post-pairing admin
//! endpoint, `POST /pairings`.

pub mod admin;
pub mod setup;
pub mod verify;

use uuid::Uuid;

use crate::error::PairingError;
use crate::tlv::Tag;

/// `kTLVType_State` values identifying each step of a handshake.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Sequence {
    M1 = 1,
    M2 = 2,
    M3 = 3,
    M4 = 4,
    M5 = 5,
    M6 = 6,
}

/// The controllers in this protocol identify themselves with a literal
/// UUID-formatted string sent as the `USERNAME`/identifier TLV value,
/// rather than a hash derived from it.
pub(crate) fn client_uuid(username_bytes: &[u8]) -> Result<Uuid, PairingError> {
    let text = std::str::from_utf8(username_bytes).map_err(|_| PairingError::Malformed(
        crate::error::TlvError::TruncatedValue {
            expected: 36,
            got: username_bytes.len(),
        },
    ))?;
    Uuid::parse_str(text).map_err(|_| PairingError::Malformed(crate::error::TlvError::TruncatedValue {
        expected: 36,
        got: text.len(),
    }))
}

/// Builds the `{SEQ=state, ERROR=code}` response TLV common to every
/// handshake failure.
pub(crate) fn error_response(state: Sequence, code: crate::error::TlvErrorCode) -> Vec<u8> {
    crate::tlv::Encoder::new()
        .add_u8(Tag::SequenceNum, state as u8)
        .add_u8(Tag::ErrorCode, code as u8)
        .build()
}
