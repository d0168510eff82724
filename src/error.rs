//! Typed error outcomes for every fallible boundary in the protocol core.
//!
//! Authentication, invalid-state, and invalid-value conditions each become
//! an enum variant that the handler matches on to select the TLV or JSON
//! error body the situation requires.

use thiserror::Error;

/// Numeric HAP status codes embedded in JSON `status` fields, per the
/// HomeKit Accessory Protocol specification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(i32)]
pub enum HapStatus {
    Success = 0,
    InsufficientPrivileges = -70401,
    CommunicationFailure = -70402,
    ResourceBusy = -70403,
    ReadOnly = -70404,
    WriteOnly = -70405,
    NotificationNotSupported = -70406,
    OutOfResource = -70407,
    Timeout = -70408,
    NotFound = -70409,
    InvalidValue = -70410,
}

impl From<HapStatus> for i32 {
    fn from(s: HapStatus) -> Self {
        s as i32
    }
}

/// TLV `ERROR_CODE` values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum TlvErrorCode {
    Authentication = 0x02,
    Unavailable = 0x06,
    Busy = 0x07,
}

#[derive(Debug, Error)]
pub enum TlvError {
    #[error("truncated TLV length header")]
    TruncatedLength,
    #[error("truncated TLV value (expected {expected} bytes, got {got})")]
    TruncatedValue { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD authentication failed")]
    Aead(#[from] hap_crypto::AeadError),
    #[error("Ed25519 signature verification failed")]
    Ed25519(#[from] hap_crypto::Ed25519Error),
    #[error("SRP-6a client proof did not match")]
    Srp(#[from] hap_crypto::SrpVerifyError),
}

/// Outcome of a pair-setup or pair-verify step. Authentication failures are
/// not fatal to the connection: the handler encodes them into the
/// appropriate TLV response and the state machine remains usable for a
/// retry from M1.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("pair-setup attempted while already paired")]
    AlreadyPaired,
    #[error("pair-verify attempted before pairing")]
    NotPaired,
    #[error("message arrived out of sequence (expected {expected}, got {got})")]
    UnexpectedSequence { expected: u8, got: u8 },
    #[error("authentication failed: {0}")]
    Authentication(#[from] CryptoError),
    #[error("malformed TLV body: {0}")]
    Malformed(#[from] TlvError),
    #[error("admin privileges required for this pairings request")]
    InsufficientPrivileges,
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Pairing(#[from] PairingError),
    #[error("characteristic {aid}.{iid} not found")]
    NotFound { aid: u64, iid: u64 },
    #[error("characteristic {aid}.{iid} does not permit read")]
    WriteOnly { aid: u64, iid: u64 },
    #[error("characteristic {aid}.{iid} does not permit write")]
    ReadOnly { aid: u64, iid: u64 },
    #[error("value failed validation for {aid}.{iid}")]
    InvalidValue { aid: u64, iid: u64 },
    #[error("setter failed for {aid}.{iid}")]
    CommunicationFailure { aid: u64, iid: u64 },
    #[error("no prepared write found for pid {0}")]
    NoPreparedWrite(i64),
    #[error("accessory has no snapshot capability")]
    NoSnapshotCapability,
    #[error("snapshot request timed out")]
    SnapshotTimeout,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("transport closed")]
    Closed,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error("malformed HTTP request: {0}")]
    MalformedHttp(String),
    #[error("request made before pair-verify completed")]
    Unauthenticated,
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write state: {0}")]
    Io(#[from] std::io::Error),
}
