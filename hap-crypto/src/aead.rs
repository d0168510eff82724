use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

/// Errors from AEAD sealing/opening. Opening failure is always reported as
/// the single opaque variant below: HAP treats any authentication failure
/// as fatal and never distinguishes the cause.
#[derive(Debug, thiserror::Error)]
pub enum AeadError {
    #[error("ChaCha20-Poly1305 authentication failed")]
    AuthenticationFailed,
}

/// Builds the 12-byte nonce used by the fixed pairing-message labels
/// (`"PS-Msg05"`, `"PS-Msg06"`, `"PV-Msg02"`, `"PV-Msg03"`, ...): four
/// zero bytes followed by the 8-byte ASCII label.
#[must_use]
pub fn nonce_for_label(label: &[u8; 8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(label);
    nonce
}

/// Builds the 12-byte nonce used by the secure channel: a little-endian
/// 64-bit counter left-padded with zeros.
#[must_use]
pub fn nonce_for_counter(counter: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[4..].copy_from_slice(&counter.to_le_bytes());
    nonce
}

/// Encrypts `plaintext` under `key` with the given nonce and optional
/// additional authenticated data, appending the 16-byte tag.
pub fn encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8], aad: &[u8]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .expect("ChaCha20-Poly1305 encryption is infallible for valid key/nonce lengths")
}

/// Decrypts `ciphertext` (including its trailing 16-byte tag) under `key`
/// with the given nonce and additional authenticated data.
pub fn decrypt(
    key: &[u8; 32],
    nonce: &[u8; 12],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, AeadError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| AeadError::AuthenticationFailed)
}
