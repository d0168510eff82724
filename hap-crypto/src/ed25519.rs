use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;

/// An Ed25519 long-term keypair, used both for the accessory's identity and
/// for a paired controller's long-term public key.
#[derive(Clone)]
pub struct Ed25519KeyPair {
    signing: SigningKey,
}

#[derive(Debug, thiserror::Error)]
pub enum Ed25519Error {
    #[error("malformed Ed25519 key material")]
    MalformedKey,
    #[error("signature verification failed")]
    InvalidSignature,
}

impl Ed25519KeyPair {
    /// Generates a fresh keypair, used the first time a State is created.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// Reconstructs a keypair from its 32-byte seed (the persisted form).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    #[must_use]
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    #[must_use]
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &hex_fmt(&self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Verifies a detached signature against a raw 32-byte Ed25519 public key,
/// as done for a controller's long-term public key during pair-setup M5
/// and pair-verify M3.
pub fn verify(public_key: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<(), Ed25519Error> {
    let vk = VerifyingKey::from_bytes(public_key).map_err(|_| Ed25519Error::MalformedKey)?;
    let sig = Signature::from_bytes(signature);
    vk.verify(message, &sig)
        .map_err(|_| Ed25519Error::InvalidSignature)
}

fn hex_fmt(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trips() {
        let kp = Ed25519KeyPair::generate();
        let sig = kp.sign(b"hello world");
        verify(&kp.public_key(), b"hello world", &sig).unwrap();
    }

    #[test]
    fn wrong_message_fails() {
        let kp = Ed25519KeyPair::generate();
        let sig = kp.sign(b"hello world");
        assert!(verify(&kp.public_key(), b"goodbye", &sig).is_err());
    }

    #[test]
    fn seed_round_trips() {
        let kp = Ed25519KeyPair::generate();
        let kp2 = Ed25519KeyPair::from_seed(&kp.seed());
        assert_eq!(kp.public_key(), kp2.public_key());
    }
}
