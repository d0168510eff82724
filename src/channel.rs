//! The length-framed ChaCha20-Poly1305 secure channel pair-verify
//! negotiates.
//!
//! Two independent AEAD directions are keyed once from the pair-verify
//! shared secret and never rekeyed for the life of the connection. Each
//! direction keeps its own little-endian 64-bit frame counter, used
//! directly as the nonce. Decryption failure is unrecoverable: the
//! caller must close the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ConnectionError;

/// Plaintext is never framed larger than this many bytes per ciphertext
/// frame.
pub const MAX_BLOCK_LEN: usize = 1024;
const LENGTH_PREFIX_LEN: usize = 2;
const TAG_LEN: usize = 16;

fn derive_keys(shared_secret: &[u8; 32]) -> ([u8; 32], [u8; 32]) {
    let read_key = hap_crypto::hkdf_sha512::<32>(
        shared_secret,
        b"Control-Salt",
        b"Control-Write-Encryption-Key",
    );
    let write_key = hap_crypto::hkdf_sha512::<32>(
        shared_secret,
        b"Control-Salt",
        b"Control-Read-Encryption-Key",
    );
    (read_key, write_key)
}

/// A `tokio_util` [`Decoder`]/[`Encoder`] pair implementing the secure
/// channel's wire framing over an arbitrary byte transport.
#[derive(Debug)]
pub struct SecureChannel {
    read_key: [u8; 32],
    write_key: [u8; 32],
    read_counter: u64,
    write_counter: u64,
}

impl SecureChannel {
    /// Derives both directions' keys from the 32-byte shared secret
    /// produced by pair-verify M3/M4.
    #[must_use]
    pub fn new(shared_secret: &[u8; 32]) -> Self {
        let (read_key, write_key) = derive_keys(shared_secret);
        Self {
            read_key,
            write_key,
            read_counter: 0,
            write_counter: 0,
        }
    }
}

impl Encoder<Bytes> for SecureChannel {
    type Error = ConnectionError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        for block in item.chunks(MAX_BLOCK_LEN) {
            let len = block.len() as u16;
            let aad = len.to_le_bytes();
            let nonce = hap_crypto::nonce_for_counter(self.write_counter);
            let ciphertext = hap_crypto::encrypt(&self.write_key, &nonce, block, &aad);
            self.write_counter += 1;

            dst.reserve(LENGTH_PREFIX_LEN + ciphertext.len());
            dst.put_slice(&aad);
            dst.put_slice(&ciphertext);
        }
        Ok(())
    }
}

impl Decoder for SecureChannel {
    type Item = Bytes;
    type Error = ConnectionError;

    /// Decodes at most one frame per call, matching `tokio_util`'s
    /// convention of being re-invoked until no further item is produced.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_PREFIX_LEN {
            return Ok(None);
        }
        let len = u16::from_le_bytes([src[0], src[1]]) as usize;
        let frame_len = LENGTH_PREFIX_LEN + len + TAG_LEN;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let aad = [src[0], src[1]];
        let ciphertext = &src[LENGTH_PREFIX_LEN..frame_len];
        let nonce = hap_crypto::nonce_for_counter(self.read_counter);
        let plaintext = hap_crypto::decrypt(&self.read_key, &nonce, ciphertext, &aad)
            .map_err(|_| ConnectionError::Crypto(crate::error::CryptoError::Aead(
                hap_crypto::AeadError::AuthenticationFailed,
            )))?;
        self.read_counter += 1;
        src.advance(frame_len);
        Ok(Some(Bytes::from(plaintext)))
    }
}
