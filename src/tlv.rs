//! Tag-length-value codec used by the pair-setup, pair-verify, and
//! pairings-admin endpoints.
//!
//! A value no longer than 255 bytes encodes as `tag || len || value`. A
//! longer value is split into 255-byte chunks, each prefixed by the same
//! tag and a length of `0xFF`, followed by a final chunk carrying the
//! remainder. Decoding concatenates every occurrence of a tag, which is
//! what makes fragment reassembly transparent to callers; list semantics
//! (e.g. the `/pairings` list response) are built on top using the
//! `SEPARATOR` tag between entries.

use std::collections::BTreeMap;

use crate::error::TlvError;

/// Well-known TLV tags.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum Tag {
    RequestType = 0x00,
    Username = 0x01,
    Salt = 0x02,
    PublicKey = 0x03,
    PasswordProof = 0x04,
    EncryptedData = 0x05,
    SequenceNum = 0x06,
    ErrorCode = 0x07,
    Proof = 0x0A,
    Permissions = 0x0B,
    Separator = 0xFF,
}

const CHUNK_LEN: usize = 255;

/// Encodes a single `(tag, value)` pair, fragmenting values longer than 255
/// bytes into consecutive same-tag chunks.
fn encode_one(out: &mut Vec<u8>, tag: u8, value: &[u8]) {
    if value.len() <= CHUNK_LEN {
        out.push(tag);
        out.push(value.len() as u8);
        out.extend_from_slice(value);
        return;
    }
    let mut chunks = value.chunks(CHUNK_LEN).peekable();
    while let Some(chunk) = chunks.next() {
        out.push(tag);
        if chunk.len() == CHUNK_LEN {
            out.push(CHUNK_LEN as u8);
        } else {
            out.push(chunk.len() as u8);
        }
        out.extend_from_slice(chunk);
    }
    // An exact multiple of 255 needs an explicit zero-length terminator so
    // the decoder knows the value does not continue.
    if value.len() % CHUNK_LEN == 0 {
        out.push(tag);
        out.push(0);
    }
}

/// Builder-style TLV encoder.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add(mut self, tag: Tag, value: &[u8]) -> Self {
        encode_one(&mut self.buf, tag as u8, value);
        self
    }

    #[must_use]
    pub fn add_u8(self, tag: Tag, value: u8) -> Self {
        self.add(tag, &[value])
    }

    /// Appends an empty `SEPARATOR` tag, used between entries of a
    /// `/pairings` list response.
    #[must_use]
    pub fn separator(mut self) -> Self {
        self.buf.push(Tag::Separator as u8);
        self.buf.push(0);
        self
    }

    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Decoded TLV entries, keyed by raw tag byte with same-tag occurrences
/// concatenated in encounter order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Decoded(BTreeMap<u8, Vec<u8>>);

impl Decoded {
    pub fn decode(data: &[u8]) -> Result<Self, TlvError> {
        let mut objects: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        let mut i = 0usize;
        while i < data.len() {
            let tag = *data.get(i).ok_or(TlvError::TruncatedLength)?;
            let len = *data.get(i + 1).ok_or(TlvError::TruncatedLength)? as usize;
            let start = i + 2;
            let end = start + len;
            let value = data.get(start..end).ok_or(TlvError::TruncatedValue {
                expected: len,
                got: data.len().saturating_sub(start),
            })?;
            objects.entry(tag).or_default().extend_from_slice(value);
            i = end;
        }
        Ok(Self(objects))
    }

    #[must_use]
    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.0.get(&(tag as u8)).map(Vec::as_slice)
    }

    pub fn get_required(&self, tag: Tag) -> Result<&[u8], TlvError> {
        self.get(tag).ok_or(TlvError::TruncatedValue {
            expected: 1,
            got: 0,
        })
    }

    #[must_use]
    pub fn get_u8(&self, tag: Tag) -> Option<u8> {
        self.get(tag).and_then(|v| v.first().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple_pairs() {
        let encoded = Encoder::new()
            .add(Tag::Username, b"A")
            .add(Tag::Username, b"B")
            .add(Tag::Salt, b"C")
            .build();
        let decoded = Decoded::decode(&encoded).unwrap();
        assert_eq!(decoded.get(Tag::Username), Some(&b"AB"[..]));
        assert_eq!(decoded.get(Tag::Salt), Some(&b"C"[..]));
    }

    #[test]
    fn fragments_values_over_255_bytes() {
        let long = vec![0xABu8; 300];
        let encoded = Encoder::new().add(Tag::PublicKey, &long).build();
        assert_eq!(encoded[0], Tag::PublicKey as u8);
        assert_eq!(encoded[1], 255);
        assert_eq!(encoded[2 + 255], Tag::PublicKey as u8);
        assert_eq!(encoded[2 + 255 + 1], 45);
        let decoded = Decoded::decode(&encoded).unwrap();
        assert_eq!(decoded.get(Tag::PublicKey), Some(long.as_slice()));
    }

    #[test]
    fn fragments_exact_multiple_of_255_with_terminator() {
        let long = vec![0x11u8; 510];
        let encoded = Encoder::new().add(Tag::PublicKey, &long).build();
        // Two full 255-byte chunks plus a zero-length terminator chunk.
        assert_eq!(encoded.len(), (2 + 255) * 2 + 2);
        let decoded = Decoded::decode(&encoded).unwrap();
        assert_eq!(decoded.get(Tag::PublicKey), Some(long.as_slice()));
    }

    #[test]
    fn separator_splits_list_entries() {
        let encoded = Encoder::new()
            .add(Tag::Username, b"alice")
            .separator()
            .add(Tag::Username, b"bob")
            .build();
        // Username occurrences are concatenated by the generic decoder;
        // callers who need list semantics walk SEPARATOR boundaries
        // themselves (see pairing::admin::list).
        let decoded = Decoded::decode(&encoded).unwrap();
        assert_eq!(decoded.get(Tag::Username), Some(&b"alicebob"[..]));
    }

    #[test]
    fn truncated_length_header_fails() {
        assert!(Decoded::decode(&[0x06]).is_err());
    }

    #[test]
    fn truncated_value_fails() {
        assert!(Decoded::decode(&[0x06, 0x02, 0x01]).is_err());
    }
}
