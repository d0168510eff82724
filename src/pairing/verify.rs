//! Pair-verify: the per-connection X25519 + Ed25519 handshake that
//! re-establishes a secure session with an already-paired controller,
//! carried over an unencrypted `POST /pair-verify`.

use uuid::Uuid;

use hap_crypto::X25519KeyPair;

use crate::error::{PairingError, TlvErrorCode};
use crate::state::State;
use crate::tlv::{Decoded, Encoder, Tag};

use super::{client_uuid, error_response, Sequence};

fn array32(bytes: &[u8]) -> Result<[u8; 32], PairingError> {
    bytes.try_into().map_err(|_| {
        PairingError::Malformed(crate::error::TlvError::TruncatedValue {
            expected: 32,
            got: bytes.len(),
        })
    })
}

fn array64(bytes: &[u8]) -> Result<[u8; 64], PairingError> {
    bytes.try_into().map_err(|_| {
        PairingError::Malformed(crate::error::TlvError::TruncatedValue {
            expected: 64,
            got: bytes.len(),
        })
    })
}

/// The outcome of handling one pair-verify message.
pub struct VerifyOutcome {
    pub response: Vec<u8>,
    /// Set on a successful M4: the connection must switch its transport
    /// into the secure channel keyed from this shared secret.
    pub shared_secret: Option<[u8; 32]>,
    /// Set alongside `shared_secret`: the verified controller's identity.
    pub client: Option<Uuid>,
    /// `true` if `state.uuid_to_bytes` gained a new entry that must be
    /// persisted (the raw username wasn't on file for this client yet).
    pub needs_persist: bool,
}

impl VerifyOutcome {
    fn response_only(response: Vec<u8>) -> Self {
        Self {
            response,
            shared_secret: None,
            client: None,
            needs_persist: false,
        }
    }
}

/// Per-connection pair-verify state, alive only between M1 and M4 of a
/// single handshake attempt.
#[derive(Debug, Default)]
pub struct VerifySession {
    ephemeral: Option<X25519KeyPair>,
    client_public: Option<[u8; 32]>,
    server_public: Option<[u8; 32]>,
    shared: Option<[u8; 32]>,
    session_key: Option<[u8; 32]>,
}

impl VerifySession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, state: &mut State, body: &[u8]) -> Result<VerifyOutcome, PairingError> {
        if !state.paired() {
            return Ok(VerifyOutcome::response_only(error_response(
                Sequence::M2,
                TlvErrorCode::Authentication,
            )));
        }

        let decoded = Decoded::decode(body)?;
        let seq = decoded
            .get_u8(Tag::SequenceNum)
            .ok_or(PairingError::Malformed(crate::error::TlvError::TruncatedLength))?;

        match seq {
            1 => self.m1(state, &decoded),
            3 => self.m3(state, &decoded),
            other => Err(PairingError::UnexpectedSequence { expected: 1, got: other }),
        }
    }

    fn m1(&mut self, state: &State, decoded: &Decoded) -> Result<VerifyOutcome, PairingError> {
        let client_public = array32(decoded.get_required(Tag::PublicKey)?)?;
        let ephemeral = X25519KeyPair::generate();
        let server_public = ephemeral.public_key();
        let shared = ephemeral.diffie_hellman(&client_public);

        let mut sig_message = server_public.to_vec();
        sig_message.extend_from_slice(state.mac.as_bytes());
        sig_message.extend_from_slice(&client_public);
        let signature = state.keypair().sign(&sig_message);

        let session_key = hap_crypto::hkdf_sha512::<32>(
            &shared,
            b"Pair-Verify-Encrypt-Salt",
            b"Pair-Verify-Encrypt-Info",
        );
        let inner = Encoder::new()
            .add(Tag::Username, state.mac.as_bytes())
            .add(Tag::Proof, &signature)
            .build();
        let nonce = hap_crypto::nonce_for_label(b"PV-Msg02");
        let encrypted = hap_crypto::encrypt(&session_key, &nonce, &inner, &[]);

        let response = Encoder::new()
            .add_u8(Tag::SequenceNum, Sequence::M2 as u8)
            .add(Tag::EncryptedData, &encrypted)
            .add(Tag::PublicKey, &server_public)
            .build();

        self.ephemeral = Some(ephemeral);
        self.client_public = Some(client_public);
        self.server_public = Some(server_public);
        self.shared = Some(shared);
        self.session_key = Some(session_key);

        Ok(VerifyOutcome::response_only(response))
    }

    fn m3(&mut self, state: &mut State, decoded: &Decoded) -> Result<VerifyOutcome, PairingError> {
        let (client_public, server_public, shared, session_key) = match (
            self.client_public,
            self.server_public,
            self.shared,
            self.session_key,
        ) {
            (Some(cp), Some(sp), Some(sh), Some(sk)) => (cp, sp, sh, sk),
            _ => return Err(PairingError::UnexpectedSequence { expected: 1, got: 3 }),
        };

        let encrypted = decoded.get_required(Tag::EncryptedData)?;
        let nonce = hap_crypto::nonce_for_label(b"PV-Msg03");
        let inner = match hap_crypto::decrypt(&session_key, &nonce, encrypted, &[]) {
            Ok(inner) => inner,
            Err(_) => {
                return Ok(VerifyOutcome::response_only(error_response(
                    Sequence::M4,
                    TlvErrorCode::Authentication,
                )))
            }
        };
        let inner = Decoded::decode(&inner)?;
        let username_bytes = inner.get_required(Tag::Username)?.to_vec();
        let signature = array64(inner.get_required(Tag::Proof)?)?;

        let client = client_uuid(&username_bytes)?;
        let ltpk = match state.long_term_public_key(client) {
            Some(ltpk) => ltpk,
            None => {
                return Ok(VerifyOutcome::response_only(error_response(
                    Sequence::M4,
                    TlvErrorCode::Authentication,
                )))
            }
        };

        let mut message = client_public.to_vec();
        message.extend_from_slice(&username_bytes);
        message.extend_from_slice(&server_public);
        if hap_crypto::verify(&ltpk, &message, &signature).is_err() {
            return Ok(VerifyOutcome::response_only(error_response(
                Sequence::M4,
                TlvErrorCode::Authentication,
            )));
        }

        let needs_persist = state.record_username_bytes(client, username_bytes);

        let response = Encoder::new()
            .add_u8(Tag::SequenceNum, Sequence::M4 as u8)
            .build();

        Ok(VerifyOutcome {
            response,
            shared_secret: Some(shared),
            client: Some(client),
            needs_persist,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Permissions;
    use std::net::{IpAddr, Ipv4Addr};

    fn paired_state() -> (State, Uuid, hap_crypto::Ed25519KeyPair) {
        let mut state = State::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "11:22:33:44:55:66".into(),
            *b"00111234",
            51826,
            "ABCD".into(),
        );
        let client = Uuid::new_v4();
        let client_kp = hap_crypto::Ed25519KeyPair::generate();
        state.add_paired_client(client, client_kp.public_key(), Permissions::Admin);
        (state, client, client_kp)
    }

    #[test]
    fn full_handshake_establishes_a_shared_secret() {
        let (mut state, client, client_kp) = paired_state();
        let mut session = VerifySession::new();

        let client_x25519 = X25519KeyPair::generate();
        let m1_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 1)
            .add(Tag::PublicKey, &client_x25519.public_key())
            .build();
        let m2 = session.handle(&mut state, &m1_body).unwrap();
        let decoded_m2 = Decoded::decode(&m2.response).unwrap();
        let server_public: [u8; 32] = decoded_m2.get(Tag::PublicKey).unwrap().try_into().unwrap();
        let client_shared = client_x25519.diffie_hellman(&server_public);
        let session_key = hap_crypto::hkdf_sha512::<32>(
            &client_shared,
            b"Pair-Verify-Encrypt-Salt",
            b"Pair-Verify-Encrypt-Info",
        );
        let server_encrypted = decoded_m2.get(Tag::EncryptedData).unwrap();
        let server_inner = Decoded::decode(
            &hap_crypto::decrypt(&session_key, &hap_crypto::nonce_for_label(b"PV-Msg02"), server_encrypted, &[]).unwrap(),
        )
        .unwrap();
        hap_crypto::verify(
            &state.keypair().public_key(),
            &[
                server_public.as_slice(),
                state.mac.as_bytes(),
                client_x25519.public_key().as_slice(),
            ]
            .concat(),
            &server_inner.get(Tag::Proof).unwrap().try_into().unwrap(),
        )
        .unwrap();

        let client_id_str = client.to_string();
        let mut client_sig_message = client_x25519.public_key().to_vec();
        client_sig_message.extend_from_slice(client_id_str.as_bytes());
        client_sig_message.extend_from_slice(&server_public);
        let client_sig = client_kp.sign(&client_sig_message);
        let client_inner = Encoder::new()
            .add(Tag::Username, client_id_str.as_bytes())
            .add(Tag::Proof, &client_sig)
            .build();
        let client_encrypted = hap_crypto::encrypt(
            &session_key,
            &hap_crypto::nonce_for_label(b"PV-Msg03"),
            &client_inner,
            &[],
        );
        let m3_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 3)
            .add(Tag::EncryptedData, &client_encrypted)
            .build();

        let m4 = session.handle(&mut state, &m3_body).unwrap();
        assert_eq!(m4.shared_secret, Some(client_shared));
        assert_eq!(m4.client, Some(client));
        assert!(m4.needs_persist);
    }

    #[test]
    fn rejects_when_not_yet_paired() {
        let mut state = State::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "11:22:33:44:55:66".into(),
            *b"00111234",
            51826,
            "ABCD".into(),
        );
        let mut session = VerifySession::new();
        let body = Encoder::new()
            .add_u8(Tag::SequenceNum, 1)
            .add(Tag::PublicKey, &[0u8; 32])
            .build();
        let outcome = session.handle(&mut state, &body).unwrap();
        let decoded = Decoded::decode(&outcome.response).unwrap();
        assert_eq!(decoded.get_u8(Tag::ErrorCode), Some(TlvErrorCode::Authentication as u8));
    }

    #[test]
    fn rejects_unknown_client() {
        let (mut state, _client, _kp) = paired_state();
        let mut session = VerifySession::new();

        let client_x25519 = X25519KeyPair::generate();
        let m1_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 1)
            .add(Tag::PublicKey, &client_x25519.public_key())
            .build();
        let m2 = session.handle(&mut state, &m1_body).unwrap();
        let decoded_m2 = Decoded::decode(&m2.response).unwrap();
        let server_public: [u8; 32] = decoded_m2.get(Tag::PublicKey).unwrap().try_into().unwrap();
        let client_shared = client_x25519.diffie_hellman(&server_public);
        let session_key = hap_crypto::hkdf_sha512::<32>(
            &client_shared,
            b"Pair-Verify-Encrypt-Salt",
            b"Pair-Verify-Encrypt-Info",
        );

        let unknown_id = Uuid::new_v4().to_string();
        let unknown_kp = hap_crypto::Ed25519KeyPair::generate();
        let mut sig_message = client_x25519.public_key().to_vec();
        sig_message.extend_from_slice(unknown_id.as_bytes());
        sig_message.extend_from_slice(&server_public);
        let sig = unknown_kp.sign(&sig_message);
        let inner = Encoder::new()
            .add(Tag::Username, unknown_id.as_bytes())
            .add(Tag::Proof, &sig)
            .build();
        let encrypted = hap_crypto::encrypt(&session_key, &hap_crypto::nonce_for_label(b"PV-Msg03"), &inner, &[]);
        let m3_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 3)
            .add(Tag::EncryptedData, &encrypted)
            .build();

        let outcome = session.handle(&mut state, &m3_body).unwrap();
        assert!(outcome.shared_secret.is_none());
        let decoded = Decoded::decode(&outcome.response).unwrap();
        assert_eq!(decoded.get_u8(Tag::ErrorCode), Some(TlvErrorCode::Authentication as u8));
    }
}
