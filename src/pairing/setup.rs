//! Pair-setup: the SRP-6a + Ed25519 handshake that establishes the first
//! paired controller, carried over an unencrypted `POST /pair-setup`.

use hap_crypto::SrpServer;

use crate::error::{PairingError, TlvErrorCode};
use crate::state::{Permissions, State};
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

/// The outcome of handling one pair-setup message: the TLV response body,
/// and whether the driver must republish its mDNS record.
pub struct SetupOutcome {
    pub response: Vec<u8>,
    pub republish_mdns: bool,
}

impl SetupOutcome {
    fn response_only(response: Vec<u8>) -> Self {
        Self {
            response,
            republish_mdns: false,
        }
    }
}

/// Per-connection pair-setup state, alive only between M1 and M6 of a
/// single handshake attempt.
#[derive(Debug, Default)]
pub struct SetupSession {
    srp: Option<SrpServer>,
}

impl SetupSession {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and dispatches one pair-setup TLV request, mutating `state`
    /// only on a successful M5 → M6.
    pub fn handle(&mut self, state: &mut State, body: &[u8]) -> Result<SetupOutcome, PairingError> {
        if state.paired() {
            return Ok(SetupOutcome::response_only(error_response(
                Sequence::M2,
                TlvErrorCode::Unavailable,
            )));
        }

        let decoded = Decoded::decode(body)?;
        let seq = decoded
            .get_u8(Tag::SequenceNum)
            .ok_or(PairingError::Malformed(crate::error::TlvError::TruncatedLength))?;

        match seq {
            1 => Ok(SetupOutcome::response_only(self.m1(state))),
            3 => self.m3(&decoded),
            5 => self.m5(state, &decoded),
            other => Err(PairingError::UnexpectedSequence { expected: 1, got: other }),
        }
    }

    fn m1(&mut self, state: &State) -> Vec<u8> {
        let srp = SrpServer::new(&state.pincode);
        let response = Encoder::new()
            .add_u8(Tag::SequenceNum, Sequence::M2 as u8)
            .add(Tag::Salt, &srp.salt())
            .add(Tag::PublicKey, srp.public_key())
            .build();
        self.srp = Some(srp);
        response
    }

    fn m3(&mut self, decoded: &Decoded) -> Result<SetupOutcome, PairingError> {
        let srp = self
            .srp
            .as_mut()
            .ok_or(PairingError::UnexpectedSequence { expected: 1, got: 3 })?;

        let a_pub = decoded.get_required(Tag::PublicKey)?;
        let client_proof = decoded.get_required(Tag::PasswordProof)?;

        match srp.verify_client(a_pub, client_proof) {
            Ok(h_amk) => {
                let response = Encoder::new()
                    .add_u8(Tag::SequenceNum, Sequence::M4 as u8)
                    .add(Tag::PasswordProof, &h_amk)
                    .build();
                Ok(SetupOutcome::response_only(response))
            }
            Err(_) => Ok(SetupOutcome::response_only(error_response(
                Sequence::M4,
                TlvErrorCode::Authentication,
            ))),
        }
    }

    fn m5(&mut self, state: &mut State, decoded: &Decoded) -> Result<SetupOutcome, PairingError> {
        let srp = self
            .srp
            .as_ref()
            .ok_or(PairingError::UnexpectedSequence { expected: 3, got: 5 })?;
        let session_key = srp
            .session_key()
            .ok_or(PairingError::UnexpectedSequence { expected: 3, got: 5 })?;

        let enc_key = hap_crypto::hkdf_sha512::<32>(
            &session_key,
            b"Pair-Setup-Encrypt-Salt",
            b"Pair-Setup-Encrypt-Info",
        );
        let encrypted = decoded.get_required(Tag::EncryptedData)?;
        let nonce = hap_crypto::nonce_for_label(b"PS-Msg05");
        let inner = match hap_crypto::decrypt(&enc_key, &nonce, encrypted, &[]) {
            Ok(inner) => inner,
            Err(_) => {
                return Ok(SetupOutcome::response_only(error_response(
                    Sequence::M6,
                    TlvErrorCode::Authentication,
                )))
            }
        };
        let inner = Decoded::decode(&inner)?;

        let username_bytes = inner.get_required(Tag::Username)?.to_vec();
        let ltpk = array32(inner.get_required(Tag::PublicKey)?)?;
        let sig = array64(inner.get_required(Tag::Proof)?)?;

        let ctrl_sign_salt = hap_crypto::hkdf_sha512::<32>(
            &session_key,
            b"Pair-Setup-Controller-Sign-Salt",
            b"Pair-Setup-Controller-Sign-Info",
        );
        let mut ctrl_message = ctrl_sign_salt.to_vec();
        ctrl_message.extend_from_slice(&username_bytes);
        ctrl_message.extend_from_slice(&ltpk);
        if hap_crypto::verify(&ltpk, &ctrl_message, &sig).is_err() {
            return Ok(SetupOutcome::response_only(error_response(
                Sequence::M6,
                TlvErrorCode::Authentication,
            )));
        }

        let client = client_uuid(&username_bytes)?;
        state.add_paired_client(client, ltpk, Permissions::Admin);

        let acc_sign_salt = hap_crypto::hkdf_sha512::<32>(
            &session_key,
            b"Pair-Setup-Accessory-Sign-Salt",
            b"Pair-Setup-Accessory-Sign-Info",
        );
        let acc_pub = state.keypair().public_key();
        let mut acc_message = acc_sign_salt.to_vec();
        acc_message.extend_from_slice(state.mac.as_bytes());
        acc_message.extend_from_slice(&acc_pub);
        let sig_a = state.keypair().sign(&acc_message);

        let inner_response = Encoder::new()
            .add(Tag::Username, state.mac.as_bytes())
            .add(Tag::PublicKey, &acc_pub)
            .add(Tag::Proof, &sig_a)
            .build();
        let response_nonce = hap_crypto::nonce_for_label(b"PS-Msg06");
        let encrypted_response = hap_crypto::encrypt(&enc_key, &response_nonce, &inner_response, &[]);

        let response = Encoder::new()
            .add_u8(Tag::SequenceNum, Sequence::M6 as u8)
            .add(Tag::EncryptedData, &encrypted_response)
            .build();

        Ok(SetupOutcome {
            response,
            republish_mdns: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hap_crypto::Ed25519KeyPair;
    use num_bigint::BigUint;
    use rand_core::{OsRng, RngCore};
    use std::net::{IpAddr, Ipv4Addr};

    fn fresh_state() -> State {
        State::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "11:22:33:44:55:66".into(),
            *b"00111234",
            51826,
            "ABCD".into(),
        )
    }

    /// Drives a full client-side pair-setup against [`SetupSession`],
    /// mirroring a real controller's M1–M6 round trip.
    #[test]
    fn full_handshake_pairs_a_new_admin_client() {
        let mut state = fresh_state();
        let mut session = SetupSession::new();

        let m1_response = session.handle(&mut state, &Encoder::new().add_u8(Tag::SequenceNum, 1).build()).unwrap();
        let m2 = Decoded::decode(&m1_response.response).unwrap();
        let salt = m2.get(Tag::Salt).unwrap().to_vec();
        let b_pub = m2.get(Tag::PublicKey).unwrap().to_vec();

        let n = hex_to_biguint(N_HEX_TEST);
        let g = BigUint::from(5u32);
        let mut a_secret = [0u8; 32];
        OsRng.fill_bytes(&mut a_secret);
        let a = BigUint::from_bytes_be(&a_secret);
        let a_pub = g.modpow(&a, &n);
        let a_pub_bytes = a_pub.to_bytes_be();

        let pad = |v: &[u8], len: usize| -> Vec<u8> {
            let mut out = vec![0u8; len.saturating_sub(v.len())];
            out.extend_from_slice(v);
            out
        };
        use sha2::{Digest, Sha512};
        let sha512 = |parts: &[&[u8]]| -> [u8; 64] {
            let mut h = Sha512::new();
            for p in parts {
                h.update(p);
            }
            h.finalize().into()
        };

        let k = BigUint::from_bytes_be(&sha512(&[&n.to_bytes_be(), &pad(&g.to_bytes_be(), 384)]));
        let u = BigUint::from_bytes_be(&sha512(&[&pad(&a_pub_bytes, 384), &pad(&b_pub, 384)]));
        let x_inner = sha512(&[b"Pair-Setup", b":", b"00111234"]);
        let x = BigUint::from_bytes_be(&sha512(&[&salt, &x_inner]));
        let b_pub_big = BigUint::from_bytes_be(&b_pub);
        let base = (&b_pub_big + &n - (&k * g.modpow(&x, &n)) % &n) % &n;
        let exp = &a + &u * &x;
        let s = base.modpow(&exp, &n);
        let session_key = sha512(&[&s.to_bytes_be()]);

        let h_n = sha512(&[&n.to_bytes_be()]);
        let h_g = sha512(&[&g.to_bytes_be()]);
        let h_group: Vec<u8> = h_n.iter().zip(h_g.iter()).map(|(x, y)| x ^ y).collect();
        let h_user = sha512(&[b"Pair-Setup"]);
        let m1_proof = sha512(&[&h_group, &h_user, &salt, &a_pub_bytes, &b_pub, &session_key]);

        let m3_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 3)
            .add(Tag::PublicKey, &a_pub_bytes)
            .add(Tag::PasswordProof, &m1_proof)
            .build();
        let m4_outcome = session.handle(&mut state, &m3_body).unwrap();
        let m4 = Decoded::decode(&m4_outcome.response).unwrap();
        assert!(m4.get(Tag::PasswordProof).is_some());

        let enc_key = hap_crypto::hkdf_sha512::<32>(
            &session_key,
            b"Pair-Setup-Encrypt-Salt",
            b"Pair-Setup-Encrypt-Info",
        );
        let ctrl_sign_salt = hap_crypto::hkdf_sha512::<32>(
            &session_key,
            b"Pair-Setup-Controller-Sign-Salt",
            b"Pair-Setup-Controller-Sign-Info",
        );
        let ctrl_kp = Ed25519KeyPair::generate();
        let client_id = uuid::Uuid::new_v4();
        let client_id_str = client_id.to_string();
        let mut ctrl_message = ctrl_sign_salt.to_vec();
        ctrl_message.extend_from_slice(client_id_str.as_bytes());
        ctrl_message.extend_from_slice(&ctrl_kp.public_key());
        let sig = ctrl_kp.sign(&ctrl_message);

        let inner = Encoder::new()
            .add(Tag::Username, client_id_str.as_bytes())
            .add(Tag::PublicKey, &ctrl_kp.public_key())
            .add(Tag::Proof, &sig)
            .build();
        let nonce = hap_crypto::nonce_for_label(b"PS-Msg05");
        let encrypted = hap_crypto::encrypt(&enc_key, &nonce, &inner, &[]);
        let m5_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 5)
            .add(Tag::EncryptedData, &encrypted)
            .build();

        let m6_outcome = session.handle(&mut state, &m5_body).unwrap();
        assert!(m6_outcome.republish_mdns);
        let m6 = Decoded::decode(&m6_outcome.response).unwrap();
        assert_eq!(m6.get_u8(Tag::SequenceNum), Some(Sequence::M6 as u8));

        assert!(state.paired());
        assert!(state.is_admin(client_id));
        assert_eq!(state.long_term_public_key(client_id), Some(ctrl_kp.public_key()));
    }

    #[test]
    fn rejects_pair_setup_when_already_paired() {
        let mut state = fresh_state();
        state.add_paired_client(uuid::Uuid::new_v4(), [1u8; 32], Permissions::Admin);
        let mut session = SetupSession::new();
        let outcome = session
            .handle(&mut state, &Encoder::new().add_u8(Tag::SequenceNum, 1).build())
            .unwrap();
        let decoded = Decoded::decode(&outcome.response).unwrap();
        assert_eq!(
            decoded.get_u8(Tag::ErrorCode),
            Some(TlvErrorCode::Unavailable as u8)
        );
    }

    #[test]
    fn wrong_password_proof_yields_authentication_error() {
        let mut state = fresh_state();
        let mut session = SetupSession::new();
        session
            .handle(&mut state, &Encoder::new().add_u8(Tag::SequenceNum, 1).build())
            .unwrap();

        let m3_body = Encoder::new()
            .add_u8(Tag::SequenceNum, 3)
            .add(Tag::PublicKey, &[1u8; 384])
            .add(Tag::PasswordProof, &[0u8; 64])
            .build();
        let outcome = session.handle(&mut state, &m3_body).unwrap();
        let decoded = Decoded::decode(&outcome.response).unwrap();
        assert_eq!(
            decoded.get_u8(Tag::ErrorCode),
            Some(TlvErrorCode::Authentication as u8)
        );
    }

    const N_HEX_TEST: &str = concat!(
        "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E08",
        "8A67CC74020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B",
        "302B0A6DF25F14374FE1356D6D51C245E485B576625E7EC6F44C42E9",
        "A637ED6B0BFF5CB6F406B7EDEE386BFB5A899FA5AE9F24117C4B1FE6",
        "49286651ECE45B3DC2007CB8A163BF0598DA48361C55D39A69163FA8",
        "FD24CF5F83655D23DCA3AD961C62F356208552BB9ED529077096966D",
        "670C354E4ABC9804F1746C08CA18217C32905E462E36CE3BE39E772C",
        "180E86039B2783A2EC07A28FB5C55DF06F4C52C9DE2BCBF695581718",
        "3995497CEA956AE515D2261898FA051015728E5A8AAAC42DAD33170D",
        "04507A33A85521ABDF1CBA64ECFB850458DBEF0A8AEA71575D060C7D",
        "B3970F85A6E1E4C7ABF5AE8CDB0933D71E8C94E04A25619DCEE3D226",
        "1AD2EE6BF12FFA06D98A0864D87602733EC86A64521F2B18177B200C",
        "BBE117577A615D6C770988C0BAD946E208E24FA074E5AB3143DB5BFC",
        "E0FD108E4B82D120A93AD2CAFFFFFFFFFFFFFFFF",
    );

    fn hex_to_biguint(hex: &str) -> BigUint {
        BigUint::parse_bytes(hex.as_bytes(), 16).unwrap()
    }
}
