//! SRP-6a server half of the pair-setup handshake, using the RFC 5054
//! 3072-bit group and SHA-512.

use num_bigint::BigUint;
use num_traits::Zero;
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha512};

/// Byte length of the RFC 5054 3072-bit group modulus.
pub const SRP_N_BYTES: usize = 384;

const SRP_USERNAME: &[u8] = b"Pair-Setup";

const N_HEX: &str = concat!(
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

#[derive(Debug, thiserror::Error)]
pub enum SrpVerifyError {
    #[error("client proof did not match the expected value")]
    ProofMismatch,
}

fn group_n() -> BigUint {
    BigUint::parse_bytes(N_HEX.as_bytes(), 16).expect("RFC 5054 3072-bit group constant is valid")
}

fn group_g() -> BigUint {
    BigUint::from(5u32)
}

fn sha512(parts: &[&[u8]]) -> [u8; 64] {
    let mut h = Sha512::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

/// Left-pads `v` with zero bytes to `len`. `v` must not already exceed `len`.
fn pad(v: &[u8], len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.saturating_sub(v.len())];
    out.extend_from_slice(v);
    out
}

/// Server-side SRP-6a state for one pair-setup attempt.
pub struct SrpServer {
    n: BigUint,
    g: BigUint,
    salt: [u8; 16],
    v: BigUint,
    b: BigUint,
    b_pub: BigUint,
    b_pub_bytes: Vec<u8>,
    session_key: Option<[u8; 64]>,
}

impl std::fmt::Debug for SrpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrpServer")
            .field("salt", &hex_fmt(&self.salt))
            .finish_non_exhaustive()
    }
}

impl SrpServer {
    /// Starts a new SRP-6a exchange for the 8-digit PIN `pincode`, computing
    /// a fresh 16-byte salt, verifier, and server ephemeral keypair.
    #[must_use]
    pub fn new(pincode: &[u8]) -> Self {
        let mut salt = [0u8; 16];
        OsRng.fill_bytes(&mut salt);
        let mut secret = [0u8; 32];
        OsRng.fill_bytes(&mut secret);
        Self::with_salt_and_secret(pincode, salt, &secret)
    }

    fn with_salt_and_secret(pincode: &[u8], salt: [u8; 16], secret: &[u8; 32]) -> Self {
        let n = group_n();
        let g = group_g();
        let g_bytes = g.to_bytes_be();
        let n_bytes = n.to_bytes_be();

        let k = BigUint::from_bytes_be(&sha512(&[&n_bytes, &pad(&g_bytes, SRP_N_BYTES)]));
        let x_hash_inner = sha512(&[SRP_USERNAME, b":", pincode]);
        let x = BigUint::from_bytes_be(&sha512(&[&salt, &x_hash_inner]));
        let v = g.modpow(&x, &n);

        let b = BigUint::from_bytes_be(secret);
        let b_pub = (&k * &v + g.modpow(&b, &n)) % &n;
        let b_pub_bytes = b_pub.to_bytes_be();

        Self {
            n,
            g,
            salt,
            v,
            b,
            b_pub,
            b_pub_bytes,
            session_key: None,
        }
    }

    #[must_use]
    pub fn salt(&self) -> [u8; 16] {
        self.salt
    }

    /// The server's public ephemeral `B`, transmitted unsigned big-endian
    /// without leading zeros.
    #[must_use]
    pub fn public_key(&self) -> &[u8] {
        &self.b_pub_bytes
    }

    /// Processes the client's public ephemeral `A` and proof `M1`. On
    /// success returns `H_AMK`, the server's proof of the shared key.
    pub fn verify_client(&mut self, a_pub: &[u8], client_proof: &[u8]) -> Result<[u8; 64], SrpVerifyError> {
        let a = BigUint::from_bytes_be(a_pub);
        if a.is_zero() || &a % &self.n == BigUint::zero() {
            return Err(SrpVerifyError::ProofMismatch);
        }

        let u = BigUint::from_bytes_be(&sha512(&[
            &pad(a_pub, SRP_N_BYTES),
            &pad(&self.b_pub_bytes, SRP_N_BYTES),
        ]));

        let s = (&a * self.v.modpow(&u, &self.n)).modpow(&self.b, &self.n);
        let s_bytes = s.to_bytes_be();
        let session_key = sha512(&[&s_bytes]);

        let h_n = sha512(&[&self.n.to_bytes_be()]);
        let h_g = sha512(&[&self.g.to_bytes_be()]);
        let h_group: Vec<u8> = h_n.iter().zip(h_g.iter()).map(|(a, b)| a ^ b).collect();
        let h_user = sha512(&[SRP_USERNAME]);

        let expected_m = sha512(&[
            &h_group,
            &h_user,
            &self.salt,
            a_pub,
            &self.b_pub_bytes,
            &session_key,
        ]);

        if expected_m.as_slice() != client_proof {
            return Err(SrpVerifyError::ProofMismatch);
        }

        self.session_key = Some(session_key);
        Ok(sha512(&[a_pub, &expected_m, &session_key]))
    }

    /// The shared session key `K`, available after a successful
    /// [`SrpServer::verify_client`].
    #[must_use]
    pub fn session_key(&self) -> Option<[u8; 64]> {
        self.session_key
    }
}

fn hex_fmt(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
