use hkdf::Hkdf;
use sha2::Sha512;

/// Derives `L` bytes via HKDF-SHA512, as used throughout the pair-setup and
/// pair-verify handshakes (e.g. `HKDF(K, "Pair-Setup-Encrypt-Salt",
/// "Pair-Setup-Encrypt-Info")`).
#[must_use]
pub fn hkdf_sha512<const L: usize>(ikm: &[u8], salt: &[u8], info: &[u8]) -> [u8; L] {
    let (_, hk) = Hkdf::<Sha512>::extract(Some(salt), ikm);
    let mut out = [0u8; L];
    hk.expand(info, &mut out)
        .expect("HKDF-SHA512 output length is always valid for L <= 16320");
    out
}
