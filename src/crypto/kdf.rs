use crate::crypto::cipher::KEY_LEN;
use hkdf::Hkdf;
use sha3::{Digest, Sha3_256, Sha3_512};

/// The interoperable key-derivation scheme (§4.5, §9): SHA3-256 over the
/// raw passphrase yields the AES key, and the raw passphrase bytes are
/// the HMAC key directly. This is the scheme the upload/download path
/// uses, because the metadata record carries no salt and must remain
/// restorable without auxiliary state.
pub fn derive_simple(passphrase: &str) -> ([u8; KEY_LEN], Vec<u8>) {
    let aes_key: [u8; KEY_LEN] = Sha3_256::digest(passphrase.as_bytes()).into();
    let hmac_key = passphrase.as_bytes().to_vec();
    (aes_key, hmac_key)
}

/// An improved key-derivation scheme the original project migrated to and
/// then back away from: HKDF-SHA3-512 over a master secret with a salt
/// and the fixed context info `"OZB HKDF"`, producing independent
/// encryption and authentication keys.
///
/// Not wired into the upload/download path — shipping it would require
/// extending the metadata record with a `salt` field (§9), which this
/// implementation does not do in order to stay restorable against an
/// unmodified metadata document. Kept here, tested, as the documented
/// alternative a future metadata-format revision could adopt.
pub fn derive_hkdf(master_secret: &[u8], salt: &[u8]) -> ([u8; KEY_LEN], [u8; KEY_LEN]) {
    const INFO: &[u8] = b"OZB HKDF";
    let hk = Hkdf::<Sha3_512>::new(Some(salt), master_secret);

    let mut enc_key = [0u8; KEY_LEN];
    hk.expand(&[INFO, b" encryption"].concat(), &mut enc_key)
        .expect("32 bytes is a valid HKDF output length");

    let mut auth_key = [0u8; KEY_LEN];
    hk.expand(&[INFO, b" authentication"].concat(), &mut auth_key)
        .expect("32 bytes is a valid HKDF output length");

    (enc_key, auth_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_simple_is_deterministic() {
        let (k1, h1) = derive_simple("correct horse battery staple");
        let (k2, h2) = derive_simple("correct horse battery staple");
        assert_eq!(k1, k2);
        assert_eq!(h1, h2);
    }

    #[test]
    fn derive_simple_hmac_key_is_the_raw_passphrase() {
        let (_, hmac_key) = derive_simple("p");
        assert_eq!(hmac_key, b"p".to_vec());
    }

    #[test]
    fn derive_hkdf_produces_distinct_keys() {
        let (enc, auth) = derive_hkdf(b"master secret", b"some salt");
        assert_ne!(enc, auth);
    }

    #[test]
    fn derive_hkdf_is_deterministic_given_same_inputs() {
        let (e1, a1) = derive_hkdf(b"secret", b"salt");
        let (e2, a2) = derive_hkdf(b"secret", b"salt");
        assert_eq!(e1, e2);
        assert_eq!(a1, a2);
    }
}
