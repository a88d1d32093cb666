//! Constructs the compressor/cipher/MAC composition from a named
//! algorithm set (§4.5). All transforms here are synchronous — the only
//! suspension points in the whole pipeline are object-store reads/writes
//! (§5).

pub mod cipher;
pub mod kdf;
pub mod mac;

pub use cipher::{CipherStream, Direction, Encryption, IV_LEN, KEY_LEN};
pub use mac::{Authentication, MacAccumulator};

use crate::error::Error;

/// Keys derived from the passphrase once per backup (§4.5).
pub struct PipelineKeys {
    pub aes_key: [u8; KEY_LEN],
    pub hmac_key: Vec<u8>,
}

pub fn derive_keys(passphrase: &str) -> PipelineKeys {
    let (aes_key, hmac_key) = kdf::derive_simple(passphrase);
    PipelineKeys { aes_key, hmac_key }
}

/// Resolves the keys to drive the cipher/MAC pipeline with. A missing
/// passphrase is valid only when both `encryption` and `authentication`
/// are `none` (enforced earlier by `require_passphrase_if_needed`), so the
/// zeroed key returned here is never actually used as keystream material.
pub fn resolve_keys(passphrase: Option<&str>) -> ([u8; KEY_LEN], Vec<u8>) {
    match passphrase {
        Some(p) => {
            let keys = derive_keys(p);
            (keys.aes_key, keys.hmac_key)
        }
        None => ([0u8; KEY_LEN], Vec::new()),
    }
}

/// Fatal configuration check run before any network I/O (§4.5, §7
/// `Config`): encryption or authentication requires a passphrase.
pub fn require_passphrase_if_needed(
    encryption: Encryption,
    authentication: Authentication,
    passphrase: &Option<String>,
) -> Result<(), Error> {
    if (!encryption.is_none() || !authentication.is_none()) && passphrase.is_none() {
        return Err(Error::Config(
            "must specify a passphrase for encryption and/or authentication".to_string(),
        ));
    }
    Ok(())
}

pub fn build_cipher(
    encryption: Encryption,
    aes_key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    direction: Direction,
) -> Result<CipherStream, Error> {
    CipherStream::new(encryption, aes_key, iv, direction)
}

pub fn build_mac(authentication: Authentication, hmac_key: &[u8]) -> Result<MacAccumulator, Error> {
    MacAccumulator::new(authentication, hmac_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_required_when_encryption_enabled() {
        let err = require_passphrase_if_needed(Encryption::AesCtr, Authentication::None, &None);
        assert!(err.is_err());
    }

    #[test]
    fn passphrase_not_required_when_everything_disabled() {
        let ok = require_passphrase_if_needed(Encryption::None, Authentication::None, &None);
        assert!(ok.is_ok());
    }
}
