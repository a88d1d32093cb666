use crate::error::Error;
use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encryption {
    None,
    AesOfb,
    AesCfb,
    AesCtr,
}

impl Encryption {
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "none" => Ok(Encryption::None),
            "aes-ofb" => Ok(Encryption::AesOfb),
            "aes-cfb" => Ok(Encryption::AesCfb),
            "aes-ctr" => Ok(Encryption::AesCtr),
            other => Err(Error::Config(format!("unsupported encryption method: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Encryption::None => "none",
            Encryption::AesOfb => "aes-ofb",
            Encryption::AesCfb => "aes-cfb",
            Encryption::AesCtr => "aes-ctr",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Encryption::None)
    }
}

type Ofb = ofb::Ofb<Aes256>;
type CfbEncryptor = cfb_mode::Encryptor<Aes256>;
type CfbDecryptor = cfb_mode::Decryptor<Aes256>;
type Ctr = ctr::Ctr128BE<Aes256>;

/// A keyed, in-place stream cipher over one of the three AES stream modes
/// the metadata record can name (§4.5). `None` is a no-op pass-through.
pub enum CipherStream {
    None,
    Ofb(Ofb),
    CfbEncrypt(CfbEncryptor),
    CfbDecrypt(CfbDecryptor),
    Ctr(Ctr),
}

impl CipherStream {
    pub fn new(
        encryption: Encryption,
        key: &[u8; KEY_LEN],
        iv: &[u8; IV_LEN],
        direction: Direction,
    ) -> Result<Self, Error> {
        let bad_key = |e: cipher::InvalidLength| Error::Config(format!("invalid cipher key/iv: {e}"));
        Ok(match encryption {
            Encryption::None => CipherStream::None,
            Encryption::AesOfb => {
                CipherStream::Ofb(Ofb::new_from_slices(key, iv).map_err(bad_key)?)
            }
            Encryption::AesCfb => match direction {
                Direction::Encrypt => {
                    CipherStream::CfbEncrypt(CfbEncryptor::new_from_slices(key, iv).map_err(bad_key)?)
                }
                Direction::Decrypt => {
                    CipherStream::CfbDecrypt(CfbDecryptor::new_from_slices(key, iv).map_err(bad_key)?)
                }
            },
            Encryption::AesCtr => {
                CipherStream::Ctr(Ctr::new_from_slices(key, iv).map_err(bad_key)?)
            }
        })
    }

    /// Apply the keystream to `buf` in place. Safe to call repeatedly with
    /// successive slices of a stream — each mode carries its own position.
    pub fn apply(&mut self, buf: &mut [u8]) {
        match self {
            CipherStream::None => {}
            CipherStream::Ofb(c) => c.apply_keystream(buf),
            CipherStream::CfbEncrypt(c) => c.apply_keystream(buf),
            CipherStream::CfbDecrypt(c) => c.apply_keystream(buf),
            CipherStream::Ctr(c) => c.apply_keystream(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; KEY_LEN] {
        [7u8; KEY_LEN]
    }

    fn iv() -> [u8; IV_LEN] {
        [9u8; IV_LEN]
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert!(Encryption::parse("rot13").is_err());
    }

    #[test]
    fn ctr_roundtrips() {
        let mut enc = CipherStream::new(Encryption::AesCtr, &key(), &iv(), Direction::Encrypt).unwrap();
        let mut dec = CipherStream::new(Encryption::AesCtr, &key(), &iv(), Direction::Decrypt).unwrap();
        let mut data = b"the quick brown fox jumps over the lazy dog".to_vec();
        let original = data.clone();
        enc.apply(&mut data);
        assert_ne!(data, original);
        dec.apply(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn ofb_roundtrips_across_multiple_calls() {
        let mut enc = CipherStream::new(Encryption::AesOfb, &key(), &iv(), Direction::Encrypt).unwrap();
        let mut dec = CipherStream::new(Encryption::AesOfb, &key(), &iv(), Direction::Decrypt).unwrap();

        let mut part1 = b"hello ".to_vec();
        let mut part2 = b"world!".to_vec();
        enc.apply(&mut part1);
        enc.apply(&mut part2);
        dec.apply(&mut part1);
        dec.apply(&mut part2);
        assert_eq!(part1, b"hello ");
        assert_eq!(part2, b"world!");
    }

    #[test]
    fn cfb_roundtrips() {
        let mut enc = CipherStream::new(Encryption::AesCfb, &key(), &iv(), Direction::Encrypt).unwrap();
        let mut dec = CipherStream::new(Encryption::AesCfb, &key(), &iv(), Direction::Decrypt).unwrap();
        let mut data = b"0123456789abcdef0123456789abcdef0123".to_vec();
        let original = data.clone();
        enc.apply(&mut data);
        dec.apply(&mut data);
        assert_eq!(data, original);
    }

    #[test]
    fn none_is_a_passthrough() {
        let mut c = CipherStream::new(Encryption::None, &key(), &iv(), Direction::Encrypt).unwrap();
        let mut data = b"unchanged".to_vec();
        let original = data.clone();
        c.apply(&mut data);
        assert_eq!(data, original);
    }
}
