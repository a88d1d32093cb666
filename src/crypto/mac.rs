use crate::error::Error;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use sha3::{Sha3_256, Sha3_512};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authentication {
    None,
    HmacSha256,
    HmacSha512,
    HmacSha3_256,
    HmacSha3_512,
}

impl Authentication {
    pub fn parse(name: &str) -> Result<Self, Error> {
        match name {
            "none" => Ok(Authentication::None),
            "hmac-sha256" => Ok(Authentication::HmacSha256),
            "hmac-sha512" => Ok(Authentication::HmacSha512),
            "hmac-sha3-256" => Ok(Authentication::HmacSha3_256),
            "hmac-sha3-512" => Ok(Authentication::HmacSha3_512),
            other => Err(Error::Config(format!("unsupported authentication method: {other}"))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Authentication::None => "none",
            Authentication::HmacSha256 => "hmac-sha256",
            Authentication::HmacSha512 => "hmac-sha512",
            Authentication::HmacSha3_256 => "hmac-sha3-256",
            Authentication::HmacSha3_512 => "hmac-sha3-512",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Authentication::None)
    }
}

/// A running MAC accumulator keyed per §4.5. Fed the plaintext (pre-
/// compression on upload, post-decompression on download — never
/// ciphertext, per the §9 "silent-corruption bug" warning) and finalized
/// once at the end of the stream.
pub enum MacAccumulator {
    None,
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
    Sha3_256(Hmac<Sha3_256>),
    Sha3_512(Hmac<Sha3_512>),
}

impl MacAccumulator {
    pub fn new(authentication: Authentication, key: &[u8]) -> Result<Self, Error> {
        let bad_key = |e: hmac::digest::InvalidLength| Error::Config(format!("invalid HMAC key: {e}"));
        Ok(match authentication {
            Authentication::None => MacAccumulator::None,
            Authentication::HmacSha256 => {
                MacAccumulator::Sha256(Hmac::<Sha256>::new_from_slice(key).map_err(bad_key)?)
            }
            Authentication::HmacSha512 => {
                MacAccumulator::Sha512(Hmac::<Sha512>::new_from_slice(key).map_err(bad_key)?)
            }
            Authentication::HmacSha3_256 => {
                MacAccumulator::Sha3_256(Hmac::<Sha3_256>::new_from_slice(key).map_err(bad_key)?)
            }
            Authentication::HmacSha3_512 => {
                MacAccumulator::Sha3_512(Hmac::<Sha3_512>::new_from_slice(key).map_err(bad_key)?)
            }
        })
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            MacAccumulator::None => {}
            MacAccumulator::Sha256(m) => m.update(data),
            MacAccumulator::Sha512(m) => m.update(data),
            MacAccumulator::Sha3_256(m) => m.update(data),
            MacAccumulator::Sha3_512(m) => m.update(data),
        }
    }

    /// Finalize into the hex digest stored as `metadata.hmac`, or the empty
    /// string when authentication is disabled (§3).
    pub fn finalize_hex(self) -> String {
        match self {
            MacAccumulator::None => String::new(),
            MacAccumulator::Sha256(m) => hex::encode(m.finalize().into_bytes()),
            MacAccumulator::Sha512(m) => hex::encode(m.finalize().into_bytes()),
            MacAccumulator::Sha3_256(m) => hex::encode(m.finalize().into_bytes()),
            MacAccumulator::Sha3_512(m) => hex::encode(m.finalize().into_bytes()),
        }
    }
}
