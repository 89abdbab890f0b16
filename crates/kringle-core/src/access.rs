//! Access codes
//!
//! A group is addressed publicly by a 6-character code drawn from
//! `[A-Z0-9]`. The space is 36^6 (about 2.2 billion); it resists casual
//! guessing and collisions but is not a secret.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{KringleError, KringleResult};

/// Length of an access code
pub const ACCESS_CODE_LEN: usize = 6;

/// Characters an access code is drawn from
pub const ACCESS_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Normalised access code, always uppercase
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessCode([u8; ACCESS_CODE_LEN]);

impl AccessCode {
    /// Draw a code uniformly from the alphabet
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut code = [0u8; ACCESS_CODE_LEN];
        for c in code.iter_mut() {
            *c = ACCESS_CODE_ALPHABET[rng.gen_range(0..ACCESS_CODE_ALPHABET.len())];
        }
        AccessCode(code)
    }

    /// Parse user input: surrounding whitespace is ignored and letters are
    /// uppercased before validation.
    pub fn parse(input: &str) -> KringleResult<Self> {
        let normalized = input.trim().to_ascii_uppercase();
        let bytes = normalized.as_bytes();

        if bytes.len() != ACCESS_CODE_LEN || !bytes.iter().all(|b| ACCESS_CODE_ALPHABET.contains(b)) {
            return Err(KringleError::InvalidAccessCode(input.to_string()));
        }

        let mut code = [0u8; ACCESS_CODE_LEN];
        code.copy_from_slice(bytes);
        Ok(AccessCode(code))
    }

    pub fn as_str(&self) -> &str {
        // Only alphabet bytes are ever stored
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    #[inline]
    pub fn to_bytes(self) -> [u8; ACCESS_CODE_LEN] {
        self.0
    }

    /// Rebuild from raw bytes, validating the alphabet
    pub fn from_bytes(bytes: [u8; ACCESS_CODE_LEN]) -> KringleResult<Self> {
        if bytes.iter().all(|b| ACCESS_CODE_ALPHABET.contains(b)) {
            Ok(AccessCode(bytes))
        } else {
            Err(KringleError::InvalidAccessCode(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        }
    }
}

impl fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessCode({})", self.as_str())
    }
}

impl fmt::Display for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessCode {
    type Err = KringleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccessCode::parse(s)
    }
}

impl Serialize for AccessCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AccessCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccessCode::parse(&s).map_err(de::Error::custom)
    }
}
