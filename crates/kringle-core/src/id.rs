//! Identity types for Kringle
//!
//! Ids are 64-bit internally and travel as opaque 16-character lowercase
//! hex strings. Zero is reserved and never generated.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::KringleError;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const ZERO: $name = $name(0);

            #[inline]
            pub fn new(id: u64) -> Self {
                $name(id)
            }

            /// Generate a fresh non-zero id
            pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
                loop {
                    let id = rng.gen::<u64>();
                    if id != 0 {
                        return $name(id);
                    }
                }
            }

            #[inline]
            pub fn to_bytes(self) -> [u8; 8] {
                self.0.to_le_bytes()
            }

            #[inline]
            pub fn from_bytes(bytes: [u8; 8]) -> Self {
                $name(u64::from_le_bytes(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "({:016x})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:016x}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = KringleError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if s.len() != 16 {
                    return Err(KringleError::InvalidInput(format!(
                        concat!("malformed ", $label, " id: {:?}"),
                        s
                    )));
                }
                u64::from_str_radix(s, 16).map($name).map_err(|_| {
                    KringleError::InvalidInput(format!(concat!("malformed ", $label, " id: {:?}"), s))
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

opaque_id!(
    /// Group identity
    GroupId,
    "Group"
);

opaque_id!(
    /// Participant identity - unique across groups
    ParticipantId,
    "Participant"
);

opaque_id!(
    /// Identity of one (giver, receiver) pair in an assignment mapping
    PairId,
    "Pair"
);

opaque_id!(
    /// Gift idea identity
    IdeaId,
    "Idea"
);
