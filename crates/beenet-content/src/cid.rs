//! Content identifiers
//!
//! A CID is the 256-bit BLAKE3 hash of the addressed bytes, rendered as
//! `bafy:<lowercase base32 without padding>`. String and hash forms are
//! interconvertible and compare equal through the byte form.

use beenet_core::Error as CoreError;
use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

/// String prefix for rendered CIDs
pub const CID_PREFIX: &str = "bafy:";

/// 256-bit content identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cid(pub [u8; 32]);

impl Cid {
    /// The CID of a byte string: `BLAKE3(data)`.
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Get as raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse the `bafy:<base32>` string form.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let encoded = s
            .strip_prefix(CID_PREFIX)
            .ok_or_else(|| CoreError::Decode(format!("cid missing {CID_PREFIX} prefix")))?;
        let bytes = BASE32_NOPAD
            .decode(encoded.to_ascii_uppercase().as_bytes())
            .map_err(|e| CoreError::Decode(format!("cid base32: {e}")))?;
        let raw: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Decode("cid hash must be 32 bytes".into()))?;
        Ok(Self(raw))
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{CID_PREFIX}{}",
            BASE32_NOPAD.encode(&self.0).to_ascii_lowercase()
        )
    }
}

impl std::fmt::Debug for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cid({})", hex::encode(&self.0[..8]))
    }
}

impl std::str::FromStr for Cid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
