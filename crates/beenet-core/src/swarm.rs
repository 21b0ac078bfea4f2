//! Swarm identifiers and names

use crate::error::{Error, Result};
use crate::handle::normalize_nickname;
use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// 128-bit random swarm identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub [u8; 16]);

impl SwarmId {
    /// Generate a fresh random swarm id.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get as raw bytes
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parse the lowercase base32 string form.
    pub fn parse(s: &str) -> Result<Self> {
        let bytes = BASE32_NOPAD
            .decode(s.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidSwarmId(format!("base32 decode: {e}")))?;
        let raw: [u8; 16] = bytes
            .try_into()
            .map_err(|_| Error::InvalidSwarmId("swarm id must be 16 bytes".into()))?;
        Ok(Self(raw))
    }
}

impl std::fmt::Display for SwarmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", BASE32_NOPAD.encode(&self.0).to_ascii_lowercase())
    }
}

impl std::fmt::Debug for SwarmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SwarmId({self})")
    }
}

impl std::str::FromStr for SwarmId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Normalized human-readable swarm name.
///
/// Same syntactic class as nicknames: trimmed, NFKC-folded, lowercased,
/// `[a-z0-9-]{3,32}`. Construction is the only way in, so a held value is
/// always valid.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SwarmName(String);

impl SwarmName {
    /// Normalize and validate a swarm name.
    pub fn parse(input: &str) -> Result<Self> {
        Ok(Self(normalize_nickname(input)?))
    }

    /// The normalized name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SwarmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SwarmName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SwarmName {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<SwarmName> for String {
    fn from(name: SwarmName) -> String {
        name.0
    }
}
