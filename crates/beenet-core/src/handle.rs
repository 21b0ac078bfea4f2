//! Swarm-scoped handles
//!
//! A handle is `nickname~honeytag`, optionally suffixed `@swarmname`.
//! Nicknames are trimmed, NFKC-folded, lowercased, and must match
//! `[a-z0-9-]{3,32}`. The honeytag suffix makes `nickname~honeytag`
//! collision-free within a swarm.

use crate::error::{Error, Result};
use crate::honeytag;
use crate::swarm::SwarmName;
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Minimum nickname length in characters
pub const NICKNAME_MIN: usize = 3;
/// Maximum nickname length in characters
pub const NICKNAME_MAX: usize = 32;

/// Normalize a nickname: trim, NFKC compatibility fold, lowercase.
///
/// Rejects the input when the normalized form falls outside
/// `[a-z0-9-]{3,32}`.
pub fn normalize_nickname(input: &str) -> Result<String> {
    let folded: String = input.trim().nfkc().collect::<String>().to_lowercase();
    validate_nickname(&folded)?;
    Ok(folded)
}

fn validate_nickname(nickname: &str) -> Result<()> {
    let len = nickname.chars().count();
    if !(NICKNAME_MIN..=NICKNAME_MAX).contains(&len) {
        return Err(Error::InvalidHandle(format!(
            "nickname must be {NICKNAME_MIN}-{NICKNAME_MAX} characters, got {len}"
        )));
    }
    if let Some(bad) = nickname
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Err(Error::InvalidHandle(format!(
            "nickname character '{bad}' outside [a-z0-9-]"
        )));
    }
    Ok(())
}

/// A parsed `nickname~honeytag[@swarmname]` handle.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle {
    pub nickname: String,
    pub honeytag: String,
    pub swarm: Option<SwarmName>,
}

impl Handle {
    /// Build a handle from parts, normalizing the nickname.
    pub fn new(nickname: &str, honeytag: &str, swarm: Option<&str>) -> Result<Self> {
        let nickname = normalize_nickname(nickname)?;
        honeytag::decode_honeytag(honeytag)?;
        let swarm = match swarm {
            Some(s) => Some(SwarmName::parse(s)?),
            None => None,
        };
        Ok(Self {
            nickname,
            honeytag: honeytag.to_string(),
            swarm,
        })
    }

    /// Parse the string form.
    pub fn parse(s: &str) -> Result<Self> {
        let (body, swarm) = match s.split_once('@') {
            Some((body, swarm)) => (body, Some(swarm)),
            None => (s, None),
        };
        let (nickname, tag) = body
            .split_once('~')
            .ok_or_else(|| Error::InvalidHandle("missing '~' separator".into()))?;
        Self::new(nickname, tag, swarm)
    }

    /// The swarm-local `nickname~honeytag` portion.
    pub fn local_part(&self) -> String {
        format!("{}~{}", self.nickname, self.honeytag)
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}~{}", self.nickname, self.honeytag)?;
        if let Some(swarm) = &self.swarm {
            write!(f, "@{swarm}")?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
