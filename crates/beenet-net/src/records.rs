//! Signed naming records stored in the DHT
//!
//! Presence, handle, and name records all carry an Ed25519 signature
//! following the common record discipline; readers validate the signature
//! and expiry before trusting a record.

use beenet_core::frame::{unix_millis, Signable};
use beenet_core::handle::Handle;
use beenet_core::{honeytag, Bid, SwarmId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record validation errors
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record expired at {0}")]
    Expired(u64),
    #[error("handle honeytag does not match bid")]
    HoneytagMismatch,
    #[error("malformed record: {0}")]
    Malformed(String),
}

/// Announces where a bee can be reached within a swarm.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub swarm_id: SwarmId,
    pub bid: Bid,
    /// `nickname~honeytag` handle; the honeytag suffix must match the bid
    pub handle: String,
    pub multiaddrs: Vec<String>,
    pub capabilities: Vec<String>,
    /// Absolute expiry, milliseconds since the Unix epoch
    pub expires_ms: u64,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for PresenceRecord {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

impl PresenceRecord {
    /// Structural validation: expiry and the honeytag binding.
    pub fn validate(&self, now_ms: u64) -> Result<(), RecordError> {
        if now_ms > self.expires_ms {
            return Err(RecordError::Expired(self.expires_ms));
        }
        let handle = Handle::parse(&self.handle)
            .map_err(|e| RecordError::Malformed(e.to_string()))?;
        if handle.honeytag != honeytag::honeytag(&self.bid) {
            return Err(RecordError::HoneytagMismatch);
        }
        Ok(())
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_ms
    }
}

/// Ephemeral `handle -> BID` mapping, signed by the BID it names.
///
/// Expires on a short schedule; publishers refresh it alongside presence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HandleIndex {
    pub handle: String,
    pub bid: Bid,
    /// Absolute expiry, milliseconds since the Unix epoch
    pub expires_ms: u64,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for HandleIndex {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

impl HandleIndex {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expires_ms
    }
}

/// Swarm-scoped name binding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NameRecord {
    pub swarm_id: SwarmId,
    pub name: String,
    pub bid: Bid,
    pub ts_ms: u64,
    pub ttl_secs: u64,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for NameRecord {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

impl NameRecord {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.ts_ms + self.ttl_secs * 1000
    }
}

/// Default presence lifetime (10 minutes).
pub const PRESENCE_TTL_MS: u64 = 10 * 60 * 1000;
/// Default handle index lifetime (5 minutes).
pub const HANDLE_INDEX_TTL_MS: u64 = 5 * 60 * 1000;
/// Default name record lifetime (1 hour).
pub const NAME_RECORD_TTL_SECS: u64 = 3600;

/// Build a signed presence record for an identity.
pub fn build_presence(
    identity: &beenet_core::Identity,
    swarm_id: SwarmId,
    nickname: &str,
    multiaddrs: Vec<String>,
    capabilities: Vec<String>,
) -> beenet_core::Result<PresenceRecord> {
    let mut record = PresenceRecord {
        swarm_id,
        bid: identity.bid(),
        handle: identity.handle(nickname)?,
        multiaddrs,
        capabilities,
        expires_ms: unix_millis() + PRESENCE_TTL_MS,
        sig: Vec::new(),
    };
    beenet_core::frame::sign_record(&mut record, identity.signing_key())?;
    Ok(record)
}

/// Build a signed handle index entry for an identity.
pub fn build_handle_index(
    identity: &beenet_core::Identity,
    nickname: &str,
) -> beenet_core::Result<HandleIndex> {
    let mut record = HandleIndex {
        handle: identity.handle(nickname)?,
        bid: identity.bid(),
        expires_ms: unix_millis() + HANDLE_INDEX_TTL_MS,
        sig: Vec::new(),
    };
    beenet_core::frame::sign_record(&mut record, identity.signing_key())?;
    Ok(record)
}

/// Build a signed name record binding a swarm-scoped name to an identity.
pub fn build_name_record(
    identity: &beenet_core::Identity,
    swarm_id: SwarmId,
    name: &str,
) -> beenet_core::Result<NameRecord> {
    let mut record = NameRecord {
        swarm_id,
        name: beenet_core::handle::normalize_nickname(name)?,
        bid: identity.bid(),
        ts_ms: unix_millis(),
        ttl_secs: NAME_RECORD_TTL_SECS,
        sig: Vec::new(),
    };
    beenet_core::frame::sign_record(&mut record, identity.signing_key())?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beenet_core::frame::verify_record;
    use beenet_core::Identity;

    #[test]
    fn test_presence_sign_verify() {
        let id = Identity::generate();
        let record = build_presence(
            &id,
            SwarmId::generate(),
            "forager",
            vec!["/ip4/127.0.0.1/tcp/7000".into()],
            vec!["content".into()],
        )
        .unwrap();

        assert!(verify_record(&record, &id.verifying_key()).is_ok());
        assert!(record.validate(unix_millis()).is_ok());
    }

    #[test]
    fn test_presence_honeytag_binding() {
        let id = Identity::generate();
        let other = Identity::generate();
        let mut record = build_presence(&id, SwarmId::generate(), "forager", vec![], vec![]).unwrap();

        // Swap in a different bid: the handle suffix no longer matches.
        record.bid = other.bid();
        assert!(matches!(
            record.validate(unix_millis()),
            Err(RecordError::HoneytagMismatch)
        ));
    }

    #[test]
    fn test_presence_expiry() {
        let id = Identity::generate();
        let record = build_presence(&id, SwarmId::generate(), "forager", vec![], vec![]).unwrap();
        assert!(record.is_expired(record.expires_ms + 1));
        assert!(!record.is_expired(record.expires_ms));
    }

    #[test]
    fn test_handle_index_roundtrip() {
        let id = Identity::generate();
        let record = build_handle_index(&id, "scout").unwrap();

        assert!(verify_record(&record, &id.verifying_key()).is_ok());
        assert!(record.handle.starts_with("scout~"));

        let mut tampered = record.clone();
        tampered.handle = "drone~babab-babab".into();
        assert!(verify_record(&tampered, &id.verifying_key()).is_err());
    }

    #[test]
    fn test_name_record_sign_verify() {
        let id = Identity::generate();
        let record = build_name_record(&id, SwarmId::generate(), "  Queen  ").unwrap();

        assert_eq!(record.name, "queen");
        assert_eq!(record.bid, id.bid());
        assert!(verify_record(&record, &id.verifying_key()).is_ok());

        let mut tampered = record.clone();
        tampered.name = "drone".into();
        assert!(verify_record(&tampered, &id.verifying_key()).is_err());
    }

    #[test]
    fn test_name_record_expiry() {
        let id = Identity::generate();
        let record = build_name_record(&id, SwarmId::generate(), "queen").unwrap();

        let deadline = record.ts_ms + record.ttl_secs * 1000;
        assert!(!record.is_expired(deadline));
        assert!(record.is_expired(deadline + 1));
    }

    #[test]
    fn test_name_record_rejects_bad_name() {
        let id = Identity::generate();
        assert!(build_name_record(&id, SwarmId::generate(), "bad name!").is_err());
    }
}
