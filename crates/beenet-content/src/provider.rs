//! Provider records: who serves which content
//!
//! A signed [`ProvideRecord`] asserts that a bee serves a CID at the given
//! addresses until `ts_ms + ttl_secs`. Records live in the DHT under
//! `BLAKE3("provide" || swarm || cid_string)`; several providers of the
//! same CID share the key, so the stored value is a record list.
//! Unpublishing writes a backdated TTL=1 record in place of the live one.

use crate::cid::Cid;
use crate::error::{ContentError, ErrorCode};
use beenet_core::canonical::{from_cbor, to_canonical_cbor};
use beenet_core::frame::{sign_record, unix_millis, verify_record, Signable};
use beenet_core::{Bid, Identity, SwarmId};
use beenet_net::dht::{provide_key, Dht};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Default provider record lifetime (1 hour).
pub const PROVIDE_TTL_SECS: u64 = 3600;

/// Signed assertion that a bee serves a CID.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProvideRecord {
    pub cid: Cid,
    pub provider: Bid,
    pub addrs: Vec<String>,
    /// Creation time, milliseconds since the Unix epoch
    pub ts_ms: u64,
    /// Lifetime in seconds; the record expires at `ts_ms + ttl_secs`
    pub ttl_secs: u64,
    #[serde(with = "serde_bytes")]
    pub sig: Vec<u8>,
}

impl Signable for ProvideRecord {
    fn signature_mut(&mut self) -> &mut Vec<u8> {
        &mut self.sig
    }

    fn signature(&self) -> &[u8] {
        &self.sig
    }
}

impl ProvideRecord {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.ts_ms + self.ttl_secs.saturating_mul(1000)
    }

    /// Signature check against the provider's own key (BID is the key).
    fn verify_own_signature(&self) -> bool {
        match self.provider.verifying_key() {
            Ok(key) => verify_record(self, &key).is_ok(),
            Err(_) => false,
        }
    }
}

/// Publishes and resolves provider records through the DHT.
pub struct ProviderClient<D: Dht> {
    dht: Arc<D>,
    swarm: SwarmId,
    identity: Identity,
    addrs: Vec<String>,
}

impl<D: Dht> ProviderClient<D> {
    pub fn new(dht: Arc<D>, swarm: SwarmId, identity: Identity, addrs: Vec<String>) -> Self {
        Self {
            dht,
            swarm,
            identity,
            addrs,
        }
    }

    /// Publish a signed provider record for a CID.
    pub async fn publish(&self, cid: &Cid) -> Result<(), ContentError> {
        let record = self.build_record(cid, unix_millis(), PROVIDE_TTL_SECS)?;
        self.replace_own_record(cid, record).await
    }

    /// Effectively delete our record: backdated timestamp, TTL of one
    /// second.
    pub async fn unpublish(&self, cid: &Cid) -> Result<(), ContentError> {
        let backdated = unix_millis().saturating_sub(60_000);
        let record = self.build_record(cid, backdated, 1)?;
        self.replace_own_record(cid, record).await
    }

    /// Resolve live provider records for a CID.
    ///
    /// Accepts a single record or an array at the key; expired,
    /// addressless, and malformed entries are discarded.
    pub async fn lookup(&self, cid: &Cid) -> Result<Vec<ProvideRecord>, ContentError> {
        let key = provide_key(&self.swarm, &cid.to_string());
        let raw = self
            .dht
            .get(key)
            .await
            .map_err(|e| {
                ContentError::new(ErrorCode::NetworkFailure, "dht get failed")
                    .with_cid(*cid)
                    .with_source(e)
            })?;

        let Some(raw) = raw else {
            return Ok(Vec::new());
        };

        let records = decode_records(&raw);
        let now = unix_millis();
        Ok(records
            .into_iter()
            .filter(|r| {
                !r.is_expired(now)
                    && !r.addrs.is_empty()
                    && r.cid == *cid
                    && r.verify_own_signature()
            })
            .collect())
    }

    fn build_record(
        &self,
        cid: &Cid,
        ts_ms: u64,
        ttl_secs: u64,
    ) -> Result<ProvideRecord, ContentError> {
        let mut record = ProvideRecord {
            cid: *cid,
            provider: self.identity.bid(),
            addrs: self.addrs.clone(),
            ts_ms,
            ttl_secs,
            sig: Vec::new(),
        };
        sign_record(&mut record, self.identity.signing_key()).map_err(|e| {
            ContentError::new(ErrorCode::InvalidRequest, "record signing failed").with_source(e)
        })?;
        Ok(record)
    }

    /// Swap our record into the stored list, keeping other providers' live
    /// entries.
    async fn replace_own_record(
        &self,
        cid: &Cid,
        record: ProvideRecord,
    ) -> Result<(), ContentError> {
        let key = provide_key(&self.swarm, &cid.to_string());
        let existing = self.dht.get(key).await.map_err(|e| {
            ContentError::new(ErrorCode::NetworkFailure, "dht get failed")
                .with_cid(*cid)
                .with_source(e)
        })?;

        let now = unix_millis();
        let own = self.identity.bid();
        let mut records: Vec<ProvideRecord> = existing
            .as_deref()
            .map(decode_records)
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.provider != own && !r.is_expired(now))
            .collect();
        records.push(record);

        let bytes = to_canonical_cbor(&records).map_err(|e| {
            ContentError::new(ErrorCode::InvalidRequest, "record encoding failed").with_source(e)
        })?;
        debug!(%cid, count = records.len(), "publishing provider records");
        self.dht.put(key, bytes).await.map_err(|e| {
            ContentError::new(ErrorCode::NetworkFailure, "dht put failed")
                .with_cid(*cid)
                .with_source(e)
        })
    }
}

/// Decode a stored value as a record list, falling back to a single
/// record. Undecodable values yield an empty list.
fn decode_records(raw: &[u8]) -> Vec<ProvideRecord> {
    if let Ok(records) = from_cbor::<Vec<ProvideRecord>>(raw) {
        return records;
    }
    if let Ok(record) = from_cbor::<ProvideRecord>(raw) {
        return vec![record];
    }
    Vec::new()
}
