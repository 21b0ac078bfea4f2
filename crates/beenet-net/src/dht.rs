//! DHT abstraction and well-known key derivations
//!
//! The core only needs `put`/`get` by 32-byte key; routing table
//! maintenance lives outside. Keys are domain-separated BLAKE3 hashes so
//! provider, presence, handle, and name records never collide.

use beenet_core::{Bid, SwarmId};
use blake3::Hasher;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use thiserror::Error;

/// 32-byte DHT key
pub type DhtKey = [u8; 32];

/// DHT errors
#[derive(Debug, Error)]
pub enum DhtError {
    #[error("dht backend error: {0}")]
    Backend(String),
}

/// Minimal distributed hash table interface.
///
/// Implementations are assumed internally thread-safe; the core issues
/// concurrent gets and puts.
pub trait Dht: Send + Sync + 'static {
    /// Store a value under a key, replacing any existing value.
    fn put(
        &self,
        key: DhtKey,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), DhtError>> + Send;

    /// Fetch the value stored under a key.
    fn get(&self, key: DhtKey) -> impl Future<Output = Result<Option<Vec<u8>>, DhtError>> + Send;
}

// =============================================================================
// DOMAIN SEPARATION PREFIXES
// =============================================================================

/// Domain prefix for provider records
pub const DOMAIN_PROVIDE: &[u8] = b"provide";
/// Domain prefix for presence records
pub const DOMAIN_PRESENCE: &[u8] = b"presence";
/// Domain prefix for handle index records
pub const DOMAIN_HANDLE: &[u8] = b"handle";
/// Domain prefix for name records
pub const DOMAIN_NAME: &[u8] = b"name";

fn derive_key(domain: &[u8], swarm: &SwarmId, suffix: &[u8]) -> DhtKey {
    let mut hasher = Hasher::new();
    hasher.update(domain);
    hasher.update(swarm.as_bytes());
    hasher.update(suffix);
    *hasher.finalize().as_bytes()
}

/// Key for provider records: `BLAKE3("provide" || swarm || cid_string)`.
pub fn provide_key(swarm: &SwarmId, cid: &str) -> DhtKey {
    derive_key(DOMAIN_PROVIDE, swarm, cid.as_bytes())
}

/// Key for presence records: `BLAKE3("presence" || swarm || bid)`.
pub fn presence_key(swarm: &SwarmId, bid: &Bid) -> DhtKey {
    derive_key(DOMAIN_PRESENCE, swarm, bid.as_bytes())
}

/// Key for handle index records: `BLAKE3("handle" || swarm || handle)`.
pub fn handle_key(swarm: &SwarmId, handle: &str) -> DhtKey {
    derive_key(DOMAIN_HANDLE, swarm, handle.as_bytes())
}

/// Key for name records: `BLAKE3("name" || swarm || name)`.
pub fn name_key(swarm: &SwarmId, name: &str) -> DhtKey {
    derive_key(DOMAIN_NAME, swarm, name.as_bytes())
}

/// In-memory DHT for tests and single-process swarms.
#[derive(Default)]
pub struct MemoryDht {
    records: RwLock<HashMap<DhtKey, Vec<u8>>>,
}

impl MemoryDht {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Dht for MemoryDht {
    async fn put(&self, key: DhtKey, value: Vec<u8>) -> Result<(), DhtError> {
        self.records.write().insert(key, value);
        Ok(())
    }

    async fn get(&self, key: DhtKey) -> Result<Option<Vec<u8>>, DhtError> {
        Ok(self.records.read().get(&key).cloned())
    }
}
