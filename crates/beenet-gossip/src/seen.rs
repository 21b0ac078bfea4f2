//! TTL cache of recently seen message ids
//!
//! Gossip uses this to drop duplicates. Many tasks insert concurrently; a
//! periodic sweeper evicts entries older than the TTL.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default entry lifetime (10 minutes).
pub const DEFAULT_SEEN_TTL: Duration = Duration::from_secs(600);

/// Map from message id to insertion time, with TTL eviction.
pub struct SeenCache {
    entries: RwLock<HashMap<String, Instant>>,
    ttl: Duration,
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::new(DEFAULT_SEEN_TTL)
    }
}

impl SeenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a message id; returns true when it was not already present.
    pub fn insert(&self, mid: &str) -> bool {
        self.entries
            .write()
            .insert(mid.to_string(), Instant::now())
            .is_none()
    }

    /// Whether a live entry exists for the id.
    pub fn contains(&self, mid: &str) -> bool {
        self.entries
            .read()
            .get(mid)
            .map(|at| at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Evict entries older than the TTL; returns the eviction count.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, at| at.elapsed() < self.ttl);
        before - entries.len()
    }

    /// Number of entries, including any not yet swept.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
