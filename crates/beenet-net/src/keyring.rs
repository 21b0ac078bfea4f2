//! BID -> verifying key registry
//!
//! The handshake verifies peer signatures against keys looked up here. The
//! registry is an explicit dependency injected at construction, never a
//! global; tests register known keys through the same seam.

use beenet_core::{Bid, Identity};
use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Registry of known peer verifying keys.
#[derive(Default)]
pub struct KeyRegistry {
    keys: RwLock<HashMap<Bid, VerifyingKey>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer's verifying key.
    pub fn register(&self, bid: Bid, key: VerifyingKey) {
        self.keys.write().insert(bid, key);
    }

    /// Register an identity's own key (convenience for tests and bootstrap).
    pub fn register_identity(&self, identity: &Identity) {
        self.register(identity.bid(), identity.verifying_key());
    }

    /// Look up a verifying key by BID.
    pub fn lookup(&self, bid: &Bid) -> Option<VerifyingKey> {
        self.keys.read().get(bid).copied()
    }

    /// Whether the BID is known.
    pub fn contains(&self, bid: &Bid) -> bool {
        self.keys.read().contains_key(bid)
    }

    /// Remove a key, returning whether it was present.
    pub fn remove(&self, bid: &Bid) -> bool {
        self.keys.write().remove(bid).is_some()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup() {
        let registry = KeyRegistry::new();
        let id = Identity::generate();

        assert!(registry.lookup(&id.bid()).is_none());
        registry.register_identity(&id);
        assert_eq!(
            registry.lookup(&id.bid()).unwrap().to_bytes(),
            id.verifying_key().to_bytes()
        );
    }

    #[test]
    fn test_remove() {
        let registry = KeyRegistry::new();
        let id = Identity::generate();
        registry.register_identity(&id);

        assert!(registry.remove(&id.bid()));
        assert!(!registry.remove(&id.bid()));
        assert!(registry.is_empty());
    }
}
