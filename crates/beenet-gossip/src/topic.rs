//! Swarm-scoped topic identifiers

use beenet_core::SwarmId;
use data_encoding::BASE32_NOPAD;

/// Domain prefix for topic derivation
pub const DOMAIN_TOPIC: &[u8] = b"topic";

/// Wire identifier for a topic:
/// `base32(BLAKE3("topic" || swarm_id || topic_name))`.
pub fn topic_id(swarm: &SwarmId, name: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(DOMAIN_TOPIC);
    hasher.update(swarm.as_bytes());
    hasher.update(name.as_bytes());
    BASE32_NOPAD
        .encode(hasher.finalize().as_bytes())
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let swarm = SwarmId([1u8; 16]);
        assert_eq!(topic_id(&swarm, "waggle"), topic_id(&swarm, "waggle"));
    }

    #[test]
    fn test_scoped_by_swarm_and_name() {
        let a = SwarmId([1u8; 16]);
        let b = SwarmId([2u8; 16]);
        assert_ne!(topic_id(&a, "waggle"), topic_id(&b, "waggle"));
        assert_ne!(topic_id(&a, "waggle"), topic_id(&a, "dance"));
    }

    #[test]
    fn test_lowercase_base32() {
        let id = topic_id(&SwarmId([3u8; 16]), "nectar");
        assert_eq!(id, id.to_ascii_lowercase());
        assert!(!id.is_empty());
    }
}
