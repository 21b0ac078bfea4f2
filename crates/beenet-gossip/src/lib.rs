//! Beenet gossip mesh
//!
//! Topic-based epidemic message dissemination: subscription, deduplicated
//! forwarding, and IHAVE/IWANT/GRAFT/PRUNE mesh maintenance.
//!
//! # Modules
//!
//! - [`topic`]: Swarm-scoped topic identifiers
//! - [`seen`]: TTL cache of recently seen message ids
//! - [`mesh`]: Per-topic peer sets
//! - [`engine`]: Publish/forward/control engine and background tasks

pub mod engine;
pub mod mesh;
pub mod seen;
pub mod topic;

pub use engine::{
    Delivery, FrameSender, Gossip, GossipConfig, GossipError, PubSubEnvelope,
};
pub use mesh::TopicMesh;
pub use seen::SeenCache;
pub use topic::topic_id;
