//! Beenet Core Library
//!
//! This crate provides the identity primitives, canonical encoding, and
//! wire envelope types for the Beenet mesh protocol.
//!
//! # Modules
//!
//! - [`identity`]: Long-term key material and BID rendering
//! - [`honeytag`]: Pronounceable 32-bit identity fingerprints
//! - [`handle`]: Swarm-scoped `nickname~honeytag` handles
//! - [`swarm`]: Swarm identifiers
//! - [`canonical`]: Deterministic CBOR serialization for hashing/signing
//! - [`frame`]: Signed wire envelopes and the record signing discipline
//! - [`seq`]: Sequence numbering and the anti-replay window
//! - [`error`]: Error types

pub mod canonical;
pub mod error;
pub mod frame;
pub mod handle;
pub mod honeytag;
pub mod identity;
pub mod seq;
pub mod swarm;

#[cfg(test)]
mod test_vectors;

pub use error::{Error, Result};
pub use frame::{BaseFrame, Kind, PROTOCOL_VERSION};
pub use identity::{Bid, Identity, IdentityKeys};
pub use seq::{ReplayWindow, SequenceTracker};
pub use swarm::{SwarmId, SwarmName};
