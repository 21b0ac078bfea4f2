//! Error types for the Beenet core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Beenet core error types
#[derive(Debug, Error)]
pub enum Error {
    /// CBOR serialization failure
    #[error("encoding error: {0}")]
    Encode(String),

    /// CBOR deserialization failure
    #[error("decoding error: {0}")]
    Decode(String),

    /// Floating-point values never appear in canonical encodings
    #[error("disallowed value kind: float")]
    FloatDisallowed,

    /// Signature did not verify against the claimed key
    #[error("invalid signature")]
    InvalidSignature,

    /// Malformed or unparseable public key material
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Malformed BID string
    #[error("invalid bid: {0}")]
    InvalidBid(String),

    /// Malformed honeytag string
    #[error("invalid honeytag: {0}")]
    InvalidHoneytag(String),

    /// Handle or nickname failed syntactic validation
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Malformed swarm identifier
    #[error("invalid swarm id: {0}")]
    InvalidSwarmId(String),

    /// Envelope carried a message kind we do not know
    #[error("unknown message kind: {0}")]
    UnknownKind(u16),

    /// Envelope version does not match the local protocol version
    #[error("protocol version mismatch: got {got}, want {want}")]
    VersionMismatch { got: u16, want: u16 },
}
