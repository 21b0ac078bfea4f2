//! Beenet content engine
//!
//! Content-addressed storage: fixed-size chunking, cryptographic content
//! identifiers, manifests, provider discovery through the DHT, and a
//! backpressured fetcher with integrity verification.
//!
//! # Modules
//!
//! - [`cid`]: Content identifiers
//! - [`chunker`]: Fixed-size chunking (buffered and streaming)
//! - [`manifest`]: Chunk maps of logical objects
//! - [`store`]: sled-backed local chunk store
//! - [`provider`]: Signed provider records in the DHT
//! - [`fetch`]: Semaphore-bounded chunk fetcher
//! - [`integrity`]: Verification reports
//! - [`error`]: Typed content errors and statistics

pub mod chunker;
pub mod cid;
pub mod error;
pub mod fetch;
pub mod integrity;
pub mod manifest;
pub mod provider;
pub mod store;

pub use chunker::{chunk_bytes, reconstruct, Chunk, ChunkStream, DEFAULT_CHUNK_SIZE};
pub use cid::Cid;
pub use error::{ContentError, ErrorCode, ErrorStats};
pub use fetch::{
    ChunkDataBody, ChunkSender, FetchChunkBody, FetchConfig, Fetcher, PendingFetches,
};
pub use integrity::{verify_chunk, verify_content, verify_reconstructed_file, ContentReport};
pub use manifest::{build_manifest, manifest_cid, verify_manifest, Manifest, ManifestEntry};
pub use provider::{ProvideRecord, ProviderClient};
pub use store::ChunkStore;
