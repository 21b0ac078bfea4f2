//! Persistent chunk storage using sled

use crate::chunker::Chunk;
use crate::cid::Cid;
use sled::Db;
use std::path::Path;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("chunk data does not hash to its cid")]
    CidMismatch,
}

/// Local content-addressed chunk store.
///
/// Backs the daemon's `FETCH_CHUNK` handler; keys are raw CID bytes.
pub struct ChunkStore {
    db: Db,
    chunks: sled::Tree,
    manifests: sled::Tree,
}

impl ChunkStore {
    /// Open storage at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let chunks = db.open_tree("chunks")?;
        let manifests = db.open_tree("manifests")?;
        Ok(Self {
            db,
            chunks,
            manifests,
        })
    }

    /// Store a chunk, verifying its CID first.
    pub fn put_chunk(&self, chunk: &Chunk) -> Result<(), StoreError> {
        if Cid::of(&chunk.data) != chunk.cid {
            return Err(StoreError::CidMismatch);
        }
        self.chunks.insert(chunk.cid.as_bytes(), chunk.data.clone())?;
        Ok(())
    }

    /// Store raw bytes, returning their CID.
    pub fn put_bytes(&self, data: &[u8]) -> Result<Cid, StoreError> {
        let cid = Cid::of(data);
        self.chunks.insert(cid.as_bytes(), data)?;
        Ok(cid)
    }

    /// Fetch chunk bytes by CID.
    pub fn get(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.chunks.get(cid.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Whether a chunk is present.
    pub fn has(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.chunks.contains_key(cid.as_bytes())?)
    }

    /// Remove a chunk, returning whether it was present.
    pub fn remove(&self, cid: &Cid) -> Result<bool, StoreError> {
        Ok(self.chunks.remove(cid.as_bytes())?.is_some())
    }

    /// Store a serialized manifest under its CID.
    pub fn put_manifest(&self, cid: &Cid, bytes: &[u8]) -> Result<(), StoreError> {
        self.manifests.insert(cid.as_bytes(), bytes)?;
        Ok(())
    }

    /// Fetch a serialized manifest by CID.
    pub fn get_manifest(&self, cid: &Cid) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.manifests.get(cid.as_bytes())?.map(|v| v.to_vec()))
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
