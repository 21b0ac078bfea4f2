//! Fixed-size content chunking
//!
//! Content is split into consecutive slices of at most `chunk_size` bytes;
//! each slice's CID is the hash of its bytes. The streaming form reads
//! from any `Read` source and never buffers more than one chunk.

use crate::cid::Cid;
use crate::error::{ContentError, ErrorCode};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// A single chunk of content data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// BLAKE3 hash of the data
    pub cid: Cid,
    /// The raw chunk bytes
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
    /// Length of the data in bytes
    pub size: u64,
    /// Byte offset within the parent object
    pub offset: u64,
}

impl Chunk {
    fn from_slice(data: &[u8], offset: u64) -> Self {
        Self {
            cid: Cid::of(data),
            data: data.to_vec(),
            size: data.len() as u64,
            offset,
        }
    }
}

/// Split a byte string into chunks of at most `chunk_size` bytes.
///
/// Empty input yields an empty list; a zero chunk size is an error.
pub fn chunk_bytes(data: &[u8], chunk_size: usize) -> Result<Vec<Chunk>, ContentError> {
    if chunk_size == 0 {
        return Err(ContentError::new(
            ErrorCode::InvalidRequest,
            "chunk size must be nonzero",
        ));
    }

    let mut chunks = Vec::with_capacity(data.len().div_ceil(chunk_size));
    let mut offset = 0u64;
    for slice in data.chunks(chunk_size) {
        chunks.push(Chunk::from_slice(slice, offset));
        offset += slice.len() as u64;
    }
    Ok(chunks)
}

/// Reassemble chunk data in the given order.
pub fn reconstruct(chunks: &[Chunk]) -> Vec<u8> {
    let total: usize = chunks.iter().map(|c| c.data.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend_from_slice(&chunk.data);
    }
    out
}

/// Streaming chunker over any byte source.
///
/// Memory use is bounded by one chunk regardless of input size.
pub struct ChunkStream<R: Read> {
    reader: R,
    chunk_size: usize,
    offset: u64,
    done: bool,
}

impl<R: Read> ChunkStream<R> {
    pub fn new(reader: R, chunk_size: usize) -> Result<Self, ContentError> {
        if chunk_size == 0 {
            return Err(ContentError::new(
                ErrorCode::InvalidRequest,
                "chunk size must be nonzero",
            ));
        }
        Ok(Self {
            reader,
            chunk_size,
            offset: 0,
            done: false,
        })
    }

    /// Read the next chunk; `None` once the source is drained.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, ContentError> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let read = self
                .reader
                .read(&mut buf[filled..])
                .map_err(|e| {
                    ContentError::new(ErrorCode::NetworkFailure, "chunk source read failed")
                        .with_source(e)
                })?;
            if read == 0 {
                self.done = true;
                break;
            }
            filled += read;
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        let chunk = Chunk::from_slice(&buf, self.offset);
        self.offset += filled as u64;
        Ok(Some(chunk))
    }
}
