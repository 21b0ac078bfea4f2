//! Manifests: ordered chunk maps of logical objects
//!
//! A manifest lists `(cid, size, offset)` for every chunk of an object,
//! plus totals and optional MIME type and filename. The manifest is itself
//! content-addressed: its CID is the hash of its canonical CBOR bytes, the
//! same canonical form used for signed records. Peers must agree on this
//! serialization for manifest CIDs to reproduce across implementations.

use crate::chunker::Chunk;
use crate::cid::Cid;
use crate::error::{ContentError, ErrorCode};
use beenet_core::canonical::to_canonical_cbor;
use beenet_core::frame::unix_millis;
use serde::{Deserialize, Serialize};

/// Current manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// One chunk's metadata within a manifest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub cid: Cid,
    pub size: u64,
    pub offset: u64,
}

/// Ordered chunk map describing a logical object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub version: u32,
    pub chunk_size: u64,
    pub chunk_count: u64,
    pub file_size: u64,
    /// Creation time, milliseconds since the Unix epoch
    pub created_ms: u64,
    pub mime: Option<String>,
    pub filename: Option<String>,
    pub chunks: Vec<ManifestEntry>,
}

/// Aggregate chunk metadata into a manifest.
pub fn build_manifest(
    chunks: &[Chunk],
    chunk_size: u64,
    mime: Option<String>,
    filename: Option<String>,
) -> Result<Manifest, ContentError> {
    if chunk_size == 0 {
        return Err(ContentError::new(
            ErrorCode::InvalidRequest,
            "chunk size must be nonzero",
        ));
    }
    let entries: Vec<ManifestEntry> = chunks
        .iter()
        .map(|c| ManifestEntry {
            cid: c.cid,
            size: c.size,
            offset: c.offset,
        })
        .collect();
    let file_size = entries.iter().map(|e| e.size).sum();

    let manifest = Manifest {
        version: MANIFEST_VERSION,
        chunk_size,
        chunk_count: entries.len() as u64,
        file_size,
        created_ms: unix_millis(),
        mime,
        filename,
        chunks: entries,
    };
    verify_manifest(&manifest)?;
    Ok(manifest)
}

/// Structural validation of a manifest.
///
/// Checks version, chunk count, contiguous offsets from zero, full-size
/// non-final chunks, a bounded final chunk, and the size total.
pub fn verify_manifest(manifest: &Manifest) -> Result<(), ContentError> {
    let invalid = |msg: String| ContentError::new(ErrorCode::ManifestInvalid, msg);

    if manifest.version == 0 {
        return Err(invalid("manifest version must be nonzero".into()));
    }
    if manifest.chunk_size == 0 {
        return Err(invalid("chunk size must be nonzero".into()));
    }
    if manifest.chunks.len() as u64 != manifest.chunk_count {
        return Err(invalid(format!(
            "chunk count {} does not match entry count {}",
            manifest.chunk_count,
            manifest.chunks.len()
        )));
    }

    let mut expected_offset = 0u64;
    let last = manifest.chunks.len().saturating_sub(1);
    for (index, entry) in manifest.chunks.iter().enumerate() {
        if entry.offset != expected_offset {
            return Err(invalid(format!(
                "chunk {index} offset {} is not contiguous (expected {expected_offset})",
                entry.offset
            )));
        }
        if index < last && entry.size != manifest.chunk_size {
            return Err(invalid(format!(
                "non-final chunk {index} has size {} (expected {})",
                entry.size, manifest.chunk_size
            )));
        }
        if entry.size > manifest.chunk_size {
            return Err(invalid(format!(
                "chunk {index} size {} exceeds chunk size {}",
                entry.size, manifest.chunk_size
            )));
        }
        expected_offset += entry.size;
    }

    if expected_offset != manifest.file_size {
        return Err(invalid(format!(
            "chunk sizes sum to {expected_offset}, manifest claims {}",
            manifest.file_size
        )));
    }
    Ok(())
}

/// The manifest's own CID: hash of its canonical CBOR serialization.
pub fn manifest_cid(manifest: &Manifest) -> Result<Cid, ContentError> {
    let bytes = to_canonical_cbor(manifest).map_err(|e| {
        ContentError::new(ErrorCode::ManifestInvalid, "manifest encoding failed").with_source(e)
    })?;
    Ok(Cid::of(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_bytes;

    fn sample_manifest() -> Manifest {
        let data = vec![3u8; 2500];
        let chunks = chunk_bytes(&data, 1000).unwrap();
        build_manifest(&chunks, 1000, Some("text/plain".into()), None).unwrap()
    }

    #[test]
    fn test_build_and_verify() {
        let manifest = sample_manifest();
        assert_eq!(manifest.chunk_count, 3);
        assert_eq!(manifest.file_size, 2500);
        assert!(verify_manifest(&manifest).is_ok());
    }

    #[test]
    fn test_empty_object() {
        let manifest = build_manifest(&[], 1000, None, None).unwrap();
        assert_eq!(manifest.chunk_count, 0);
        assert_eq!(manifest.file_size, 0);
        assert!(verify_manifest(&manifest).is_ok());
    }

    #[test]
    fn test_cid_deterministic() {
        let manifest = sample_manifest();
        assert_eq!(
            manifest_cid(&manifest).unwrap(),
            manifest_cid(&manifest).unwrap()
        );
    }

    #[test]
    fn test_cid_changes_with_content() {
        let a = sample_manifest();
        let mut b = a.clone();
        b.filename = Some("honey.txt".into());
        assert_ne!(manifest_cid(&a).unwrap(), manifest_cid(&b).unwrap());
    }

    #[test]
    fn test_rejects_gap_in_offsets() {
        let mut manifest = sample_manifest();
        manifest.chunks[1].offset += 1;
        assert!(verify_manifest(&manifest).is_err());
    }

    #[test]
    fn test_rejects_undersized_middle_chunk() {
        let mut manifest = sample_manifest();
        manifest.chunks[0].size -= 1;
        assert!(verify_manifest(&manifest).is_err());
    }

    #[test]
    fn test_rejects_oversized_final_chunk() {
        let mut manifest = sample_manifest();
        manifest.chunks[2].size = manifest.chunk_size + 1;
        manifest.file_size = 2000 + manifest.chunk_size + 1;
        assert!(verify_manifest(&manifest).is_err());
    }

    #[test]
    fn test_rejects_wrong_total() {
        let mut manifest = sample_manifest();
        manifest.file_size += 1;
        assert!(verify_manifest(&manifest).is_err());
    }

    #[test]
    fn test_rejects_count_mismatch() {
        let mut manifest = sample_manifest();
        manifest.chunk_count += 1;
        assert!(verify_manifest(&manifest).is_err());
    }

    #[test]
    fn test_rejects_zero_version() {
        let mut manifest = sample_manifest();
        manifest.version = 0;
        assert!(verify_manifest(&manifest).is_err());
    }
}
