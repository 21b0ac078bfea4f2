//! Content verification reports
//!
//! Chunk-level and object-level integrity checks, plus a streaming
//! verification of reassembled files through a second hash function
//! (SHA-256) to catch tampering introduced after reassembly.

use crate::chunker::Chunk;
use crate::cid::Cid;
use crate::error::{ContentError, ErrorCode};
use crate::manifest::{manifest_cid, verify_manifest, Manifest};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Check one chunk against its declared CID.
pub fn verify_chunk(chunk: &Chunk) -> bool {
    Cid::of(&chunk.data) == chunk.cid
}

/// Per-chunk outcome within a [`ContentReport`].
#[derive(Clone, Debug)]
pub struct ChunkCheck {
    pub index: usize,
    /// CID the manifest declares for this chunk
    pub expected: Cid,
    /// Hash actually computed, present on failure
    pub computed: Option<Cid>,
    pub ok: bool,
}

/// Structured verification report for a manifest and its chunks.
#[derive(Clone, Debug, Default)]
pub struct ContentReport {
    pub chunk_checks: Vec<ChunkCheck>,
    pub manifest_ok: bool,
    pub manifest_cid_ok: bool,
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub errors: Vec<String>,
}

impl ContentReport {
    /// Whether every check passed.
    pub fn is_valid(&self) -> bool {
        self.manifest_ok && self.manifest_cid_ok && self.failed_chunks == 0 && self.errors.is_empty()
    }
}

/// Verify chunks against a manifest, and optionally the manifest against
/// its expected CID.
pub fn verify_content(
    manifest: &Manifest,
    chunks: &[Chunk],
    expected_manifest_cid: Option<&Cid>,
) -> ContentReport {
    let mut report = ContentReport {
        total_chunks: manifest.chunks.len(),
        manifest_ok: true,
        manifest_cid_ok: true,
        ..ContentReport::default()
    };

    if let Err(error) = verify_manifest(manifest) {
        report.manifest_ok = false;
        report.errors.push(error.to_string());
    }

    if let Some(expected) = expected_manifest_cid {
        match manifest_cid(manifest) {
            Ok(computed) if computed == *expected => {}
            Ok(computed) => {
                report.manifest_cid_ok = false;
                report
                    .errors
                    .push(format!("manifest cid {computed} does not match expected {expected}"));
            }
            Err(error) => {
                report.manifest_cid_ok = false;
                report.errors.push(error.to_string());
            }
        }
    }

    if chunks.len() != manifest.chunks.len() {
        report.errors.push(format!(
            "chunk count {} does not match manifest {}",
            chunks.len(),
            manifest.chunks.len()
        ));
    }

    for (index, (chunk, entry)) in chunks.iter().zip(&manifest.chunks).enumerate() {
        let computed = Cid::of(&chunk.data);
        let ok = computed == entry.cid && chunk.cid == entry.cid;
        if !ok {
            report.failed_chunks += 1;
        }
        report.chunk_checks.push(ChunkCheck {
            index,
            expected: entry.cid,
            computed: (!ok).then_some(computed),
            ok,
        });
    }

    report
}

/// Stream a reassembled file through SHA-256 and compare size and digest.
pub fn verify_reconstructed_file(
    path: &Path,
    expected_size: u64,
    expected_sha256: &[u8; 32],
) -> Result<(), ContentError> {
    let io_error = |e: std::io::Error| {
        ContentError::new(ErrorCode::NetworkFailure, "file read failed").with_source(e)
    };

    let mut file = std::fs::File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let read = file.read(&mut buf).map_err(io_error)?;
        if read == 0 {
            break;
        }
        total += read as u64;
        hasher.update(&buf[..read]);
    }

    if total != expected_size {
        return Err(ContentError::new(
            ErrorCode::IntegrityFailure,
            format!("file size {total} does not match expected {expected_size}"),
        ));
    }

    let digest: [u8; 32] = hasher.finalize().into();
    if &digest != expected_sha256 {
        return Err(ContentError::new(
            ErrorCode::IntegrityFailure,
            "file digest does not match expected hash",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_bytes;
    use crate::manifest::build_manifest;

    fn fixture() -> (Vec<Chunk>, Manifest) {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 253) as u8).collect();
        let chunks = chunk_bytes(&data, 1024).unwrap();
        let manifest = build_manifest(&chunks, 1024, None, None).unwrap();
        (chunks, manifest)
    }

    #[test]
    fn test_verify_chunk() {
        let (chunks, _) = fixture();
        assert!(verify_chunk(&chunks[0]));

        let mut corrupted = chunks[0].clone();
        corrupted.data[0] ^= 0xFF;
        assert!(!verify_chunk(&corrupted));
    }

    #[test]
    fn test_valid_content_report() {
        let (chunks, manifest) = fixture();
        let cid = manifest_cid(&manifest).unwrap();

        let report = verify_content(&manifest, &chunks, Some(&cid));
        assert!(report.is_valid());
        assert_eq!(report.total_chunks, 3);
        assert_eq!(report.failed_chunks, 0);
        assert!(report.chunk_checks.iter().all(|c| c.ok));
    }

    #[test]
    fn test_corrupted_chunk_reported() {
        let (mut chunks, manifest) = fixture();
        chunks[1].data[0] ^= 0xFF;

        let report = verify_content(&manifest, &chunks, None);
        assert!(!report.is_valid());
        assert_eq!(report.failed_chunks, 1);
        assert!(!report.chunk_checks[1].ok);
        assert!(report.chunk_checks[1].computed.is_some());
        assert_eq!(report.chunk_checks[1].expected, manifest.chunks[1].cid);
    }

    #[test]
    fn test_wrong_manifest_cid_reported() {
        let (chunks, manifest) = fixture();
        let wrong = Cid::of(b"not the manifest");

        let report = verify_content(&manifest, &chunks, Some(&wrong));
        assert!(!report.is_valid());
        assert!(!report.manifest_cid_ok);
    }

    #[test]
    fn test_count_mismatch_reported() {
        let (chunks, manifest) = fixture();
        let report = verify_content(&manifest, &chunks[..2], None);
        assert!(!report.is_valid());
        assert!(!report.errors.is_empty());
    }

    #[test]
    fn test_file_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reassembled");
        let data = vec![0x42u8; 10_000];
        std::fs::write(&path, &data).unwrap();

        let digest: [u8; 32] = Sha256::digest(&data).into();
        assert!(verify_reconstructed_file(&path, 10_000, &digest).is_ok());

        // Wrong size
        let error = verify_reconstructed_file(&path, 9_999, &digest).unwrap_err();
        assert_eq!(error.code, ErrorCode::IntegrityFailure);

        // Tampered file
        std::fs::write(&path, vec![0x43u8; 10_000]).unwrap();
        let error = verify_reconstructed_file(&path, 10_000, &digest).unwrap_err();
        assert_eq!(error.code, ErrorCode::IntegrityFailure);
    }
}
