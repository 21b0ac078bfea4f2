//! Backpressured chunk fetching
//!
//! `fetch` returns a manifest's chunks in order, with every chunk verified
//! against its declared CID. A counting semaphore caps in-flight requests
//! at `concurrent_fetches`; each request observes `fetch_timeout`.
//! Providers are tried in the given order; the first fatal error, or
//! exhaustion of all providers, fails the chunk. Dropping the returned
//! future aborts all in-flight chunk tasks.

use crate::chunker::Chunk;
use crate::cid::Cid;
use crate::error::{ContentError, ErrorCode, ErrorStats};
use crate::manifest::{verify_manifest, Manifest, ManifestEntry};
use beenet_core::Bid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Wire body of a `FETCH_CHUNK` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchChunkBody {
    pub cid: Cid,
}

/// Wire body of a `CHUNK_DATA` envelope; echoes the request sequence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkDataBody {
    pub cid: Cid,
    pub request_seq: u64,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

/// Fetcher tunables.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    /// Maximum chunk requests in flight at any instant
    pub concurrent_fetches: usize,
    /// Per-request deadline
    pub fetch_timeout: Duration,
    /// Verify `H(data) == cid` on every received chunk
    pub verify_integrity: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrent_fetches: 8,
            fetch_timeout: Duration::from_secs(10),
            verify_integrity: true,
        }
    }
}

/// Sends `FETCH_CHUNK` envelopes into per-provider sessions.
///
/// The implementor owns the session sequence trackers; `next_seq` reserves
/// the request sequence the response slot is keyed by.
pub trait ChunkSender: Send + Sync + 'static {
    /// Reserve the next outgoing sequence number toward a provider.
    fn next_seq(&self, provider: &Bid) -> u64;

    /// Send a `FETCH_CHUNK` request carrying the given sequence.
    fn send_fetch(
        &self,
        provider: &Bid,
        cid: &Cid,
        seq: u64,
    ) -> impl Future<Output = Result<(), ContentError>> + Send;
}

/// One-shot response slots keyed by request sequence number.
///
/// The message router resolves a slot when the matching `CHUNK_DATA`
/// envelope arrives.
#[derive(Default)]
pub struct PendingFetches {
    slots: Mutex<HashMap<u64, oneshot::Sender<Vec<u8>>>>,
}

impl PendingFetches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a slot for a request sequence.
    pub fn register(&self, seq: u64) -> oneshot::Receiver<Vec<u8>> {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(seq, tx);
        rx
    }

    /// Deliver response data to a waiting slot; false when no slot waits.
    pub fn resolve(&self, seq: u64, data: Vec<u8>) -> bool {
        match self.slots.lock().remove(&seq) {
            Some(tx) => tx.send(data).is_ok(),
            None => false,
        }
    }

    /// Drop a slot after timeout or cancellation.
    pub fn cancel(&self, seq: u64) {
        self.slots.lock().remove(&seq);
    }

    /// Number of outstanding slots.
    pub fn outstanding(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Semaphore-bounded chunk fetcher.
pub struct Fetcher<S: ChunkSender> {
    sender: Arc<S>,
    pending: Arc<PendingFetches>,
    config: FetchConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<ErrorStats>,
}

impl<S: ChunkSender> Fetcher<S> {
    pub fn new(sender: Arc<S>, pending: Arc<PendingFetches>, config: FetchConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.concurrent_fetches));
        Self {
            sender,
            pending,
            config,
            semaphore,
            stats: Arc::new(ErrorStats::new()),
        }
    }

    /// The fetcher's error statistics collector.
    pub fn stats(&self) -> &ErrorStats {
        &self.stats
    }

    /// Fetch every chunk of a manifest, in manifest order.
    ///
    /// Fails with the first chunk's error (by manifest index), preserving
    /// its classification.
    pub async fn fetch(
        &self,
        manifest: &Manifest,
        providers: &[Bid],
    ) -> Result<Vec<Chunk>, ContentError> {
        verify_manifest(manifest)?;
        if providers.is_empty() {
            return Err(ContentError::new(
                ErrorCode::ProviderNotFound,
                "no providers supplied",
            ));
        }

        let mut tasks: JoinSet<Result<(usize, Chunk), (usize, ContentError)>> = JoinSet::new();
        for (index, entry) in manifest.chunks.iter().cloned().enumerate() {
            let sender = Arc::clone(&self.sender);
            let pending = Arc::clone(&self.pending);
            let semaphore = Arc::clone(&self.semaphore);
            let stats = Arc::clone(&self.stats);
            let config = self.config.clone();
            let providers = providers.to_vec();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.map_err(|_| {
                    (
                        index,
                        ContentError::new(ErrorCode::NetworkFailure, "fetch cancelled")
                            .with_cid(entry.cid),
                    )
                })?;

                let mut last_error: Option<ContentError> = None;
                for provider in &providers {
                    match fetch_from_provider(&*sender, &pending, &config, provider, &entry).await {
                        Ok(data) => {
                            return Ok((
                                index,
                                Chunk {
                                    cid: entry.cid,
                                    size: entry.size,
                                    offset: entry.offset,
                                    data,
                                },
                            ));
                        }
                        Err(error) => {
                            warn!(cid = %entry.cid, provider = %provider, %error, "chunk fetch failed");
                            stats.record(&error);
                            if !error.is_retryable() {
                                return Err((index, error));
                            }
                            last_error = Some(error);
                        }
                    }
                }
                Err((
                    index,
                    last_error.unwrap_or_else(|| {
                        ContentError::new(ErrorCode::ProviderNotFound, "all providers exhausted")
                            .with_cid(entry.cid)
                    }),
                ))
            });
        }

        let mut chunks: Vec<Option<Chunk>> = (0..manifest.chunks.len()).map(|_| None).collect();
        let mut first_failure: Option<(usize, ContentError)> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok((index, chunk))) => chunks[index] = Some(chunk),
                Ok(Err((index, error))) => {
                    let replace = first_failure
                        .as_ref()
                        .map(|(i, _)| index < *i)
                        .unwrap_or(true);
                    if replace {
                        first_failure = Some((index, error));
                    }
                }
                Err(join_error) => {
                    return Err(ContentError::new(
                        ErrorCode::NetworkFailure,
                        format!("fetch task aborted: {join_error}"),
                    ));
                }
            }
        }

        if let Some((_, error)) = first_failure {
            return Err(error);
        }

        chunks
            .into_iter()
            .collect::<Option<Vec<Chunk>>>()
            .ok_or_else(|| {
                ContentError::new(ErrorCode::NetworkFailure, "fetch completed with missing chunks")
            })
    }
}

/// One request toward one provider: reserve a sequence, register the
/// response slot, send, await with deadline, verify.
async fn fetch_from_provider<S: ChunkSender>(
    sender: &S,
    pending: &PendingFetches,
    config: &FetchConfig,
    provider: &Bid,
    entry: &ManifestEntry,
) -> Result<Vec<u8>, ContentError> {
    let seq = sender.next_seq(provider);
    let slot = pending.register(seq);

    if let Err(error) = sender.send_fetch(provider, &entry.cid, seq).await {
        pending.cancel(seq);
        return Err(error.with_cid(entry.cid).with_provider(*provider));
    }

    let data = match tokio::time::timeout(config.fetch_timeout, slot).await {
        Err(_) => {
            pending.cancel(seq);
            return Err(ContentError::new(
                ErrorCode::Timeout,
                format!("no chunk response within {:?}", config.fetch_timeout),
            )
            .with_cid(entry.cid)
            .with_provider(*provider));
        }
        Ok(Err(_)) => {
            return Err(ContentError::new(
                ErrorCode::NetworkFailure,
                "response channel dropped",
            )
            .with_cid(entry.cid)
            .with_provider(*provider));
        }
        Ok(Ok(data)) => data,
    };

    if config.verify_integrity && Cid::of(&data) != entry.cid {
        return Err(
            ContentError::new(ErrorCode::IntegrityFailure, "chunk hash mismatch")
                .with_cid(entry.cid)
                .with_provider(*provider),
        );
    }
    if data.len() as u64 != entry.size {
        return Err(ContentError::new(
            ErrorCode::CorruptedData,
            format!("chunk size {} does not match manifest {}", data.len(), entry.size),
        )
        .with_cid(entry.cid)
        .with_provider(*provider));
    }

    debug!(cid = %entry.cid, provider = %provider, seq, "chunk fetched");
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{chunk_bytes, reconstruct};
    use crate::manifest::build_manifest;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

    /// Test sender that serves chunks from a map after a short delay,
    /// tracking the peak number of in-flight requests.
    struct MockSender {
        chunks: HashMap<Cid, Vec<u8>>,
        pending: Arc<PendingFetches>,
        seq: AtomicU64,
        active: Arc<AtomicI64>,
        peak: Arc<AtomicI64>,
        /// CIDs this sender pretends not to have
        missing: Vec<Cid>,
        /// CIDs this sender serves corrupted
        corrupt: Vec<Cid>,
    }

    impl MockSender {
        fn new(chunks: &[Chunk], pending: Arc<PendingFetches>) -> Self {
            Self {
                chunks: chunks.iter().map(|c| (c.cid, c.data.clone())).collect(),
                pending,
                seq: AtomicU64::new(0),
                active: Arc::new(AtomicI64::new(0)),
                peak: Arc::new(AtomicI64::new(0)),
                missing: Vec::new(),
                corrupt: Vec::new(),
            }
        }
    }

    impl ChunkSender for MockSender {
        fn next_seq(&self, _provider: &Bid) -> u64 {
            self.seq.fetch_add(1, Ordering::SeqCst) + 1
        }

        async fn send_fetch(
            &self,
            _provider: &Bid,
            cid: &Cid,
            seq: u64,
        ) -> Result<(), ContentError> {
            if self.missing.contains(cid) {
                // No response will ever arrive; the fetcher times out.
                return Ok(());
            }
            let mut data = match self.chunks.get(cid) {
                Some(data) => data.clone(),
                None => return Ok(()),
            };
            if self.corrupt.contains(cid) {
                data[0] ^= 0xFF;
            }

            let active = self.active.clone();
            let peak = self.peak.clone();
            let pending = self.pending.clone();

            let now_active = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now_active, Ordering::SeqCst);

            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                pending.resolve(seq, data);
            });
            Ok(())
        }
    }

    fn fixture(len: usize, chunk_size: usize) -> (Vec<Chunk>, Manifest, Vec<u8>) {
        let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
        let chunks = chunk_bytes(&data, chunk_size).unwrap();
        let manifest = build_manifest(&chunks, chunk_size as u64, None, None).unwrap();
        (chunks, manifest, data)
    }

    #[tokio::test]
    async fn test_fetch_all_chunks_in_order() {
        let (chunks, manifest, data) = fixture(5000, 512);
        let pending = Arc::new(PendingFetches::new());
        let sender = Arc::new(MockSender::new(&chunks, pending.clone()));
        let fetcher = Fetcher::new(sender, pending, FetchConfig::default());

        let fetched = fetcher.fetch(&manifest, &[Bid([1u8; 32])]).await.unwrap();
        assert_eq!(fetched.len(), chunks.len());
        assert_eq!(reconstruct(&fetched), data);
        for (fetched, expected) in fetched.iter().zip(&chunks) {
            assert_eq!(fetched.offset, expected.offset);
        }
    }

    #[tokio::test]
    async fn test_backpressure_cap_respected() {
        let (chunks, manifest, _) = fixture(20 * 128, 128); // 20 chunks
        assert_eq!(manifest.chunk_count, 20);

        let pending = Arc::new(PendingFetches::new());
        let sender = Arc::new(MockSender::new(&chunks, pending.clone()));
        let peak = sender.peak.clone();

        let config = FetchConfig {
            concurrent_fetches: 2,
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(sender, pending, config);

        let fetched = fetcher.fetch(&manifest, &[Bid([1u8; 32])]).await.unwrap();
        assert_eq!(fetched.len(), 20);
        assert!(
            peak.load(Ordering::SeqCst) <= 2,
            "peak in-flight {} exceeded cap",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_timeout_classified_retryable() {
        let (chunks, manifest, _) = fixture(600, 512);
        let pending = Arc::new(PendingFetches::new());
        let mut sender = MockSender::new(&chunks, pending.clone());
        sender.missing = vec![chunks[0].cid];

        let config = FetchConfig {
            fetch_timeout: Duration::from_millis(50),
            ..FetchConfig::default()
        };
        let fetcher = Fetcher::new(Arc::new(sender), pending.clone(), config);

        let error = fetcher
            .fetch(&manifest, &[Bid([1u8; 32])])
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::Timeout);
        assert_eq!(error.cid, Some(chunks[0].cid));
        assert!(error.provider.is_some());
        assert!(error.is_retryable());
        // Timed-out slots are cleaned up.
        assert_eq!(pending.outstanding(), 0);
        assert!(fetcher.stats().count(ErrorCode::Timeout) >= 1);
    }

    #[tokio::test]
    async fn test_integrity_failure_is_fatal() {
        let (chunks, manifest, _) = fixture(600, 512);
        let pending = Arc::new(PendingFetches::new());
        let mut sender = MockSender::new(&chunks, pending.clone());
        sender.corrupt = vec![chunks[1].cid];

        let fetcher = Fetcher::new(Arc::new(sender), pending, FetchConfig::default());
        let error = fetcher
            .fetch(&manifest, &[Bid([1u8; 32]), Bid([2u8; 32])])
            .await
            .unwrap_err();

        // Fatal: the second provider is never tried.
        assert_eq!(error.code, ErrorCode::IntegrityFailure);
        assert!(!error.is_retryable());
    }

    #[tokio::test]
    async fn test_no_providers() {
        let (_, manifest, _) = fixture(600, 512);
        let pending = Arc::new(PendingFetches::new());
        let sender = Arc::new(MockSender::new(&[], pending.clone()));
        let fetcher = Fetcher::new(sender, pending, FetchConfig::default());

        let error = fetcher.fetch(&manifest, &[]).await.unwrap_err();
        assert_eq!(error.code, ErrorCode::ProviderNotFound);
    }

    #[tokio::test]
    async fn test_invalid_manifest_rejected_before_fetching() {
        let (chunks, mut manifest, _) = fixture(600, 512);
        manifest.file_size += 1;

        let pending = Arc::new(PendingFetches::new());
        let sender = Arc::new(MockSender::new(&chunks, pending.clone()));
        let fetcher = Fetcher::new(sender, pending, FetchConfig::default());

        let error = fetcher
            .fetch(&manifest, &[Bid([1u8; 32])])
            .await
            .unwrap_err();
        assert_eq!(error.code, ErrorCode::ManifestInvalid);
    }
}
