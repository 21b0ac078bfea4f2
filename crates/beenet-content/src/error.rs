//! Typed content errors and aggregated statistics
//!
//! Every content operation fails with a [`ContentError`] carrying a code,
//! the affected CID and provider where known, a timestamp, and whether a
//! retry is worthwhile. An [`ErrorStats`] collector aggregates counts by
//! code and by provider for the operator surface.

use crate::cid::Cid;
use beenet_core::frame::unix_millis;
use beenet_core::Bid;
use parking_lot::Mutex;
use std::collections::HashMap;
use thiserror::Error;

/// Content error classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Connection closed or I/O failure (retryable)
    NetworkFailure,
    /// Per-request deadline exceeded (retryable)
    Timeout,
    /// Chunk or manifest hash mismatch (fatal)
    IntegrityFailure,
    /// No provider records found (retryable)
    ProviderNotFound,
    /// Provider does not hold the chunk (retryable)
    ChunkNotFound,
    /// Manifest failed structural validation (fatal)
    ManifestInvalid,
    /// Response failed to decode (fatal)
    CorruptedData,
    /// Peer signalled a rate limit (retryable, carries retry-after)
    RateLimit,
    /// Request was malformed (fatal)
    InvalidRequest,
}

impl ErrorCode {
    /// Whether an operation failing with this code is worth retrying.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkFailure
                | Self::Timeout
                | Self::ProviderNotFound
                | Self::ChunkNotFound
                | Self::RateLimit
        )
    }
}

/// Structured content operation error.
#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct ContentError {
    pub code: ErrorCode,
    pub message: String,
    pub cid: Option<Cid>,
    pub provider: Option<Bid>,
    /// When the error occurred, milliseconds since the Unix epoch
    pub ts_ms: u64,
    /// Suggested wait before retrying, seconds (rate limits only)
    pub retry_after_secs: Option<u64>,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ContentError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cid: None,
            provider: None,
            ts_ms: unix_millis(),
            retry_after_secs: None,
            source: None,
        }
    }

    pub fn with_cid(mut self, cid: Cid) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn with_provider(mut self, provider: Bid) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

#[derive(Default)]
struct StatsInner {
    by_code: HashMap<ErrorCode, u64>,
    by_provider: HashMap<Bid, u64>,
    last_error: Option<String>,
    last_error_time: Option<u64>,
}

/// Aggregated error statistics.
#[derive(Default)]
pub struct ErrorStats {
    inner: Mutex<StatsInner>,
}

/// Point-in-time view of the collected statistics.
#[derive(Clone, Debug)]
pub struct StatsSnapshot {
    pub by_code: HashMap<ErrorCode, u64>,
    pub by_provider: HashMap<Bid, u64>,
    pub last_error: Option<String>,
    pub last_error_time: Option<u64>,
    pub most_problematic_provider: Option<Bid>,
}

impl ErrorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one error occurrence.
    pub fn record(&self, error: &ContentError) {
        let mut inner = self.inner.lock();
        *inner.by_code.entry(error.code).or_insert(0) += 1;
        if let Some(provider) = error.provider {
            *inner.by_provider.entry(provider).or_insert(0) += 1;
        }
        inner.last_error = Some(error.to_string());
        inner.last_error_time = Some(error.ts_ms);
    }

    /// Count for a specific code.
    pub fn count(&self, code: ErrorCode) -> u64 {
        self.inner.lock().by_code.get(&code).copied().unwrap_or(0)
    }

    /// The provider with the most recorded failures.
    pub fn most_problematic_provider(&self) -> Option<Bid> {
        self.inner
            .lock()
            .by_provider
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(bid, _)| *bid)
    }

    /// Snapshot all collected statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = self.inner.lock();
        StatsSnapshot {
            by_code: inner.by_code.clone(),
            by_provider: inner.by_provider.clone(),
            last_error: inner.last_error.clone(),
            last_error_time: inner.last_error_time,
            most_problematic_provider: inner
                .by_provider
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(bid, _)| *bid),
        }
    }
}
