use crate::analytics::models::{AggregateCounters, VisitFact};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed visit record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Process-wide monotonic counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    TotalVisits,
    MobileVisits,
}

impl Counter {
    pub fn key(self) -> &'static str {
        match self {
            Counter::TotalVisits => "total:visits",
            Counter::MobileVisits => "mobile:visits",
        }
    }
}

/// Append-only, time-ordered visit timelines keyed by visitor identity
#[async_trait]
pub trait VisitStore: Send + Sync {
    /// Initialize the storage (create schema, verify connectivity)
    async fn init(&self) -> anyhow::Result<()>;

    /// Append a visit to its identity's timeline, scored by timestamp in epoch millis
    async fn append(&self, ip: &str, fact: &VisitFact) -> StorageResult<()>;

    /// Set or refresh the timeline's time-to-live, measured from now
    async fn touch(&self, ip: &str, ttl: Duration) -> StorageResult<()>;

    /// Increment a counter and return its new value
    async fn increment(&self, counter: Counter) -> StorageResult<u64>;

    /// Visits with score in `[from_ms, to_ms]`, ascending
    async fn range(&self, ip: &str, from_ms: i64, to_ms: i64) -> StorageResult<Vec<VisitFact>>;

    /// Every visit of the identity, ascending
    async fn history(&self, ip: &str) -> StorageResult<Vec<VisitFact>>;

    /// All identities whose timeline has not expired
    async fn identities(&self) -> StorageResult<Vec<String>>;

    /// Current counter values; counters never written read as zero
    async fn counters(&self) -> StorageResult<AggregateCounters>;

    /// Release connections
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Persist one tracked visit
    ///
    /// Appends the fact, refreshes the timeline TTL and bumps the counters.
    /// Every step is attempted even when an earlier one fails; failures are
    /// logged and never returned. Returns whether the append succeeded.
    async fn record(&self, fact: &VisitFact, ttl: Duration) -> bool {
        let appended = match self.append(&fact.ip, fact).await {
            Ok(()) => true,
            Err(e) => {
                warn!(ip = %fact.ip, error = %e, "failed to append visit");
                false
            }
        };

        if let Err(e) = self.touch(&fact.ip, ttl).await {
            warn!(ip = %fact.ip, error = %e, "failed to refresh visitor ttl");
        }

        if let Err(e) = self.increment(Counter::TotalVisits).await {
            warn!(error = %e, "failed to increment total visits");
        }

        if fact.is_mobile {
            if let Err(e) = self.increment(Counter::MobileVisits).await {
                warn!(error = %e, "failed to increment mobile visits");
            }
        }

        appended
    }
}
