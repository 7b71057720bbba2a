//! Remote document store abstraction and the sync client built on it.
//!
//! [`RemoteStore`] is the record-level seam: one method per REST call,
//! idempotent, no retries. [`SyncClient`] is the document-level API the
//! orchestrator uses: it chunks notes, retries transient failures with
//! bounded exponential backoff, and removes chunk records a shrinking
//! document no longer needs.
//!
//! # Retry Strategy
//!
//! - Network errors, timeouts, HTTP 429 and 5xx → retry
//! - HTTP 4xx (not 429), schema and auth errors → fail immediately
//! - Backoff: `base_delay`, then doubling (capped at 2^5 × base)
//! - Every attempt is bounded by `request_timeout`

pub mod memory;
pub mod weaviate;

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::chunk::chunk_text;
use crate::error::SyncError;
use crate::models::{Document, RecordId, RemoteRecord};

/// Record-level operations of a remote document store.
///
/// Implementations must be idempotent: upserting identical content twice
/// leaves one record, and deleting a missing record succeeds.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Check that the target collection exists and create it if not.
    /// Called once per process, not per document.
    async fn ensure_collection(&self) -> Result<(), SyncError>;

    /// Create or replace the record keyed by `record.id`.
    async fn upsert_record(&self, record: &RemoteRecord) -> Result<RecordId, SyncError>;

    /// Delete the record keyed by `id`. Missing records are not an error.
    async fn delete_record(&self, id: &RecordId) -> Result<(), SyncError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt.saturating_sub(1)).min(5))
    }
}

/// Run `op` until it succeeds, fails permanently, or retries run out.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.backoff(attempt)).await;
        }

        let result = match tokio::time::timeout(policy.request_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Transient(format!(
                "timed out after {}ms",
                policy.request_timeout.as_millis()
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    operation = what,
                    attempt = attempt + 1,
                    max_attempts = policy.max_retries + 1,
                    error = %e,
                    "remote call failed"
                );
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_err
        .unwrap_or_else(|| SyncError::Transient(format!("{} failed after retries", what))))
}

/// Result of a document upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertedDocument {
    pub chunk_count: usize,
}

/// Document-level client over a [`RemoteStore`].
#[derive(Clone)]
pub struct SyncClient {
    store: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    max_tokens: usize,
}

impl SyncClient {
    pub fn new(store: Arc<dyn RemoteStore>, retry: RetryPolicy, max_tokens: usize) -> Self {
        Self {
            store,
            retry,
            max_tokens,
        }
    }

    pub async fn ensure_collection(&self) -> Result<(), SyncError> {
        let store = &self.store;
        with_retry(&self.retry, "ensure_collection", move || store.ensure_collection()).await
    }

    /// Upsert a document as ordered chunk records, then delete the chunk
    /// records of the previous version beyond the new chunk count.
    ///
    /// Stops at the first chunk that fails; the caller keeps the old index
    /// entry so the whole document is retried next run. Chunk records at or
    /// past `previous_chunks` that this call touched are removed again before
    /// the error is returned, since the old entry does not account for them.
    pub async fn upsert(
        &self,
        document: &Document,
        previous_chunks: usize,
    ) -> Result<UpsertedDocument, SyncError> {
        let chunks = chunk_text(&document.path, &document.content, self.max_tokens);
        let chunk_count = chunks.len();
        let mut attempted = Vec::with_capacity(chunk_count);

        for chunk in chunks {
            let record = RemoteRecord {
                id: chunk.record_id(),
                path: chunk.path,
                chunk_index: chunk.chunk_index,
                content: chunk.text,
                created_at: document.created_at,
                modified_at: document.modified_at,
                metadata: document.metadata.clone(),
            };
            // A timed out request may still have been applied remotely.
            attempted.push(record.id.clone());
            let store = &self.store;
            let record = &record;
            if let Err(e) =
                with_retry(&self.retry, "upsert", move || store.upsert_record(record)).await
            {
                let untracked = attempted.get(previous_chunks..).unwrap_or_default();
                self.discard_untracked(&document.path, untracked).await;
                return Err(e);
            }
        }

        for stale in chunk_count..previous_chunks {
            self.delete(&RecordId::for_chunk(&document.path, stale))
                .await?;
        }

        Ok(UpsertedDocument { chunk_count })
    }

    /// Best-effort removal of chunk records no index entry will cover.
    async fn discard_untracked(&self, path: &str, ids: &[RecordId]) {
        for id in ids {
            if let Err(e) = self.delete(id).await {
                tracing::warn!(
                    path,
                    record = %id,
                    error = %e,
                    "could not remove partially written chunk"
                );
            }
        }
    }

    pub async fn delete(&self, id: &RecordId) -> Result<(), SyncError> {
        let store = &self.store;
        with_retry(&self.retry, "delete", move || store.delete_record(id)).await
    }

    /// Delete every chunk record the index says `path` occupies.
    pub async fn delete_document(&self, path: &str, chunk_count: usize) -> Result<(), SyncError> {
        for index in 0..chunk_count.max(1) {
            self.delete(&RecordId::for_chunk(path, index)).await?;
        }
        Ok(())
    }
}
