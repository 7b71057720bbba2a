//! In-memory [`RemoteStore`] used by the test suites.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Failures can be
//! injected per path to exercise the retry and partial-failure paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::RemoteStore;
use crate::error::SyncError;
use crate::models::{RecordId, RemoteRecord};

/// How operations on an injected path fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailMode {
    /// Every call fails with a permanent error.
    Permanent,
    /// Every call fails with a transient error.
    Transient,
    /// The next `n` calls fail transiently, then calls succeed.
    TransientTimes(usize),
}

pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordId, RemoteRecord>>,
    upsert_failures: RwLock<HashMap<String, FailMode>>,
    record_failures: RwLock<HashMap<String, FailMode>>,
    delete_failures: RwLock<HashMap<String, FailMode>>,
    upsert_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    collection_checks: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            upsert_failures: RwLock::new(HashMap::new()),
            record_failures: RwLock::new(HashMap::new()),
            delete_failures: RwLock::new(HashMap::new()),
            upsert_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            collection_checks: AtomicUsize::new(0),
        }
    }

    /// Make upserts of any chunk of `path` fail.
    pub fn fail_path(&self, path: &str, mode: FailMode) {
        self.upsert_failures
            .write()
            .unwrap()
            .insert(path.to_string(), mode);
    }

    /// Make upserts of one chunk record fail, leaving its siblings alone.
    pub fn fail_record(&self, id: &RecordId, mode: FailMode) {
        self.record_failures
            .write()
            .unwrap()
            .insert(id.as_str().to_string(), mode);
    }

    /// Make deletes of any chunk of `path` fail.
    pub fn fail_delete(&self, path: &str, mode: FailMode) {
        self.delete_failures
            .write()
            .unwrap()
            .insert(path.to_string(), mode);
    }

    pub fn clear_failures(&self) {
        self.upsert_failures.write().unwrap().clear();
        self.record_failures.write().unwrap().clear();
        self.delete_failures.write().unwrap().clear();
    }

    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn collection_checks(&self) -> usize {
        self.collection_checks.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.upsert_calls.store(0, Ordering::SeqCst);
        self.delete_calls.store(0, Ordering::SeqCst);
    }

    pub fn record(&self, id: &RecordId) -> Option<RemoteRecord> {
        self.records.read().unwrap().get(id).cloned()
    }

    pub fn record_count_for(&self, path: &str) -> usize {
        self.records
            .read()
            .unwrap()
            .values()
            .filter(|r| r.path == path)
            .count()
    }

    /// Distinct document paths with at least one record, sorted.
    pub fn paths(&self) -> Vec<String> {
        let records = self.records.read().unwrap();
        let mut paths: Vec<String> = records.values().map(|r| r.path.clone()).collect();
        paths.sort();
        paths.dedup();
        paths
    }

    fn check_failure(
        table: &RwLock<HashMap<String, FailMode>>,
        key: &str,
    ) -> Result<(), SyncError> {
        let mut failures = table.write().unwrap();
        match failures.get_mut(key) {
            None => Ok(()),
            Some(FailMode::Permanent) => Err(SyncError::Permanent(format!(
                "HTTP 422 Unprocessable Entity: rejected {}",
                key
            ))),
            Some(FailMode::Transient) => Err(SyncError::Transient(format!(
                "HTTP 503 Service Unavailable: {}",
                key
            ))),
            Some(FailMode::TransientTimes(n)) => {
                if *n == 0 {
                    return Ok(());
                }
                *n -= 1;
                Err(SyncError::Transient(format!(
                    "HTTP 503 Service Unavailable: {}",
                    key
                )))
            }
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn path_of(id: &RecordId) -> &str {
    id.as_str()
        .rsplit_once('#')
        .map(|(path, _)| path)
        .unwrap_or(id.as_str())
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn ensure_collection(&self) -> Result<(), SyncError> {
        self.collection_checks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_record(&self, record: &RemoteRecord) -> Result<RecordId, SyncError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_failure(&self.upsert_failures, &record.path)?;
        Self::check_failure(&self.record_failures, record.id.as_str())?;
        self.records
            .write()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(record.id.clone())
    }

    async fn delete_record(&self, id: &RecordId) -> Result<(), SyncError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Self::check_failure(&self.delete_failures, path_of(id))?;
        self.records.write().unwrap().remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentMetadata;
    use chrono::Utc;

    fn record(path: &str, index: usize) -> RemoteRecord {
        RemoteRecord {
            id: RecordId::for_chunk(path, index),
            path: path.to_string(),
            chunk_index: index,
            content: "text".to_string(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
            metadata: DocumentMetadata::default(),
        }
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MemoryStore::new();
        store.upsert_record(&record("a.md", 0)).await.unwrap();
        store.upsert_record(&record("a.md", 0)).await.unwrap();
        assert_eq!(store.record_count_for("a.md"), 1);
        assert_eq!(store.upsert_calls(), 2);
    }

    #[tokio::test]
    async fn test_delete_missing_succeeds() {
        let store = MemoryStore::new();
        store
            .delete_record(&RecordId::for_chunk("nope.md", 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_transient_times_recovers() {
        let store = MemoryStore::new();
        store.fail_path("a.md", FailMode::TransientTimes(1));
        assert!(store.upsert_record(&record("a.md", 0)).await.is_err());
        assert!(store.upsert_record(&record("a.md", 0)).await.is_ok());
    }

    #[test]
    fn test_path_of_keeps_hashes_in_path() {
        assert_eq!(path_of(&RecordId::for_chunk("c#sharp.md", 2)), "c#sharp.md");
    }
}
