//! End-to-end sync runs against a temporary vault and an in-memory store.
//!
//! These drive the real vault scanner, diff, index and orchestrator; only
//! the remote side is replaced by `MemoryStore`.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use vault_sync::config::VaultConfig;
use vault_sync::connector_fs::VaultSource;
use vault_sync::error::{RunError, SyncError};
use vault_sync::hash::Fingerprint;
use vault_sync::index::ChangeSetIndex;
use vault_sync::ingest::{SyncOptions, Syncer};
use vault_sync::lock::{lock_path_for, RunLock};
use vault_sync::models::{RecordId, RemoteRecord};
use vault_sync::remote::memory::{FailMode, MemoryStore};
use vault_sync::remote::{RemoteStore, RetryPolicy, SyncClient};
use vault_sync::report::{Operation, SyncReport};

struct Harness {
    _tmp: TempDir,
    vault: PathBuf,
    index_path: PathBuf,
    store: Arc<MemoryStore>,
    max_tokens: usize,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let vault = tmp.path().join("vault");
        fs::create_dir_all(&vault).unwrap();
        let index_path = tmp.path().join("data").join("index.json");
        Self {
            _tmp: tmp,
            vault,
            index_path,
            store: Arc::new(MemoryStore::new()),
            max_tokens: 250,
        }
    }

    fn write(&self, name: &str, content: &str) {
        let path = self.vault.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn remove(&self, name: &str) {
        fs::remove_file(self.vault.join(name)).unwrap();
    }

    fn syncer(&self, force: bool) -> Syncer {
        self.syncer_with(self.store.clone(), force)
    }

    fn syncer_with(&self, store: Arc<dyn RemoteStore>, force: bool) -> Syncer {
        let vault = VaultConfig {
            root: self.vault.clone(),
            include_globs: vec!["**/*.md".to_string()],
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        };
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            request_timeout: Duration::from_secs(2),
        };
        Syncer::new(SyncOptions {
            source: Arc::new(VaultSource::new(vault)),
            client: SyncClient::new(store, retry, self.max_tokens),
            index_path: self.index_path.clone(),
            concurrency: 3,
            allow_empty_corpus: false,
            force,
            dry_run: false,
        })
    }

    async fn run(&self) -> Result<SyncReport, RunError> {
        self.syncer(false).run().await
    }

    fn index(&self) -> ChangeSetIndex {
        ChangeSetIndex::load(&self.index_path)
    }

    fn indexed_paths(&self) -> Vec<String> {
        self.index().paths().map(str::to_string).collect()
    }
}

#[tokio::test]
async fn test_three_run_scenario() {
    let h = Harness::new();
    h.write("a.md", "hello");
    h.write("b.md", "world");

    let first = h.run().await.unwrap();
    assert_eq!(first.added, 2);
    assert_eq!(h.store.upsert_calls(), 2);
    let index = h.index();
    assert_eq!(
        index.get("a.md").unwrap().fingerprint,
        Fingerprint::of_bytes(b"hello")
    );
    assert_eq!(
        index.get("b.md").unwrap().fingerprint,
        Fingerprint::of_bytes(b"world")
    );

    h.store.reset_counters();
    h.write("b.md", "world!");
    h.write("c.md", "new note");
    let second = h.run().await.unwrap();
    assert_eq!(second.added, 1);
    assert_eq!(second.updated, 1);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.unchanged, 1);
    assert_eq!(h.store.upsert_calls(), 2);
    assert_eq!(
        h.store
            .record(&RecordId::for_chunk("b.md", 0))
            .unwrap()
            .content,
        "world!"
    );

    h.store.reset_counters();
    h.remove("a.md");
    let third = h.run().await.unwrap();
    assert_eq!(third.deleted, 1);
    assert_eq!(third.unchanged, 2);
    assert_eq!(h.store.upsert_calls(), 0);
    assert_eq!(h.indexed_paths(), vec!["b.md", "c.md"]);
    assert_eq!(h.store.paths(), vec!["b.md", "c.md"]);
}

#[tokio::test]
async fn test_second_run_without_changes_is_a_no_op() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.write("notes/b.md", "beta");
    h.run().await.unwrap();

    h.store.reset_counters();
    let report = h.run().await.unwrap();
    assert_eq!(report.succeeded(), 0);
    assert_eq!(report.unchanged, 2);
    assert_eq!(h.store.upsert_calls(), 0);
    assert_eq!(h.store.delete_calls(), 0);
}

#[tokio::test]
async fn test_touch_without_edit_is_skipped() {
    let h = Harness::new();
    h.write("a.md", "same");
    h.run().await.unwrap();

    h.store.reset_counters();
    h.write("a.md", "same");
    let report = h.run().await.unwrap();
    assert_eq!(report.unchanged, 1);
    assert_eq!(h.store.upsert_calls(), 0);
}

#[tokio::test]
async fn test_unreadable_vault_aborts_without_deletes() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.write("b.md", "beta");
    h.run().await.unwrap();
    let before = fs::read(&h.index_path).unwrap();

    fs::rename(&h.vault, h.vault.with_extension("moved")).unwrap();
    h.store.reset_counters();
    let err = h.run().await.unwrap_err();

    assert!(matches!(err, RunError::Load(_)));
    assert_eq!(h.store.delete_calls(), 0);
    assert_eq!(fs::read(&h.index_path).unwrap(), before);
    assert_eq!(h.store.paths(), vec!["a.md", "b.md"]);
}

#[tokio::test]
async fn test_one_permanent_failure_among_five() {
    let h = Harness::new();
    for name in ["1.md", "2.md", "3.md", "4.md", "5.md"] {
        h.write(name, &format!("note {}", name));
    }
    h.store.fail_path("3.md", FailMode::Permanent);

    let report = h.run().await.unwrap();
    assert_eq!(report.succeeded(), 4);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].path, "3.md");
    assert_eq!(report.failures[0].operation, Operation::Add);
    assert!(!report.failures[0].transient);
    assert_eq!(h.indexed_paths(), vec!["1.md", "2.md", "4.md", "5.md"]);

    // The failed note is picked up again once the store accepts it.
    h.store.clear_failures();
    let retry = h.run().await.unwrap();
    assert_eq!(retry.added, 1);
    assert_eq!(retry.unchanged, 4);
    assert_eq!(h.index().len(), 5);
}

#[tokio::test]
async fn test_transient_failure_recovers_within_run() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.store.fail_path("a.md", FailMode::TransientTimes(2));

    let report = h.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.added, 1);
    assert_eq!(h.store.upsert_calls(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_are_reported_as_transient() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.store.fail_path("a.md", FailMode::Transient);

    let report = h.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert!(report.failures[0].transient);
    assert_eq!(h.store.upsert_calls(), 3);
    assert!(h.index().is_empty());
}

#[tokio::test]
async fn test_shrinking_note_drops_stale_chunks() {
    let mut h = Harness::new();
    h.max_tokens = 5;
    h.write(
        "long.md",
        "first paragraph\n\nsecond paragraph\n\nthird paragraph",
    );
    let report = h.run().await.unwrap();
    assert_eq!(report.chunks_written, 3);
    assert_eq!(h.store.record_count_for("long.md"), 3);
    assert_eq!(h.index().get("long.md").unwrap().chunk_count, 3);

    h.write("long.md", "first paragraph");
    h.run().await.unwrap();
    assert_eq!(h.store.record_count_for("long.md"), 1);
    assert!(h
        .store
        .record(&RecordId::for_chunk("long.md", 2))
        .is_none());
    assert_eq!(h.index().get("long.md").unwrap().chunk_count, 1);
}

#[tokio::test]
async fn test_failed_delete_is_retried_next_run() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.write("b.md", "beta");
    h.run().await.unwrap();

    h.remove("a.md");
    h.store.fail_delete("a.md", FailMode::Permanent);
    let report = h.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].operation, Operation::Delete);
    assert!(h.index().contains("a.md"));
    assert_eq!(h.store.record_count_for("a.md"), 1);

    h.store.clear_failures();
    let report = h.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(!h.index().contains("a.md"));
    assert_eq!(h.store.record_count_for("a.md"), 0);
}

#[tokio::test]
async fn test_emptied_vault_is_refused() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.run().await.unwrap();

    h.remove("a.md");
    let err = h.run().await.unwrap_err();
    assert!(matches!(err, RunError::EmptyCorpus(1)));
    assert_eq!(h.store.record_count_for("a.md"), 1);
    assert!(h.index().contains("a.md"));
}

#[tokio::test]
async fn test_full_resync_reuploads_everything() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.write("b.md", "beta");
    h.run().await.unwrap();

    h.store.reset_counters();
    let report = h.syncer(true).run().await.unwrap();
    assert_eq!(report.updated, 2);
    assert_eq!(report.unchanged, 0);
    assert_eq!(h.store.upsert_calls(), 2);
    assert_eq!(h.store.paths(), vec!["a.md", "b.md"]);
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let h = Harness::new();
    h.write("a.md", "alpha");

    let held = RunLock::acquire(&lock_path_for(&h.index_path)).unwrap();
    let err = h.run().await.unwrap_err();
    assert!(matches!(err, RunError::Locked(_)));
    assert_eq!(h.store.upsert_calls(), 0);

    drop(held);
    assert!(h.run().await.is_ok());
}

#[tokio::test]
async fn test_corrupt_index_triggers_full_resync() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.run().await.unwrap();

    fs::write(&h.index_path, "{ not json").unwrap();
    h.store.reset_counters();
    let report = h.run().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(h.store.record_count_for("a.md"), 1);
    assert_eq!(h.index().len(), 1);
}

#[tokio::test]
async fn test_obsidian_metadata_is_ignored() {
    let h = Harness::new();
    h.write("a.md", "alpha");
    h.write(".obsidian/workspace.md", "ui state");
    h.write(".trash/old.md", "gone");

    let report = h.run().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(h.indexed_paths(), vec!["a.md"]);
}

#[tokio::test]
async fn test_partially_written_note_leaves_nothing_after_removal() {
    let mut h = Harness::new();
    h.max_tokens = 5;
    h.write("keep.md", "kept");
    h.write(
        "long.md",
        "first paragraph\n\nsecond paragraph\n\nthird paragraph",
    );
    h.store
        .fail_record(&RecordId::for_chunk("long.md", 1), FailMode::Permanent);

    let report = h.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].path, "long.md");
    assert!(!h.index().contains("long.md"));
    assert_eq!(h.store.record_count_for("long.md"), 0);

    h.remove("long.md");
    let report = h.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(h.store.record_count_for("long.md"), 0);
    assert_eq!(h.store.paths(), vec!["keep.md"]);
}

#[tokio::test]
async fn test_partially_written_update_is_fully_deleted_later() {
    let mut h = Harness::new();
    h.max_tokens = 5;
    h.write("keep.md", "kept");
    h.write("long.md", "first paragraph");
    h.run().await.unwrap();
    assert_eq!(h.index().get("long.md").unwrap().chunk_count, 1);

    h.write(
        "long.md",
        "first paragraph\n\nsecond paragraph\n\nthird paragraph",
    );
    h.store
        .fail_record(&RecordId::for_chunk("long.md", 2), FailMode::Permanent);
    let report = h.run().await.unwrap();
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].operation, Operation::Update);
    assert_eq!(h.index().get("long.md").unwrap().chunk_count, 1);
    assert_eq!(h.store.record_count_for("long.md"), 1);

    h.remove("long.md");
    let report = h.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(h.store.record_count_for("long.md"), 0);
}

/// Store that holds every upsert open for a while and records the highest
/// number of upserts running at the same time.
struct SlowStore {
    inner: MemoryStore,
    in_flight: AtomicUsize,
    high_water: AtomicUsize,
}

#[async_trait]
impl RemoteStore for SlowStore {
    async fn ensure_collection(&self) -> Result<(), SyncError> {
        self.inner.ensure_collection().await
    }

    async fn upsert_record(&self, record: &RemoteRecord) -> Result<RecordId, SyncError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        let result = self.inner.upsert_record(record).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_record(&self, id: &RecordId) -> Result<(), SyncError> {
        self.inner.delete_record(id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_documents_stay_within_concurrency() {
    let h = Harness::new();
    for i in 0..20 {
        h.write(&format!("note-{:02}.md", i), &format!("note number {}", i));
    }
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        in_flight: AtomicUsize::new(0),
        high_water: AtomicUsize::new(0),
    });

    let report = h.syncer_with(store.clone(), false).run().await.unwrap();
    assert_eq!(report.added, 20);

    // The harness runs with a concurrency of 3.
    let high_water = store.high_water.load(Ordering::SeqCst);
    assert!(high_water <= 3, "{} upserts ran at once", high_water);
    assert!(high_water > 1, "documents were not synced in parallel");
    assert_eq!(store.inner.paths().len(), 20);
}
