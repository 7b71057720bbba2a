//! Sync run orchestration.
//!
//! One run walks a fixed sequence of phases:
//!
//! ```text
//! Idle → Loading → Diffing → Syncing → Reporting → Idle
//! ```
//!
//! - **Loading** scans the vault and reads the change-set index. A vault
//!   that cannot be read aborts the run before anything remote happens.
//! - **Diffing** classifies every note as add, update, delete or unchanged.
//! - **Syncing** runs the remote operations on a bounded worker pool. Each
//!   worker owns one document; a failure is recorded and the others go on.
//! - **Reporting** folds worker outcomes into the index, saves it once,
//!   and emits the [`SyncReport`].
//!
//! Only documents whose remote operation fully succeeded get a new index
//! entry. Everything else keeps its previous entry and is picked up again
//! on the next run.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Config;
use crate::connector_fs::VaultSource;
use crate::diff::{diff, PendingDelete, PendingUpsert};
use crate::error::RunError;
use crate::hash::Fingerprint;
use crate::index::{ChangeSetIndex, IndexEntry};
use crate::lock::{lock_path_for, RunLock};
use crate::remote::weaviate::WeaviateStore;
use crate::remote::SyncClient;
use crate::report::{DocumentFailure, Operation, SyncReport};
use crate::traits::CorpusSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    Loading,
    Diffing,
    Syncing,
    Reporting,
}

pub struct SyncOptions {
    pub source: Arc<dyn CorpusSource>,
    pub client: SyncClient,
    pub index_path: PathBuf,
    /// Maximum number of documents in flight at once.
    pub concurrency: usize,
    /// Permit a run where the vault is empty but the index is not, which
    /// deletes every remote record.
    pub allow_empty_corpus: bool,
    /// Re-upload every note even when its fingerprint matches.
    pub force: bool,
    /// Stop after diffing; nothing remote is touched and the index is
    /// not written.
    pub dry_run: bool,
}

/// Result of one worker.
enum Outcome {
    Upserted {
        operation: Operation,
        path: String,
        fingerprint: Fingerprint,
        chunk_count: usize,
    },
    Deleted {
        path: String,
    },
    Failed(DocumentFailure),
}

pub struct Syncer {
    options: SyncOptions,
    phase: SyncPhase,
}

impl Syncer {
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    fn enter(&mut self, phase: SyncPhase) {
        debug!(from = ?self.phase, to = ?phase, "sync phase");
        self.phase = phase;
    }

    /// Run one sync pass and return its report.
    ///
    /// Per-document remote failures are part of the report, not an error.
    /// `Err` means the run was aborted: the index was locked, the vault
    /// could not be read, the empty-vault guard tripped, or the index could
    /// not be saved.
    pub async fn run(&mut self) -> Result<SyncReport, RunError> {
        let started = Instant::now();
        let _lock = if self.options.dry_run {
            None
        } else {
            Some(RunLock::acquire(&lock_path_for(&self.options.index_path))?)
        };

        let result = self.run_phases(started).await;
        self.enter(SyncPhase::Idle);
        result
    }

    async fn run_phases(&mut self, started: Instant) -> Result<SyncReport, RunError> {
        self.enter(SyncPhase::Loading);
        let corpus = self.options.source.scan().await?;
        let mut index = ChangeSetIndex::load(&self.options.index_path);
        info!(
            source = self.options.source.name(),
            documents = corpus.len(),
            indexed = index.len(),
            "vault loaded"
        );

        if corpus.is_empty() && !index.is_empty() && !self.options.allow_empty_corpus {
            return Err(RunError::EmptyCorpus(index.len()));
        }

        self.enter(SyncPhase::Diffing);
        let changes = diff(&corpus, &index, self.options.force);
        drop(corpus);
        info!(
            to_add = changes.to_add.len(),
            to_update = changes.to_update.len(),
            to_delete = changes.to_delete.len(),
            unchanged = changes.unchanged,
            "change set computed"
        );

        let mut report = SyncReport {
            unchanged: changes.unchanged,
            dry_run: self.options.dry_run,
            ..Default::default()
        };

        if self.options.dry_run {
            report.added = changes.to_add.len();
            report.updated = changes.to_update.len();
            report.deleted = changes.to_delete.len();
            self.enter(SyncPhase::Reporting);
            report.duration = started.elapsed();
            report.log();
            return Ok(report);
        }

        self.enter(SyncPhase::Syncing);
        let mut workers = Vec::with_capacity(changes.operation_count());
        let permits = Arc::new(Semaphore::new(self.options.concurrency.max(1)));

        let upserts = changes
            .to_add
            .into_iter()
            .map(|p| (Operation::Add, p))
            .chain(changes.to_update.into_iter().map(|p| (Operation::Update, p)));
        for (operation, pending) in upserts {
            let path = pending.document.path.clone();
            let client = self.options.client.clone();
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                upsert_one(&client, operation, pending).await
            });
            workers.push((operation, path, handle));
        }
        for pending in changes.to_delete {
            let path = pending.path.clone();
            let client = self.options.client.clone();
            let permits = Arc::clone(&permits);
            let handle = tokio::spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                delete_one(&client, pending).await
            });
            workers.push((Operation::Delete, path, handle));
        }

        let outcomes = join_all(workers).await;

        self.enter(SyncPhase::Reporting);
        let synced_at = Utc::now();
        for outcome in outcomes {
            match outcome {
                Outcome::Upserted {
                    operation,
                    path,
                    fingerprint,
                    chunk_count,
                } => {
                    index.insert(
                        path,
                        IndexEntry {
                            fingerprint,
                            synced_at,
                            chunk_count,
                        },
                    );
                    report.chunks_written += chunk_count;
                    report.record(operation);
                }
                Outcome::Deleted { path } => {
                    index.remove(&path);
                    report.record(Operation::Delete);
                }
                Outcome::Failed(failure) => report.failures.push(failure),
            }
        }
        report.failures.sort_by(|a, b| a.path.cmp(&b.path));

        index.save(&self.options.index_path)?;

        report.duration = started.elapsed();
        report.log();
        Ok(report)
    }
}

/// Wait for every worker. A worker that panicked counts as a failure of
/// its document so the index keeps the old entry.
async fn join_all(workers: Vec<(Operation, String, JoinHandle<Outcome>)>) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(workers.len());
    for (operation, path, handle) in workers {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Outcome::Failed(DocumentFailure {
                path,
                operation,
                error: format!("sync worker aborted: {}", e),
                transient: false,
            }),
        };
        outcomes.push(outcome);
    }
    outcomes
}

async fn upsert_one(client: &SyncClient, operation: Operation, pending: PendingUpsert) -> Outcome {
    let PendingUpsert {
        document,
        fingerprint,
        previous_chunks,
    } = pending;

    match client.upsert(&document, previous_chunks).await {
        Ok(done) => {
            debug!(path = %document.path, %operation, chunks = done.chunk_count, "synced");
            Outcome::Upserted {
                operation,
                path: document.path,
                fingerprint,
                chunk_count: done.chunk_count,
            }
        }
        Err(e) => Outcome::Failed(DocumentFailure {
            path: document.path,
            operation,
            transient: e.is_transient(),
            error: e.to_string(),
        }),
    }
}

async fn delete_one(client: &SyncClient, pending: PendingDelete) -> Outcome {
    match client
        .delete_document(&pending.path, pending.chunk_count)
        .await
    {
        Ok(()) => {
            debug!(path = %pending.path, chunks = pending.chunk_count, "deleted");
            Outcome::Deleted { path: pending.path }
        }
        Err(e) => Outcome::Failed(DocumentFailure {
            path: pending.path,
            operation: Operation::Delete,
            transient: e.is_transient(),
            error: e.to_string(),
        }),
    }
}

/// Build the Weaviate-backed client described by `config`.
pub fn build_client(config: &Config) -> Result<SyncClient> {
    let store = WeaviateStore::new(&config.remote).context("Failed to set up Weaviate client")?;
    Ok(SyncClient::new(
        Arc::new(store),
        config.remote.retry_policy(),
        config.chunking.max_tokens,
    ))
}

/// Build a [`Syncer`] for the vault and index named in `config`.
pub fn syncer_for(config: &Config, client: SyncClient, full: bool, dry_run: bool) -> Syncer {
    Syncer::new(SyncOptions {
        source: Arc::new(VaultSource::new(config.vault.clone())),
        client,
        index_path: config.index.path.clone(),
        concurrency: config.sync.concurrency,
        allow_empty_corpus: config.sync.allow_empty_corpus,
        force: full,
        dry_run,
    })
}

/// One sync run against the configured vault and Weaviate instance.
///
/// The collection is checked (and created if missing) before the run,
/// except on a dry run, which makes no remote calls.
pub async fn run_sync(config: &Config, full: bool, dry_run: bool) -> Result<SyncReport> {
    let client = build_client(config)?;
    if !dry_run {
        client
            .ensure_collection()
            .await
            .map_err(RunError::Remote)
            .context("Failed to prepare remote collection")?;
    }
    let mut syncer = syncer_for(config, client, full, dry_run);
    Ok(syncer.run().await?)
}
