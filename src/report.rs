//! Run report.
//!
//! Every run ends with a [`SyncReport`], including runs where some
//! documents failed. It is logged as one structured event and printed by
//! the CLI, either as text or as JSON.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Add,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Add => "add",
            Operation::Update => "update",
            Operation::Delete => "delete",
        })
    }
}

/// A document whose remote operation did not complete this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub path: String,
    pub operation: Operation,
    pub error: String,
    /// Whether retries were exhausted, as opposed to a permanent rejection.
    pub transient: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub chunks_written: usize,
    pub failures: Vec<DocumentFailure>,
    pub dry_run: bool,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

impl SyncReport {
    pub fn succeeded(&self) -> usize {
        self.added + self.updated + self.deleted
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record(&mut self, op: Operation) {
        match op {
            Operation::Add => self.added += 1,
            Operation::Update => self.updated += 1,
            Operation::Delete => self.deleted += 1,
        }
    }

    /// Emit the summary to the log.
    pub fn log(&self) {
        for failure in &self.failures {
            tracing::warn!(
                path = %failure.path,
                operation = %failure.operation,
                transient = failure.transient,
                error = %failure.error,
                "document sync failed"
            );
        }
        tracing::info!(
            added = self.added,
            updated = self.updated,
            deleted = self.deleted,
            unchanged = self.unchanged,
            failed = self.failed(),
            chunks_written = self.chunks_written,
            dry_run = self.dry_run,
            duration_ms = self.duration.as_millis() as u64,
            "sync run finished"
        );
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "sync vault (dry-run)")?;
        } else {
            writeln!(f, "sync vault")?;
        }
        writeln!(f, "  added: {}", self.added)?;
        writeln!(f, "  updated: {}", self.updated)?;
        writeln!(f, "  deleted: {}", self.deleted)?;
        writeln!(f, "  unchanged: {}", self.unchanged)?;
        writeln!(f, "  failed: {}", self.failed())?;
        if !self.dry_run {
            writeln!(f, "  chunks written: {}", self.chunks_written)?;
        }
        writeln!(f, "  duration: {}ms", self.duration.as_millis())?;
        for failure in &self.failures {
            writeln!(
                f,
                "  ! {} {}: {}",
                failure.operation, failure.path, failure.error
            )?;
        }
        if self.is_clean() {
            write!(f, "ok")
        } else {
            write!(f, "completed with {} failure(s)", self.failed())
        }
    }
}
