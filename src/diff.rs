//! Diff engine: current corpus vs. persisted index.
//!
//! Pure and synchronous. Unchanged documents cost one map lookup each.

use std::collections::HashSet;

use crate::hash::Fingerprint;
use crate::index::ChangeSetIndex;
use crate::models::Document;

/// A document scheduled for upsert.
#[derive(Debug, Clone)]
pub struct PendingUpsert {
    pub document: Document,
    pub fingerprint: Fingerprint,
    /// Chunks the previous version occupies remotely (0 for new paths).
    pub previous_chunks: usize,
}

/// A path scheduled for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDelete {
    pub path: String,
    pub chunk_count: usize,
}

#[derive(Debug, Default)]
pub struct ChangeSet {
    pub to_add: Vec<PendingUpsert>,
    pub to_update: Vec<PendingUpsert>,
    pub to_delete: Vec<PendingDelete>,
    pub unchanged: usize,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_update.is_empty() && self.to_delete.is_empty()
    }

    pub fn operation_count(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_delete.len()
    }
}

/// Compare the corpus against the index.
///
/// With `force`, documents whose fingerprint matches are scheduled as
/// updates instead of being skipped.
pub fn diff(corpus: &[Document], index: &ChangeSetIndex, force: bool) -> ChangeSet {
    let mut changes = ChangeSet::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(corpus.len());

    for doc in corpus {
        if !seen.insert(doc.path.as_str()) {
            tracing::warn!(path = %doc.path, "duplicate path in corpus, keeping first");
            continue;
        }

        let fingerprint = Fingerprint::of_document(doc);
        match index.get(&doc.path) {
            None => changes.to_add.push(PendingUpsert {
                document: doc.clone(),
                fingerprint,
                previous_chunks: 0,
            }),
            Some(entry) if force || entry.fingerprint != fingerprint => {
                changes.to_update.push(PendingUpsert {
                    document: doc.clone(),
                    fingerprint,
                    previous_chunks: entry.chunk_count,
                })
            }
            Some(_) => changes.unchanged += 1,
        }
    }

    for (path, entry) in index.iter() {
        if !seen.contains(path) {
            changes.to_delete.push(PendingDelete {
                path: path.to_string(),
                chunk_count: entry.chunk_count,
            });
        }
    }

    changes
}
