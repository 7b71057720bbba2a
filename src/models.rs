//! Core data models used throughout vault-sync.
//!
//! These types represent the notes read from the vault, the chunks pushed to
//! the remote store, and the keys the remote store is addressed by.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// A note read from the vault.
///
/// Re-read from disk on every run; a changed file produces a new value at
/// the same `path`.
#[derive(Debug, Clone)]
pub struct Document {
    /// Vault-relative path, `/`-separated. Unique within the corpus.
    pub path: String,
    /// Raw file bytes, the input of the fingerprint.
    pub bytes: Vec<u8>,
    /// Text body (lossy UTF-8 of `bytes`).
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Build a document from in-memory text. Used by non-filesystem sources.
    pub fn from_text(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        let path = path.into();
        let source = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            bytes: content.as_bytes().to_vec(),
            metadata: DocumentMetadata {
                source,
                tags: Vec::new(),
            },
            path,
            content,
            created_at: now,
            modified_at: now,
        }
    }
}

/// Metadata attached to every remote record of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    /// File name of the note.
    pub source: String,
    /// Tags from the note's front matter.
    pub tags: Vec<String>,
}

/// A chunk of a document's body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub path: String,
    pub chunk_index: usize,
    pub text: String,
}

impl Chunk {
    pub fn record_id(&self) -> RecordId {
        RecordId::for_chunk(&self.path, self.chunk_index)
    }
}

/// Key of a record in the remote store: `path#chunk_index`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn for_chunk(path: &str, chunk_index: usize) -> Self {
        Self(format!("{}#{}", path, chunk_index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single object sent to the remote store.
#[derive(Debug, Clone)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub path: String,
    pub chunk_index: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub metadata: DocumentMetadata,
}
