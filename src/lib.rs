//! # Vault Sync
//!
//! Incremental synchronization of an Obsidian vault into a remote vector
//! store.
//!
//! Each run fingerprints every note, compares the fingerprints with a small
//! local index, and sends only the differences to the remote store: new
//! notes are added, edited notes re-uploaded, removed notes deleted.
//! Unchanged notes cost nothing but a hash.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌─────────────┐
//! │    Vault    │──▶│    Diff     │──▶│ Sync client │──▶ Weaviate
//! │ (markdown)  │   │ vs. index   │   │ retry+chunk │
//! └─────────────┘   └──────▲──────┘   └──────┬──────┘
//!                          │                 │ outcomes
//!                   ┌──────┴──────┐          │
//!                   │ index.json  │◀─────────┘
//!                   └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! vault-sync init               # create the remote collection
//! vault-sync sync --dry-run     # show what would change
//! vault-sync sync               # push the changes
//! vault-sync status             # summarize the local index
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Load, sync and run error types |
//! | [`hash`] | Content fingerprints |
//! | [`connector_fs`] | Vault scanner |
//! | [`traits`] | Corpus source extension point |
//! | [`chunk`] | Paragraph chunking |
//! | [`index`] | Persisted change-set index |
//! | [`lock`] | Single-writer run lock |
//! | [`diff`] | Change-set computation |
//! | [`remote`] | Remote store, retries, Weaviate backend |
//! | [`ingest`] | Run orchestration |
//! | [`report`] | Run report |

pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod diff;
pub mod error;
pub mod hash;
pub mod index;
pub mod ingest;
pub mod lock;
pub mod models;
pub mod remote;
pub mod report;
pub mod traits;
