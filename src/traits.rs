//! Extension points of the sync pipeline.
//!
//! The orchestrator only talks to the vault through [`CorpusSource`] and to
//! the remote index through [`RemoteStore`](crate::remote::RemoteStore), so
//! either side can be swapped (a different vault layout, an in-memory store
//! in tests).

use async_trait::async_trait;

use crate::error::LoadError;
use crate::models::Document;

/// A corpus that can enumerate all of its documents in one call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use vault_sync::error::LoadError;
/// use vault_sync::models::Document;
/// use vault_sync::traits::CorpusSource;
///
/// struct Fixed(Vec<(String, String)>);
///
/// #[async_trait]
/// impl CorpusSource for Fixed {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn scan(&self) -> Result<Vec<Document>, LoadError> {
///         Ok(self.0.iter().map(|(p, c)| Document::from_text(p.clone(), c.clone())).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait CorpusSource: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Enumerate every document with path, content and timestamps.
    ///
    /// An `Err` means the corpus could not be read. It must never be
    /// reported as an empty `Ok`, since an empty result schedules deletion
    /// of everything previously synced.
    async fn scan(&self) -> Result<Vec<Document>, LoadError>;
}
