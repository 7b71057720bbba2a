//! Vault connector.
//!
//! Walks the vault root, applies include/exclude globs and turns every
//! matching file into a [`Document`]. Unlike a best-effort crawler, any I/O
//! failure here fails the whole scan: a partial listing would look like a
//! batch of deleted notes to the diff engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::VaultConfig;
use crate::error::LoadError;
use crate::models::{Document, DocumentMetadata};
use crate::traits::CorpusSource;

/// Filesystem-backed [`CorpusSource`] for an Obsidian vault.
pub struct VaultSource {
    config: VaultConfig,
}

impl VaultSource {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CorpusSource for VaultSource {
    fn name(&self) -> &str {
        "vault"
    }

    async fn scan(&self) -> Result<Vec<Document>, LoadError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || scan_vault(&config))
            .await
            .map_err(|e| LoadError::Source(format!("vault scan task failed: {}", e)))?
    }
}

pub fn scan_vault(config: &VaultConfig) -> Result<Vec<Document>, LoadError> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(LoadError::MissingRoot(root.clone()));
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        ".obsidian/**".to_string(),
        ".trash/**".to_string(),
        ".git/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut docs = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }

        if !include_set.is_match(&rel_str) {
            continue;
        }

        docs.push(file_to_document(path, rel_str)?);
    }

    // Sort for deterministic ordering
    docs.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(docs)
}

fn file_to_document(path: &Path, relative_path: String) -> Result<Document, LoadError> {
    let read_err = |source| LoadError::Read {
        path: PathBuf::from(path),
        source,
    };

    let metadata = std::fs::metadata(path).map_err(read_err)?;
    let bytes = std::fs::read(path).map_err(read_err)?;

    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let created = metadata.created().unwrap_or(modified);

    let content = String::from_utf8_lossy(&bytes).into_owned();
    let tags = frontmatter_tags(&content);

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Document {
        path: relative_path,
        bytes,
        content,
        created_at: DateTime::<Utc>::from(created),
        modified_at: DateTime::<Utc>::from(modified),
        metadata: DocumentMetadata { source, tags },
    })
}

/// Extract `tags` from a note's YAML front matter.
///
/// Accepts both a list (`tags: [a, b]` or one `- a` per line) and a single
/// comma/space separated string. Malformed front matter yields no tags.
pub fn frontmatter_tags(content: &str) -> Vec<String> {
    let Some(rest) = content.strip_prefix("---") else {
        return Vec::new();
    };
    let Some(end) = rest.find("\n---") else {
        return Vec::new();
    };

    let Ok(docs) = yaml_rust2::YamlLoader::load_from_str(&rest[..end]) else {
        return Vec::new();
    };
    let Some(doc) = docs.first() else {
        return Vec::new();
    };

    let tags = &doc["tags"];
    if let Some(list) = tags.as_vec() {
        list.iter()
            .filter_map(|t| t.as_str())
            .map(|t| t.trim_start_matches('#').to_string())
            .collect()
    } else if let Some(s) = tags.as_str() {
        s.split([',', ' '])
            .map(|t| t.trim().trim_start_matches('#'))
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        Vec::new()
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
