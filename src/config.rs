use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::remote::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub vault: VaultConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 250 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub allow_empty_corpus: bool,
    #[serde(default)]
    pub fail_on_document_errors: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            allow_empty_corpus: false,
            fail_on_document_errors: false,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_key_env")]
    pub openai_key_env: Option<String>,
    #[serde(default = "default_vectorizer")]
    pub vectorizer: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
}

fn default_provider() -> String {
    "weaviate".to_string()
}
fn default_collection() -> String {
    "ObsidianDocs".to_string()
}
fn default_api_key_env() -> String {
    "WEAVIATE_API_KEY".to_string()
}
fn default_openai_key_env() -> Option<String> {
    Some("OPENAI_API_KEY".to_string())
}
fn default_vectorizer() -> String {
    "text2vec-openai".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_ms() -> u64 {
    1000
}

impl RemoteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            request_timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;

    // OBSIDIAN_PATH wins over the configured root.
    if let Ok(root) = std::env::var("OBSIDIAN_PATH") {
        if !root.is_empty() {
            config.vault.root = PathBuf::from(root);
        }
    }

    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.sync.concurrency == 0 {
        anyhow::bail!("sync.concurrency must be > 0");
    }

    match config.remote.provider.as_str() {
        "weaviate" => {}
        other => anyhow::bail!("Unknown remote provider: '{}'. Must be weaviate.", other),
    }

    if config.remote.url.trim().is_empty() {
        anyhow::bail!("remote.url must not be empty");
    }
    if config.remote.collection.trim().is_empty() {
        anyhow::bail!("remote.collection must not be empty");
    }

    Ok(config)
}
