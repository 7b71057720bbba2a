//! Weaviate REST backend.
//!
//! Records are written through the batch endpoint, which creates or
//! replaces objects by id. Object ids are UUID v5 of the record key, so the
//! same `path#chunk` always lands on the same object.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | ensure collection | `GET /v1/schema/{class}`, then `POST /v1/schema` on 404 |
//! | upsert | `POST /v1/batch/objects` |
//! | delete | `DELETE /v1/objects/{class}/{uuid}` (404 is success) |

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

use super::RemoteStore;
use crate::config::RemoteConfig;
use crate::error::SyncError;
use crate::models::{RecordId, RemoteRecord};

pub struct WeaviateStore {
    client: reqwest::Client,
    base_url: String,
    class: String,
    vectorizer: String,
    api_key: Option<String>,
    openai_key: Option<String>,
}

impl WeaviateStore {
    /// Build a client from configuration. API keys are read from the
    /// environment variables named in the config; both are optional so a
    /// local, unauthenticated Weaviate works too.
    pub fn new(config: &RemoteConfig) -> Result<Self, SyncError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        let openai_key = config
            .openai_key_env
            .as_deref()
            .filter(|name| !name.is_empty())
            .and_then(|name| std::env::var(name).ok())
            .filter(|k| !k.is_empty());

        if api_key.is_none() {
            tracing::debug!(env = %config.api_key_env, "no Weaviate API key set, sending unauthenticated requests");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            class: config.collection.clone(),
            vectorizer: config.vectorizer.clone(),
            api_key,
            openai_key,
        })
    }

    /// Weaviate object id for a record key.
    pub fn object_uuid(id: &RecordId) -> Uuid {
        Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_str().as_bytes())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(key) = &self.openai_key {
            req = req.header("X-OpenAI-Api-Key", key);
        }
        req
    }

    fn class_definition(&self) -> Value {
        json!({
            "class": self.class,
            "vectorizer": self.vectorizer,
            "properties": [
                { "name": "content", "dataType": ["text"] },
                { "name": "path", "dataType": ["text"] },
                { "name": "source", "dataType": ["text"] },
                { "name": "chunk_index", "dataType": ["int"] },
                { "name": "created", "dataType": ["date"] },
                { "name": "last_modified", "dataType": ["date"] },
                { "name": "tags", "dataType": ["text[]"] },
            ]
        })
    }

    async fn create_collection(&self) -> Result<(), SyncError> {
        let resp = self
            .request(Method::POST, "/v1/schema")
            .json(&self.class_definition())
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::info!(collection = %self.class, "created collection");
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        // Another process may have created it between our GET and POST.
        if status == StatusCode::UNPROCESSABLE_ENTITY && body.contains("already exists") {
            return Ok(());
        }
        Err(SyncError::from_status(status, &body))
    }
}

fn to_rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Collect per-object error messages from a batch response.
fn batch_errors(json: &Value) -> Option<String> {
    let messages: Vec<&str> = json
        .as_array()?
        .iter()
        .filter_map(|obj| obj["result"]["errors"]["error"].as_array())
        .flatten()
        .filter_map(|e| e["message"].as_str())
        .collect();

    if messages.is_empty() {
        None
    } else {
        Some(messages.join("; "))
    }
}

#[async_trait]
impl RemoteStore for WeaviateStore {
    async fn ensure_collection(&self) -> Result<(), SyncError> {
        let resp = self
            .request(Method::GET, &format!("/v1/schema/{}", self.class))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            tracing::debug!(collection = %self.class, "collection exists");
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            return self.create_collection().await;
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::from_status(status, &body))
    }

    async fn upsert_record(&self, record: &RemoteRecord) -> Result<RecordId, SyncError> {
        let body = json!({
            "objects": [{
                "class": self.class,
                "id": Self::object_uuid(&record.id).to_string(),
                "properties": {
                    "content": record.content,
                    "path": record.path,
                    "source": record.metadata.source,
                    "chunk_index": record.chunk_index,
                    "created": to_rfc3339(record.created_at),
                    "last_modified": to_rfc3339(record.modified_at),
                    "tags": record.metadata.tags,
                }
            }]
        });

        let resp = self
            .request(Method::POST, "/v1/batch/objects")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SyncError::from_status(status, &body));
        }

        let json: Value = resp.json().await?;
        if let Some(message) = batch_errors(&json) {
            return Err(SyncError::Permanent(format!(
                "batch rejected {}: {}",
                record.id, message
            )));
        }

        Ok(record.id.clone())
    }

    async fn delete_record(&self, id: &RecordId) -> Result<(), SyncError> {
        let path = format!("/v1/objects/{}/{}", self.class, Self::object_uuid(id));
        let resp = self.request(Method::DELETE, &path).send().await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(SyncError::from_status(status, &body))
    }
}
