use super::{ChunkRecord, IndexSpec, Metadata, QueryMatch, VectorStore};
use crate::config::VectorStoreConfig;
use crate::error::{ChunkdexError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

const API_VERSION: &str = "2024-07";

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct IndexDescription {
    #[serde(default)]
    dimension: Option<usize>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    status: Option<IndexStatus>,
}

impl IndexDescription {
    fn is_ready(&self) -> bool {
        self.status.as_ref().map(|s| s.ready).unwrap_or(false) && self.host.is_some()
    }
}

#[derive(Serialize)]
struct UpsertVector<'a> {
    id: &'a str,
    values: &'a [f32],
    metadata: Metadata,
}

#[derive(Deserialize)]
struct UpsertResponse {
    #[serde(rename = "upsertedCount")]
    upserted_count: Option<usize>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct StatsResponse {
    #[serde(rename = "totalVectorCount", default)]
    total_vector_count: usize,
}

/// Pinecone serverless client (control plane + per-index data plane).
pub struct PineconeStore {
    client: Client,
    api_key: String,
    control_plane: String,
    cloud: String,
    region: String,
    batch_size: usize,
    poll_attempts: u32,
    poll_interval: Duration,
    /// index name -> data plane base URL
    hosts: Mutex<HashMap<String, String>>,
}

/// `host` as returned by the control plane has no scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

/// Pinecone rejects null metadata values
fn without_nulls(metadata: &Metadata) -> Metadata {
    metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl PineconeStore {
    pub fn new(api_key: String, config: &VectorStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ChunkdexError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            control_plane: config.control_plane_url.trim_end_matches('/').to_string(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            batch_size: config.upsert_batch_size.max(1),
            poll_attempts: 30,
            poll_interval: Duration::from_secs(2),
            hosts: Mutex::new(HashMap::new()),
        })
    }

    /// Bound on waiting for a freshly created index to become ready
    pub fn with_readiness_poll(mut self, attempts: u32, interval: Duration) -> Self {
        self.poll_attempts = attempts;
        self.poll_interval = interval;
        self
    }

    fn cached_host(&self, index: &str) -> Option<String> {
        self.hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(index)
            .cloned()
    }

    fn remember_host(&self, index: &str, host: &str) {
        self.hosts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(index.to_string(), normalize_host(host));
    }

    /// GET /indexes/{name}; `None` when the index does not exist
    async fn describe(&self, index: &str) -> std::result::Result<Option<IndexDescription>, String> {
        let response = self
            .client
            .get(format!("{}/indexes/{}", self.control_plane, index))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| format!("Failed to parse index description: {}", e)),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(format!("Pinecone API error {}: {}", status, body))
            }
        }
    }

    async fn create(&self, spec: &IndexSpec) -> std::result::Result<(), String> {
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric.as_str(),
            "spec": { "serverless": { "cloud": self.cloud, "region": self.region } }
        });

        let response = self
            .client
            .post(format!("{}/indexes", self.control_plane))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = response.status();
        // 409: created concurrently by someone else
        if status.is_success() || status == StatusCode::CONFLICT {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(format!("Pinecone API error {}: {}", status, body))
    }

    async fn wait_until_ready(&self, index: &str) -> std::result::Result<String, String> {
        for attempt in 0..=self.poll_attempts {
            if let Some(description) = self.describe(index).await? {
                if description.is_ready() {
                    if let Some(host) = description.host {
                        return Ok(host);
                    }
                }
            }
            if attempt < self.poll_attempts {
                log::debug!("Index {} not ready yet (attempt {})", index, attempt + 1);
                tokio::time::sleep(self.poll_interval).await;
            }
        }
        Err(format!(
            "index not ready after {} readiness checks",
            self.poll_attempts + 1
        ))
    }

    /// Data plane base URL, described on first use
    async fn host(&self, index: &str) -> std::result::Result<String, String> {
        if let Some(host) = self.cached_host(index) {
            return Ok(host);
        }
        let host = self
            .describe(index)
            .await?
            .and_then(|d| d.host)
            .ok_or_else(|| format!("index {} not found", index))?;
        self.remember_host(index, &host);
        Ok(normalize_host(&host))
    }

    async fn post_data<T: serde::de::DeserializeOwned>(
        &self,
        index: &str,
        path: &str,
        body: &Value,
    ) -> std::result::Result<T, String> {
        let host = self.host(index).await?;
        let response = self
            .client
            .post(format!("{}{}", host, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Network error: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Pinecone API error {}: {}", status, body));
        }
        response
            .json()
            .await
            .map_err(|e| format!("Failed to parse response: {}", e))
    }
}

#[async_trait]
impl VectorStore for PineconeStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let setup_error = |message: String| ChunkdexError::IndexSetup {
            index: spec.name.clone(),
            message,
        };

        match self.describe(&spec.name).await.map_err(setup_error)? {
            Some(existing) => {
                if let Some(dimension) = existing.dimension {
                    if dimension != spec.dimension {
                        return Err(setup_error(format!(
                            "existing index has dimension {}, expected {}",
                            dimension, spec.dimension
                        )));
                    }
                }
                log::info!("Using existing index: {}", spec.name);
                let ready = existing.is_ready();
                let host = match existing.host {
                    Some(host) if ready => host,
                    _ => self.wait_until_ready(&spec.name).await.map_err(setup_error)?,
                };
                self.remember_host(&spec.name, &host);
            }
            None => {
                log::info!("Creating index: {}", spec.name);
                self.create(spec).await.map_err(setup_error)?;
                let host = self.wait_until_ready(&spec.name).await.map_err(setup_error)?;
                self.remember_host(&spec.name, &host);
                log::info!("Index {} is ready", spec.name);
            }
        }
        Ok(())
    }

    async fn upsert(&self, index: &str, records: &[ChunkRecord]) -> Result<usize> {
        let mut written = 0;
        for batch in records.chunks(self.batch_size) {
            let vectors: Vec<UpsertVector> = batch
                .iter()
                .map(|r| UpsertVector {
                    id: &r.id,
                    values: &r.values,
                    metadata: without_nulls(&r.metadata),
                })
                .collect();

            let response: UpsertResponse = self
                .post_data(index, "/vectors/upsert", &json!({ "vectors": vectors }))
                .await
                .map_err(|message| ChunkdexError::Upsert {
                    index: index.to_string(),
                    message,
                })?;
            written += response.upserted_count.unwrap_or(batch.len());
        }
        Ok(written)
    }

    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false
        });
        let response: QueryResponse = self
            .post_data(index, "/query", &body)
            .await
            .map_err(ChunkdexError::Query)?;

        let mut matches = response.matches;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(matches)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let stats: StatsResponse = self
            .post_data(index, "/describe_index_stats", &json!({}))
            .await
            .map_err(ChunkdexError::Query)?;
        Ok(stats.total_vector_count)
    }
}
