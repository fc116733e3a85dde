pub mod pinecone;
pub mod sqlite;

pub use pinecone::PineconeStore;
pub use sqlite::SqliteStore;

use crate::config::{Config, Metric, StoreProvider};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Flat metadata attached to a stored vector
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Shape of an index: fixed vector length and similarity metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: Metric,
}

/// The unit persisted to a vector store; `id` is the upsert key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// One ranked result of a similarity query
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl QueryMatch {
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(|v| v.as_u64())
    }
}

/// Vector database operations used by the pipeline.
///
/// `ensure_index` failures are fatal for a run; `upsert` failures are per
/// item.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the index if absent, otherwise reuse it
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()>;

    /// Insert or overwrite records by id; returns how many were written
    async fn upsert(&self, index: &str, records: &[ChunkRecord]) -> Result<usize>;

    /// Top-k matches, descending by score
    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>>;

    /// Number of records in the index
    async fn count(&self, index: &str) -> Result<usize>;
}

/// Build the configured store. Resolves the Pinecone credential eagerly so
/// a missing key fails before any work starts.
pub fn from_config(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let settings = &config.vector_store;
    match settings.provider {
        StoreProvider::Pinecone => {
            let api_key = config.credential(&settings.api_key_env)?;
            Ok(Arc::new(PineconeStore::new(api_key, settings)?))
        }
        StoreProvider::Sqlite => Ok(Arc::new(SqliteStore::new(&settings.db_path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_match_metadata_accessors() {
        let m: QueryMatch = serde_json::from_value(json!({
            "id": "abc",
            "score": 0.5,
            "metadata": {"file_path": "src/main.rs", "start_line": 3}
        }))
        .unwrap();

        assert_eq!(m.metadata_str("file_path"), Some("src/main.rs"));
        assert_eq!(m.metadata_u64("start_line"), Some(3));
        assert_eq!(m.metadata_str("missing"), None);
    }

    #[test]
    fn test_query_match_without_metadata() {
        let m: QueryMatch = serde_json::from_value(json!({"id": "x", "score": 1.0})).unwrap();
        assert!(m.metadata.is_empty());
    }

    #[test]
    fn test_from_config_sqlite() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.vector_store.provider = StoreProvider::Sqlite;
        config.vector_store.db_path = temp_dir.path().join("v.db");
        assert!(from_config(&config).is_ok());
    }
}
