use crate::embeddings::{Embedder, QueryEmbeddingCache};
use crate::error::{ChunkdexError, Result};
use crate::store::{QueryMatch, VectorStore};
use std::sync::Arc;

/// Similarity search over an index written by the pipeline.
///
/// Queries are embedded with the same embedder used for ingestion; repeated
/// queries are served from an LRU cache.
pub struct Searcher {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    cache: QueryEmbeddingCache,
}

impl Searcher {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>, cache_capacity: usize) -> Self {
        Self {
            embedder,
            store,
            cache: QueryEmbeddingCache::new(cache_capacity),
        }
    }

    async fn query_embedding(&self, query: &str) -> Result<Vec<f32>> {
        let model = self.embedder.model();
        if let Some(cached) = self.cache.get(model, query) {
            log::debug!("Cache hit for query: {}", query);
            return Ok(cached);
        }

        let embedding = self.embedder.embed(query).await?;
        self.cache.put(model, query, embedding.clone());
        Ok(embedding)
    }

    /// Top `top_k` matches in `index`, highest score first
    pub async fn search(&self, index: &str, query: &str, top_k: usize) -> Result<Vec<QueryMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ChunkdexError::InvalidInput("Query must not be empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let start = std::time::Instant::now();
        let vector = self.query_embedding(query).await?;

        let mut matches = self.store.query(index, &vector, top_k).await?;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);

        log::debug!("Search in {} returned {} results in {:?}", index, matches.len(), start.elapsed());
        Ok(matches)
    }

    /// Query-embedding cache (hits, misses)
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::ingest::TokenEstimator;
    use crate::pipeline::test_support::{HistogramEmbedder, MemorySource};
    use crate::pipeline::{Pipeline, RunContext};
    use crate::store::SqliteStore;
    use tempfile::TempDir;

    const INDEX: &str = "notion-notes-embeddings";

    async fn indexed_store(temp_dir: &TempDir) -> Arc<SqliteStore> {
        let store = Arc::new(SqliteStore::new(temp_dir.path().join("search.db")));
        let mut config = Config::default();
        config.chunking.chunk_size_tokens = 20;
        config.chunking.chunk_overlap_tokens = 0;
        let ctx = RunContext::with_estimator(config, TokenEstimator::heuristic());

        let source = MemorySource::vault(&[
            ("cache.md", Some("Caches keep hot lines close to the core")),
            ("zzz.md", Some("zzzzzzzzzzzzzzzzzzzz")),
            ("branch.md", Some("Branch predictors guess the next fetch address")),
        ]);
        Pipeline::new(ctx, Arc::new(HistogramEmbedder::new()), store.clone())
            .run(&source)
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_search_ranks_exact_text_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = indexed_store(&temp_dir).await;
        let searcher = Searcher::new(Arc::new(HistogramEmbedder::new()), store, 16);

        let results = searcher.search(INDEX, "zzzzzzzzzzzzzzzzzzzz", 3).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].metadata_str("file_path"), Some("zzz.md"));
        assert!((results[0].score - 1.0).abs() < 1e-5);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_repeated_query_uses_cache() {
        let temp_dir = TempDir::new().unwrap();
        let store = indexed_store(&temp_dir).await;
        let embedder = Arc::new(HistogramEmbedder::new());
        let searcher = Searcher::new(embedder.clone(), store, 16);

        let first = searcher.search(INDEX, "branch prediction", 2).await.unwrap();
        let second = searcher.search(INDEX, "  branch prediction ", 2).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls(), 1);
        assert_eq!(searcher.cache_stats(), (1, 1));
    }

    #[tokio::test]
    async fn test_empty_query_and_zero_top_k() {
        let temp_dir = TempDir::new().unwrap();
        let store = indexed_store(&temp_dir).await;
        let searcher = Searcher::new(Arc::new(HistogramEmbedder::new()), store, 0);

        assert!(matches!(
            searcher.search(INDEX, "   ", 5).await,
            Err(ChunkdexError::InvalidInput(_))
        ));
        assert!(searcher.search(INDEX, "cache", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces() {
        let temp_dir = TempDir::new().unwrap();
        let store = indexed_store(&temp_dir).await;
        let searcher = Searcher::new(Arc::new(HistogramEmbedder::new()), store, 4);

        let err = searcher.search(INDEX, "POISON", 5).await.unwrap_err();
        assert!(matches!(err, ChunkdexError::Embedding(_)));
    }
}
