use crate::config::Config;
use crate::ingest::{ChunkParams, TokenEstimator};
use crate::sources::SourceKind;
use crate::store::IndexSpec;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;

/// Per-run settings shared by the orchestrator and its collaborators.
///
/// Built once when a run starts and never mutated afterwards.
#[derive(Debug)]
pub struct RunContext {
    pub config: Config,
    pub estimator: TokenEstimator,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(config: Config) -> Arc<Self> {
        let estimator = if config.chunking.exact_tokenizer {
            TokenEstimator::for_model(&config.chunking.tokenizer_model)
        } else {
            TokenEstimator::heuristic()
        };
        Self::with_estimator(config, estimator)
    }

    pub fn with_estimator(config: Config, estimator: TokenEstimator) -> Arc<Self> {
        log::debug!("Run context created (tokenizer: {})", estimator.model());
        Arc::new(Self {
            config,
            estimator,
            started_at: Utc::now(),
        })
    }

    pub fn chunk_params(&self) -> ChunkParams {
        ChunkParams::from(&self.config.chunking)
    }

    /// Index name a source kind writes to
    pub fn index_name(&self, kind: &SourceKind) -> &str {
        match kind {
            SourceKind::Repository { .. } => &self.config.vector_store.code_index,
            SourceKind::Vault { .. } => &self.config.vector_store.notes_index,
        }
    }

    pub fn index_spec(&self, kind: &SourceKind, dimension: usize) -> IndexSpec {
        IndexSpec {
            name: self.index_name(kind).to_string(),
            dimension,
            metric: self.config.vector_store.metric,
        }
    }

    /// Run start as an RFC 3339 string, stamped on code records
    pub fn timestamp(&self) -> String {
        self.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}
