//! In-memory collaborators for pipeline and search tests

use crate::embeddings::Embedder;
use crate::error::{ChunkdexError, Result};
use crate::ingest::FileTimes;
use crate::sources::{ContentSource, SourceEntry, SourceItem, SourceKind};
use crate::store::{ChunkRecord, IndexSpec, QueryMatch, VectorStore};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DIMS: usize = 8;

/// Byte-histogram embedder; any text containing "POISON" fails.
pub struct HistogramEmbedder {
    pub calls: AtomicUsize,
}

impl HistogramEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for HistogramEmbedder {
    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model(&self) -> &str {
        "histogram"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("POISON") {
            return Err(ChunkdexError::Embedding("provider rejected input".to_string()));
        }
        let mut vector = vec![0.0f32; DIMS];
        vector[0] = 1.0;
        for b in text.bytes() {
            vector[b as usize % DIMS] += 1.0;
        }
        Ok(vector)
    }
}

/// Fixed set of files; `None` content makes the fetch fail.
pub struct MemorySource {
    kind: SourceKind,
    files: Vec<(String, Option<String>)>,
}

impl MemorySource {
    pub fn repository(files: &[(&str, Option<&str>)]) -> Self {
        Self::with_kind(
            SourceKind::Repository {
                url: "https://github.com/acme/widgets".to_string(),
            },
            files,
        )
    }

    pub fn vault(files: &[(&str, Option<&str>)]) -> Self {
        Self::with_kind(
            SourceKind::Vault {
                root: std::path::PathBuf::from("/vault"),
            },
            files,
        )
    }

    fn with_kind(kind: SourceKind, files: &[(&str, Option<&str>)]) -> Self {
        Self {
            kind,
            files: files
                .iter()
                .map(|(path, content)| (path.to_string(), content.map(str::to_string)))
                .collect(),
        }
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    fn kind(&self) -> &SourceKind {
        &self.kind
    }

    async fn list(&self) -> Result<Vec<SourceEntry>> {
        Ok(self
            .files
            .iter()
            .map(|(path, content)| SourceEntry {
                path: path.clone(),
                size: content.as_ref().map(|c| c.len() as u64).unwrap_or(0),
                url: None,
                html_url: None,
                absolute_path: None,
            })
            .collect())
    }

    async fn fetch(&self, entry: &SourceEntry) -> Result<SourceItem> {
        let content = self
            .files
            .iter()
            .find(|(path, _)| *path == entry.path)
            .and_then(|(_, content)| content.clone())
            .ok_or_else(|| ChunkdexError::fetch(&entry.path, "404 Not Found"))?;

        Ok(SourceItem {
            entry: entry.clone(),
            content,
            times: FileTimes::default(),
        })
    }
}

/// Store that accepts index setup but rejects every write
pub struct RejectingStore;

#[async_trait]
impl VectorStore for RejectingStore {
    async fn ensure_index(&self, _spec: &IndexSpec) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, index: &str, _records: &[ChunkRecord]) -> Result<usize> {
        Err(ChunkdexError::Upsert {
            index: index.to_string(),
            message: "quota exceeded".to_string(),
        })
    }

    async fn query(&self, _index: &str, _vector: &[f32], _top_k: usize) -> Result<Vec<QueryMatch>> {
        Ok(Vec::new())
    }

    async fn count(&self, _index: &str) -> Result<usize> {
        Ok(0)
    }
}
