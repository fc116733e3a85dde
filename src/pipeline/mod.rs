pub mod context;
pub mod records;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::RunContext;
pub use search::Searcher;

use crate::embeddings::Embedder;
use crate::error::{ChunkdexError, Result};
use crate::ingest::{extract_metadata, normalize_note, split, SplitUnit};
use crate::sources::{ContentSource, SourceEntry, SourceItem, SourceKind};
use crate::store::{ChunkRecord, VectorStore};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Where a run is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    IndexReady,
    Enumerating,
    ProcessingItem { position: usize, total: usize },
    Done,
}

/// Result of processing one source item
#[derive(Debug)]
pub enum ItemOutcome {
    /// Records were upserted; `failed_chunks` chunks could not be embedded
    Indexed { records: usize, failed_chunks: usize },
    /// Nothing to index (empty or whitespace-only content)
    Empty,
    /// Fetch, decode or embedding failed for the whole item
    Skipped(ChunkdexError),
    /// The item's batch could not be written
    UpsertFailed(ChunkdexError),
}

/// Aggregate counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub processed: usize,
    pub empty: usize,
    pub skipped: usize,
    pub upsert_failed: usize,
    pub chunks_upserted: usize,
    pub chunks_failed: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Indexed { records, failed_chunks } => {
                self.processed += 1;
                self.chunks_upserted += records;
                self.chunks_failed += failed_chunks;
            }
            ItemOutcome::Empty => self.empty += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
            ItemOutcome::UpsertFailed(_) => self.upsert_failed += 1,
        }
    }

    pub fn log(&self) {
        log::info!("=== Indexing Complete ===");
        log::info!("Items discovered: {}", self.discovered);
        log::info!("Items processed: {}", self.processed);
        log::info!(
            "  Empty: {}, skipped: {}, upsert failed: {}",
            self.empty,
            self.skipped,
            self.upsert_failed
        );
        log::info!("Chunks upserted: {}", self.chunks_upserted);
        if self.chunks_failed > 0 {
            log::info!("Chunks failed: {}", self.chunks_failed);
        }
        log::info!("Time: {:?}", self.elapsed);

        if self.skipped + self.upsert_failed + self.chunks_failed > 0 {
            log::warn!("Some items or chunks failed. Check logs above for details.");
        }
    }
}

/// Drives enumerate -> fetch -> split -> embed -> upsert for one source.
///
/// Items are processed one at a time and only one item's records are held
/// in memory. Only index setup and enumeration failures end a run early.
pub struct Pipeline {
    ctx: Arc<RunContext>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(ctx: Arc<RunContext>, embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            ctx,
            embedder,
            store,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("Pipeline state: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Index every item of `source` into the index for its kind.
    pub async fn run(&mut self, source: &dyn ContentSource) -> Result<RunSummary> {
        let start = Instant::now();
        self.transition(PipelineState::Idle);

        let spec = self.ctx.index_spec(source.kind(), self.embedder.dimensions());
        self.store.ensure_index(&spec).await?;
        self.transition(PipelineState::IndexReady);

        self.transition(PipelineState::Enumerating);
        let entries = source.list().await?;
        log::info!("Found {} items to index into {}", entries.len(), spec.name);

        let mut summary = RunSummary {
            discovered: entries.len(),
            ..RunSummary::default()
        };

        let total = entries.len();
        for (idx, entry) in entries.iter().enumerate() {
            self.transition(PipelineState::ProcessingItem {
                position: idx + 1,
                total,
            });
            log::info!("[{}/{}] Processing: {}", idx + 1, total, entry.path);

            let outcome = self.process_item(source, entry, &spec.name).await;
            match &outcome {
                ItemOutcome::Indexed { records, failed_chunks } => {
                    log::info!("✓ {} ({} chunks, {} failed)", entry.path, records, failed_chunks)
                }
                ItemOutcome::Empty => log::info!("- {} (empty, nothing to index)", entry.path),
                ItemOutcome::Skipped(e) => log::error!("✗ {}: {}", entry.path, e),
                ItemOutcome::UpsertFailed(e) => log::error!("✗ {}: {}", entry.path, e),
            }
            summary.record(&outcome);
        }

        summary.elapsed = start.elapsed();
        self.transition(PipelineState::Done);
        summary.log();
        Ok(summary)
    }

    /// Fetch, split, embed and upsert one item. Never fails the run.
    pub async fn process_item(
        &self,
        source: &dyn ContentSource,
        entry: &SourceEntry,
        index: &str,
    ) -> ItemOutcome {
        let item = match source.fetch(entry).await {
            Ok(item) => item,
            Err(e) => return ItemOutcome::Skipped(e),
        };

        let (batch, failed_chunks) = match self.build_records(source.kind(), &item).await {
            Ok(Some(built)) => built,
            Ok(None) => return ItemOutcome::Empty,
            Err(e) => return ItemOutcome::Skipped(e),
        };

        match self.store.upsert(index, &batch).await {
            Ok(written) => ItemOutcome::Indexed {
                records: written,
                failed_chunks,
            },
            Err(e) => ItemOutcome::UpsertFailed(e),
        }
    }

    /// Records for one item plus the number of chunks that failed to embed.
    /// `None` when the item yields no chunks.
    async fn build_records(
        &self,
        kind: &SourceKind,
        item: &SourceItem,
    ) -> Result<Option<(Vec<ChunkRecord>, usize)>> {
        let path = item.entry.path.as_str();
        let params = self.ctx.chunk_params();
        let estimator = &self.ctx.estimator;

        let (chunks, note) = match kind {
            SourceKind::Repository { .. } => {
                (split(&item.content, path, SplitUnit::Line, params, estimator), None)
            }
            SourceKind::Vault { .. } => {
                let note = extract_metadata(&item.content, Path::new(path), item.times);
                let body = normalize_note(&item.content);
                (split(&body, path, SplitUnit::Paragraph, params, estimator), Some(note))
            }
        };

        if chunks.is_empty() {
            return Ok(None);
        }

        let repository = match kind {
            SourceKind::Repository { url } => url.as_str(),
            SourceKind::Vault { .. } => "",
        };
        let timestamp = self.ctx.timestamp();
        let total_chunks = chunks.len();

        let mut batch = Vec::with_capacity(total_chunks);
        let mut failed = 0;
        for chunk in &chunks {
            let values = match self.embedder.embed(&chunk.text).await {
                Ok(values) => values,
                Err(e) => {
                    log::warn!("Skipping chunk {} of {}: {}", chunk.index, path, e);
                    failed += 1;
                    continue;
                }
            };

            let metadata = match &note {
                Some(note) => records::note_metadata(chunk, note, total_chunks),
                None => records::code_metadata(chunk, &item.entry, repository, &timestamp),
            };
            batch.push(records::build_record(chunk, values, metadata));
        }

        if batch.is_empty() {
            return Err(ChunkdexError::Embedding(format!(
                "all {} chunks of {} failed to embed",
                failed, path
            )));
        }

        Ok(Some((batch, failed)))
    }
}
