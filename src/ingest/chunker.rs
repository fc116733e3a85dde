use super::identity::{chunk_id, Position};
use super::tokens::TokenEstimator;
use crate::config::ChunkingConfig;

/// Unit a source is split on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitUnit {
    /// Source code: one line at a time, overlapping chunks
    Line,
    /// Notes: paragraphs, falling back to sentences, no overlap
    Paragraph,
}

/// Inclusive range of units covered by a chunk.
///
/// Lines are 1-based; paragraphs are 0-based indices over non-empty paragraphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A chunk of text with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    /// Ordinal within the source
    pub index: usize,
    pub span: Span,
    pub token_count: usize,
    pub unit: SplitUnit,
}

impl Chunk {
    pub fn position(&self) -> Position {
        match self.unit {
            SplitUnit::Line => Position::Lines {
                start: self.span.start,
                end: self.span.end,
            },
            // Sentence chunks of one paragraph share a span, so notes key by ordinal.
            SplitUnit::Paragraph => Position::Ordinal(self.index),
        }
    }

    pub fn id(&self) -> String {
        chunk_id(&self.source_path, self.position())
    }
}

/// Size budget for splitting, in tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl From<&ChunkingConfig> for ChunkParams {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size_tokens,
            overlap: config.chunk_overlap_tokens,
        }
    }
}

/// Split text into ordered chunks at the given granularity.
pub fn split(
    text: &str,
    source_path: &str,
    unit: SplitUnit,
    params: ChunkParams,
    estimator: &TokenEstimator,
) -> Vec<Chunk> {
    match unit {
        SplitUnit::Line => split_lines(text, source_path, params, estimator),
        SplitUnit::Paragraph => split_paragraphs(text, source_path, params.chunk_size, estimator),
    }
}

/// Line-based splitting with trailing-context overlap.
///
/// Lines accumulate while the running total stays within `chunk_size`. When the
/// next line would overflow a non-empty chunk, the chunk is closed and the next
/// one is seeded with as many trailing lines of the closed chunk as fit in the
/// overlap budget. A line that alone exceeds `chunk_size` is emitted whole.
pub fn split_lines(
    text: &str,
    source_path: &str,
    params: ChunkParams,
    estimator: &TokenEstimator,
) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = text.split('\n').collect();
    let costs: Vec<usize> = lines.iter().map(|line| estimator.estimate(line)).collect();

    let mut chunks = Vec::new();
    // Running chunk is lines[start..cursor]
    let mut start = 0usize;
    let mut running = 0usize;

    for cursor in 0..lines.len() {
        let cost = costs[cursor];

        if running + cost > params.chunk_size && cursor > start {
            chunks.push(line_chunk(&lines, start, cursor, running, source_path, chunks.len()));

            // Seed the next chunk from the tail of the closed one. The budget is
            // capped so overlap plus the triggering line stays within chunk_size.
            let budget = params.overlap.min(params.chunk_size.saturating_sub(cost));
            let mut seed = cursor;
            let mut seeded = 0usize;
            while seed > start && seeded + costs[seed - 1] <= budget {
                seed -= 1;
                seeded += costs[seed];
            }

            start = seed;
            running = seeded;
        }

        running += cost;
    }

    chunks.push(line_chunk(&lines, start, lines.len(), running, source_path, chunks.len()));
    chunks
}

fn line_chunk(
    lines: &[&str],
    start: usize,
    end: usize,
    tokens: usize,
    source_path: &str,
    index: usize,
) -> Chunk {
    Chunk {
        text: lines[start..end].join("\n"),
        source_path: source_path.to_string(),
        index,
        span: Span {
            start: start + 1,
            end,
        },
        token_count: tokens,
        unit: SplitUnit::Line,
    }
}

/// Running state of the paragraph splitter
struct NoteAccumulator<'a> {
    source_path: &'a str,
    chunks: Vec<Chunk>,
    parts: Vec<String>,
    tokens: usize,
    first: usize,
    last: usize,
}

impl<'a> NoteAccumulator<'a> {
    fn new(source_path: &'a str) -> Self {
        Self {
            source_path,
            chunks: Vec::new(),
            parts: Vec::new(),
            tokens: 0,
            first: 0,
            last: 0,
        }
    }

    fn push(&mut self, part: String, tokens: usize, paragraph: usize) {
        if self.parts.is_empty() {
            self.first = paragraph;
        }
        self.parts.push(part);
        self.tokens += tokens;
        self.last = paragraph;
    }

    fn flush(&mut self) {
        if self.parts.is_empty() {
            return;
        }
        let parts = std::mem::take(&mut self.parts);
        self.emit(parts.join("\n\n"), self.tokens, self.first, self.last);
        self.tokens = 0;
    }

    fn emit(&mut self, text: String, tokens: usize, first: usize, last: usize) {
        let index = self.chunks.len();
        self.chunks.push(Chunk {
            text,
            source_path: self.source_path.to_string(),
            index,
            span: Span { start: first, end: last },
            token_count: tokens,
            unit: SplitUnit::Paragraph,
        });
    }
}

/// Paragraph-based splitting for normalized notes.
///
/// Whole paragraphs accumulate while the total stays within `chunk_size`. A
/// paragraph that alone exceeds the budget is split on `". "` with the same
/// accumulate/close rule; its trailing sentences stay open as one unit that
/// following paragraphs may join. No overlap is applied.
pub fn split_paragraphs(
    text: &str,
    source_path: &str,
    chunk_size: usize,
    estimator: &TokenEstimator,
) -> Vec<Chunk> {
    let paragraphs: Vec<&str> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut acc = NoteAccumulator::new(source_path);

    for (idx, paragraph) in paragraphs.iter().enumerate() {
        let cost = estimator.estimate(paragraph);

        if acc.tokens + cost <= chunk_size {
            acc.push(paragraph.to_string(), cost, idx);
            continue;
        }

        acc.flush();

        if cost <= chunk_size {
            acc.push(paragraph.to_string(), cost, idx);
            continue;
        }

        let mut sentences: Vec<&str> = Vec::new();
        let mut sentence_tokens = 0usize;
        for sentence in paragraph.split(". ") {
            let sentence_cost = estimator.estimate(sentence);
            if sentence_tokens + sentence_cost > chunk_size && !sentences.is_empty() {
                acc.emit(sentences.join(". "), sentence_tokens, idx, idx);
                sentences.clear();
                sentence_tokens = 0;
            }
            sentences.push(sentence);
            sentence_tokens += sentence_cost;
        }

        if !sentences.is_empty() {
            acc.push(sentences.join(". "), sentence_tokens, idx);
        }
    }

    acc.flush();
    acc.chunks
}
