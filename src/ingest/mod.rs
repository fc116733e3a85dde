pub mod tokens;
pub mod chunker;
pub mod identity;
pub mod markdown;
pub mod metadata;

pub use tokens::{TokenEstimator, heuristic_tokens};
pub use chunker::{Chunk, ChunkParams, Span, SplitUnit, split, split_lines, split_paragraphs};
pub use identity::{Position, chunk_id};
pub use markdown::normalize_note;
pub use metadata::{FileTimes, FrontMatter, VaultMetadata, extract_metadata, split_front_matter};
