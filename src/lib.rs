pub mod config;
pub mod error;
pub mod ingest;
pub mod sources;
pub mod embeddings;
pub mod store;
pub mod pipeline;

pub use config::Config;
pub use error::{ChunkdexError, Result};
pub use pipeline::{Pipeline, RunContext, RunSummary, Searcher};
