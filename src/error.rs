use thiserror::Error;

/// Main error type for Chunkdex
#[derive(Error, Debug)]
pub enum ChunkdexError {
    /// Missing credential or invalid setting; aborts before any work starts
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Local vector store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON encoding/decoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A single source item (or listing) could not be retrieved
    #[error("Fetch error ({locator}): {message}")]
    Fetch { locator: String, message: String },

    /// Content could not be decoded under any attempted encoding
    #[error("Decode error ({locator}): content is not valid {attempted}")]
    Decode { locator: String, attempted: String },

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Batch write to the vector store failed
    #[error("Upsert error (index {index}): {message}")]
    Upsert { index: String, message: String },

    /// Index could not be created or reached
    #[error("Index setup error (index {index}): {message}")]
    IndexSetup { index: String, message: String },

    /// Similarity query failed
    #[error("Query error: {0}")]
    Query(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A blocking task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl ChunkdexError {
    /// Only configuration and index-setup failures abort a run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChunkdexError::Config(_) | ChunkdexError::IndexSetup { .. })
    }

    pub(crate) fn fetch(locator: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ChunkdexError::Fetch {
            locator: locator.into(),
            message: message.to_string(),
        }
    }
}

/// Convenient Result type using ChunkdexError
pub type Result<T> = std::result::Result<T, ChunkdexError>;
