use crate::ingest::{Chunk, VaultMetadata};
use crate::sources::SourceEntry;
use crate::store::{ChunkRecord, Metadata};
use serde_json::{json, Value};

/// Metadata of a code chunk.
///
/// `file_url` is the browser URL of the file and is omitted when the host
/// does not report one.
pub fn code_metadata(chunk: &Chunk, entry: &SourceEntry, repository: &str, timestamp: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("file_path".to_string(), json!(chunk.source_path));
    metadata.insert("start_line".to_string(), json!(chunk.span.start));
    metadata.insert("end_line".to_string(), json!(chunk.span.end));
    metadata.insert("file_size".to_string(), json!(entry.size));
    if let Some(url) = &entry.html_url {
        metadata.insert("file_url".to_string(), json!(url));
    }
    metadata.insert("repository".to_string(), json!(repository));
    metadata.insert("pageContent".to_string(), json!(chunk.text));
    metadata.insert("timestamp".to_string(), json!(timestamp));
    metadata
}

/// Metadata of a note chunk; note-level fields repeat on every chunk.
pub fn note_metadata(chunk: &Chunk, note: &VaultMetadata, total_chunks: usize) -> Metadata {
    let file_name = chunk
        .source_path
        .rsplit('/')
        .next()
        .unwrap_or(&chunk.source_path);

    let mut metadata = Metadata::new();
    metadata.insert("title".to_string(), json!(note.title));
    metadata.insert("file_path".to_string(), json!(chunk.source_path));
    metadata.insert("file_name".to_string(), json!(file_name));
    metadata.insert(
        "tags".to_string(),
        Value::Array(note.tags.iter().map(|t| json!(t)).collect()),
    );
    if let Some(created) = &note.created_date {
        metadata.insert("created_date".to_string(), json!(created));
    }
    if let Some(modified) = &note.modified_date {
        metadata.insert("modified_date".to_string(), json!(modified));
    }
    metadata.insert("chunk_index".to_string(), json!(chunk.index));
    metadata.insert("total_chunks".to_string(), json!(total_chunks));
    metadata.insert("token_count".to_string(), json!(chunk.token_count));
    metadata.insert("content_type".to_string(), json!("obsidian_note"));
    metadata.insert("start_paragraph".to_string(), json!(chunk.span.start));
    metadata.insert("end_paragraph".to_string(), json!(chunk.span.end));
    metadata.insert("pageContent".to_string(), json!(chunk.text));
    metadata
}

pub fn build_record(chunk: &Chunk, values: Vec<f32>, metadata: Metadata) -> ChunkRecord {
    ChunkRecord {
        id: chunk.id(),
        values,
        metadata,
    }
}
