use super::{ChunkRecord, IndexSpec, Metadata, QueryMatch, VectorStore};
use crate::config::Metric;
use crate::error::{ChunkdexError, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use tokio::task;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS vector_indexes (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    metric TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS vectors (
    index_name TEXT NOT NULL REFERENCES vector_indexes(name) ON DELETE CASCADE,
    id TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (index_name, id)
);
";

/// Local vector store in a single SQLite file.
///
/// Queries are exact full scans scored in Rust, which is fine for a
/// personal vault or a single repository.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Execute a closure with a fresh connection in a blocking task
    async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        task::spawn_blocking(move || {
            let mut conn = Connection::open(&path)?;
            conn.execute_batch(
                "PRAGMA journal_mode = WAL; \
                 PRAGMA synchronous = NORMAL; \
                 PRAGMA foreign_keys = ON;",
            )?;
            conn.execute_batch(SCHEMA)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| ChunkdexError::Task(e.to_string()))?
    }
}

/// Index dimension and metric, if the index exists
fn index_shape(conn: &Connection, name: &str) -> Result<Option<(usize, Metric)>> {
    let row: Option<(i64, String)> = conn
        .query_row(
            "SELECT dimension, metric FROM vector_indexes WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((dimension, metric)) => {
            let metric = Metric::parse(&metric).ok_or_else(|| {
                ChunkdexError::InvalidInput(format!("Unknown metric '{}' for index {}", metric, name))
            })?;
            Ok(Some((dimension as usize, metric)))
        }
    }
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    blob.chunks(4)
        .map(|bytes| {
            let arr: [u8; 4] = bytes.try_into().ok()?;
            Some(f32::from_le_bytes(arr))
        })
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

/// Higher is more similar for every metric
fn score(metric: Metric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Metric::Cosine => cosine_similarity(a, b),
        Metric::Dotproduct => a.iter().zip(b.iter()).map(|(x, y)| x * y).sum(),
        Metric::Euclidean => {
            let distance = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt();
            1.0 / (1.0 + distance)
        }
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<()> {
        let spec = spec.clone();
        let name = spec.name.clone();

        self.with_connection(move |conn| {
            match index_shape(conn, &spec.name)? {
                Some((dimension, _)) if dimension != spec.dimension => {
                    Err(ChunkdexError::InvalidInput(format!(
                        "existing index has dimension {}, expected {}",
                        dimension, spec.dimension
                    )))
                }
                Some((_, metric)) => {
                    if metric != spec.metric {
                        log::warn!(
                            "Index {} uses metric {}, keeping it (requested {})",
                            spec.name,
                            metric.as_str(),
                            spec.metric.as_str()
                        );
                    }
                    log::info!("Using existing index: {}", spec.name);
                    Ok(())
                }
                None => {
                    conn.execute(
                        "INSERT INTO vector_indexes (name, dimension, metric, created_at) VALUES (?1, ?2, ?3, ?4)",
                        params![
                            spec.name,
                            spec.dimension as i64,
                            spec.metric.as_str(),
                            chrono::Utc::now().to_rfc3339()
                        ],
                    )?;
                    log::info!("Created index: {} ({} dims, {})", spec.name, spec.dimension, spec.metric.as_str());
                    Ok(())
                }
            }
        })
        .await
        .map_err(|e| ChunkdexError::IndexSetup {
            index: name,
            message: e.to_string(),
        })
    }

    async fn upsert(&self, index: &str, records: &[ChunkRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let index_name = index.to_string();
        let rows: Vec<(String, Vec<u8>, usize, String)> = records
            .iter()
            .map(|r| {
                Ok((
                    r.id.clone(),
                    encode_embedding(&r.values),
                    r.values.len(),
                    serde_json::to_string(&r.metadata)?,
                ))
            })
            .collect::<Result<_>>()?;

        self.with_connection(move |conn| {
            let (dimension, _) = index_shape(conn, &index_name)?
                .ok_or_else(|| ChunkdexError::InvalidInput("index does not exist".to_string()))?;

            let tx = conn.transaction()?;
            let now = chrono::Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO vectors (index_name, id, embedding, metadata, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(index_name, id) DO UPDATE SET
                         embedding = excluded.embedding,
                         metadata = excluded.metadata,
                         updated_at = excluded.updated_at",
                )?;
                for (id, blob, len, metadata) in &rows {
                    if *len != dimension {
                        return Err(ChunkdexError::InvalidInput(format!(
                            "record {} has {} dimensions, index expects {}",
                            id, len, dimension
                        )));
                    }
                    stmt.execute(params![index_name, id, blob, metadata, now])?;
                }
            }
            tx.commit()?;
            Ok(rows.len())
        })
        .await
        .map_err(|e| ChunkdexError::Upsert {
            index: index.to_string(),
            message: e.to_string(),
        })
    }

    async fn query(&self, index: &str, vector: &[f32], top_k: usize) -> Result<Vec<QueryMatch>> {
        let index_name = index.to_string();
        let query_vec = vector.to_vec();

        let scanned = self
            .with_connection(move |conn| {
                let (dimension, metric) = index_shape(conn, &index_name)?.ok_or_else(|| {
                    ChunkdexError::Query(format!("Index {} does not exist", index_name))
                })?;
                if query_vec.len() != dimension {
                    return Err(ChunkdexError::Query(format!(
                        "Query vector has {} dimensions, index {} expects {}",
                        query_vec.len(),
                        index_name,
                        dimension
                    )));
                }

                let mut stmt =
                    conn.prepare("SELECT id, embedding, metadata FROM vectors WHERE index_name = ?1")?;
                let mut rows = stmt.query(params![index_name])?;
                let mut matches = Vec::new();
                while let Some(row) = rows.next()? {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    let metadata: String = row.get(2)?;

                    let embedding = match decode_embedding(&blob) {
                        Some(e) if e.len() == dimension => e,
                        _ => {
                            log::warn!("Skipping malformed vector {} in {}", id, index_name);
                            continue;
                        }
                    };
                    let metadata: Metadata = serde_json::from_str(&metadata)?;
                    matches.push(QueryMatch {
                        id,
                        score: score(metric, &query_vec, &embedding),
                        metadata,
                    });
                }
                Ok(matches)
            })
            .await?;

        let mut matches = scanned;
        matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn count(&self, index: &str) -> Result<usize> {
        let index_name = index.to_string();
        self.with_connection(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM vectors WHERE index_name = ?1",
                params![index_name],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}
