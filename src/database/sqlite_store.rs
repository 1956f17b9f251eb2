use async_trait::async_trait;
use chrono::Utc;
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rusqlite::{params, Connection};
use uuid::Uuid;

use super::vector_store::{
    check_counts, cosine_similarity, ScoredChunk, VectorStore, VectorStoreError,
};
use crate::document::Chunk;

/// Vector index kept in a single SQLite file. Vectors are stored as
/// little-endian `f32` blobs and scanned exhaustively on search.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Arc<Connection>,
    path: PathBuf,
    model: String,
}

impl SqliteVectorStore {
    /// Opens the index at `path`, creating the file and schema if needed.
    /// Fails if the file was built with a different embedding model.
    pub async fn open<P: AsRef<Path>>(path: P, model: &str) -> Result<Self, VectorStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)
            .await
            .map_err(|e| VectorStoreError::Connection(e.to_string()))?;

        let store = Self {
            conn: Arc::new(conn),
            path,
            model: model.to_string(),
        };
        store.initialize().await?;
        Ok(store)
    }

    /// Opens the index only if its file already exists.
    pub async fn open_existing<P: AsRef<Path>>(
        path: P,
        model: &str,
    ) -> Result<Option<Self>, VectorStoreError> {
        match tokio::fs::metadata(path.as_ref()).await {
            Ok(meta) if meta.is_file() => Ok(Some(Self::open(path, model).await?)),
            _ => Ok(None),
        }
    }

    async fn initialize(&self) -> Result<(), VectorStoreError> {
        let model = self.model.clone();
        let stored = self
            .conn
            .call(move |conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS index_meta (
                        key TEXT PRIMARY KEY,
                        value TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS chunks (
                        id TEXT PRIMARY KEY,
                        source TEXT NOT NULL,
                        position INTEGER NOT NULL,
                        text TEXT NOT NULL,
                        embedding BLOB NOT NULL,
                        created_at TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);",
                )?;
                conn.execute(
                    "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('embedding_model', ?1)",
                    params![model],
                )?;
                let stored: String = conn.query_row(
                    "SELECT value FROM index_meta WHERE key = 'embedding_model'",
                    [],
                    |row| row.get(0),
                )?;
                Ok(stored)
            })
            .await?;

        if stored != self.model {
            return Err(VectorStoreError::ModelMismatch {
                stored,
                requested: self.model.clone(),
            });
        }

        info!("Vector index ready at {}", self.path.display());
        Ok(())
    }

    async fn dimension(&self) -> Result<Option<usize>, VectorStoreError> {
        let dimension = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT value FROM index_meta WHERE key = 'dimension'")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut values = Vec::new();
                for row in rows {
                    values.push(row?);
                }
                Ok(values)
            })
            .await?;

        Ok(dimension.first().and_then(|d| d.parse::<usize>().ok()))
    }

    async fn check_dimension(&self, actual: usize) -> Result<(), VectorStoreError> {
        match self.dimension().await? {
            Some(expected) if expected != actual => {
                Err(VectorStoreError::DimensionMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_document(
        &self,
        source: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError> {
        check_counts(chunks, vectors)?;
        let dimension = match vectors.first() {
            Some(first) => first.len(),
            None => return Ok(0),
        };
        self.check_dimension(dimension).await?;

        let source = source.to_string();
        let created_at = Utc::now().to_rfc3339();
        let rows: Vec<(String, i64, String, Vec<u8>)> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                (
                    Uuid::new_v4().to_string(),
                    chunk.position as i64,
                    chunk.text.clone(),
                    encode_vector(vector),
                )
            })
            .collect();

        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('dimension', ?1)",
                    params![dimension.to_string()],
                )?;
                tx.execute("DELETE FROM chunks WHERE source = ?1", params![source])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO chunks (id, source, position, text, embedding, created_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )?;
                    for (id, position, text, embedding) in &rows {
                        stmt.execute(params![id, source, position, text, embedding, created_at])?;
                    }
                }
                tx.commit()?;
                Ok(rows.len())
            })
            .await?;

        Ok(written)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query.len()).await?;

        let query = query.to_vec();
        let results = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT source, position, text, embedding FROM chunks")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Vec<u8>>(3)?,
                    ))
                })?;

                let mut scored = Vec::new();
                for row in rows {
                    let (source, position, text, embedding) = row?;
                    let score = cosine_similarity(&query, &decode_vector(&embedding));
                    scored.push(ScoredChunk {
                        chunk: Chunk {
                            text,
                            source,
                            position: position as usize,
                        },
                        score,
                    });
                }
                Ok(scored)
            })
            .await?;

        Ok(top_k(results, k))
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count as u64)
    }
}

fn top_k(mut results: Vec<ScoredChunk>, k: usize) -> Vec<ScoredChunk> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk.source.cmp(&b.chunk.source))
            .then_with(|| a.chunk.position.cmp(&b.chunk.position))
    });
    results.truncate(k);
    results
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
