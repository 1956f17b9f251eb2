use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::document::Chunk;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Index was built with embedding model '{stored}', refusing to mix in '{requested}'")]
    ModelMismatch { stored: String, requested: String },
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("Got {chunks} chunks but {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A retrieved chunk with its similarity to the query (higher is closer).
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Persistent (chunk, vector) index with nearest-neighbour lookup.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Stores `chunks` with their `vectors`, replacing whatever was stored
    /// before for `source`. Returns the number of chunks written.
    async fn upsert_document(
        &self,
        source: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError>;

    /// The `k` chunks most similar to `query`, best first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorStoreError>;

    async fn count(&self) -> Result<u64, VectorStoreError>;
}

pub(crate) fn check_counts(chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), VectorStoreError> {
    if chunks.len() != vectors.len() {
        return Err(VectorStoreError::CountMismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }
    if let Some(first) = vectors.first() {
        if let Some(bad) = vectors.iter().find(|v| v.len() != first.len()) {
            return Err(VectorStoreError::DimensionMismatch {
                expected: first.len(),
                actual: bad.len(),
            });
        }
    }
    Ok(())
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(position: usize) -> Chunk {
        Chunk {
            text: format!("chunk {}", position),
            source: "a.pdf".to_string(),
            position,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 1.0], &[-1.0, -1.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_check_counts() {
        assert!(check_counts(&[chunk(0)], &[vec![0.1, 0.2]]).is_ok());
        assert!(matches!(
            check_counts(&[chunk(0), chunk(1)], &[vec![0.1]]),
            Err(VectorStoreError::CountMismatch { .. })
        ));
        assert!(matches!(
            check_counts(&[chunk(0), chunk(1)], &[vec![0.1, 0.2], vec![0.3]]),
            Err(VectorStoreError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }
}
