use anyhow::{anyhow, Result};
use log::debug;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::providers::traits::EmbeddingProvider;

const QUERY_CACHE_CAPACITY: usize = 256;
/// Batches sent to the runner at the same time.
const MAX_IN_FLIGHT: usize = 4;

/// Turns chunk texts and questions into vectors through an
/// [`EmbeddingProvider`], batching document calls and caching query vectors.
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            batch_size: batch_size.max(1),
            query_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    /// Embeds `texts` in order. All vectors must share one dimension.
    pub async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for group in batches.chunks(MAX_IN_FLIGHT) {
            let results = futures::future::join_all(
                group.iter().map(|batch| self.provider.embed_documents(batch)),
            )
            .await;

            for (batch, result) in group.iter().zip(results) {
                let vectors = result?;
                if vectors.len() != batch.len() {
                    return Err(anyhow!(
                        "Embedding provider returned {} vectors for {} texts",
                        vectors.len(),
                        batch.len()
                    ));
                }
                embeddings.extend(vectors);
            }
        }

        check_dimensions(&embeddings)?;
        debug!("Embedded {} texts in {} batches", texts.len(), batches.len());
        Ok(embeddings)
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let cached = self.query_cache.lock().get(text).cloned();
        if let Some(hit) = cached {
            return Ok(hit);
        }

        let embedding = self.provider.embed_query(text).await?;
        if embedding.is_empty() {
            return Err(anyhow!("Embedding provider returned an empty vector"));
        }
        self.query_cache.lock().put(text.to_string(), embedding.clone());
        Ok(embedding)
    }
}

fn check_dimensions(embeddings: &[Vec<f32>]) -> Result<()> {
    let Some(first) = embeddings.first() else {
        return Ok(());
    };
    if first.is_empty() {
        return Err(anyhow!("Embedding provider returned an empty vector"));
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != first.len()) {
        return Err(anyhow!(
            "Inconsistent embedding dimensions: {} and {}",
            first.len(),
            bad.len()
        ));
    }
    Ok(())
}
