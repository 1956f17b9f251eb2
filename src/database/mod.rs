pub mod qdrant_config;
pub mod sqlite_store;
pub mod vector_db;
pub mod vector_store;

use log::info;
use std::sync::Arc;

use crate::config::{Settings, StoreBackend};

pub use sqlite_store::SqliteVectorStore;
pub use vector_db::QdrantVectorStore;
pub use vector_store::{cosine_similarity, ScoredChunk, VectorStore, VectorStoreError};

/// Opens the configured index if it already holds data from an earlier run.
/// `None` means nothing has been ingested yet. `model` is the embedding model
/// whose vectors the index holds; a file built by another model is rejected.
pub async fn open_existing(
    settings: &Settings,
    model: &str,
) -> Result<Option<Arc<dyn VectorStore>>, VectorStoreError> {
    match &settings.store {
        StoreBackend::Local => {
            let path = settings.index_path();
            match SqliteVectorStore::open_existing(&path, model).await? {
                Some(store) if store.count().await? > 0 => {
                    info!("Loaded existing index from {}", path.display());
                    Ok(Some(Arc::new(store)))
                }
                _ => Ok(None),
            }
        }
        StoreBackend::Qdrant { url, collection } => {
            let store = QdrantVectorStore::connect(url, collection, model).await?;
            if store.count().await? > 0 {
                info!("Using existing Qdrant collection {}", collection);
                Ok(Some(Arc::new(store)))
            } else {
                Ok(None)
            }
        }
    }
}

/// Opens the configured index, creating it when absent.
pub async fn create(
    settings: &Settings,
    model: &str,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match &settings.store {
        StoreBackend::Local => {
            let store = SqliteVectorStore::open(settings.index_path(), model).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Qdrant { url, collection } => {
            let store = QdrantVectorStore::connect(url, collection, model).await?;
            Ok(Arc::new(store))
        }
    }
}
