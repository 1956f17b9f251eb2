use async_trait::async_trait;
use log::info;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, points_selector::PointsSelectorOneOf,
        vectors_config::Config, with_payload_selector::SelectorOptions, CollectionExistsRequest,
        Condition, CountPoints, CreateCollection, DeletePoints, Distance, Filter, PointId,
        PointStruct, PointsSelector, SearchPoints, UpsertPoints, Value, VectorParams,
        VectorsConfig, WithPayloadSelector,
    },
    Qdrant,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::qdrant_config::create_qdrant_client;
use super::vector_store::{check_counts, ScoredChunk, VectorStore, VectorStoreError};
use crate::document::Chunk;

/// Points are written in batches of this many per upsert call.
const UPSERT_BATCH: usize = 256;

/// Vector index kept in a Qdrant collection; persistence belongs to the
/// Qdrant server.
#[derive(Clone)]
pub struct QdrantVectorStore {
    client: Arc<Qdrant>,
    collection: String,
    model: String,
}

impl QdrantVectorStore {
    pub async fn connect(url: &str, collection: &str, model: &str) -> Result<Self, VectorStoreError> {
        let client = create_qdrant_client(url).await?;
        Ok(Self {
            client: Arc::new(client),
            collection: collection.to_string(),
            model: model.to_string(),
        })
    }

    pub async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        self.client
            .collection_exists(CollectionExistsRequest {
                collection_name: self.collection.clone(),
            })
            .await
            .map_err(|e| VectorStoreError::Operation(e.to_string()))
    }

    async fn create_collection(&self, vector_size: u64) -> Result<(), VectorStoreError> {
        let vectors_config = VectorsConfig {
            config: Some(Config::Params(VectorParams {
                size: vector_size,
                distance: Distance::Cosine.into(),
                ..Default::default()
            })),
        };

        let create_collection = CreateCollection {
            collection_name: self.collection.clone(),
            vectors_config: Some(vectors_config),
            ..Default::default()
        };

        match self.client.create_collection(create_collection).await {
            Ok(_) => {
                info!("Created Qdrant collection {}", self.collection);
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                info!("Collection {} already exists, skipping creation", self.collection);
                Ok(())
            }
            Err(e) => Err(VectorStoreError::Operation(e.to_string())),
        }
    }

    async fn delete_source(&self, source: &str) -> Result<(), VectorStoreError> {
        let points_selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Filter(Filter::must([
                Condition::matches("source", source.to_string()),
            ]))),
        };

        let delete_points = DeletePoints {
            collection_name: self.collection.clone(),
            points: Some(points_selector),
            wait: Some(true),
            ..Default::default()
        };

        self.client
            .delete_points(delete_points)
            .await
            .map_err(|e| VectorStoreError::Operation(e.to_string()))?;
        Ok(())
    }

    fn to_point(&self, chunk: &Chunk, vector: &[f32]) -> PointStruct {
        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("text".to_string(), Value::from(chunk.text.clone()));
        payload.insert("source".to_string(), Value::from(chunk.source.clone()));
        payload.insert("position".to_string(), Value::from(chunk.position as i64));
        payload.insert("embedding_model".to_string(), Value::from(self.model.clone()));

        PointStruct {
            id: Some(PointId {
                point_id_options: Some(PointIdOptions::Uuid(Uuid::new_v4().to_string())),
            }),
            vectors: Some(vector.to_vec().into()),
            payload,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert_document(
        &self,
        source: &str,
        chunks: &[Chunk],
        vectors: &[Vec<f32>],
    ) -> Result<usize, VectorStoreError> {
        check_counts(chunks, vectors)?;
        let Some(first) = vectors.first() else {
            return Ok(0);
        };

        self.create_collection(first.len() as u64).await?;
        self.delete_source(source).await?;

        let points: Vec<PointStruct> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| self.to_point(chunk, vector))
            .collect();

        for batch in points.chunks(UPSERT_BATCH) {
            let upsert_points = UpsertPoints {
                collection_name: self.collection.clone(),
                points: batch.to_vec(),
                wait: Some(true),
                ..Default::default()
            };
            self.client
                .upsert_points(upsert_points)
                .await
                .map_err(|e| VectorStoreError::Operation(e.to_string()))?;
        }

        Ok(points.len())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, VectorStoreError> {
        if k == 0 || !self.collection_exists().await? {
            return Ok(Vec::new());
        }

        let request = SearchPoints {
            collection_name: self.collection.clone(),
            vector: query.to_vec(),
            limit: k as u64,
            with_payload: Some(WithPayloadSelector {
                selector_options: Some(SelectorOptions::Enable(true)),
            }),
            ..Default::default()
        };

        let results = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorStoreError::Operation(e.to_string()))?;

        let chunks = results
            .result
            .into_iter()
            .filter_map(|point| {
                let text = point.payload.get("text")?.as_str()?.to_string();
                let source = point.payload.get("source")?.as_str()?.to_string();
                let position = point
                    .payload
                    .get("position")
                    .and_then(|v| v.as_integer())
                    .unwrap_or(0) as usize;

                Some(ScoredChunk {
                    chunk: Chunk {
                        text,
                        source,
                        position,
                    },
                    score: point.score,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn count(&self) -> Result<u64, VectorStoreError> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(CountPoints {
                collection_name: self.collection.clone(),
                exact: Some(true),
                ..Default::default()
            })
            .await
            .map_err(|e| VectorStoreError::Operation(e.to_string()))?;

        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }
}
