use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::config::Settings;
use crate::database::{self, VectorStore, VectorStoreError};
use crate::document::{load_pdf, DocumentError, TextSplitter};
use crate::llm::{AnswerGenerator, EmbeddingGenerator};
use crate::providers::{self, CompletionProvider, EmbeddingProvider};

pub const NOT_READY: &str = "The system is not ready. Please upload a document first.";

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to initialize model providers: {0}")]
    Provider(#[source] anyhow::Error),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("Vector store error: {0}")]
    Store(#[from] VectorStoreError),
    #[error("Embedding failed: {0}")]
    Embedding(#[source] anyhow::Error),
    #[error("Answer generation failed: {0}")]
    Generation(#[source] anyhow::Error),
    #[error("No chunks produced from {0}")]
    NoChunks(String),
}

/// Ingests PDFs into the vector index and answers questions against it.
///
/// Ingestion runs one document at a time. Questions may run concurrently with
/// ingestion and see the index either before or after the document lands.
pub struct RagPipeline {
    settings: Settings,
    splitter: TextSplitter,
    embeddings: EmbeddingGenerator,
    answers: AnswerGenerator,
    store: RwLock<Option<Arc<dyn VectorStore>>>,
    ingest: Mutex<()>,
}

impl RagPipeline {
    /// Builds the providers named in `settings` and attaches any index left by
    /// an earlier run.
    pub async fn new(settings: Settings) -> Result<Self, PipelineError> {
        info!("Initializing RAG pipeline...");
        let (embedder, generator) =
            providers::from_settings(&settings).map_err(PipelineError::Provider)?;
        Self::with_providers(settings, embedder, generator).await
    }

    pub async fn with_providers(
        settings: Settings,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn CompletionProvider>,
    ) -> Result<Self, PipelineError> {
        let store = database::open_existing(&settings, embedder.model_name()).await?;
        if store.is_some() {
            info!("QA chain initialized with existing vector store.");
        } else {
            info!("No vector store found. It will be created on the first document upload.");
        }

        Ok(Self {
            splitter: TextSplitter::new(settings.chunk_size, settings.chunk_overlap),
            embeddings: EmbeddingGenerator::new(embedder, settings.embedding_batch_size),
            answers: AnswerGenerator::new(generator),
            store: RwLock::new(store),
            ingest: Mutex::new(()),
            settings,
        })
    }

    pub async fn is_ready(&self) -> bool {
        self.store.read().await.is_some()
    }

    pub async fn indexed_chunks(&self) -> Result<u64, PipelineError> {
        match self.current_store().await {
            Some(store) => Ok(store.count().await?),
            None => Ok(0),
        }
    }

    async fn current_store(&self) -> Option<Arc<dyn VectorStore>> {
        self.store.read().await.clone()
    }

    /// Extracts, splits, embeds and indexes the PDF at `path`. Chunks from an
    /// earlier upload with the same file name are replaced.
    pub async fn process_document<P: AsRef<Path>>(&self, path: P) -> Result<(), PipelineError> {
        info!("Processing document: {}", path.as_ref().display());
        let (document, text) = load_pdf(path).await?;
        self.ingest_text(&document.filename, &text).await?;
        Ok(())
    }

    /// Indexes already extracted `text` under `source`. Returns the number of
    /// chunks written.
    pub async fn ingest_text(&self, source: &str, text: &str) -> Result<usize, PipelineError> {
        let chunks = self.splitter.split_document(text, source);
        if chunks.is_empty() {
            return Err(PipelineError::NoChunks(source.to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let _guard = self.ingest.lock().await;

        let vectors = self
            .embeddings
            .generate_batch_embeddings(&texts)
            .await
            .map_err(PipelineError::Embedding)?;

        let store = match self.current_store().await {
            Some(store) => store,
            None => {
                info!("Creating and persisting vector store...");
                database::create(&self.settings, self.embeddings.model_name()).await?
            }
        };

        let written = store.upsert_document(source, &chunks, &vectors).await?;
        *self.store.write().await = Some(store);

        info!("Indexed {} chunks from {}", written, source);
        Ok(written)
    }

    /// Answers `query` from the indexed documents, or returns [`NOT_READY`]
    /// when nothing has been indexed yet.
    pub async fn ask_question(&self, query: &str) -> Result<String, PipelineError> {
        let Some(store) = self.current_store().await else {
            warn!("Question received before any document was indexed");
            return Ok(NOT_READY.to_string());
        };

        info!("Answering query: {}", query);
        let query_vector = self
            .embeddings
            .generate_embedding(query)
            .await
            .map_err(PipelineError::Embedding)?;

        let context = store.search(&query_vector, self.settings.top_k).await?;
        info!("Retrieved {} chunks for query", context.len());

        self.answers
            .answer(query, &context)
            .await
            .map_err(PipelineError::Generation)
    }
}
