pub mod huggingface;
pub mod openai;
pub mod traits;

use anyhow::Result;
use log::info;
use std::sync::Arc;

use crate::config::{LLMProvider, Settings};
use huggingface::huggingface::HuggingFaceProvider;
use openai::openai::OpenAIProvider;
pub use traits::{CompletionProvider, EmbeddingProvider};

/// Builds the embedding and completion providers selected by `LLM_PROVIDER`.
pub fn from_settings(
    settings: &Settings,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn CompletionProvider>)> {
    info!(
        "Using {:?} runner: embeddings={}, generation={}, device={}, 8-bit={}",
        settings.provider,
        settings.embedding_model_name,
        settings.llm_checkpoint,
        settings.device,
        settings.use_8bit
    );

    match settings.provider {
        LLMProvider::HuggingFace => {
            let provider = Arc::new(HuggingFaceProvider::new(settings)?);
            let embedder: Arc<dyn EmbeddingProvider> = provider.clone();
            let generator: Arc<dyn CompletionProvider> = provider;
            Ok((embedder, generator))
        }
        LLMProvider::OpenAI => {
            let provider = Arc::new(OpenAIProvider::new(settings)?);
            let embedder: Arc<dyn EmbeddingProvider> = provider.clone();
            let generator: Arc<dyn CompletionProvider> = provider;
            Ok((embedder, generator))
        }
    }
}
