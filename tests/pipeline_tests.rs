mod common;

use async_trait::async_trait;
use common::*;
use infogenie_rag::database::VectorStoreError;
use infogenie_rag::document::{load_pdf, DocumentError};
use infogenie_rag::providers::EmbeddingProvider;
use infogenie_rag::rag::{PipelineError, NOT_READY};
use infogenie_rag::RagPipeline;
use std::sync::Arc;
use tempfile::TempDir;

async fn write_pdf(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, pdf_with_lines(lines)).await.unwrap();
    path
}

#[tokio::test]
async fn test_generated_pdf_text_is_extracted() {
    let dir = TempDir::new().unwrap();
    let path = write_pdf(&dir, "sample.pdf", &["Glaciers carve valleys slowly."]).await;

    let (document, text) = load_pdf(&path).await.unwrap();
    assert_eq!(document.filename, "sample.pdf");
    assert!(text.contains("Glaciers"));
}

#[tokio::test]
async fn test_two_documents_persist_across_restart() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);

    let first = write_pdf(&dir, "rivers.pdf", &["The Danube flows through ten countries."]).await;
    let second = write_pdf(&dir, "peaks.pdf", &["Mount Elbrus is the highest peak in Europe."]).await;

    let count = {
        let pipeline = test_pipeline(settings.clone()).await;
        pipeline.process_document(&first).await.unwrap();
        pipeline.process_document(&second).await.unwrap();
        pipeline.indexed_chunks().await.unwrap()
    };
    assert!(count >= 2);

    let reopened = test_pipeline(settings).await;
    assert!(reopened.is_ready().await);
    assert_eq!(reopened.indexed_chunks().await.unwrap(), count);

    let answer = reopened
        .ask_question("Which river flows through ten countries?")
        .await
        .unwrap();
    assert_ne!(answer, NOT_READY);
    assert!(answer.contains("Danube"));
}

#[tokio::test]
async fn test_missing_file_is_a_document_error() {
    let dir = TempDir::new().unwrap();
    let pipeline = test_pipeline(test_settings(&dir)).await;

    let result = pipeline
        .process_document(dir.path().join("missing.pdf"))
        .await;

    assert!(matches!(
        result,
        Err(PipelineError::Document(DocumentError::Read { .. }))
    ));
    assert_eq!(
        pipeline.ask_question("anything?").await.unwrap(),
        NOT_READY
    );
}

/// Produces the same vectors as [`HashEmbedder`] under another model name.
struct RenamedEmbedder;

#[async_trait]
impl EmbeddingProvider for RenamedEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        HashEmbedder.embed_documents(texts).await
    }

    fn model_name(&self) -> &str {
        "renamed-embedder"
    }
}

#[tokio::test]
async fn test_index_rejects_a_different_embedding_model() {
    let dir = TempDir::new().unwrap();
    let settings = test_settings(&dir);

    let path = write_pdf(&dir, "rivers.pdf", &["The Danube flows through ten countries."]).await;
    test_pipeline(settings.clone())
        .await
        .process_document(&path)
        .await
        .unwrap();

    let result = RagPipeline::with_providers(
        settings,
        Arc::new(RenamedEmbedder),
        Arc::new(EchoGenerator),
    )
    .await;

    assert!(matches!(
        result,
        Err(PipelineError::Store(VectorStoreError::ModelMismatch { .. }))
    ));
}
