#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use infogenie_rag::api::{create_api, AppState};
use infogenie_rag::providers::{CompletionProvider, EmbeddingProvider};
use infogenie_rag::{RagPipeline, Settings};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "infogenie-test-boundary";
const DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: each lowercase word bumps one bucket.
pub struct HashEmbedder;

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| hash_embedding(text)).collect())
    }

    fn model_name(&self) -> &str {
        "hash-embedder"
    }
}

fn hash_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSION];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() as usize) % DIMENSION] += 1.0;
    }
    // Keeps vectors for texts without words off the origin.
    vector[0] += 0.01;
    vector
}

/// Replies with the first retrieved excerpt.
pub struct EchoGenerator;

#[async_trait]
impl CompletionProvider for EchoGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let excerpt = prompt.lines().nth(2).unwrap_or_default();
        Ok(format!("From the document: {}", excerpt))
    }
}

pub fn test_settings(dir: &TempDir) -> Settings {
    Settings {
        persist_directory: dir.path().join("db"),
        docs_directory: dir.path().join("docs"),
        embedding_model_name: "hash-embedder".to_string(),
        chunk_size: 200,
        chunk_overlap: 20,
        ..Settings::default()
    }
}

pub async fn test_pipeline(settings: Settings) -> Arc<RagPipeline> {
    let pipeline =
        RagPipeline::with_providers(settings, Arc::new(HashEmbedder), Arc::new(EchoGenerator))
            .await
            .expect("pipeline should start");
    Arc::new(pipeline)
}

pub async fn test_app(dir: &TempDir) -> (Router, Arc<RagPipeline>) {
    let settings = test_settings(dir);
    let pipeline = test_pipeline(settings.clone()).await;
    let app = create_api(AppState::new(Some(pipeline.clone()), settings));
    (app, pipeline)
}

/// A one-page PDF with each line drawn in Courier.
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), 12.into()]),
        Operation::new("Td", vec![50.into(), 750.into()]),
    ];
    for line in lines {
        operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
        operations.push(Operation::new("Td", vec![0.into(), (-16).into()]));
    }
    operations.push(Operation::new("ET", vec![]));

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("content should encode"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("pdf should serialize");
    bytes
}

pub fn upload_request(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn ask_request(query: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/ask")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::json!({ "query": query }).to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
