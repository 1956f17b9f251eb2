use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::config::Settings;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};

/// Client for Hugging Face style runners: the hosted Inference API, or a
/// self-hosted text-generation / text-embeddings server exposing the same
/// routes.
#[derive(Clone)]
pub struct HuggingFaceProvider {
    api_key: Option<String>,
    api_url: String,
    client: Client,
    embedding_model: String,
    model: String,
    max_length: u16,
    temperature: f32,
    top_p: f32,
}

impl HuggingFaceProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            api_key: settings.huggingface_api_key.clone(),
            api_url: settings.huggingface_api_url.clone(),
            client,
            embedding_model: settings.embedding_model_name.clone(),
            model: settings.llm_checkpoint.clone(),
            max_length: settings.max_length,
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
    }

    async fn post(&self, url: String, body: Value) -> Result<Value> {
        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!(
                "API request failed: Status {}, Body: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response.json().await?;
        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("API returned error: {}", error));
        }
        Ok(response_json)
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!(
            "{}/pipeline/feature-extraction/{}",
            self.api_url, self.embedding_model
        );
        let response_json = self
            .post(
                url,
                json!({
                    "inputs": texts,
                    "options": { "wait_for_model": true }
                }),
            )
            .await?;

        let embeddings = parse_embeddings(&response_json)?;
        if embeddings.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, runner returned {}",
                texts.len(),
                embeddings.len()
            ));
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl CompletionProvider for HuggingFaceProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}", self.api_url, self.model);
        let response_json = self
            .post(
                url,
                json!({
                    "inputs": prompt,
                    "parameters": {
                        "max_new_tokens": self.max_length,
                        "temperature": self.temperature,
                        "top_p": self.top_p,
                        "do_sample": true,
                        "return_full_text": false
                    },
                    "options": { "wait_for_model": true }
                }),
            )
            .await?;

        parse_generated_text(&response_json).ok_or_else(|| {
            let debug_json = serde_json::to_string_pretty(&response_json).unwrap_or_default();
            anyhow!("Invalid response format. Response JSON: {}", debug_json)
        })
    }
}

/// Accepts `[[f32]]` (one pooled vector per input) or `[[[f32]]]` (one vector
/// per token, mean-pooled here).
fn parse_embeddings(value: &Value) -> Result<Vec<Vec<f32>>> {
    let rows = value
        .as_array()
        .ok_or_else(|| anyhow!("Embedding response is not an array"))?;

    rows.iter()
        .map(|row| match row.as_array() {
            Some(items) if items.first().map_or(false, Value::is_array) => {
                let tokens = items
                    .iter()
                    .map(as_vector)
                    .collect::<Result<Vec<_>>>()?;
                mean_pool(&tokens)
            }
            Some(_) => as_vector(row),
            None => Err(anyhow!("Embedding row is not an array")),
        })
        .collect()
}

fn as_vector(value: &Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| anyhow!("Embedding vector is not an array"))?
        .iter()
        .map(|x| {
            x.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("Embedding contains a non-numeric value"))
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Result<Vec<f32>> {
    let dim = tokens
        .first()
        .map(Vec::len)
        .ok_or_else(|| anyhow!("Empty token embedding"))?;
    let mut pooled = vec![0.0f32; dim];
    for token in tokens {
        if token.len() != dim {
            return Err(anyhow!("Ragged token embeddings"));
        }
        for (acc, x) in pooled.iter_mut().zip(token) {
            *acc += x;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|x| *x /= n);
    Ok(pooled)
}

/// Text-generation runners answer with `[{"generated_text": ..}]` or a bare
/// object.
fn parse_generated_text(value: &Value) -> Option<String> {
    let item = match value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    item.get("generated_text")
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
}
