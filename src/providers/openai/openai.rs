use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, EmbeddingInput,
    },
    Client,
};
use async_trait::async_trait;

use crate::config::Settings;
use crate::providers::traits::{CompletionProvider, EmbeddingProvider};

const SYSTEM_MESSAGE: &str =
    "You answer questions using only the document excerpts supplied in the prompt.";

/// Provider for OpenAI-compatible servers (OpenAI itself, vLLM, llama.cpp
/// server, Ollama's `/v1` routes).
#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client<OpenAIConfig>,
    chat_model: String,
    embedding_model: String,
    max_tokens: u16,
    temperature: f32,
    top_p: f32,
}

impl OpenAIProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;

        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(settings.openai_api_base.clone());
        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()?;
        let client = Client::with_config(config).with_http_client(http_client);

        Ok(Self {
            client,
            chat_model: settings.llm_checkpoint.clone(),
            embedding_model: settings.embedding_model_name.clone(),
            max_tokens: settings.max_length,
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.embedding_model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);
        if data.len() != texts.len() {
            return Err(anyhow!(
                "Expected {} embeddings, OpenAI returned {}",
                texts.len(),
                data.len()
            ));
        }
        Ok(data.into_iter().map(|embedding| embedding.embedding).collect())
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_MESSAGE)
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .top_p(self.top_p)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_api_key() {
        let settings = Settings::default();
        assert!(OpenAIProvider::new(&settings).is_err());
    }

    #[tokio::test]
    async fn test_new_with_key() {
        let settings = Settings {
            openai_api_key: Some("sk-test".to_string()),
            embedding_model_name: "text-embedding-3-small".to_string(),
            llm_checkpoint: "gpt-4o-mini".to_string(),
            ..Settings::default()
        };
        let provider = OpenAIProvider::new(&settings).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.chat_model, "gpt-4o-mini");
        assert!(provider.embed_documents(&[]).await.unwrap().is_empty());
    }
}
