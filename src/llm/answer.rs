use anyhow::Result;
use log::debug;
use std::sync::Arc;

use crate::database::ScoredChunk;
use crate::providers::traits::CompletionProvider;

pub const NO_ANSWER: &str = "Sorry, I could not find an answer.";

const PROMPT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Stuffs retrieved chunks into a single prompt and asks the generator.
pub struct AnswerGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl AnswerGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
        let context = context
            .iter()
            .map(|scored| scored.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            "{}\n\n{}\n\nQuestion: {}\nHelpful Answer:",
            PROMPT_PREAMBLE, context, question
        )
    }

    /// Blank generations are replaced with [`NO_ANSWER`].
    pub async fn answer(&self, question: &str, context: &[ScoredChunk]) -> Result<String> {
        let prompt = Self::build_prompt(question, context);
        debug!(
            "Generating answer from {} chunks ({} prompt chars)",
            context.len(),
            prompt.chars().count()
        );

        let response = self.provider.complete(&prompt).await?;
        let answer = response.trim();
        if answer.is_empty() {
            return Ok(NO_ANSWER.to_string());
        }
        Ok(answer.to_string())
    }
}
