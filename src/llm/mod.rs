mod openrouter;

pub use openrouter::{LlmClient, LlmConfig, LlmError, LlmMessage};

use async_trait::async_trait;
use tracing::debug;

/// Single request/response completion call. The pipeline only ever sends one
/// user prompt and reads back the text.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[async_trait]
impl Completion for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let response = self.chat(&[LlmMessage::user(prompt)]).await?;
        if let Some(usage) = &response.usage {
            debug!(
                target: "scraper.llm",
                model = self.model(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion_usage"
            );
        }
        Ok(response.text)
    }
}
