use crate::http::build_client;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "deepseek/deepseek-r1-0528:free";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl LlmConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("LLM_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .or_else(|_| std::env::var("DEEPSEEK_API_KEY"))
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self {
            base_url: std::env::var("LLM_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
            api_key,
            model: std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing base url")]
    MissingBaseUrl,
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// OpenAI-compatible chat-completions client (OpenRouter by default).
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            http: build_client(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub async fn chat(&self, messages: &[LlmMessage]) -> Result<LlmResponse, LlmError> {
        let base = self.config.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(LlmError::MissingBaseUrl);
        }

        let body = ChatRequest {
            model: &self.config.model,
            messages,
        };

        let mut request = self
            .http
            .post(format!("{base}/chat/completions"))
            .json(&body);

        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key.trim());
        }

        let response = request
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .choices
            .into_iter()
            .find_map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("missing message content".into()))?;

        Ok(LlmResponse {
            text,
            usage: payload.usage,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<LlmUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_reads_content_and_usage() {
        let body = r#"{
            "id": "gen-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "[]"}}],
            "usage": {"prompt_tokens": 812, "completion_tokens": 37, "total_tokens": 849}
        }"#;
        let payload: ChatResponse = serde_json::from_str(body).expect("parse");

        assert_eq!(payload.choices[0].message.content.as_deref(), Some("[]"));
        let usage = payload.usage.expect("usage");
        assert_eq!(usage.prompt_tokens, Some(812));
        assert_eq!(usage.completion_tokens, Some(37));
    }

    #[test]
    fn missing_usage_is_tolerated() {
        let body = r#"{"choices": [{"message": {"content": "ok"}}]}"#;
        let payload: ChatResponse = serde_json::from_str(body).expect("parse");
        assert!(payload.usage.is_none());
    }
}
