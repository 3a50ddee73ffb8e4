//! Answer generator adapters.
//!
//! | Config Value | Generator |
//! |-------------|-----------|
//! | `"extractive"` | [`ExtractiveGenerator`] (deterministic, offline) |
//! | `"openai"` | [`ChatCompletionsGenerator`] against the OpenAI API |
//! | `"ollama"` | [`ChatCompletionsGenerator`] against Ollama's OpenAI-compatible API |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use lexrag_core::generate::{
    build_prompt, AnswerGenerator, ExtractiveGenerator, NO_CONTEXT_ANSWER, SYSTEM_PROMPT,
};
use lexrag_core::{Chunk, Port, RagError};

use crate::config::GenerationConfig;
use crate::http;

const OPENAI_URL: &str = "https://api.openai.com/v1";
const OLLAMA_URL: &str = "http://localhost:11434/v1";

/// Generator backed by an OpenAI-compatible `POST /chat/completions` endpoint.
pub struct ChatCompletionsGenerator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_retries: u32,
    service: &'static str,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for {} provider", config.provider))?;

        let (service, default_url, api_key) = match config.provider.as_str() {
            "openai" => {
                let key = std::env::var("OPENAI_API_KEY")
                    .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
                ("OpenAI", OPENAI_URL, Some(key))
            }
            "ollama" => ("Ollama", OLLAMA_URL, None),
            other => bail!("Provider '{}' does not speak chat completions", other),
        };

        Ok(Self {
            client: http::build_client(config.timeout_secs)?,
            url: config.url.clone().unwrap_or_else(|| default_url.to_string()),
            api_key,
            model,
            temperature: config.temperature,
            max_retries: config.max_retries,
            service,
        })
    }

    fn request_body(&self, question: &str, context: &[Chunk]) -> Value {
        serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(question, context)},
            ],
        })
    }
}

#[async_trait]
impl AnswerGenerator for ChatCompletionsGenerator {
    async fn generate_answer(&self, question: &str, context: &[Chunk]) -> lexrag_core::Result<String> {
        if context.is_empty() {
            return Ok(NO_CONTEXT_ANSWER.to_string());
        }

        let endpoint = format!("{}/chat/completions", self.url.trim_end_matches('/'));
        let json = http::post_json(
            &self.client,
            &endpoint,
            self.api_key.as_deref(),
            &self.request_body(question, context),
            self.max_retries,
            self.service,
        )
        .await
        .map_err(|e| RagError::unavailable(Port::Generator, e))?;

        let answer =
            parse_chat_response(&json).map_err(|e| RagError::unavailable(Port::Generator, e))?;
        debug!(model = %self.model, chars = answer.len(), "answer generated");
        Ok(answer)
    }
}

/// Extract `choices[0].message.content`.
fn parse_chat_response(json: &Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

/// Create the [`AnswerGenerator`] selected by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn AnswerGenerator>> {
    match config.provider.as_str() {
        "extractive" => Ok(Arc::new(ExtractiveGenerator::new())),
        "openai" | "ollama" => Ok(Arc::new(ChatCompletionsGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ollama_config() -> GenerationConfig {
        GenerationConfig {
            provider: "ollama".into(),
            model: Some("llama3.1".into()),
            url: Some("http://127.0.0.1:9/v1".into()),
            max_retries: 0,
            ..GenerationConfig::default()
        }
    }

    #[test]
    fn test_parse_chat_response() {
        let json = json!({
            "choices": [{"message": {"role": "assistant", "content": " The rent is due monthly [1]. "}}]
        });
        assert_eq!(
            parse_chat_response(&json).unwrap(),
            "The rent is due monthly [1]."
        );
        assert!(parse_chat_response(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_request_body_carries_prompt() {
        let generator = ChatCompletionsGenerator::new(&ollama_config()).unwrap();
        let body = generator.request_body("Who pays rent?", &[Chunk::new("d", 0, "Tenant pays.")]);
        assert_eq!(body["model"], "llama3.1");
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("[1] Tenant pays."));
        assert!(user.contains("Who pays rent?"));
    }

    #[tokio::test]
    async fn test_no_context_skips_network() {
        let generator = ChatCompletionsGenerator::new(&ollama_config()).unwrap();
        let answer = generator.generate_answer("anything", &[]).await.unwrap();
        assert_eq!(answer, NO_CONTEXT_ANSWER);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_generator_unavailable() {
        let generator = ChatCompletionsGenerator::new(&ollama_config()).unwrap();
        let err = generator
            .generate_answer("anything", &[Chunk::new("d", 0, "text")])
            .await
            .unwrap_err();
        assert_eq!(err.port(), Some(Port::Generator));
    }

    #[test]
    fn test_create_generator() {
        assert!(create_generator(&GenerationConfig::default()).is_ok());
        let config = GenerationConfig {
            provider: "gpt".into(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&config).is_err());
    }
}
