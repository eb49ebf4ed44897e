//! LLM provider client
//!
//! The engine treats the LLM as an opaque request/response oracle behind the
//! [`LlmProvider`] trait. The concrete [`LlmClient`] speaks the
//! OpenRouter-compatible chat completions API.

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::agent::types::ChatMessage;
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Provider-agnostic chat interface
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat completion and return the assistant text.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String>;
}

/// HTTP client for an OpenRouter-compatible chat endpoint
pub struct LlmClient {
    client: Client,
    config: ProviderConfig,
}

#[derive(serde::Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

impl LlmClient {
    /// Create a new client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let mut headers = header::HeaderMap::new();

        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!(
                "Bearer {}",
                config.api_key.expose_secret()
            ))
            .map_err(|e| Error::Config(format!("Invalid API key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        Ok(LlmClient { client, config })
    }

    /// The configured model identifier
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl LlmProvider for LlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature,
            max_tokens,
        };

        debug!("Sending chat request: model={}", self.config.model);

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 {
                warn!("Provider rate limit: {}", error_text);
            }
            return Err(Error::Provider(format!(
                "API error ({}): {}",
                status, error_text
            )));
        }

        let body: ChatCompletionResponse = response.json().await?;

        if let Some(ref usage) = body.usage {
            info!("Chat completion: tokens={}", usage.total_tokens);
        }

        body.choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Provider("Empty response: no choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> ProviderConfig {
        ProviderConfig {
            api_key: SecretString::from("test-key"),
            base_url,
            model: "test/model".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new(test_config("https://example.com/api/v1".into()));
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_chat_returns_first_choice_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [
                    {"message": {"role": "assistant", "content": "Thought: hi\nAction: Final Answer: hello"}}
                ],
                "usage": {"total_tokens": 12}
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(test_config(server.uri())).unwrap();
        let reply = client
            .chat(&[ChatMessage::user("say hello")], 0.2, None)
            .await
            .unwrap();
        assert!(reply.contains("Final Answer: hello"));
    }

    #[tokio::test]
    async fn test_chat_surfaces_api_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = LlmClient::new(test_config(server.uri())).unwrap();
        let err = client
            .chat(&[ChatMessage::user("hi")], 0.2, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }
}
