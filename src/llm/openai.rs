use crate::config::OpenAiSettings;
use crate::http::build_client;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Settings from the config file, with `OPENAI_*` environment overrides.
    pub fn from_settings(settings: &OpenAiSettings) -> Self {
        let api_key = Some(settings.api_key.trim().to_string())
            .filter(|key| !key.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        Self {
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            api_key,
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".into()),
            temperature: 0.7,
            max_tokens: 150,
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("missing api key")]
    MissingApiKey,
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

    pub async fn chat(&self, messages: &[LlmMessage]) -> Result<LlmResponse, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(LlmError::MissingApiKey)?;
        let base = self.config.base_url.trim_end_matches('/');

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http
            .post(format!("{base}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Http(format!("HTTP {}", response.status())));
        }

        let payload: ChatCompletion = response
            .json()
            .await
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;

        let text = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("missing text".into()))?;

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
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
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
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            api_key: Some("sk-test".into()),
            model: "gpt-3.5-turbo".into(),
            temperature: 0.7,
            max_tokens: 150,
        }
    }

    fn user(content: &str) -> LlmMessage {
        LlmMessage {
            role: "user".into(),
            content: content.into(),
        }
    }

    #[tokio::test]
    async fn returns_first_choice_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "max_tokens": 150,
                "messages": [{ "role": "user", "content": "prompt" }],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "index": 0, "message": { "role": "assistant", "content": "  $200, take it  " } }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(config(server.uri()));
        let response = client.chat(&[user("prompt")]).await.expect("chat");
        assert_eq!(response.text, "  $200, take it  ");
        assert_eq!(response.usage.and_then(|u| u.completion_tokens), Some(5));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let mut cfg = config("http://127.0.0.1:9".into());
        cfg.api_key = None;
        let err = LlmClient::new(cfg)
            .chat(&[user("prompt")])
            .await
            .expect_err("no key");
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn empty_choices_are_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;
        let err = LlmClient::new(config(server.uri()))
            .chat(&[user("prompt")])
            .await
            .expect_err("no choices");
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn quota_errors_surface_as_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let err = LlmClient::new(config(server.uri()))
            .chat(&[user("prompt")])
            .await
            .expect_err("rate limited");
        assert!(matches!(err, LlmError::Http(msg) if msg.contains("429")));
    }
}
