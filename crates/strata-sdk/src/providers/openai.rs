//! OpenAI-compatible HTTP provider.
//!
//! Works against any endpoint speaking the OpenAI chat-completions and
//! embeddings API (OpenAI itself, LM Studio, OpenRouter).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionOptions, CompletionProvider, EmbeddingProvider, ProviderError};

/// Default API base
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    /// API base without trailing slash (default: OpenAI)
    pub base_url: String,
    /// Bearer token; local servers often accept none
    pub api_key: Option<String>,
    /// Chat model (default: gpt-3.5-turbo)
    pub completion_model: String,
    /// Embedding model (default: text-embedding-3-small)
    pub embedding_model: String,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Completion and embedding client for an OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    client: Client,
    settings: OpenAiSettings,
}

impl OpenAiCompatibleProvider {
    pub fn new(settings: OpenAiSettings) -> Self {
        Self {
            client: Client::new(),
            settings: OpenAiSettings {
                base_url: settings.base_url.trim_end_matches('/').to_string(),
                ..settings
            },
        }
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp, ProviderError> {
        let url = format!("{}/{}", self.settings.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String, ProviderError> {
        options.validate()?;
        let model = options.model.as_deref().unwrap_or(&self.settings.completion_model);
        debug!(model, base_url = %self.settings.base_url, "requesting completion");

        let request = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        };
        let response: ChatResponse = self.post("chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no completion choices returned".into()))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.settings.embedding_model,
            input: vec![text],
        };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;

        response
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| ProviderError::InvalidResponse("no embedding returned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults_and_trailing_slash() {
        let provider = OpenAiCompatibleProvider::new(OpenAiSettings {
            base_url: "http://localhost:1234/v1/".into(),
            ..Default::default()
        });
        assert_eq!(provider.settings().base_url, "http://localhost:1234/v1");
        assert_eq!(provider.settings().completion_model, DEFAULT_COMPLETION_MODEL);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hi"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("hi"));

        let body = r#"{"data":[{"embedding":[0.5,0.25],"index":0}],"model":"m"}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.5, 0.25]);

        let body = r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error.message, "Incorrect API key");
    }

    #[tokio::test]
    async fn test_invalid_options_fail_without_network() {
        let provider = OpenAiCompatibleProvider::new(OpenAiSettings::default());
        let options = CompletionOptions {
            max_tokens: 0,
            ..Default::default()
        };
        let err = provider.complete("x", &options).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_error() {
        let provider = OpenAiCompatibleProvider::new(OpenAiSettings {
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        });
        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
        assert!(err.is_retryable());
    }
}
