use super::traits::{Completion, CompletionRequest, ModelClient};
use crate::error::ProviderError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const PROVIDER: &str = "anthropic";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ─── Wire types ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ResponseContentBlock>,
    model: String,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text { text: String },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ─── Client ─────────────────────────────────────────────────────────────────

/// Anthropic Messages API client. Each call carries an explicit deadline;
/// exceeding it surfaces as a retryable [`ProviderError::Timeout`], never a
/// silent success.
pub struct AnthropicClient {
    client: Client,
    messages_url: String,
    api_key: String,
    request_timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, request_timeout: Duration) -> Self {
        Self::with_base_url(api_key, "https://api.anthropic.com", request_timeout)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            messages_url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            request_timeout,
        }
    }

    async fn call_api(&self, request: &CompletionRequest) -> Result<Completion, ProviderError> {
        let body = ChatRequest {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone(),
            messages: vec![Message {
                role: "user",
                content: request.user.clone(),
            }],
            temperature: request.temperature,
        };

        let send = self
            .client
            .post(&self.messages_url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("x-api-key", &self.api_key)
            .json(&body)
            .send();

        let response = tokio::time::timeout(self.request_timeout, send)
            .await
            .map_err(|_| ProviderError::Timeout {
                provider: PROVIDER.into(),
                deadline_secs: self.request_timeout.as_secs(),
            })?
            .map_err(|e| ProviderError::Http {
                provider: PROVIDER.into(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(status.as_u16(), response).await);
        }

        let parsed: ChatResponse =
            tokio::time::timeout(self.request_timeout, response.json())
                .await
                .map_err(|_| ProviderError::Timeout {
                    provider: PROVIDER.into(),
                    deadline_secs: self.request_timeout.as_secs(),
                })?
                .map_err(|e| ProviderError::Http {
                    provider: PROVIDER.into(),
                    message: e.to_string(),
                })?;

        let usage = parsed.usage.ok_or_else(|| ProviderError::MissingUsage {
            provider: PROVIDER.into(),
        })?;

        let text = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text.as_str()),
                ResponseContentBlock::Unsupported => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.is_empty() {
            return Err(ProviderError::EmptyResponse {
                provider: PROVIDER.into(),
            });
        }

        Ok(Completion {
            text,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            model: parsed.model,
        })
    }

    async fn status_error(status: u16, response: reqwest::Response) -> ProviderError {
        match status {
            401 | 403 => ProviderError::Auth {
                provider: PROVIDER.into(),
            },
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);
                ProviderError::RateLimited {
                    provider: PROVIDER.into(),
                    retry_after,
                }
            }
            _ => {
                let message = match response.json::<ApiErrorBody>().await {
                    Ok(body) => body
                        .error
                        .map_or_else(|| "unknown error".to_string(), |e| e.message),
                    Err(_) => "unreadable error body".to_string(),
                };
                ProviderError::Api {
                    provider: PROVIDER.into(),
                    status,
                    message,
                }
            }
        }
    }
}

impl ModelClient for AnthropicClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn complete<'a>(
        &'a self,
        request: &'a CompletionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Completion, ProviderError>> + Send + 'a>> {
        Box::pin(self.call_api(request))
    }
}
