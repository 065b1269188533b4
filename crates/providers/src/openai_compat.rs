//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, Azure-style proxies, Ollama, vLLM and any endpoint
//! exposing `/chat/completions` and `/embeddings`.
//!
//! Supports:
//! - Chat completions with function calling (`functions` / `function_call`)
//! - Embeddings, one batch per request

use async_trait::async_trait;
use goalclaw_core::error::ProviderError;
use goalclaw_core::function::FunctionCall;
use goalclaw_core::message::{Message, Role};
use goalclaw_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible model provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    embedding_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            embedding_model: "text-embedding-ada-002".into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Model used when an embedding request leaves `model` empty.
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: if m.content.is_empty() && m.function_call.is_some() {
                    None
                } else {
                    Some(m.content.clone())
                },
                name: m.name.clone(),
                function_call: m.function_call.as_ref().map(|c| ApiFunctionCall {
                    name: c.name.clone(),
                    arguments: c.arguments.clone(),
                }),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.functions.is_empty() {
            body["functions"] = serde_json::json!(request.functions);
            body["function_call"] = serde_json::json!("auto");
        }

        body
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(map_status(status, error_body));
        }
        Ok(response)
    }
}

/// Classify a non-success HTTP status.
///
/// 400, 403 and 429 get their own variants because callers treat them
/// differently: never retry, report the cap, and back off.
pub fn map_status(status: u16, body: String) -> ProviderError {
    match status {
        400 => ProviderError::BadRequest(body),
        401 => ProviderError::AuthenticationFailed("Invalid API key".into()),
        403 => ProviderError::QuotaExceeded(body),
        429 => ProviderError::RateLimited { retry_after_secs: 15 },
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

#[async_trait]
impl goalclaw_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            functions = request.functions.len(),
            "Sending completion request"
        );

        let response = self.post("chat/completions", &Self::request_body(&request)).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parse_completion(api_response)
    }
}

fn parse_completion(api_response: ApiResponse) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

    let mut message = Message::new(Role::Assistant, choice.message.content.unwrap_or_default());
    message.function_call = choice
        .message
        .function_call
        .map(|c| FunctionCall::new(c.name, c.arguments));

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        message,
        usage,
        model: api_response.model,
    })
}

#[async_trait]
impl EmbeddingBackend for OpenAiCompatProvider {
    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let model = if request.model.is_empty() {
            self.embedding_model.clone()
        } else {
            request.model
        };

        debug!(
            provider = %self.name,
            model = %model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let body = serde_json::json!({
            "model": model,
            "input": request.inputs,
            "encoding_format": "float",
        });

        let response = self.post("embeddings", &body).await?;
        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        Ok(parse_embeddings(api_resp))
    }
}

fn parse_embeddings(mut api_resp: EmbeddingApiResponse) -> EmbeddingResponse {
    // The service may return data out of order; `index` is authoritative.
    api_resp.data.sort_by_key(|d| d.index);
    let embeddings = api_resp.data.into_iter().map(|d| d.embedding).collect();

    let usage = api_resp.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: 0,
        total_tokens: u.total_tokens,
    });

    EmbeddingResponse {
        embeddings,
        model: api_resp.model,
        usage,
    }
}

// --- OpenAI API wire types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
    function_call: Option<ApiFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: String,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}
