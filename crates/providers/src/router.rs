//! Provider construction from configuration.

use std::sync::Arc;
use std::time::Duration;

use goalclaw_core::error::ProviderError;
use goalclaw_core::provider::{EmbeddingBackend, Provider};

use crate::openai_compat::OpenAiCompatProvider;
use crate::retry::RetryProvider;

/// The model backends one agent run needs.
#[derive(Clone)]
pub struct Providers {
    /// Completion provider, wrapped with rate-limit retry
    pub completion: Arc<dyn Provider>,
    /// Raw embedding backend; retry policy is applied by the embedding client
    pub embeddings: Arc<dyn EmbeddingBackend>,
}

/// Build providers from configuration.
///
/// Local endpoints (`ollama`, `vllm`, `llamacpp`) work without an API key;
/// every other provider needs one.
pub fn build_from_config(config: &goalclaw_config::AppConfig) -> Result<Providers, ProviderError> {
    let api_key = match (&config.api_key, is_local(&config.provider)) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(format!(
                "no API key for provider '{}' (set OPENAI_API_KEY or api_key in config.toml)",
                config.provider
            )));
        }
    };

    let base_url = config
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    let client = Arc::new(
        OpenAiCompatProvider::new(&config.provider, &base_url, &api_key)
            .with_embedding_model(&config.embedding.model),
    );

    let completion = RetryProvider::new(client.clone())
        .with_delay(Duration::from_secs(config.embedding.rate_limit_delay_secs))
        .with_max_attempts(config.embedding.max_attempts);

    Ok(Providers {
        completion: Arc::new(completion),
        embeddings: client,
    })
}

fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
