pub mod agents;
pub mod collections;
pub mod config_cmd;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use goalclaw_config::AppConfig;
use goalclaw_core::provider::EmbeddingBackend;
use goalclaw_core::tokenizer::{HeuristicTokenizer, Tokenizer};
use goalclaw_memory::EmbeddingClient;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Load the configuration, pointing the storage root at `root` if given.
pub(crate) fn load_config(root: Option<PathBuf>) -> CliResult<AppConfig> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(root) = root {
        config.workspace.root_dir = root;
    }
    Ok(config)
}

/// The tokenizer used for chat budgets and embedding input limits.
///
/// With the `hf-tokenizer` feature, `GOALCLAW_TOKENIZER` may name a
/// `tokenizer.json` file to load instead of the byte heuristic.
pub(crate) fn tokenizer() -> CliResult<Arc<dyn Tokenizer>> {
    #[cfg(feature = "hf-tokenizer")]
    {
        if let Ok(path) = std::env::var("GOALCLAW_TOKENIZER") {
            let tokenizer = goalclaw_providers::HfTokenizer::from_file(std::path::Path::new(&path))?;
            tracing::debug!(path = %path, "Loaded tokenizer");
            return Ok(Arc::new(tokenizer));
        }
    }
    Ok(Arc::new(HeuristicTokenizer))
}

/// Wrap the raw backend with the configured batching and retry policy.
pub(crate) fn embedding_client(
    config: &AppConfig,
    backend: Arc<dyn EmbeddingBackend>,
    tokenizer: Arc<dyn Tokenizer>,
) -> EmbeddingClient {
    EmbeddingClient::new(backend, tokenizer)
        .with_model(&config.embedding.model)
        .with_max_tokens_per_input(config.embedding.max_tokens_per_input)
        .with_max_inputs_per_request(config.embedding.max_inputs_per_request)
        .with_retry(
            Duration::from_secs(config.embedding.rate_limit_delay_secs),
            config.embedding.max_attempts,
        )
        .on_cap_reached(Arc::new(|| {
            tracing::warn!("Embedding quota exhausted; check the billing limits of the API key");
        }))
}
