//! Exact token counts from a Hugging Face `tokenizer.json`.

use std::path::Path;

use goalclaw_core::error::ProviderError;
use goalclaw_core::tokenizer::{HeuristicTokenizer, Tokenizer};
use hf_hub::api::sync::Api;
use tracing::{info, warn};

pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to load tokenizer: {e}")))?;
        Ok(Self { inner })
    }

    /// Download `tokenizer.json` from a Hub repository (cached locally).
    pub fn from_pretrained(repo: &str) -> Result<Self, ProviderError> {
        let api = Api::new()
            .map_err(|e| ProviderError::Network(format!("HuggingFace Hub API error: {e}")))?;
        let path = api.model(repo.to_string()).get("tokenizer.json").map_err(|e| {
            ProviderError::Network(format!("Failed to download tokenizer from '{repo}': {e}"))
        })?;
        info!(repo, path = %path.display(), "Tokenizer ready");
        Self::from_file(&path)
    }
}

impl Tokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        match self.inner.encode(text, false) {
            Ok(encoding) => encoding.get_ids().to_vec(),
            Err(e) => {
                warn!(error = %e, "Tokenizer failed, using byte estimate");
                HeuristicTokenizer.encode(text)
            }
        }
    }
}
