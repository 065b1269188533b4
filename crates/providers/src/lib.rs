//! Model provider implementations for GoalClaw.
//!
//! [`OpenAiCompatProvider`] implements both `goalclaw_core::Provider` and
//! `goalclaw_core::EmbeddingBackend`. [`build_from_config`] wires them up
//! from an `AppConfig`.

#[cfg(feature = "hf-tokenizer")]
pub mod hf_tokenizer;
pub mod openai_compat;
pub mod retry;
pub mod router;

#[cfg(feature = "hf-tokenizer")]
pub use hf_tokenizer::HfTokenizer;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryProvider;
pub use router::{Providers, build_from_config};
