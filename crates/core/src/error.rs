//! Error types for the GoalClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all GoalClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Embedding errors ---
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    // --- Function errors ---
    #[error("Function error: {0}")]
    Function(#[from] FunctionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a single request to a model service (completion or embedding).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Usage cap reached: {0}")]
    QuotaExceeded(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying later in the same run cannot help: the cap is spent,
    /// the retry bound is used up, or the service is unusable as configured.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::QuotaExceeded(_) | Self::RateLimited { .. } | Self::AuthenticationFailed(_) | Self::NotConfigured(_)
        )
    }
}

/// Failures surfaced by the embedding client after its local checks and retry policy.
#[derive(Debug, Clone, Error)]
pub enum EmbeddingError {
    #[error("Input {index} is {tokens} tokens, exceeding the maximum of {max}")]
    InputTooLong { index: usize, tokens: usize, max: usize },

    #[error("Embedding request rejected: {0}")]
    BadRequest(String),

    #[error("Still rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Embedding quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Embedding service error: {0}")]
    Service(String),

    #[error("Expected {expected} embeddings, service returned {got}")]
    Mismatch { expected: usize, got: usize },
}

impl EmbeddingError {
    /// Whether this failure was detected locally, before any network activity.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InputTooLong { .. })
    }

    /// Quota exhaustion, or rate limiting that outlasted the retry bound.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_) | Self::RateLimited { .. })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Corrupt data in {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments for {function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error("Function execution failed: {function}: {reason}")]
    ExecutionFailed { function: String, reason: String },

    /// The embedding service failed underneath a function.
    #[error("Function execution failed: {function}: {source}")]
    Embedding { function: String, source: EmbeddingError },

    /// A nested model request made by a function failed.
    #[error("Function execution failed: {function}: {source}")]
    Provider { function: String, source: ProviderError },
}

impl FunctionError {
    /// Whether the failure must end the run instead of going back to the model.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Embedding { source, .. } => source.is_fatal(),
            Self::Provider { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn embedding_validation_is_distinguishable() {
        let err = EmbeddingError::InputTooLong { index: 2, tokens: 9000, max: 8191 };
        assert!(err.is_validation());
        assert!(err.to_string().contains("9000"));
        assert!(!EmbeddingError::RateLimited { attempts: 5 }.is_validation());
    }

    #[test]
    fn function_error_displays_correctly() {
        let err = Error::Function(FunctionError::InvalidArguments {
            function: "fs_readFile".into(),
            reason: "missing field `path`".into(),
        });
        assert!(err.to_string().contains("fs_readFile"));
        assert!(err.to_string().contains("path"));
    }

    #[test]
    fn only_spent_service_limits_are_fatal() {
        let quota = FunctionError::Embedding {
            function: "search".into(),
            source: EmbeddingError::QuotaExceeded("subsidy max".into()),
        };
        assert!(quota.is_fatal());
        assert!(quota.to_string().contains("subsidy max"));

        let retries_spent = FunctionError::Embedding {
            function: "search".into(),
            source: EmbeddingError::RateLimited { attempts: 5 },
        };
        assert!(retries_spent.is_fatal());

        let rejected = FunctionError::Embedding {
            function: "search".into(),
            source: EmbeddingError::BadRequest("bad input".into()),
        };
        assert!(!rejected.is_fatal());

        let timeout = FunctionError::Provider {
            function: "plan".into(),
            source: ProviderError::Timeout("30s".into()),
        };
        assert!(!timeout.is_fatal());
        assert!(
            FunctionError::Provider {
                function: "plan".into(),
                source: ProviderError::QuotaExceeded("cap".into()),
            }
            .is_fatal()
        );

        let missing = FunctionError::ExecutionFailed {
            function: "search".into(),
            reason: "no collections available".into(),
        };
        assert!(!missing.is_fatal());
    }
}
