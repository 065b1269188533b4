//! Rate-limit retry for completions.
//!
//! When the provider answers "rate limited", wait a fixed delay and send
//! the same request again, up to a bounded number of attempts. Every other
//! error is returned immediately.

use async_trait::async_trait;
use goalclaw_core::error::ProviderError;
use goalclaw_core::provider::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A provider that retries rate-limited requests on the wrapped provider.
pub struct RetryProvider {
    inner: Arc<dyn goalclaw_core::Provider>,
    delay: Duration,
    max_attempts: u32,
}

impl RetryProvider {
    /// Wrap `inner` with the default policy: 15s between attempts, 5 attempts.
    pub fn new(inner: Arc<dyn goalclaw_core::Provider>) -> Self {
        Self {
            inner,
            delay: Duration::from_secs(15),
            max_attempts: 5,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Total attempts including the first. Values below 1 are treated as 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

#[async_trait]
impl goalclaw_core::Provider for RetryProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let mut attempt = 1;
        loop {
            match self.inner.complete(request.clone()).await {
                Err(ProviderError::RateLimited { .. }) if attempt < self.max_attempts => {
                    warn!(
                        provider = %self.inner.name(),
                        attempt,
                        delay_secs = self.delay.as_secs(),
                        "Rate limited, waiting before retry"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
                Ok(response) => {
                    if attempt > 1 {
                        info!(provider = %self.inner.name(), attempt, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
