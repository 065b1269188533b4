//! A provider wrapper that feeds every request into a [`DebugLog`].

use async_trait::async_trait;
use chrono::Utc;
use goalclaw_core::error::ProviderError;
use goalclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::sync::Arc;
use std::time::Instant;

use crate::debug_log::DebugLog;
use crate::model::RequestRecord;

pub struct DebugProvider {
    inner: Arc<dyn Provider>,
    log: Arc<DebugLog>,
}

impl DebugProvider {
    pub fn new(inner: Arc<dyn Provider>, log: Arc<DebugLog>) -> Self {
        Self { inner, log }
    }
}

#[async_trait]
impl Provider for DebugProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let started_at = Utc::now();
        let timer = Instant::now();

        let result = self.inner.complete(request).await;

        let mut record = RequestRecord {
            model,
            started_at,
            duration_ms: timer.elapsed().as_millis() as u64,
            prompt_tokens: None,
            completion_tokens: None,
            response: None,
            error: None,
        };
        match &result {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    record.prompt_tokens = Some(usage.prompt_tokens);
                    record.completion_tokens = Some(usage.completion_tokens);
                }
                record.response = Some(match &response.message.function_call {
                    Some(call) => format!("{}({})", call.name, call.arguments),
                    None => response.message.content.clone(),
                });
            }
            Err(e) => record.error = Some(e.to_string()),
        }
        self.log.record_request(record).await;

        result
    }
}
