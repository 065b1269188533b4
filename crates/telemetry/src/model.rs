//! Data model for a goal run's debug record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Request ───────────────────────────────────────────────────────────────

/// One model request, as seen from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub model: String,
    pub started_at: DateTime<Utc>,
    /// Wall time of the call in milliseconds.
    pub duration_ms: u64,
    /// Prompt tokens as reported by the service, when it reports them.
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    /// The reply text or the called function rendered as `name(args)`.
    pub response: Option<String>,
    pub error: Option<String>,
}

impl RequestRecord {
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.prompt_tokens.unwrap_or(0)) + u64::from(self.completion_tokens.unwrap_or(0))
    }
}

// ── Step ──────────────────────────────────────────────────────────────────

/// One pass through the function-call loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// The last thing the loop logged during this step.
    pub last_message: Option<String>,
    pub error: Option<String>,
    pub requests: Vec<RequestRecord>,
}

impl StepRecord {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            started_at: Utc::now(),
            ended_at: None,
            last_message: None,
            error: None,
            requests: Vec::new(),
        }
    }
}

// ── Goal ──────────────────────────────────────────────────────────────────

/// Everything recorded for one goal. Persisted as `debug.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GoalRecord {
    pub prompt: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub total_tokens: u64,
    pub request_count: usize,
    pub steps: Vec<StepRecord>,
}

impl GoalRecord {
    /// All requests across steps, in the order they were made.
    pub fn requests(&self) -> impl Iterator<Item = &RequestRecord> {
        self.steps.iter().flat_map(|s| s.requests.iter())
    }

    /// The `n` slowest requests, slowest first.
    pub fn slowest(&self, n: usize) -> Vec<RequestRecord> {
        let mut all: Vec<&RequestRecord> = self.requests().collect();
        all.sort_by(|a, b| b.duration_ms.cmp(&a.duration_ms));
        all.into_iter().take(n).cloned().collect()
    }
}

/// Persisted as `perf.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfReport {
    pub total_duration_ms: Option<u64>,
    pub total_tokens: u64,
    pub request_count: usize,
    pub slowest_requests: Vec<RequestRecord>,
}
