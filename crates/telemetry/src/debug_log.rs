//! Goal-run debug log, persisted to the workspace after every change.

use chrono::Utc;
use goalclaw_core::storage::{Workspace, join};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

use crate::model::{GoalRecord, PerfReport, RequestRecord, StepRecord};

/// How many requests `perf.json` lists.
pub const SLOWEST_REQUESTS: usize = 5;

/// Records goal, step and request timings for one run.
///
/// Every mutation rewrites `debug.json` and `perf.json` under `dir`, so the
/// files are current even if the process dies mid-run. Write failures are
/// logged and otherwise ignored.
pub struct DebugLog {
    workspace: Arc<dyn Workspace>,
    dir: String,
    record: Mutex<GoalRecord>,
}

impl DebugLog {
    pub fn new(workspace: Arc<dyn Workspace>, dir: impl Into<String>) -> Self {
        Self {
            workspace,
            dir: dir.into(),
            record: Mutex::new(GoalRecord::default()),
        }
    }

    pub async fn start_goal(&self, prompt: impl Into<String>) {
        let mut record = self.record.lock().await;
        *record = GoalRecord {
            prompt: prompt.into(),
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        self.persist(&record).await;
    }

    pub async fn end_goal(&self) {
        let mut record = self.record.lock().await;
        close_step(&mut record);
        record.ended_at = Some(Utc::now());
        self.persist(&record).await;
    }

    /// Close the running step, if any, and open the next one.
    pub async fn start_step(&self) -> usize {
        let mut record = self.record.lock().await;
        close_step(&mut record);
        let index = record.steps.len();
        record.steps.push(StepRecord::new(index));
        self.persist(&record).await;
        index
    }

    /// Remember `message` as the current step's last log line.
    pub async fn log(&self, message: impl Into<String>) {
        let mut record = self.record.lock().await;
        current_step(&mut record).last_message = Some(message.into());
        self.persist(&record).await;
    }

    pub async fn step_error(&self, error: impl Into<String>) {
        let mut record = self.record.lock().await;
        current_step(&mut record).error = Some(error.into());
        self.persist(&record).await;
    }

    pub async fn record_request(&self, request: RequestRecord) {
        let mut record = self.record.lock().await;
        record.total_tokens += request.total_tokens();
        record.request_count += 1;
        current_step(&mut record).requests.push(request);
        self.persist(&record).await;
    }

    pub async fn snapshot(&self) -> GoalRecord {
        self.record.lock().await.clone()
    }

    pub async fn perf(&self) -> PerfReport {
        perf_report(&*self.record.lock().await)
    }

    async fn persist(&self, record: &GoalRecord) {
        let files = [
            ("debug.json", serde_json::to_string_pretty(record)),
            ("perf.json", serde_json::to_string_pretty(&perf_report(record))),
        ];
        for (name, json) in files {
            let path = join(&self.dir, name);
            let result = match json {
                Ok(json) => self.workspace.write(&path, &json).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            if let Err(error) = result {
                warn!(path = %path, error = %error, "Failed to persist debug log");
            }
        }
    }
}

fn close_step(record: &mut GoalRecord) {
    if let Some(step) = record.steps.last_mut()
        && step.ended_at.is_none()
    {
        step.ended_at = Some(Utc::now());
    }
}

/// The open step, creating one if requests arrive before the first step.
fn current_step(record: &mut GoalRecord) -> &mut StepRecord {
    if record.steps.is_empty() {
        record.steps.push(StepRecord::new(0));
    }
    let last = record.steps.len() - 1;
    &mut record.steps[last]
}

fn perf_report(record: &GoalRecord) -> PerfReport {
    let total_duration_ms = match (record.started_at, record.ended_at) {
        (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_milliseconds().max(0) as u64),
        _ => None,
    };
    PerfReport {
        total_duration_ms,
        total_tokens: record.total_tokens,
        request_count: record.request_count,
        slowest_requests: record.slowest(SLOWEST_REQUESTS),
    }
}
