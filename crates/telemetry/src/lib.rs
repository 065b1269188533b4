//! Debug records for GoalClaw goal runs.
//!
//! A [`DebugLog`] tracks one goal: when it started and ended, each loop
//! step, and every model request made along the way. [`DebugProvider`]
//! wraps any provider so requests are recorded without the loop knowing.

pub mod debug_log;
pub mod model;
pub mod provider;

pub use debug_log::{DebugLog, SLOWEST_REQUESTS};
pub use model::{GoalRecord, PerfReport, RequestRecord, StepRecord};
pub use provider::DebugProvider;
