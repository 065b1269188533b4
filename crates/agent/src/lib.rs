//! The GoalClaw agent: a goal in, a terminal outcome out.
//!
//! 1. **Select** a specialist profile for the goal ([`AgentSelector`])
//! 2. **Seed** the [`ChatLog`] with persistent persona and goal messages
//! 3. **Loop** ([`FunctionCallLoop`]): ask the model, execute the function
//!    it calls, append the result, repeat
//! 4. **Stop** when a terminal function fires, the run is cancelled or
//!    times out, or a step fails
//!
//! The chat log keeps the conversation inside the model's context window
//! by evicting the oldest working-memory messages first.

pub mod agent;
pub mod chat_log;
pub mod loop_runner;
pub mod profile;
pub mod selector;
pub mod variables;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::Agent;
pub use chat_log::{ChatLog, ChatSnapshot, MessageList};
pub use loop_runner::{
    DEFAULT_LOOP_PREVENTION_PROMPT, FailureKind, FunctionCallLoop, LoopConfig, LoopOutcome, LoopResult,
    Termination, UNRECOVERABLE_MESSAGE,
};
pub use profile::AgentProfile;
pub use selector::AgentSelector;
pub use variables::{AgentVariables, VARIABLES_PROMPT};
