//! One agent run: a profile, its chat, its variables, and the loop.

use goalclaw_core::error::Result;
use goalclaw_core::function::AgentOutput;
use goalclaw_core::message::Message;
use goalclaw_telemetry::DebugLog;
use goalclaw_tools::FunctionContext;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::chat_log::ChatLog;
use crate::loop_runner::{FunctionCallLoop, LoopConfig, LoopResult};
use crate::profile::AgentProfile;
use crate::variables::{AgentVariables, VARIABLES_PROMPT};

/// Owns everything one run needs. Nothing here is shared with other runs.
pub struct Agent {
    profile: AgentProfile,
    ctx: FunctionContext,
    chat: ChatLog,
    variables: AgentVariables,
    config: LoopConfig,
    sink: Option<mpsc::UnboundedSender<AgentOutput>>,
    debug_log: Option<Arc<DebugLog>>,
}

impl Agent {
    /// The context's agent name is replaced by the profile's.
    pub fn new(
        profile: AgentProfile,
        mut ctx: FunctionContext,
        chat: ChatLog,
        variables: AgentVariables,
        config: LoopConfig,
    ) -> Self {
        ctx.agent_name = profile.name.clone();
        Self {
            profile,
            ctx,
            chat,
            variables,
            config,
            sink: None,
            debug_log: None,
        }
    }

    pub fn with_output_sink(mut self, sink: mpsc::UnboundedSender<AgentOutput>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_debug_log(mut self, log: Arc<DebugLog>) -> Self {
        self.debug_log = Some(log);
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn chat(&self) -> &ChatLog {
        &self.chat
    }

    pub fn chat_mut(&mut self) -> &mut ChatLog {
        &mut self.chat
    }

    pub fn variables(&self) -> &AgentVariables {
        &self.variables
    }

    /// Seed the chat with the variables note, persona and goal, then run.
    ///
    /// Fails before any model call, leaving the chat untouched, if those
    /// messages do not fit the chat budget.
    pub async fn run(&mut self, goal: &str, cancel: &CancellationToken) -> Result<LoopResult> {
        info!(agent = %self.profile.name, goal, "Starting goal");
        let seed = std::iter::once(Message::system(VARIABLES_PROMPT)).chain(self.profile.initial_messages(goal));
        self.chat.persistent_all(seed)?;
        if let Some(log) = &self.debug_log {
            log.start_goal(goal).await;
        }
        let result = self.run_with_chat(cancel).await;
        if let Some(log) = &self.debug_log {
            log.end_goal().await;
        }
        Ok(result)
    }

    /// Run on the chat as it is, e.g. after restoring a snapshot.
    pub async fn run_with_chat(&mut self, cancel: &CancellationToken) -> LoopResult {
        for function in &self.profile.functions {
            self.chat.add_function(function.definition());
        }

        let mut function_loop =
            FunctionCallLoop::new(self.ctx.provider.clone(), self.profile.registry(), self.config.clone());
        if let Some(sink) = &self.sink {
            function_loop = function_loop.with_output_sink(sink.clone());
        }
        if let Some(log) = &self.debug_log {
            function_loop = function_loop.with_debug_log(log.clone());
        }

        function_loop
            .run(&mut self.chat, &mut self.variables, &self.ctx, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_runner::LoopOutcome;
    use crate::test_helpers::{SequentialMockProvider, call};
    use goalclaw_core::error::Error;
    use goalclaw_core::message::Role;
    use goalclaw_core::storage::Workspace;
    use goalclaw_core::tokenizer::{HeuristicTokenizer, Tokenizer};
    use goalclaw_memory::InMemoryWorkspace;
    use serde_json::json;

    fn agent(provider: Arc<SequentialMockProvider>, budget: usize) -> (Agent, Arc<InMemoryWorkspace>) {
        let ws = Arc::new(InMemoryWorkspace::new());
        let ctx = FunctionContext::new("unnamed", ws.clone(), provider, "mock-model");
        let agent = Agent::new(
            AgentProfile::developer(),
            ctx,
            ChatLog::new(Arc::new(HeuristicTokenizer), budget),
            AgentVariables::new(3000),
            LoopConfig::default(),
        );
        (agent, ws)
    }

    #[tokio::test]
    async fn run_seeds_chat_and_reaches_goal() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            call("fs_writeFile", json!({"path": "hello.rs", "data": "fn main() {}"})),
            call("agent_onGoalAchieved", json!({"message": "Wrote hello.rs"})),
        ]));
        let (mut agent, ws) = agent(provider.clone(), 10_000);

        let result = agent.run("write hello.rs", &CancellationToken::new()).await.unwrap();

        assert_eq!(result.outcome, LoopOutcome::Succeeded("Wrote hello.rs".into()));
        assert_eq!(ws.read("hello.rs").await.unwrap(), "fn main() {}");

        let persistent: Vec<_> = agent.chat().persistent_messages().collect();
        assert_eq!(persistent.len(), 3);
        assert_eq!(persistent[0].content, VARIABLES_PROMPT);
        assert_eq!(persistent[2].role, Role::User);
        assert_eq!(persistent[2].content, "write hello.rs");

        let first = &provider.requests()[0];
        assert_eq!(first.functions.len(), AgentProfile::developer().functions.len());
        assert_eq!(result.outputs[0].title, "[Developer] fs_writeFile");
    }

    #[tokio::test]
    async fn persistent_overflow_fails_before_model_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        let (mut agent, _) = agent(provider.clone(), 20);

        let err = agent.run("anything", &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn overflowing_goal_leaves_chat_unseeded() {
        let provider = Arc::new(SequentialMockProvider::new(vec![]));
        // Room for the variables note, not for the persona and goal.
        let budget = HeuristicTokenizer.count(VARIABLES_PROMPT) + 5;
        let (mut agent, _) = agent(provider.clone(), budget);
        let goal = "x".repeat(1_000);

        assert!(agent.run(&goal, &CancellationToken::new()).await.is_err());
        assert!(agent.chat().is_empty());

        assert!(agent.run(&goal, &CancellationToken::new()).await.is_err());
        assert!(agent.chat().is_empty());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn debug_log_brackets_the_goal() {
        let provider = Arc::new(SequentialMockProvider::new(vec![call(
            "agent_onGoalAchieved",
            json!({"message": "done"}),
        )]));
        let (agent, ws) = agent(provider, 10_000);
        let log = Arc::new(DebugLog::new(ws.clone(), ".goalclaw"));
        let mut agent = agent.with_debug_log(log.clone());

        agent.run("g", &CancellationToken::new()).await.unwrap();

        let record = log.snapshot().await;
        assert_eq!(record.prompt, "g");
        assert!(record.ended_at.is_some());
        assert!(ws.exists(".goalclaw/perf.json").await.unwrap());
    }
}
