//! The function-call loop: the heart of a GoalClaw agent run.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! AwaitingModel ──function call──▶ Executing ──terminal fn──▶ Done
//!      ▲   │                           │
//!      │   └─plain text (threshold)─▶ Nudging
//!      └───────────────────────────────┘
//! ```
//!
//! Cancellation and timeout are polled at every state boundary. Anything
//! that goes wrong inside a step, panics included, ends the run with a
//! failure outcome instead of escaping to the caller.

use futures::FutureExt;
use goalclaw_config::AppConfig;
use goalclaw_core::function::{AgentOutput, FunctionCall, FunctionResult};
use goalclaw_core::message::{Message, Role};
use goalclaw_core::provider::{ModelReply, Provider, ProviderRequest};
use goalclaw_core::variables::VariableStore;
use goalclaw_telemetry::DebugLog;
use goalclaw_tools::{AgentFunction, FunctionContext, FunctionRegistry};
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat_log::ChatLog;

pub const DEFAULT_LOOP_PREVENTION_PROMPT: &str = "Assistant, you appear to be in a loop. \
Try calling a function to make progress, or call agent_onGoalFailed if the goal cannot be achieved.";

/// Payload of the failure outcome when a step faults.
pub const UNRECOVERABLE_MESSAGE: &str = "Unrecoverable error encountered.";

/// How a terminal function ends the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Failure,
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A failure terminal function was called.
    GoalFailed,
    /// The model kept answering without calling a function after the nudge.
    Stalled,
    /// A step faulted.
    Unrecoverable,
    /// The model or embedding service returned an error that retrying
    /// cannot fix, either on the model request or inside a function.
    Provider,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    Running,
    Succeeded(String),
    Failed { kind: FailureKind, message: String },
    Stopped(String),
}

impl LoopOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    /// The message or reason carried by the outcome.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Running => None,
            Self::Succeeded(message) | Self::Stopped(message) => Some(message),
            Self::Failed { message, .. } => Some(message),
        }
    }
}

/// The final outcome of a run plus everything it produced on the way.
#[derive(Debug, Clone)]
pub struct LoopResult {
    pub outcome: LoopOutcome,
    pub outputs: Vec<AgentOutput>,
    /// Number of model requests made.
    pub iterations: usize,
}

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// Plain replies in a row before the nudge (at least 1).
    pub loop_prevention_threshold: usize,
    pub loop_prevention_prompt: String,
    /// Upper bound on model requests per run.
    pub max_iterations: usize,
    pub timeout: Option<Duration>,
    /// Functions whose successful execution ends the run.
    pub terminal: HashMap<String, Termination>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        let terminal = HashMap::from([
            (AgentFunction::OnGoalAchieved.name().to_string(), Termination::Success),
            (AgentFunction::OnGoalFailed.name().to_string(), Termination::Failure),
        ]);
        Self {
            model: "gpt-4".into(),
            temperature: 0.0,
            max_tokens: None,
            loop_prevention_threshold: 1,
            loop_prevention_prompt: DEFAULT_LOOP_PREVENTION_PROMPT.into(),
            max_iterations: 100,
            timeout: None,
            terminal,
        }
    }
}

impl LoopConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: u32::try_from(config.max_response_tokens).ok(),
            loop_prevention_threshold: config.agent.loop_prevention_threshold as usize,
            max_iterations: config.agent.max_iterations,
            timeout: config.agent.timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }

    pub fn with_terminal(mut self, function: impl Into<String>, termination: Termination) -> Self {
        self.terminal.insert(function.into(), termination);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_loop_prevention_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.loop_prevention_prompt = prompt.into();
        self
    }
}

enum State {
    AwaitingModel,
    Executing(FunctionCall),
    Nudging,
    Done(LoopOutcome),
}

/// Mutable state owned by one run.
struct Run<'a> {
    chat: &'a mut ChatLog,
    variables: &'a mut dyn VariableStore,
    ctx: &'a FunctionContext,
    outputs: Vec<AgentOutput>,
    plain_replies: usize,
    nudged: bool,
    iterations: usize,
    started: Instant,
}

pub struct FunctionCallLoop {
    provider: Arc<dyn Provider>,
    registry: FunctionRegistry,
    config: LoopConfig,
    sink: Option<mpsc::UnboundedSender<AgentOutput>>,
    debug_log: Option<Arc<DebugLog>>,
}

impl FunctionCallLoop {
    pub fn new(provider: Arc<dyn Provider>, registry: FunctionRegistry, config: LoopConfig) -> Self {
        Self {
            provider,
            registry,
            config,
            sink: None,
            debug_log: None,
        }
    }

    /// Also send each output to `sink` as soon as it is produced.
    pub fn with_output_sink(mut self, sink: mpsc::UnboundedSender<AgentOutput>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_debug_log(mut self, log: Arc<DebugLog>) -> Self {
        self.debug_log = Some(log);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Drive the model until a terminal function fires, the run is
    /// stopped, or a step fails.
    ///
    /// Everything appended to `chat` before the run ends stays there.
    pub async fn run(
        &self,
        chat: &mut ChatLog,
        variables: &mut dyn VariableStore,
        ctx: &FunctionContext,
        cancel: &CancellationToken,
    ) -> LoopResult {
        let mut run = Run {
            chat,
            variables,
            ctx,
            outputs: Vec::new(),
            plain_replies: 0,
            nudged: false,
            iterations: 0,
            started: Instant::now(),
        };
        let mut state = State::AwaitingModel;

        loop {
            if let State::Done(outcome) = state {
                info!(agent = %ctx.agent_name, iterations = run.iterations, outcome = ?outcome, "Loop finished");
                return LoopResult {
                    outcome,
                    outputs: run.outputs,
                    iterations: run.iterations,
                };
            }

            if let Some(reason) = self.stop_reason(cancel, run.started) {
                info!(agent = %ctx.agent_name, reason, "Loop stopped");
                state = State::Done(LoopOutcome::Stopped(reason.into()));
                continue;
            }

            state = match AssertUnwindSafe(self.step(state, &mut run, cancel))
                .catch_unwind()
                .await
            {
                Ok(next) => next,
                Err(panic) => {
                    let fault = panic_message(panic.as_ref());
                    error!(agent = %ctx.agent_name, fault = %fault, "Unrecoverable error in loop step");
                    if let Some(log) = &self.debug_log {
                        log.step_error(fault).await;
                    }
                    State::Done(LoopOutcome::Failed {
                        kind: FailureKind::Unrecoverable,
                        message: UNRECOVERABLE_MESSAGE.into(),
                    })
                }
            };
        }
    }

    fn stop_reason(&self, cancel: &CancellationToken, started: Instant) -> Option<&'static str> {
        if cancel.is_cancelled() {
            return Some("cancelled");
        }
        match self.config.timeout {
            Some(timeout) if started.elapsed() >= timeout => Some("timeout"),
            _ => None,
        }
    }

    async fn step(&self, state: State, run: &mut Run<'_>, cancel: &CancellationToken) -> State {
        match state {
            State::AwaitingModel => self.await_model(run, cancel).await,
            State::Executing(call) => self.execute(call, run).await,
            State::Nudging => {
                debug!("Sending loop prevention nudge");
                run.chat.temporary(Message::system(self.config.loop_prevention_prompt.clone()));
                run.nudged = true;
                State::AwaitingModel
            }
            State::Done(outcome) => State::Done(outcome),
        }
    }

    async fn await_model(&self, run: &mut Run<'_>, cancel: &CancellationToken) -> State {
        if run.iterations >= self.config.max_iterations {
            warn!(iterations = run.iterations, "Iteration limit reached");
            return State::Done(LoopOutcome::Stopped("iteration limit".into()));
        }
        run.iterations += 1;
        if let Some(log) = &self.debug_log {
            log.start_step().await;
        }

        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages: run.chat.chat_logs(),
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            functions: run.chat.functions().to_vec(),
        };
        debug!(
            iteration = run.iterations,
            messages = request.messages.len(),
            tokens = run.chat.total_tokens(),
            "Querying model"
        );

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(provider = self.provider.name(), error = %e, "Model request failed");
                if let Some(log) = &self.debug_log {
                    log.step_error(e.to_string()).await;
                }
                return State::Done(LoopOutcome::Failed {
                    kind: FailureKind::Provider,
                    message: e.to_string(),
                });
            }
        };

        // The reply to a request that was in flight when the run was
        // stopped is dropped.
        if let Some(reason) = self.stop_reason(cancel, run.started) {
            return State::Done(LoopOutcome::Stopped(reason.into()));
        }

        match response.into_reply() {
            ModelReply::FunctionCall(call) => {
                run.plain_replies = 0;
                run.chat.temporary(Message::function_call(call.clone()));
                State::Executing(call)
            }
            ModelReply::Message(text) => {
                run.chat.temporary(Message::assistant(text.clone()));
                let title = run.ctx.agent_name.clone();
                self.emit(run, AgentOutput::message(title, text));
                run.plain_replies += 1;

                if run.plain_replies < self.config.loop_prevention_threshold.max(1) {
                    State::AwaitingModel
                } else if run.nudged {
                    warn!(replies = run.plain_replies, "Model keeps replying without calling a function");
                    State::Done(LoopOutcome::Failed {
                        kind: FailureKind::Stalled,
                        message: "The agent stopped calling functions.".into(),
                    })
                } else {
                    State::Nudging
                }
            }
        }
    }

    async fn execute(&self, call: FunctionCall, run: &mut Run<'_>) -> State {
        let name = call.name.as_str();
        if let Some(log) = &self.debug_log {
            log.log(format!("Calling {name}")).await;
        }

        let Some(function) = self.registry.get(name) else {
            warn!(function = %name, "Model called an unknown function");
            let message = format!(
                "Function {name} does not exist. Available functions: {}",
                self.registry.names().join(", ")
            );
            self.report_error(run, name, message);
            return State::AwaitingModel;
        };

        let raw = run.variables.expand(&call.arguments);
        let args = match function.parse(&raw) {
            Ok(args) => args,
            Err(e) => {
                warn!(function = %name, error = %e, "Rejected function arguments");
                self.report_error(run, name, e.to_string());
                return State::AwaitingModel;
            }
        };
        let payload = args.message().map(str::to_string);

        debug!(function = %name, "Executing function");
        let result = match args.execute(run.ctx).await {
            Ok(result) => result,
            Err(e) if e.is_fatal() => {
                error!(function = %name, error = %e, "Function hit a service limit, ending the run");
                if let Some(log) = &self.debug_log {
                    log.step_error(e.to_string()).await;
                }
                self.report_error(run, name, e.to_string());
                return State::Done(LoopOutcome::Failed {
                    kind: FailureKind::Provider,
                    message: e.to_string(),
                });
            }
            Err(e) => {
                warn!(function = %name, error = %e, "Function execution failed");
                self.report_error(run, name, e.to_string());
                return State::AwaitingModel;
            }
        };

        let FunctionResult {
            outputs,
            messages,
            store_in_variable,
        } = result;

        let last_content = outputs.iter().rev().find_map(|o| o.content.clone());
        for output in outputs {
            self.emit(run, output);
        }

        for mut message in messages {
            if message.role == Role::Function
                && (store_in_variable || run.variables.should_save(&message.content))
            {
                let content = std::mem::take(&mut message.content);
                let size = content.len();
                message.content = run.variables.save(name, content);
                debug!(function = %name, bytes = size, variable = %message.content, "Offloaded function result");
            }
            run.chat.temporary(message);
        }

        match self.config.terminal.get(name) {
            Some(termination) => {
                let message = payload.or(last_content).unwrap_or_default();
                State::Done(match termination {
                    Termination::Success => LoopOutcome::Succeeded(message),
                    Termination::Failure => LoopOutcome::Failed {
                        kind: FailureKind::GoalFailed,
                        message,
                    },
                })
            }
            None => State::AwaitingModel,
        }
    }

    /// Tell the model a call went wrong; the run continues.
    fn report_error(&self, run: &mut Run<'_>, function: &str, message: String) {
        let title = run.ctx.title(function);
        run.chat
            .temporary(Message::function_result(function, format!("Error: {message}")));
        self.emit(run, AgentOutput::error(title, message));
    }

    fn emit(&self, run: &mut Run<'_>, output: AgentOutput) {
        if let Some(sink) = &self.sink {
            // A closed receiver only means nobody is watching.
            let _ = sink.send(output.clone());
        }
        run.outputs.push(output);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{KeywordEmbedder, SequentialMockProvider, call, text};
    use crate::variables::AgentVariables;
    use async_trait::async_trait;
    use goalclaw_core::embedding::{Embedding, EmbeddingApi};
    use goalclaw_core::error::{EmbeddingError, ProviderError};
    use goalclaw_core::function::OutputKind;
    use goalclaw_core::storage::Workspace;
    use goalclaw_core::tokenizer::HeuristicTokenizer;
    use goalclaw_memory::InMemoryWorkspace;
    use serde_json::json;

    struct Harness {
        provider: Arc<SequentialMockProvider>,
        workspace: Arc<InMemoryWorkspace>,
        chat: ChatLog,
        ctx: FunctionContext,
    }

    fn harness(replies: Vec<goalclaw_core::provider::ProviderResponse>) -> Harness {
        harness_with(SequentialMockProvider::new(replies), Arc::new(KeywordEmbedder))
    }

    /// Functions share the loop's provider, so nested requests consume the same script.
    fn harness_with(provider: SequentialMockProvider, embeddings: Arc<dyn EmbeddingApi>) -> Harness {
        let provider = Arc::new(provider);
        let workspace = Arc::new(InMemoryWorkspace::new());
        let ctx = FunctionContext::new("Tester", workspace.clone(), provider.clone(), "mock-model")
            .with_embeddings(embeddings);
        let mut chat = ChatLog::new(Arc::new(HeuristicTokenizer), 10_000);
        chat.persistent(Message::user("do the thing")).unwrap();
        for function in AgentFunction::ALL {
            chat.add_function(function.definition());
        }
        Harness {
            provider,
            workspace,
            chat,
            ctx,
        }
    }

    fn function_loop(h: &Harness, config: LoopConfig) -> FunctionCallLoop {
        FunctionCallLoop::new(h.provider.clone(), AgentFunction::ALL.into_iter().collect(), config)
    }

    async fn run(h: &mut Harness, config: LoopConfig) -> LoopResult {
        let function_loop = function_loop(h, config);
        let mut vars = AgentVariables::new(3000);
        function_loop
            .run(&mut h.chat, &mut vars, &h.ctx, &CancellationToken::new())
            .await
    }

    /// Records every save.
    #[derive(Default)]
    struct RecordingStore {
        saved: Vec<(String, String)>,
    }

    impl VariableStore for RecordingStore {
        fn should_save(&self, content: &str) -> bool {
            content.len() > 100
        }

        fn save(&mut self, key: &str, content: String) -> String {
            self.saved.push((key.to_string(), content));
            goalclaw_core::variables::reference(key)
        }

        fn get(&self, name: &str) -> Option<&str> {
            self.saved.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
        }
    }

    #[tokio::test]
    async fn search_search_achieved_succeeds_in_three_iterations() {
        let mut h = harness(vec![
            call("search", json!({"query": "code"})),
            call("search", json!({"query": "data"})),
            call("agent_onGoalAchieved", json!({"message": "All done"})),
        ]);
        h.workspace.write("notes.md", "Some code.\n\nSome data.").await.unwrap();

        let result = run(&mut h, LoopConfig::default()).await;

        assert_eq!(result.outcome, LoopOutcome::Succeeded("All done".into()));
        assert_eq!(result.iterations, 3);
        assert_eq!(h.provider.call_count(), 3);

        let results: Vec<_> = h
            .chat
            .temporary_messages()
            .filter(|m| m.role == Role::Function)
            .map(|m| m.content.clone())
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].starts_with("[notes.md] Some code."));
        assert_eq!(result.outputs.last().unwrap().kind, OutputKind::Success);
    }

    #[tokio::test]
    async fn function_call_is_logged_before_its_result() {
        let mut h = harness(vec![
            call("fs_readDirectory", json!({"path": ""})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);
        run(&mut h, LoopConfig::default()).await;

        let roles: Vec<Role> = h.chat.temporary_messages().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Function, Role::Assistant]);
        let second_request = &h.provider.requests()[1];
        assert_eq!(second_request.messages.len(), 3);
        assert_eq!(second_request.functions.len(), AgentFunction::ALL.len());
    }

    #[tokio::test]
    async fn oversized_result_is_offloaded_to_variable_store() {
        let mut h = harness(vec![
            call("fs_readFile", json!({"path": "big.txt"})),
            call("agent_onGoalAchieved", json!({"message": "read it"})),
        ]);
        let big = "x".repeat(500);
        h.workspace.write("big.txt", &big).await.unwrap();

        let function_loop = function_loop(&h, LoopConfig::default());
        let mut store = RecordingStore::default();
        let result = function_loop
            .run(&mut h.chat, &mut store, &h.ctx, &CancellationToken::new())
            .await;

        assert!(result.outcome.is_success());
        assert_eq!(store.saved, vec![("fs_readFile".to_string(), big)]);
        let result_message = h
            .chat
            .temporary_messages()
            .find(|m| m.role == Role::Function)
            .unwrap();
        assert_eq!(result_message.content, "${fs_readFile}");
    }

    #[tokio::test]
    async fn variables_expand_into_later_arguments() {
        let mut h = harness(vec![
            call("fs_readFile", json!({"path": "in.txt"})),
            call("fs_writeFile", json!({"path": "out.txt", "data": "${fs_readFile}"})),
            call("agent_onGoalAchieved", json!({"message": "copied"})),
        ]);
        let content = "line \"one\"\n".repeat(20);
        h.workspace.write("in.txt", &content).await.unwrap();

        let function_loop = function_loop(&h, LoopConfig::default());
        let mut vars = AgentVariables::new(50);
        let result = function_loop
            .run(&mut h.chat, &mut vars, &h.ctx, &CancellationToken::new())
            .await;

        assert!(result.outcome.is_success());
        assert_eq!(h.workspace.read("out.txt").await.unwrap(), content);
    }

    #[tokio::test]
    async fn nudge_once_then_stall() {
        let mut h = harness(vec![text("Let me think."), text("Still thinking.")]);

        let result = run(&mut h, LoopConfig::default()).await;

        assert!(matches!(
            result.outcome,
            LoopOutcome::Failed { kind: FailureKind::Stalled, .. }
        ));
        assert_eq!(result.iterations, 2);
        let nudges = h
            .chat
            .temporary_messages()
            .filter(|m| m.role == Role::System && m.content == DEFAULT_LOOP_PREVENTION_PROMPT)
            .count();
        assert_eq!(nudges, 1);
    }

    #[tokio::test]
    async fn nudge_can_recover() {
        let mut h = harness(vec![
            text("Hmm."),
            call("agent_onGoalAchieved", json!({"message": "fine"})),
        ]);
        let result = run(&mut h, LoopConfig::default()).await;
        assert_eq!(result.outcome, LoopOutcome::Succeeded("fine".into()));
        assert_eq!(result.outputs[0].kind, OutputKind::Message);
    }

    #[tokio::test]
    async fn higher_threshold_delays_nudge() {
        let mut h = harness(vec![
            text("one"),
            text("two"),
            text("three"),
            text("four"),
        ]);
        let config = LoopConfig {
            loop_prevention_threshold: 2,
            ..LoopConfig::default()
        };
        let result = run(&mut h, config).await;
        // The nudge follows "two"; "three" is still a plain reply.
        assert!(matches!(result.outcome, LoopOutcome::Failed { kind: FailureKind::Stalled, .. }));
        assert_eq!(result.iterations, 3);
    }

    #[tokio::test]
    async fn unknown_function_reports_error_and_continues() {
        let mut h = harness(vec![
            call("launch_rockets", json!({})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);
        let result = run(&mut h, LoopConfig::default()).await;

        assert!(result.outcome.is_success());
        let error = h
            .chat
            .temporary_messages()
            .find(|m| m.role == Role::Function)
            .unwrap();
        assert_eq!(error.name.as_deref(), Some("launch_rockets"));
        assert!(error.content.starts_with("Error: Function launch_rockets does not exist"));
        assert_eq!(result.outputs[0].kind, OutputKind::Error);
    }

    #[tokio::test]
    async fn bad_arguments_never_execute() {
        let mut h = harness(vec![
            call("fs_writeFile", json!({"path": "x.txt"})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);
        let result = run(&mut h, LoopConfig::default()).await;

        assert!(result.outcome.is_success());
        assert!(!h.workspace.exists("x.txt").await.unwrap());
        let error = h
            .chat
            .temporary_messages()
            .find(|m| m.role == Role::Function)
            .unwrap();
        assert!(error.content.contains("fs_writeFile"));
    }

    #[tokio::test]
    async fn goal_failed_ends_with_failure_payload() {
        let mut h = harness(vec![call("agent_onGoalFailed", json!({"message": "no access"}))]);
        let result = run(&mut h, LoopConfig::default()).await;
        assert_eq!(
            result.outcome,
            LoopOutcome::Failed {
                kind: FailureKind::GoalFailed,
                message: "no access".into()
            }
        );
    }

    #[tokio::test]
    async fn custom_terminal_function() {
        let mut h = harness(vec![]);
        // `plan` asks the same provider for the plan itself.
        let h_provider = Arc::new(SequentialMockProvider::new(vec![
            call("plan", json!({"goal": "ship"})),
            text("1. build\n2. ship"),
        ]));
        h.provider = h_provider.clone();
        h.ctx.provider = h_provider;

        let config = LoopConfig::default().with_terminal("plan", Termination::Success);
        let result = run(&mut h, config).await;
        assert_eq!(result.outcome, LoopOutcome::Succeeded("1. build\n2. ship".into()));
    }

    #[tokio::test]
    async fn provider_error_fails_run() {
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let mut h = harness(vec![]);
        h.provider = provider;
        let result = run(&mut h, LoopConfig::default()).await;
        assert!(matches!(result.outcome, LoopOutcome::Failed { kind: FailureKind::Provider, .. }));
    }

    /// Fails every request the same way.
    struct FailingEmbedder(EmbeddingError);

    #[async_trait]
    impl EmbeddingApi for FailingEmbedder {
        async fn create_embeddings(&self, _inputs: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
            Err(self.0.clone())
        }
    }

    fn search_twice_then_achieve() -> SequentialMockProvider {
        SequentialMockProvider::new(vec![
            call("search", json!({"query": "code"})),
            call("search", json!({"query": "code"})),
            call("agent_onGoalAchieved", json!({"message": "done anyway"})),
        ])
    }

    #[tokio::test]
    async fn embedding_quota_in_search_fails_run() {
        let embeddings = Arc::new(FailingEmbedder(EmbeddingError::QuotaExceeded("subsidy max".into())));
        let mut h = harness_with(search_twice_then_achieve(), embeddings);
        h.workspace.write("notes.md", "Some code.").await.unwrap();

        let result = run(&mut h, LoopConfig::default()).await;

        match &result.outcome {
            LoopOutcome::Failed { kind: FailureKind::Provider, message } => {
                assert!(message.contains("subsidy max"));
            }
            other => panic!("expected a provider failure, got {other:?}"),
        }
        assert_eq!(h.provider.call_count(), 1);
        assert_eq!(result.iterations, 1);
        let error = h
            .chat
            .temporary_messages()
            .find(|m| m.role == Role::Function)
            .unwrap();
        assert!(error.content.starts_with("Error: "));
        assert_eq!(result.outputs.last().unwrap().kind, OutputKind::Error);
    }

    #[tokio::test]
    async fn exhausted_rate_limit_in_search_fails_run() {
        let embeddings = Arc::new(FailingEmbedder(EmbeddingError::RateLimited { attempts: 5 }));
        let mut h = harness_with(search_twice_then_achieve(), embeddings);
        h.workspace.write("notes.md", "Some code.").await.unwrap();

        let result = run(&mut h, LoopConfig::default()).await;

        assert!(matches!(result.outcome, LoopOutcome::Failed { kind: FailureKind::Provider, .. }));
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn rejected_embedding_request_in_search_is_recoverable() {
        let embeddings = Arc::new(FailingEmbedder(EmbeddingError::BadRequest("bad input".into())));
        let mut h = harness_with(search_twice_then_achieve(), embeddings);
        h.workspace.write("notes.md", "Some code.").await.unwrap();

        let result = run(&mut h, LoopConfig::default()).await;

        assert_eq!(result.outcome, LoopOutcome::Succeeded("done anyway".into()));
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn provider_quota_inside_plan_fails_run() {
        let provider = SequentialMockProvider::with_results(vec![
            Ok(call("plan", json!({"goal": "ship it"}))),
            Err(ProviderError::QuotaExceeded("usage cap".into())),
            Ok(call("agent_onGoalAchieved", json!({"message": "done anyway"}))),
        ]);
        let mut h = harness_with(provider, Arc::new(KeywordEmbedder));

        let result = run(&mut h, LoopConfig::default()).await;

        assert!(matches!(result.outcome, LoopOutcome::Failed { kind: FailureKind::Provider, .. }));
        assert_eq!(result.iterations, 1);
        // The loop's request plus the one made by `plan`.
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn provider_timeout_inside_plan_is_recoverable() {
        let provider = SequentialMockProvider::with_results(vec![
            Ok(call("plan", json!({"goal": "ship it"}))),
            Err(ProviderError::Timeout("30s".into())),
            Ok(call("agent_onGoalAchieved", json!({"message": "ok"}))),
        ]);
        let mut h = harness_with(provider, Arc::new(KeywordEmbedder));

        let result = run(&mut h, LoopConfig::default()).await;

        assert!(result.outcome.is_success());
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn missing_collection_is_recoverable() {
        let mut h = harness(vec![
            call("search", json!({"query": "code", "collection": "nope"})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);

        let result = run(&mut h, LoopConfig::default()).await;

        assert!(result.outcome.is_success());
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn panic_in_step_becomes_unrecoverable_failure() {
        // One scripted reply, then the mock panics on the second request.
        let mut h = harness(vec![call("fs_readDirectory", json!({"path": ""}))]);
        let result = run(&mut h, LoopConfig::default()).await;

        assert_eq!(
            result.outcome,
            LoopOutcome::Failed {
                kind: FailureKind::Unrecoverable,
                message: UNRECOVERABLE_MESSAGE.into()
            }
        );
        // Work done before the fault is kept.
        assert_eq!(h.chat.temporary_messages().count(), 2);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_requests() {
        let mut h = harness(vec![]);
        let function_loop = function_loop(&h, LoopConfig::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut vars = AgentVariables::new(3000);
        let result = function_loop.run(&mut h.chat, &mut vars, &h.ctx, &cancel).await;

        assert_eq!(result.outcome, LoopOutcome::Stopped("cancelled".into()));
        assert_eq!(result.iterations, 0);
        assert_eq!(h.provider.call_count(), 0);
    }

    /// Cancels the token while answering.
    struct CancellingProvider(CancellationToken);

    #[async_trait::async_trait]
    impl Provider for CancellingProvider {
        fn name(&self) -> &str {
            "cancelling"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<goalclaw_core::provider::ProviderResponse, ProviderError> {
            self.0.cancel();
            Ok(text("too late"))
        }
    }

    #[tokio::test]
    async fn in_flight_reply_is_discarded_on_cancel() {
        let mut h = harness(vec![]);
        let cancel = CancellationToken::new();
        let function_loop = FunctionCallLoop::new(
            Arc::new(CancellingProvider(cancel.clone())),
            FunctionRegistry::new(),
            LoopConfig::default(),
        );

        let mut vars = AgentVariables::new(3000);
        let result = function_loop.run(&mut h.chat, &mut vars, &h.ctx, &cancel).await;

        assert_eq!(result.outcome, LoopOutcome::Stopped("cancelled".into()));
        assert_eq!(h.chat.temporary_messages().count(), 0);
        assert_eq!(h.chat.persistent_messages().count(), 1);
    }

    /// Takes ten (virtual) seconds to answer.
    struct SlowProvider;

    #[async_trait::async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<goalclaw_core::provider::ProviderResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(text("thinking"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_stops_the_run() {
        let mut h = harness(vec![]);
        let function_loop = FunctionCallLoop::new(
            Arc::new(SlowProvider),
            FunctionRegistry::new(),
            LoopConfig::default().with_timeout(Duration::from_secs(5)),
        );

        let mut vars = AgentVariables::new(3000);
        let result = function_loop
            .run(&mut h.chat, &mut vars, &h.ctx, &CancellationToken::new())
            .await;

        assert_eq!(result.outcome, LoopOutcome::Stopped("timeout".into()));
        assert_eq!(result.iterations, 1);
    }

    #[tokio::test]
    async fn iteration_limit_stops_the_run() {
        let mut h = harness(vec![
            call("fs_readDirectory", json!({"path": ""})),
            call("fs_readDirectory", json!({"path": ""})),
        ]);
        let result = run(&mut h, LoopConfig::default().with_max_iterations(2)).await;
        assert_eq!(result.outcome, LoopOutcome::Stopped("iteration limit".into()));
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn outputs_stream_to_sink() {
        let h = harness(vec![
            call("fs_writeFile", json!({"path": "a.txt", "data": "hi"})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let function_loop = function_loop(&h, LoopConfig::default()).with_output_sink(tx);

        let mut h = h;
        let mut vars = AgentVariables::new(3000);
        let result = function_loop
            .run(&mut h.chat, &mut vars, &h.ctx, &CancellationToken::new())
            .await;
        drop(function_loop);

        let mut streamed = Vec::new();
        while let Some(output) = rx.recv().await {
            streamed.push(output);
        }
        assert_eq!(streamed, result.outputs);
        assert_eq!(streamed.len(), 2);
    }

    #[tokio::test]
    async fn debug_log_records_steps() {
        let h = harness(vec![
            call("fs_readDirectory", json!({"path": ""})),
            call("agent_onGoalAchieved", json!({"message": "ok"})),
        ]);
        let log = Arc::new(DebugLog::new(h.workspace.clone(), ".goalclaw"));
        let function_loop = function_loop(&h, LoopConfig::default()).with_debug_log(log.clone());

        let mut h = h;
        let mut vars = AgentVariables::new(3000);
        function_loop
            .run(&mut h.chat, &mut vars, &h.ctx, &CancellationToken::new())
            .await;

        let record = log.snapshot().await;
        assert_eq!(record.steps.len(), 2);
        assert_eq!(
            record.steps[1].last_message.as_deref(),
            Some("Calling agent_onGoalAchieved")
        );
    }
}
