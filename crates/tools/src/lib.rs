//! The functions a GoalClaw agent can call.
//!
//! The set is closed: [`AgentFunction`] has one variant per function, and
//! each variant knows its name, its JSON schema, how to parse raw model
//! arguments into a typed [`FunctionArgs`], and (through the args) how to
//! execute against a [`FunctionContext`]. A [`FunctionRegistry`] maps the
//! names the model uses back to variants.

pub mod fs;
pub mod goal;
pub mod plan;
pub mod search;

use goalclaw_core::embedding::EmbeddingApi;
use goalclaw_core::error::FunctionError;
use goalclaw_core::function::{FunctionDefinition, FunctionResult};
use goalclaw_core::provider::Provider;
use goalclaw_core::storage::Workspace;
use goalclaw_memory::{CachedEmbeddings, VectorStore};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a function may touch while executing, owned by one agent run.
#[derive(Clone)]
pub struct FunctionContext {
    /// Display name of the running agent, used in output titles
    pub agent_name: String,
    pub workspace: Arc<dyn Workspace>,
    pub provider: Arc<dyn Provider>,
    pub model: String,
    /// Needed by `search`; absent means search is unavailable. Shared by every
    /// clone of the context, so each distinct text is embedded once per run.
    pub embeddings: Option<Arc<dyn EmbeddingApi>>,
    /// Named collections `search` may query instead of the workspace
    pub collections: Option<Arc<VectorStore>>,
    /// Default result count for `search`
    pub search_results: usize,
}

impl FunctionContext {
    pub fn new(
        agent_name: impl Into<String>,
        workspace: Arc<dyn Workspace>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            workspace,
            provider,
            model: model.into(),
            embeddings: None,
            collections: None,
            search_results: 5,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingApi>) -> Self {
        self.embeddings = Some(Arc::new(CachedEmbeddings::new(embeddings)));
        self
    }

    pub fn with_collections(mut self, collections: Arc<VectorStore>) -> Self {
        self.collections = Some(collections);
        self
    }

    pub fn with_search_results(mut self, n: usize) -> Self {
        self.search_results = n.max(1);
        self
    }

    /// Output title for `function`, e.g. `[Developer] fs_readFile`.
    pub fn title(&self, function: &str) -> String {
        format!("[{}] {function}", self.agent_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentFunction {
    OnGoalAchieved,
    OnGoalFailed,
    ReadFile,
    WriteFile,
    AppendFile,
    ReadDirectory,
    Search,
    Plan,
}

/// Typed arguments, produced only by a successful [`AgentFunction::parse`].
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArgs {
    GoalAchieved(goal::MessageArgs),
    GoalFailed(goal::MessageArgs),
    ReadFile(fs::PathArgs),
    WriteFile(fs::WriteArgs),
    AppendFile(fs::WriteArgs),
    ReadDirectory(fs::PathArgs),
    Search(search::SearchArgs),
    Plan(plan::PlanArgs),
}

impl AgentFunction {
    pub const ALL: [AgentFunction; 8] = [
        Self::OnGoalAchieved,
        Self::OnGoalFailed,
        Self::ReadFile,
        Self::WriteFile,
        Self::AppendFile,
        Self::ReadDirectory,
        Self::Search,
        Self::Plan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::OnGoalAchieved => "agent_onGoalAchieved",
            Self::OnGoalFailed => "agent_onGoalFailed",
            Self::ReadFile => "fs_readFile",
            Self::WriteFile => "fs_writeFile",
            Self::AppendFile => "fs_appendFile",
            Self::ReadDirectory => "fs_readDirectory",
            Self::Search => "search",
            Self::Plan => "plan",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::OnGoalAchieved => "Informs the user that the goal has been achieved.",
            Self::OnGoalFailed => "Informs the user that the agent could not achieve the goal.",
            Self::ReadFile => "Read the contents of a file in the workspace.",
            Self::WriteFile => "Write data to a file in the workspace, replacing any existing content.",
            Self::AppendFile => "Append data to the end of a file in the workspace.",
            Self::ReadDirectory => "List the files and directories inside a workspace directory.",
            Self::Search => {
                "Search the workspace files (or a named collection) for passages relevant to a query."
            }
            Self::Plan => "Break a goal down into a numbered list of concrete steps.",
        }
    }

    pub fn parameters(&self) -> serde_json::Value {
        match self {
            Self::OnGoalAchieved => goal::schema("information about how the goal was achieved"),
            Self::OnGoalFailed => goal::schema("information about how and why the goal could not be achieved"),
            Self::ReadFile => fs::path_schema("Path of the file to read"),
            Self::ReadDirectory => fs::path_schema("Path of the directory to list (\"\" for the root)"),
            Self::WriteFile | Self::AppendFile => fs::write_schema(),
            Self::Search => search::schema(),
            Self::Plan => plan::schema(),
        }
    }

    /// Convert this function into a definition for the model.
    pub fn definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }

    /// Parse the model's raw argument JSON into typed arguments.
    ///
    /// Unknown fields, missing required fields and malformed JSON are all
    /// rejected; nothing executes on a parse failure.
    pub fn parse(&self, raw: &str) -> Result<FunctionArgs, FunctionError> {
        let args = match self {
            Self::OnGoalAchieved => FunctionArgs::GoalAchieved(self.decode(raw)?),
            Self::OnGoalFailed => FunctionArgs::GoalFailed(self.decode(raw)?),
            Self::ReadFile => FunctionArgs::ReadFile(self.decode(raw)?),
            Self::WriteFile => FunctionArgs::WriteFile(self.decode(raw)?),
            Self::AppendFile => FunctionArgs::AppendFile(self.decode(raw)?),
            Self::ReadDirectory => FunctionArgs::ReadDirectory(self.decode(raw)?),
            Self::Search => FunctionArgs::Search(self.decode(raw)?),
            Self::Plan => FunctionArgs::Plan(self.decode(raw)?),
        };
        Ok(args)
    }

    fn decode<T: DeserializeOwned>(&self, raw: &str) -> Result<T, FunctionError> {
        let raw = if raw.trim().is_empty() { "{}" } else { raw };
        serde_json::from_str(raw).map_err(|e| FunctionError::InvalidArguments {
            function: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

impl FunctionArgs {
    pub fn function(&self) -> AgentFunction {
        match self {
            Self::GoalAchieved(_) => AgentFunction::OnGoalAchieved,
            Self::GoalFailed(_) => AgentFunction::OnGoalFailed,
            Self::ReadFile(_) => AgentFunction::ReadFile,
            Self::WriteFile(_) => AgentFunction::WriteFile,
            Self::AppendFile(_) => AgentFunction::AppendFile,
            Self::ReadDirectory(_) => AgentFunction::ReadDirectory,
            Self::Search(_) => AgentFunction::Search,
            Self::Plan(_) => AgentFunction::Plan,
        }
    }

    /// The `message` argument of the goal functions.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::GoalAchieved(args) | Self::GoalFailed(args) => Some(&args.message),
            _ => None,
        }
    }

    pub async fn execute(self, ctx: &FunctionContext) -> Result<FunctionResult, FunctionError> {
        match self {
            Self::GoalAchieved(args) => Ok(goal::achieved(args, ctx)),
            Self::GoalFailed(args) => Ok(goal::failed(args, ctx)),
            Self::ReadFile(args) => Ok(fs::read_file(args, ctx).await),
            Self::WriteFile(args) => Ok(fs::write_file(args, ctx, false).await),
            Self::AppendFile(args) => Ok(fs::write_file(args, ctx, true).await),
            Self::ReadDirectory(args) => Ok(fs::read_directory(args, ctx).await),
            Self::Search(args) => search::execute(args, ctx).await,
            Self::Plan(args) => plan::execute(args, ctx).await,
        }
    }
}

/// The functions available to one agent, looked up by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    by_name: HashMap<&'static str, AgentFunction>,
    order: Vec<AgentFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function. Registering the same function twice is a no-op.
    pub fn register(&mut self, function: AgentFunction) {
        if self.by_name.insert(function.name(), function).is_none() {
            self.order.push(function);
        }
    }

    pub fn get(&self, name: &str) -> Option<AgentFunction> {
        self.by_name.get(name).copied()
    }

    /// Definitions in registration order.
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.order.iter().map(|f| f.definition()).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.order.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<AgentFunction> for FunctionRegistry {
    fn from_iter<I: IntoIterator<Item = AgentFunction>>(iter: I) -> Self {
        let mut registry = Self::new();
        for function in iter {
            registry.register(function);
        }
        registry
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use goalclaw_core::error::ProviderError;
    use goalclaw_core::message::Message;
    use goalclaw_core::provider::{ProviderRequest, ProviderResponse};
    use goalclaw_memory::InMemoryWorkspace;
    use std::sync::Mutex;

    /// Answers every request with a fixed text and records the requests.
    pub struct CannedProvider {
        pub reply: String,
        pub requests: Mutex<Vec<ProviderRequest>>,
    }

    impl CannedProvider {
        pub fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: reply.into(), requests: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                message: Message::assistant(self.reply.clone()),
                usage: None,
                model: "mock".into(),
            })
        }
    }

    pub fn context() -> (FunctionContext, Arc<InMemoryWorkspace>) {
        let ws = Arc::new(InMemoryWorkspace::new());
        let ctx = FunctionContext::new("Tester", ws.clone(), CannedProvider::new("1. do it"), "mock");
        (ctx, ws)
    }
}
