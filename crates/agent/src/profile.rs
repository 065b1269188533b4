//! Built-in agent profiles.

use goalclaw_core::message::Message;
use goalclaw_tools::{AgentFunction, FunctionRegistry};

/// A specialist agent: who it is and which functions it may call.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    /// What the agent is good at. Used to pick an agent for a goal.
    pub expertise: String,
    /// System prompt that opens every run.
    pub persona: String,
    pub functions: Vec<AgentFunction>,
}

impl AgentProfile {
    pub fn new(
        name: impl Into<String>,
        expertise: impl Into<String>,
        persona: impl Into<String>,
        functions: Vec<AgentFunction>,
    ) -> Self {
        Self {
            name: name.into(),
            expertise: expertise.into(),
            persona: persona.into(),
            functions,
        }
    }

    /// Text compared against a goal when selecting an agent: the expertise
    /// followed by one function name per line.
    pub fn selector_text(&self) -> String {
        std::iter::once(self.expertise.as_str())
            .chain(self.functions.iter().map(|f| f.name()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn registry(&self) -> FunctionRegistry {
        self.functions.iter().copied().collect()
    }

    /// Persona and goal, in the order they open the chat.
    pub fn initial_messages(&self, goal: &str) -> Vec<Message> {
        vec![Message::system(self.persona.clone()), Message::user(goal)]
    }

    pub fn developer() -> Self {
        Self::new(
            "Developer",
            "Architects and builds complex software. Writes, reads and debugs source code.",
            "You are an expert software engineer named \"Developer\". \
You plan your work, read the existing files in the workspace, and write complete, working files. \
When the goal is met call agent_onGoalAchieved; if it cannot be met call agent_onGoalFailed.",
            vec![
                AgentFunction::OnGoalAchieved,
                AgentFunction::OnGoalFailed,
                AgentFunction::ReadFile,
                AgentFunction::WriteFile,
                AgentFunction::AppendFile,
                AgentFunction::ReadDirectory,
                AgentFunction::Plan,
            ],
        )
    }

    pub fn researcher() -> Self {
        Self::new(
            "Researcher",
            "Researches topics in depth, gathers facts and summarizes findings in written reports.",
            "You are a meticulous researcher named \"Researcher\". \
Search the available documents, cite what you find, and write your findings to a file. \
When the goal is met call agent_onGoalAchieved; if it cannot be met call agent_onGoalFailed.",
            vec![
                AgentFunction::OnGoalAchieved,
                AgentFunction::OnGoalFailed,
                AgentFunction::Search,
                AgentFunction::Plan,
                AgentFunction::ReadFile,
                AgentFunction::WriteFile,
            ],
        )
    }

    pub fn data_analyst() -> Self {
        Self::new(
            "DataAnalyst",
            "Analyzes data sets, computes statistics and summarizes what the data shows.",
            "You are a careful analyst named \"DataAnalyst\". \
Inspect the files you are given, compute exactly what is asked, and explain your results plainly. \
When the goal is met call agent_onGoalAchieved; if it cannot be met call agent_onGoalFailed.",
            vec![
                AgentFunction::OnGoalAchieved,
                AgentFunction::OnGoalFailed,
                AgentFunction::ReadFile,
                AgentFunction::WriteFile,
                AgentFunction::ReadDirectory,
                AgentFunction::Search,
            ],
        )
    }

    pub fn web_researcher() -> Self {
        Self::new(
            "WebResearcher",
            "Researches the web for up-to-date information and cites its sources.",
            "You are a web researcher named \"WebResearcher\". \
Plan your research, search for the most relevant passages, and write a sourced answer to a file. \
When the goal is met call agent_onGoalAchieved; if it cannot be met call agent_onGoalFailed.",
            vec![
                AgentFunction::OnGoalAchieved,
                AgentFunction::OnGoalFailed,
                AgentFunction::Search,
                AgentFunction::Plan,
                AgentFunction::WriteFile,
            ],
        )
    }

    /// Every built-in profile.
    pub fn builtin() -> Vec<Self> {
        vec![
            Self::developer(),
            Self::researcher(),
            Self::data_analyst(),
            Self::web_researcher(),
        ]
    }

    /// A built-in profile by name, ignoring case.
    pub fn find(name: &str) -> Option<Self> {
        Self::builtin()
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
