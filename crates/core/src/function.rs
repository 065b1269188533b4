//! Function-calling domain types.
//!
//! The model sees [`FunctionDefinition`]s, answers with a [`FunctionCall`],
//! and the executed function produces a [`FunctionResult`]: observability
//! outputs for the driver plus messages for the chat log.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A function definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// The function name, unique within an agent
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,

    /// Arguments exactly as the model produced them (a JSON string)
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// What kind of event an [`AgentOutput`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Message,
    Success,
    Error,
}

/// An observability record produced while the agent works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub kind: OutputKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl AgentOutput {
    pub fn message(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Message,
            title: title.into(),
            content: Some(content.into()),
        }
    }

    pub fn success(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Success,
            title: title.into(),
            content: Some(content.into()),
        }
    }

    pub fn error(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Error,
            title: title.into(),
            content: Some(content.into()),
        }
    }
}

/// What an executed function hands back to the loop.
#[derive(Debug, Clone, Default)]
pub struct FunctionResult {
    /// Observability records, forwarded to the driver
    pub outputs: Vec<AgentOutput>,

    /// Messages to append to the chat log
    pub messages: Vec<Message>,

    /// Force every result message into the variable store, regardless of size
    pub store_in_variable: bool,
}

impl FunctionResult {
    /// A result with one output and one function-result message.
    pub fn single(name: &str, output: AgentOutput, content: impl Into<String>) -> Self {
        Self {
            outputs: vec![output],
            messages: vec![Message::function_result(name, content)],
            store_in_variable: false,
        }
    }
}
