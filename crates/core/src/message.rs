//! Chat message types.
//!
//! These are the value objects that flow between the chat log, the model
//! client and the function loop: the loop appends messages, the provider
//! serializes them, the model answers with new ones.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::function::FunctionCall;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, rules, nudges)
    System,
    /// The driving user or the goal statement
    User,
    /// The language model
    Assistant,
    /// Result of an executed function
    Function,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Function => "function",
        };
        f.write_str(s)
    }
}

/// A single message in a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content
    #[serde(default)]
    pub content: String,

    /// Name of the function whose result this is
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Function call requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
            function_call: None,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// An assistant message that requests a function call.
    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            function_call: Some(call),
            ..Self::new(Role::Assistant, "")
        }
    }

    /// The result of running the named function.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(Role::Function, content)
        }
    }

    /// The text a tokenizer should count for this message.
    ///
    /// Function-call requests carry no content, so their name and raw
    /// arguments stand in for it.
    pub fn token_text(&self) -> std::borrow::Cow<'_, str> {
        match &self.function_call {
            Some(call) if self.content.is_empty() => {
                format!("{} {}", call.name, call.arguments).into()
            }
            Some(call) => format!("{} {} {}", self.content, call.name, call.arguments).into(),
            None => self.content.as_str().into(),
        }
    }
}
