//! In-memory variable store for offloaded function results.

use goalclaw_core::variables::{VariableStore, reference};
use std::collections::HashMap;

/// System message explaining variable references to the model.
pub const VARIABLES_PROMPT: &str = "Some function results are too long to show in full. \
They are stored in variables and appear in the chat as ${name}. \
You can pass a variable to any function by writing ${name} inside a string argument; \
it is replaced by the variable's full content before the function runs.";

/// Variables keyed by name. Names come from the function that produced the
/// content, with `_2`, `_3`, ... appended when the name is taken.
#[derive(Debug, Clone)]
pub struct AgentVariables {
    threshold_chars: usize,
    values: HashMap<String, String>,
}

impl AgentVariables {
    /// Offload content longer than `threshold_chars`; 0 disables automatic
    /// offload (explicit saves still work).
    pub fn new(threshold_chars: usize) -> Self {
        Self {
            threshold_chars,
            values: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn free_name(&self, key: &str) -> String {
        if !self.values.contains_key(key) {
            return key.to_string();
        }
        (2..)
            .map(|n| format!("{key}_{n}"))
            .find(|name| !self.values.contains_key(name))
            .unwrap_or_else(|| key.to_string())
    }
}

impl VariableStore for AgentVariables {
    fn should_save(&self, content: &str) -> bool {
        self.threshold_chars > 0 && content.chars().count() > self.threshold_chars
    }

    fn save(&mut self, key: &str, content: String) -> String {
        let name = self.free_name(key);
        let token = reference(&name);
        self.values.insert(name, content);
        token
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}
