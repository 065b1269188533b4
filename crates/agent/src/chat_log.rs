//! Token-budgeted chat log.
//!
//! Messages live in two partitions. *Persistent* messages (persona, goal,
//! standing instructions) are never evicted. *Temporary* messages (model
//! replies, function results) are working memory: when the log goes over
//! budget the oldest temporary message is dropped first, until
//! `persistent + temporary <= budget` holds again.
//!
//! Each message's token cost is computed once on insertion and cached.

use goalclaw_core::error::{Error, Result};
use goalclaw_core::function::FunctionDefinition;
use goalclaw_core::message::Message;
use goalclaw_core::tokenizer::Tokenizer;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    message: Message,
    tokens: usize,
}

pub struct ChatLog {
    tokenizer: Arc<dyn Tokenizer>,
    budget: usize,
    persistent: Vec<Entry>,
    temporary: VecDeque<Entry>,
    persistent_tokens: usize,
    temporary_tokens: usize,
    functions: Vec<FunctionDefinition>,
}

impl ChatLog {
    /// A log holding at most `budget` tokens of messages.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, budget: usize) -> Self {
        Self {
            tokenizer,
            budget,
            persistent: Vec::new(),
            temporary: VecDeque::new(),
            persistent_tokens: 0,
            temporary_tokens: 0,
            functions: Vec::new(),
        }
    }

    /// A log for a model with a `window`-token context, keeping `reserve`
    /// tokens free for the completion.
    pub fn for_window(tokenizer: Arc<dyn Tokenizer>, window: usize, reserve: usize) -> Self {
        Self::new(tokenizer, window.saturating_sub(reserve))
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    fn entry(&self, message: Message) -> Entry {
        let tokens = self.tokenizer.count(&message.token_text());
        Entry { message, tokens }
    }

    /// Append a message that is never evicted.
    ///
    /// Fails without appending if persistent messages alone would exceed
    /// the budget. Temporary messages are evicted to make room.
    pub fn persistent(&mut self, message: Message) -> Result<()> {
        self.persistent_all([message])
    }

    /// Append several persistent messages, all or none.
    pub fn persistent_all(&mut self, messages: impl IntoIterator<Item = Message>) -> Result<()> {
        let entries: Vec<Entry> = messages.into_iter().map(|m| self.entry(m)).collect();
        let total = self.persistent_tokens + entries.iter().map(|e| e.tokens).sum::<usize>();
        self.check_persistent(total)?;
        self.persistent_tokens = total;
        self.persistent.extend(entries);
        self.evict();
        Ok(())
    }

    fn check_persistent(&self, total: usize) -> Result<()> {
        if total > self.budget {
            return Err(Error::Config {
                message: format!(
                    "persistent messages need {total} tokens but the chat budget is {}",
                    self.budget
                ),
            });
        }
        Ok(())
    }

    /// Append an evictable message, then evict the oldest temporaries until
    /// the log fits. Returns how many messages were evicted.
    ///
    /// A message larger than the free space evicts everything before it and
    /// finally itself.
    pub fn temporary(&mut self, message: Message) -> usize {
        let entry = self.entry(message);
        self.temporary_tokens += entry.tokens;
        self.temporary.push_back(entry);
        self.evict()
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.total_tokens() > self.budget {
            let Some(oldest) = self.temporary.pop_front() else {
                break;
            };
            self.temporary_tokens -= oldest.tokens;
            evicted += 1;
        }
        if evicted > 0 {
            debug!(evicted, remaining = self.temporary.len(), "Evicted temporary messages");
        }
        evicted
    }

    /// Register a function for the next model call. A definition with the
    /// same name replaces the earlier one.
    pub fn add_function(&mut self, definition: FunctionDefinition) {
        match self.functions.iter_mut().find(|f| f.name == definition.name) {
            Some(existing) => *existing = definition,
            None => self.functions.push(definition),
        }
    }

    pub fn functions(&self) -> &[FunctionDefinition] {
        &self.functions
    }

    /// The messages to send to the model: persistent first, then temporary,
    /// each in insertion order.
    pub fn chat_logs(&self) -> Vec<Message> {
        self.persistent
            .iter()
            .chain(self.temporary.iter())
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn persistent_messages(&self) -> impl Iterator<Item = &Message> {
        self.persistent.iter().map(|e| &e.message)
    }

    pub fn temporary_messages(&self) -> impl Iterator<Item = &Message> {
        self.temporary.iter().map(|e| &e.message)
    }

    pub fn persistent_tokens(&self) -> usize {
        self.persistent_tokens
    }

    pub fn temporary_tokens(&self) -> usize {
        self.temporary_tokens
    }

    pub fn total_tokens(&self) -> usize {
        self.persistent_tokens + self.temporary_tokens
    }

    pub fn len(&self) -> usize {
        self.persistent.len() + self.temporary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            persistent: MessageList {
                msgs: self.persistent_messages().cloned().collect(),
            },
            temporary: MessageList {
                msgs: self.temporary_messages().cloned().collect(),
            },
        }
    }

    /// Replace the contents with `snapshot`, recounting tokens and applying
    /// the budget. Registered functions are kept. On error the log is unchanged.
    pub fn restore(&mut self, snapshot: ChatSnapshot) -> Result<()> {
        let persistent: Vec<Entry> = snapshot.persistent.msgs.into_iter().map(|m| self.entry(m)).collect();
        let persistent_tokens = persistent.iter().map(|e| e.tokens).sum();
        self.check_persistent(persistent_tokens)?;

        let temporary: VecDeque<Entry> = snapshot.temporary.msgs.into_iter().map(|m| self.entry(m)).collect();
        self.temporary_tokens = temporary.iter().map(|e| e.tokens).sum();
        self.temporary = temporary;
        self.persistent = persistent;
        self.persistent_tokens = persistent_tokens;
        self.evict();
        Ok(())
    }
}

/// Serialized form of a [`ChatLog`]'s messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSnapshot {
    #[serde(default)]
    pub persistent: MessageList,
    #[serde(default)]
    pub temporary: MessageList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub msgs: Vec<Message>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use goalclaw_core::message::Role;
    use goalclaw_core::tokenizer::HeuristicTokenizer;

    /// A message costing exactly `tokens` with the heuristic tokenizer.
    fn sized(role: Role, tag: char, tokens: usize) -> Message {
        Message::new(role, tag.to_string().repeat(tokens * 4))
    }

    fn log(budget: usize) -> ChatLog {
        ChatLog::new(Arc::new(HeuristicTokenizer), budget)
    }

    fn temporary_tags(log: &ChatLog) -> String {
        log.temporary_messages().map(|m| &m.content[..1]).collect()
    }

    #[test]
    fn window_reserve_scenario_keeps_two_newest() {
        let mut log = ChatLog::for_window(Arc::new(HeuristicTokenizer), 100, 40);
        assert_eq!(log.budget(), 60);

        log.persistent(sized(Role::System, 'p', 20)).unwrap();
        for tag in ['a', 'b', 'c', 'd', 'e'] {
            log.temporary(sized(Role::Assistant, tag, 20));
        }

        assert_eq!(temporary_tags(&log), "de");
        assert_eq!(log.persistent_messages().count(), 1);
        assert_eq!(log.total_tokens(), 60);
    }

    #[test]
    fn full_budget_keeps_four_newest() {
        let mut log = log(100);
        log.persistent(sized(Role::System, 'p', 20)).unwrap();
        for tag in ['a', 'b', 'c', 'd', 'e'] {
            log.temporary(sized(Role::Assistant, tag, 20));
        }
        assert_eq!(temporary_tags(&log), "bcde");
        assert_eq!(log.total_tokens(), 100);
    }

    #[test]
    fn invariant_holds_after_every_append() {
        let mut log = log(50);
        log.persistent(sized(Role::System, 'p', 7)).unwrap();
        for (i, size) in [3, 11, 40, 1, 9, 25, 2, 14].into_iter().enumerate() {
            let tag = char::from(b'a' + i as u8);
            log.temporary(sized(Role::Function, tag, size));
            assert!(log.total_tokens() <= log.budget());
            assert_eq!(log.persistent_messages().count(), 1);
        }
        // 25 + 2 + 14 = 41 fits next to the 7 persistent tokens; adding 9 would not.
        assert_eq!(temporary_tags(&log), "fgh");
    }

    #[test]
    fn oversized_temporary_evicts_itself() {
        let mut log = log(10);
        log.persistent(sized(Role::System, 'p', 5)).unwrap();
        log.temporary(sized(Role::User, 'a', 2));
        let evicted = log.temporary(sized(Role::User, 'b', 8));
        assert_eq!(evicted, 2);
        assert_eq!(log.temporary_messages().count(), 0);
        assert_eq!(log.total_tokens(), 5);
    }

    #[test]
    fn persistent_overflow_is_rejected() {
        let mut log = log(30);
        log.persistent(sized(Role::System, 'p', 20)).unwrap();
        let err = log.persistent(sized(Role::User, 'g', 11)).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(log.persistent_tokens(), 20);
        assert_eq!(log.persistent_messages().count(), 1);
    }

    #[test]
    fn persistent_append_evicts_temporaries() {
        let mut log = log(30);
        log.persistent(sized(Role::System, 'p', 10)).unwrap();
        log.temporary(sized(Role::Assistant, 'a', 10));
        log.temporary(sized(Role::Assistant, 'b', 10));
        log.persistent(sized(Role::System, 'q', 10)).unwrap();
        assert_eq!(temporary_tags(&log), "b");
    }

    #[test]
    fn chat_logs_orders_persistent_first() {
        let mut log = log(1000);
        log.temporary(Message::assistant("thinking"));
        log.persistent(Message::system("persona")).unwrap();
        log.persistent(Message::user("goal")).unwrap();

        let contents: Vec<String> = log.chat_logs().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["persona", "goal", "thinking"]);
    }

    #[test]
    fn add_function_replaces_same_name() {
        let mut log = log(10);
        let def = |desc: &str| FunctionDefinition {
            name: "search".into(),
            description: desc.into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        log.add_function(def("old"));
        log.add_function(def("new"));
        assert_eq!(log.functions().len(), 1);
        assert_eq!(log.functions()[0].description, "new");
    }

    #[test]
    fn snapshot_restores_with_fresh_counts() {
        let mut log = log(100);
        log.persistent(Message::system("persona")).unwrap();
        log.temporary(Message::assistant("reply"));

        let json = serde_json::to_string(&log.snapshot()).unwrap();
        assert!(json.contains(r#""persistent":{"msgs":["#));

        let mut small = ChatLog::new(Arc::new(HeuristicTokenizer), 3);
        small.restore(serde_json::from_str(&json).unwrap()).unwrap();
        assert_eq!(small.persistent_tokens(), 2);
        // "reply" costs 2 tokens, which no longer fits.
        assert_eq!(small.temporary_messages().count(), 0);
    }

    #[test]
    fn failed_restore_keeps_current_contents() {
        let mut log = log(10);
        log.persistent(sized(Role::System, 'p', 4)).unwrap();
        log.temporary(sized(Role::Assistant, 'a', 3));

        let snapshot = ChatSnapshot {
            persistent: MessageList {
                msgs: vec![sized(Role::System, 'q', 6), sized(Role::User, 'g', 6)],
            },
            temporary: MessageList::default(),
        };
        assert!(matches!(log.restore(snapshot), Err(Error::Config { .. })));

        assert_eq!(log.persistent_tokens(), 4);
        assert_eq!(log.temporary_tokens(), 3);
        assert_eq!(temporary_tags(&log), "a");
        assert_eq!(log.persistent_messages().next().unwrap().content.chars().next(), Some('p'));
    }

    #[test]
    fn persistent_all_is_all_or_nothing() {
        let mut log = log(30);
        log.persistent(sized(Role::System, 'p', 10)).unwrap();
        let err = log
            .persistent_all([sized(Role::System, 'q', 10), sized(Role::User, 'g', 11)])
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(log.persistent_messages().count(), 1);
        assert_eq!(log.persistent_tokens(), 10);

        log.persistent_all([sized(Role::System, 'q', 10), sized(Role::User, 'g', 10)])
            .unwrap();
        assert_eq!(log.persistent_messages().count(), 3);
        assert_eq!(log.total_tokens(), 30);
    }
}
