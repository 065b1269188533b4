//! # GoalClaw Core
//!
//! Domain types, traits, and error definitions for the GoalClaw goal-driven
//! agent. This crate has **no framework dependencies**: it defines the domain
//! model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the agent loop consumes is a trait here:
//! - [`Provider`]: chat completion with function calling
//! - [`EmbeddingBackend`] / [`EmbeddingApi`]: raw and policy-wrapped embeddings
//! - [`Tokenizer`]: token counting for context budgets
//! - [`Workspace`]: key-value-over-paths storage
//! - [`VariableStore`]: offloading of oversized function results
//!
//! Implementations live in their respective crates, and tests swap in mocks.

pub mod error;
pub mod message;
pub mod function;
pub mod provider;
pub mod tokenizer;
pub mod embedding;
pub mod storage;
pub mod variables;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use function::{AgentOutput, FunctionCall, FunctionDefinition, FunctionResult, OutputKind};
pub use provider::{EmbeddingBackend, ModelReply, Provider, ProviderRequest, ProviderResponse};
pub use tokenizer::{HeuristicTokenizer, Tokenizer};
pub use embedding::{Embedding, EmbeddingApi};
pub use storage::{DirEntry, EntryKind, Workspace};
pub use variables::VariableStore;
