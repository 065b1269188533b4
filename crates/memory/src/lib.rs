//! Storage and retrieval for GoalClaw.
//!
//! - [`workspace`]: disk and in-memory `Workspace` backends
//! - [`embedding`]: the embedding client (validation, batching, retry)
//! - [`cache`]: content-keyed reuse of embeddings
//! - [`collection`] / [`store`]: persisted collections of embedded documents
//! - [`ranker`]: generic top-K similarity ranking

pub mod cache;
pub mod collection;
pub mod embedding;
pub mod ranker;
pub mod store;
pub mod vector;
pub mod workspace;

pub use cache::CachedEmbeddings;
pub use collection::{Collection, Document, Metadata, ScoredDocument};
pub use embedding::{CapReachedCallback, EmbeddingClient};
pub use ranker::{Ranked, RetrievalRanker};
pub use store::VectorStore;
pub use vector::{cosine_similarity, rank_by_similarity};
pub use workspace::{FsWorkspace, InMemoryWorkspace};
