//! Retrieval over workspace files or a named collection.
//!
//! Workspace files are split into paragraph chunks and ranked against the
//! query with a [`RetrievalRanker`]; duplicate chunks are collapsed.

use goalclaw_core::error::{EmbeddingError, Error, FunctionError};
use goalclaw_core::function::{AgentOutput, FunctionResult};
use goalclaw_core::storage::{Workspace, join};
use goalclaw_memory::RetrievalRanker;
use serde::Deserialize;
use tracing::debug;

use crate::{AgentFunction, FunctionContext};

/// Longest chunk handed to the embedder, in bytes.
const MAX_CHUNK_BYTES: usize = 1500;
/// Stop collecting after this many files.
const MAX_FILES: usize = 200;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub collection: Option<String>,
}

pub(crate) fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "query": { "type": "string", "description": "What to look for" },
            "max_results": { "type": "integer", "description": "Maximum number of passages to return" },
            "collection": { "type": "string", "description": "Search this collection instead of the workspace files" }
        },
        "required": ["query"],
        "additionalProperties": false
    })
}

#[derive(Debug, Clone)]
struct Chunk {
    path: String,
    text: String,
}

/// Split text on blank lines, then cut long paragraphs on char boundaries.
fn chunk_text(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let mut rest = paragraph;
        while rest.len() > MAX_CHUNK_BYTES {
            let mut cut = MAX_CHUNK_BYTES;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }
        chunks.push(rest.to_string());
    }
    chunks
}

/// Every readable text file under the workspace root, skipping hidden entries.
async fn collect_files(workspace: &dyn Workspace) -> Vec<(String, String)> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = workspace.read_dir(&dir).await else {
            continue;
        };
        for entry in entries {
            if entry.name.starts_with('.') {
                continue;
            }
            let path = join(&dir, &entry.name);
            if entry.is_dir() {
                pending.push(path);
            } else if files.len() < MAX_FILES {
                match workspace.read(&path).await {
                    Ok(content) => files.push((path, content)),
                    Err(e) => debug!(path = %path, error = %e, "Skipping unreadable file"),
                }
            }
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

pub(crate) async fn execute(args: SearchArgs, ctx: &FunctionContext) -> Result<FunctionResult, FunctionError> {
    let name = AgentFunction::Search.name();
    let limit = args.max_results.unwrap_or(ctx.search_results).max(1);

    let passages = match &args.collection {
        Some(collection) => search_collection(collection, &args.query, limit, ctx).await?,
        None => search_workspace(&args.query, limit, ctx).await?,
    };

    let content = if passages.is_empty() {
        format!("No results found for \"{}\".", args.query)
    } else {
        passages.join("\n\n")
    };

    Ok(FunctionResult::single(
        name,
        AgentOutput::message(
            ctx.title(name),
            format!("Found {} passages for \"{}\"", passages.len(), args.query),
        ),
        content,
    ))
}

fn execution_failed(reason: impl std::fmt::Display) -> FunctionError {
    FunctionError::ExecutionFailed {
        function: AgentFunction::Search.name().to_string(),
        reason: reason.to_string(),
    }
}

fn embedding_failed(source: EmbeddingError) -> FunctionError {
    FunctionError::Embedding {
        function: AgentFunction::Search.name().to_string(),
        source,
    }
}

/// Keep embedding failures typed so the loop can tell a spent quota from a missing file.
fn query_failed(e: Error) -> FunctionError {
    match e {
        Error::Embedding(source) => embedding_failed(source),
        other => execution_failed(other),
    }
}

async fn search_workspace(query: &str, limit: usize, ctx: &FunctionContext) -> Result<Vec<String>, FunctionError> {
    let embeddings = ctx
        .embeddings
        .clone()
        .ok_or_else(|| execution_failed("no embedding service configured"))?;

    let chunks: Vec<Chunk> = collect_files(ctx.workspace.as_ref())
        .await
        .into_iter()
        .flat_map(|(path, content)| {
            chunk_text(&content)
                .into_iter()
                .map(move |text| Chunk { path: path.clone(), text })
        })
        .collect();
    debug!(chunks = chunks.len(), "Searching workspace");

    let ranker = RetrievalRanker::new(embeddings, chunks, |c: &Chunk| c.text.clone())
        .unique(true)
        .limit(limit);

    let results = ranker.query(query).await.map_err(embedding_failed)?;
    Ok(results
        .into_iter()
        .map(|r| format!("[{}] {}", r.item.path, r.item.text))
        .collect())
}

async fn search_collection(
    name: &str,
    query: &str,
    limit: usize,
    ctx: &FunctionContext,
) -> Result<Vec<String>, FunctionError> {
    let store = ctx
        .collections
        .as_ref()
        .ok_or_else(|| execution_failed("no collections available"))?;

    let collection = store
        .collection(name)
        .await
        .map_err(execution_failed)?
        .ok_or_else(|| execution_failed(format!("collection '{name}' does not exist")))?;

    let results = collection.query(query, limit).await.map_err(query_failed)?;
    Ok(results
        .into_iter()
        .map(|r| format!("[{name}] {}", r.document.content))
        .collect())
}
