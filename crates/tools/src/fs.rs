//! Workspace file functions.
//!
//! Storage failures are reported back to the model as the function result
//! so it can correct itself; they never end the run.

use goalclaw_core::function::{AgentOutput, FunctionResult};
use serde::Deserialize;
use tracing::debug;

use crate::{AgentFunction, FunctionContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteArgs {
    pub path: String,
    pub data: String,
}

pub(crate) fn path_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": description }
        },
        "required": ["path"],
        "additionalProperties": false
    })
}

pub(crate) fn write_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": { "type": "string", "description": "Path of the file to write" },
            "data": { "type": "string", "description": "Text to write" }
        },
        "required": ["path", "data"],
        "additionalProperties": false
    })
}

fn failure(ctx: &FunctionContext, function: AgentFunction, error: String) -> FunctionResult {
    let name = function.name();
    FunctionResult::single(
        name,
        AgentOutput::error(format!("{} failed", ctx.title(name)), error.clone()),
        format!("Error: {error}"),
    )
}

pub(crate) async fn read_file(args: PathArgs, ctx: &FunctionContext) -> FunctionResult {
    let function = AgentFunction::ReadFile;
    match ctx.workspace.read(&args.path).await {
        Ok(content) => {
            debug!(path = %args.path, bytes = content.len(), "File read");
            FunctionResult::single(
                function.name(),
                AgentOutput::message(ctx.title(function.name()), format!("Read file {}", args.path)),
                content,
            )
        }
        Err(e) => failure(ctx, function, format!("could not read '{}': {e}", args.path)),
    }
}

pub(crate) async fn write_file(args: WriteArgs, ctx: &FunctionContext, append: bool) -> FunctionResult {
    let function = if append { AgentFunction::AppendFile } else { AgentFunction::WriteFile };
    let result = if append {
        ctx.workspace.append(&args.path, &args.data).await
    } else {
        ctx.workspace.write(&args.path, &args.data).await
    };

    match result {
        Ok(()) => {
            let verb = if append { "Appended" } else { "Wrote" };
            let summary = format!("{verb} {} bytes to {}", args.data.len(), args.path);
            FunctionResult::single(
                function.name(),
                AgentOutput::message(ctx.title(function.name()), summary.clone()),
                summary,
            )
        }
        Err(e) => failure(ctx, function, format!("could not write '{}': {e}", args.path)),
    }
}

pub(crate) async fn read_directory(args: PathArgs, ctx: &FunctionContext) -> FunctionResult {
    let function = AgentFunction::ReadDirectory;
    match ctx.workspace.read_dir(&args.path).await {
        Ok(entries) => {
            let listing = serde_json::to_string(&entries).unwrap_or_else(|_| "[]".into());
            FunctionResult::single(
                function.name(),
                AgentOutput::message(
                    ctx.title(function.name()),
                    format!("Listed {} entries in '{}'", entries.len(), args.path),
                ),
                listing,
            )
        }
        Err(e) => failure(ctx, function, format!("could not list '{}': {e}", args.path)),
    }
}
