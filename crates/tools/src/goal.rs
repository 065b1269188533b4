//! Terminal functions: report that the goal was achieved or failed.

use goalclaw_core::function::{AgentOutput, FunctionResult};
use serde::Deserialize;

use crate::{AgentFunction, FunctionContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MessageArgs {
    pub message: String,
}

pub(crate) fn schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "message": {
                "type": "string",
                "description": description
            }
        },
        "required": ["message"],
        "additionalProperties": false
    })
}

pub(crate) fn achieved(args: MessageArgs, ctx: &FunctionContext) -> FunctionResult {
    FunctionResult {
        outputs: vec![AgentOutput::success(
            ctx.title(AgentFunction::OnGoalAchieved.name()),
            args.message,
        )],
        ..FunctionResult::default()
    }
}

pub(crate) fn failed(args: MessageArgs, ctx: &FunctionContext) -> FunctionResult {
    FunctionResult {
        outputs: vec![AgentOutput::error(
            ctx.title(AgentFunction::OnGoalFailed.name()),
            args.message,
        )],
        ..FunctionResult::default()
    }
}
