//! Ask the model for a step-by-step plan toward a goal.

use goalclaw_core::error::FunctionError;
use goalclaw_core::function::{AgentOutput, FunctionResult};
use goalclaw_core::message::Message;
use goalclaw_core::provider::ProviderRequest;
use serde::Deserialize;
use tracing::debug;

use crate::{AgentFunction, FunctionContext};

const PLANNER_PROMPT: &str = "You are a planner. Break the user's goal into a short numbered list of concrete steps. \
Reply with the list only.";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanArgs {
    pub goal: String,
}

pub(crate) fn schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "goal": { "type": "string", "description": "The goal to plan for" }
        },
        "required": ["goal"],
        "additionalProperties": false
    })
}

pub(crate) async fn execute(args: PlanArgs, ctx: &FunctionContext) -> Result<FunctionResult, FunctionError> {
    let name = AgentFunction::Plan.name();
    let request = ProviderRequest {
        model: ctx.model.clone(),
        messages: vec![Message::system(PLANNER_PROMPT), Message::user(args.goal.clone())],
        temperature: 0.0,
        max_tokens: None,
        functions: Vec::new(),
    };

    let response = ctx
        .provider
        .complete(request)
        .await
        .map_err(|source| FunctionError::Provider {
            function: name.to_string(),
            source,
        })?;

    let plan = response.message.content.trim().to_string();
    debug!(steps = plan.lines().count(), "Plan created");

    Ok(FunctionResult::single(
        name,
        AgentOutput::message(ctx.title(name), plan.clone()),
        plan,
    ))
}
