//! Session control tools.
//!
//! These do no work themselves; invoking them is the signal. The tool
//! manager watches for its configured completion tool and records the
//! final answer, and the controller turns `message_user` into a visible
//! MessageAction.

use axon_domain::tool::ToolOutput;
use axon_domain::Result;
use serde_json::Value;

use crate::spec::{Tool, ToolContext};

/// Name of the tool that surfaces a message to the user mid-run.
pub const MESSAGE_USER: &str = "message_user";

/// `complete` — the main agent's completion sentinel.
pub struct CompleteTool;

#[async_trait::async_trait]
impl Tool for CompleteTool {
    fn name(&self) -> &str {
        "complete"
    }

    fn description(&self) -> &str {
        "Finish the task and return control to the user. Call this exactly once, \
         when the task is fully done, with the final answer."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "final_answer": {
                    "type": "string",
                    "description": "The final answer presented to the user"
                }
            },
            "required": ["final_answer"]
        })
    }

    async fn run(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let answer = input["final_answer"].as_str().unwrap_or_default();
        Ok(ToolOutput::Text(format!("Task completed: {answer}")))
    }
}

/// `message_user` — surface a progress message without stopping.
pub struct MessageUserTool;

#[async_trait::async_trait]
impl Tool for MessageUserTool {
    fn name(&self) -> &str {
        MESSAGE_USER
    }

    fn description(&self) -> &str {
        "Send a short status message to the user while continuing to work. \
         Does not wait for a reply unless wait_for_response is true."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "The message to show" },
                "wait_for_response": {
                    "type": "boolean",
                    "description": "Pause until the user replies"
                }
            },
            "required": ["text"]
        })
    }

    async fn run(&self, _input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        Ok(ToolOutput::Text("Message delivered to the user.".into()))
    }
}

/// `return_control_to_general_agent` — the reviewer's completion sentinel.
/// Kept distinct from `complete` so the two loops never alias.
pub struct ReturnControlTool;

#[async_trait::async_trait]
impl Tool for ReturnControlTool {
    fn name(&self) -> &str {
        "return_control_to_general_agent"
    }

    fn description(&self) -> &str {
        "Finish the review and hand the collected feedback back to the \
         general agent. Call this exactly once, when the review is done."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "feedback": {
                    "type": "string",
                    "description": "The full review feedback"
                }
            },
            "required": ["feedback"]
        })
    }

    async fn run(&self, input: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let feedback = input["feedback"].as_str().unwrap_or_default();
        Ok(ToolOutput::Text(format!("Review recorded: {feedback}")))
    }
}
