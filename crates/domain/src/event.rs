//! Event types — the closed sum of Actions and Observations.
//!
//! Every event serializes to a flat JSON object carrying `id`, `timestamp`,
//! `source`, `hidden`, and a snake_case `type` discriminator plus the
//! variant's own fields. Action and observation tags are disjoint so the
//! two sides of the sum round-trip unambiguously.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::AgentState;
use crate::usage::ToolCallMetadata;

pub type EventId = u64;

/// Where an event originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    User,
    Agent,
    Environment,
}

/// Self-reported risk of a runnable action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityRisk {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

/// An immutable record in a session's event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub source: Source,
    #[serde(default)]
    pub hidden: bool,
    #[serde(flatten)]
    pub payload: Payload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Action(Action),
    Observation(Observation),
}

impl Event {
    pub fn action(id: EventId, source: Source, action: Action) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            source,
            hidden: false,
            payload: Payload::Action(action),
        }
    }

    pub fn observation(id: EventId, source: Source, observation: Observation) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            source,
            hidden: false,
            payload: Payload::Observation(observation),
        }
    }

    pub fn as_action(&self) -> Option<&Action> {
        match &self.payload {
            Payload::Action(a) => Some(a),
            Payload::Observation(_) => None,
        }
    }

    pub fn as_observation(&self) -> Option<&Observation> {
        match &self.payload {
            Payload::Action(_) => None,
            Payload::Observation(o) => Some(o),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Actions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fields shared by every runnable (tool-invoking) action.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallFields {
    pub tool_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default)]
    pub security_risk: SecurityRisk,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ToolCallMetadata>,
}

impl CallFields {
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            ..Default::default()
        }
    }
}

/// An intent emitted by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Free-form text surfaced to the user.
    Message {
        content: String,
        #[serde(default)]
        wait_for_response: bool,
    },

    /// Generic tool invocation (tools without a dedicated variant).
    ToolCall {
        tool_name: String,
        tool_input: Value,
        #[serde(flatten)]
        call: CallFields,
    },

    FileRead {
        path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        end_line: Option<u32>,
        #[serde(flatten)]
        call: CallFields,
    },

    FileWrite {
        path: String,
        content: String,
        #[serde(flatten)]
        call: CallFields,
    },

    FileEdit {
        path: String,
        old_text: String,
        new_text: String,
        #[serde(flatten)]
        call: CallFields,
    },

    CmdRun {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_sec: Option<u64>,
        #[serde(flatten)]
        call: CallFields,
    },

    IpythonRunCell {
        code: String,
        #[serde(flatten)]
        call: CallFields,
    },

    BrowseUrl {
        url: String,
        #[serde(flatten)]
        call: CallFields,
    },

    BrowseInteractive {
        action: String,
        #[serde(flatten)]
        call: CallFields,
    },

    /// Invocation routed to an MCP server; the full name is kept verbatim.
    McpCall {
        tool_name: String,
        arguments: Value,
        #[serde(flatten)]
        call: CallFields,
    },

    /// Terminal action: the agent is done.
    Complete { final_answer: String },
}

/// Uniform view of a runnable action as (name, input, call id).
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub tool_input: Value,
    pub tool_call_id: String,
    pub metadata: Option<ToolCallMetadata>,
}

impl Action {
    /// The invocation this action represents, if it is runnable.
    ///
    /// Typed variants serialize their fields into the input bag exactly as
    /// the matching tool's schema declares them.
    pub fn as_tool_call(&self) -> Option<ToolInvocation> {
        let (tool_name, tool_input, call) = match self {
            Action::ToolCall {
                tool_name,
                tool_input,
                call,
            } => (tool_name.clone(), tool_input.clone(), call),
            Action::FileRead {
                path,
                start_line,
                end_line,
                call,
            } => {
                let mut input = serde_json::json!({ "path": path });
                if let Some(s) = start_line {
                    input["start_line"] = Value::from(*s);
                }
                if let Some(e) = end_line {
                    input["end_line"] = Value::from(*e);
                }
                ("file_read".into(), input, call)
            }
            Action::FileWrite { path, content, call } => (
                "file_write".into(),
                serde_json::json!({ "path": path, "content": content }),
                call,
            ),
            Action::FileEdit {
                path,
                old_text,
                new_text,
                call,
            } => (
                "file_edit".into(),
                serde_json::json!({ "path": path, "old_text": old_text, "new_text": new_text }),
                call,
            ),
            Action::CmdRun {
                command,
                timeout_sec,
                call,
            } => {
                let mut input = serde_json::json!({ "command": command });
                if let Some(t) = timeout_sec {
                    input["timeout_sec"] = Value::from(*t);
                }
                ("cmd_run".into(), input, call)
            }
            Action::IpythonRunCell { code, call } => (
                "ipython_run_cell".into(),
                serde_json::json!({ "code": code }),
                call,
            ),
            Action::BrowseUrl { url, call } => {
                ("browse_url".into(), serde_json::json!({ "url": url }), call)
            }
            Action::BrowseInteractive { action, call } => (
                "browse_interactive".into(),
                serde_json::json!({ "action": action }),
                call,
            ),
            Action::McpCall {
                tool_name,
                arguments,
                call,
            } => (tool_name.clone(), arguments.clone(), call),
            Action::Message { .. } | Action::Complete { .. } => return None,
        };
        Some(ToolInvocation {
            tool_name,
            tool_input,
            tool_call_id: call.tool_call_id.clone(),
            metadata: call.metadata.clone(),
        })
    }

    /// Map a named tool call back to the matching typed variant.
    ///
    /// Names with no dedicated variant — or typed names whose required
    /// fields do not parse — fall back to the generic `ToolCall`; the tool
    /// manager's schema validation reports the malformed input.
    pub fn from_tool_call(
        tool_name: &str,
        tool_input: Value,
        tool_call_id: String,
        metadata: Option<ToolCallMetadata>,
    ) -> Action {
        // Models that emit the optional `thought` / `security_risk` fields
        // get them carried onto the action; both ride outside the schema.
        let security_risk = get_str(&tool_input, "security_risk")
            .and_then(|s| match s.as_str() {
                "low" => Some(SecurityRisk::Low),
                "medium" => Some(SecurityRisk::Medium),
                "high" => Some(SecurityRisk::High),
                _ => None,
            })
            .unwrap_or_default();
        let call = CallFields {
            tool_call_id,
            thought: get_str(&tool_input, "thought"),
            security_risk,
            metadata,
        };

        match tool_name {
            "file_read" => {
                if let Some(path) = get_str(&tool_input, "path") {
                    return Action::FileRead {
                        path,
                        start_line: get_u64(&tool_input, "start_line").map(|v| v as u32),
                        end_line: get_u64(&tool_input, "end_line").map(|v| v as u32),
                        call,
                    };
                }
            }
            "file_write" => {
                if let (Some(path), Some(content)) =
                    (get_str(&tool_input, "path"), get_str(&tool_input, "content"))
                {
                    return Action::FileWrite { path, content, call };
                }
            }
            "file_edit" => {
                if let (Some(path), Some(old_text), Some(new_text)) = (
                    get_str(&tool_input, "path"),
                    get_str(&tool_input, "old_text"),
                    get_str(&tool_input, "new_text"),
                ) {
                    return Action::FileEdit {
                        path,
                        old_text,
                        new_text,
                        call,
                    };
                }
            }
            "cmd_run" => {
                if let Some(command) = get_str(&tool_input, "command") {
                    return Action::CmdRun {
                        command,
                        timeout_sec: get_u64(&tool_input, "timeout_sec"),
                        call,
                    };
                }
            }
            "ipython_run_cell" => {
                if let Some(code) = get_str(&tool_input, "code") {
                    return Action::IpythonRunCell { code, call };
                }
            }
            "browse_url" => {
                if let Some(url) = get_str(&tool_input, "url") {
                    return Action::BrowseUrl { url, call };
                }
            }
            "browse_interactive" => {
                if let Some(action) = get_str(&tool_input, "action") {
                    return Action::BrowseInteractive { action, call };
                }
            }
            name if name.starts_with("mcp__") => {
                return Action::McpCall {
                    tool_name: tool_name.to_owned(),
                    arguments: tool_input,
                    call,
                };
            }
            _ => {}
        }

        Action::ToolCall {
            tool_name: tool_name.to_owned(),
            tool_input,
            call,
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Action::ToolCall { call, .. }
            | Action::FileRead { call, .. }
            | Action::FileWrite { call, .. }
            | Action::FileEdit { call, .. }
            | Action::CmdRun { call, .. }
            | Action::IpythonRunCell { call, .. }
            | Action::BrowseUrl { call, .. }
            | Action::BrowseInteractive { call, .. }
            | Action::McpCall { call, .. } => Some(call.tool_call_id.as_str()),
            Action::Message { .. } | Action::Complete { .. } => None,
        }
    }
}

fn get_str(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_owned)
}

fn get_u64(input: &Value, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Observations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failure classification carried inside a failed tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidInput,
    ToolExecution,
    Timeout,
    Cancelled,
}

/// A result produced by the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Observation {
    /// User input replayed into the event stream.
    UserMessage {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        files: Vec<String>,
    },

    /// Generic tool output.
    ToolResult {
        tool_name: String,
        tool_call_id: String,
        content: String,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_kind: Option<FailureKind>,
        cause: Option<EventId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<ToolCallMetadata>,
    },

    FileReadResult {
        path: String,
        content: String,
        tool_call_id: String,
        cause: Option<EventId>,
    },

    FileWriteResult {
        path: String,
        bytes_written: u64,
        tool_call_id: String,
        cause: Option<EventId>,
    },

    FileEditResult {
        path: String,
        content: String,
        tool_call_id: String,
        cause: Option<EventId>,
    },

    CmdOutput {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        output: String,
        tool_call_id: String,
        cause: Option<EventId>,
    },

    BrowseResult {
        url: String,
        content: String,
        tool_call_id: String,
        cause: Option<EventId>,
    },

    /// Injected when the cancel signal short-circuits a dispatch.
    Interruption {
        content: String,
        cause: Option<EventId>,
    },

    /// A terminal runtime error surfaced to the observer.
    RuntimeError { content: String },

    /// Progress event for external observers; dropped by projection.
    AgentStateChanged { agent_state: AgentState },
}

impl Observation {
    pub fn content(&self) -> &str {
        match self {
            Observation::UserMessage { content, .. }
            | Observation::ToolResult { content, .. }
            | Observation::FileReadResult { content, .. }
            | Observation::FileEditResult { content, .. }
            | Observation::BrowseResult { content, .. }
            | Observation::Interruption { content, .. }
            | Observation::RuntimeError { content } => content,
            Observation::CmdOutput { output, .. } => output,
            Observation::FileWriteResult { .. } | Observation::AgentStateChanged { .. } => "",
        }
    }

    pub fn cause(&self) -> Option<EventId> {
        match self {
            Observation::ToolResult { cause, .. }
            | Observation::FileReadResult { cause, .. }
            | Observation::FileWriteResult { cause, .. }
            | Observation::FileEditResult { cause, .. }
            | Observation::CmdOutput { cause, .. }
            | Observation::BrowseResult { cause, .. }
            | Observation::Interruption { cause, .. } => *cause,
            Observation::UserMessage { .. }
            | Observation::RuntimeError { .. }
            | Observation::AgentStateChanged { .. } => None,
        }
    }

    /// The call this observation answers, when it is a tool result.
    pub fn tool_call_id(&self) -> Option<&str> {
        match self {
            Observation::ToolResult { tool_call_id, .. }
            | Observation::FileReadResult { tool_call_id, .. }
            | Observation::FileWriteResult { tool_call_id, .. }
            | Observation::FileEditResult { tool_call_id, .. }
            | Observation::CmdOutput { tool_call_id, .. }
            | Observation::BrowseResult { tool_call_id, .. } => Some(tool_call_id.as_str()),
            _ => None,
        }
    }

    pub fn success(&self) -> bool {
        match self {
            Observation::ToolResult { success, .. } => *success,
            Observation::Interruption { .. } | Observation::RuntimeError { .. } => false,
            _ => true,
        }
    }
}
