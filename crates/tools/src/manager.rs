//! The per-session tool dispatcher.
//!
//! [`ToolManager::handle_action`] is the sole path from an Action to an
//! Observation: it validates the tool name against the registry, validates
//! the input against the tool's schema, runs the tool, caps the output, and
//! converts every failure into a failed Observation. Errors never cross the
//! manager; the agent sees them as observations and may retry.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use axon_domain::event::{Action, EventId, FailureKind, Observation, ToolInvocation};
use axon_domain::trace::TraceEvent;
use axon_domain::Error;

use crate::registry::ToolRegistry;
use crate::schema;
use crate::spec::ToolContext;

/// Hard cap on recorded tool output; overflow is cut from the middle.
pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;

/// Message recorded when the cancel signal short-circuits a dispatch.
pub const TOOL_INTERRUPT_MESSAGE: &str = "Tool execution interrupted by user.";

/// A tool whose invocation ends the session's turn loop, and the input
/// field carrying its final answer.
#[derive(Debug, Clone)]
pub struct CompletionSpec {
    pub tool_name: String,
    pub answer_field: String,
}

impl CompletionSpec {
    pub fn new(tool_name: impl Into<String>, answer_field: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            answer_field: answer_field.into(),
        }
    }
}

#[derive(Default)]
struct CompletionState {
    should_stop: bool,
    final_answer: String,
}

/// Per-session dispatcher over the process-wide registry.
pub struct ToolManager {
    registry: Arc<ToolRegistry>,
    ctx: ToolContext,
    max_output_chars: usize,
    completions: Vec<CompletionSpec>,
    state: Mutex<CompletionState>,
}

impl ToolManager {
    pub fn new(registry: Arc<ToolRegistry>, ctx: ToolContext) -> Self {
        Self {
            registry,
            ctx,
            max_output_chars: MAX_TOOL_OUTPUT_CHARS,
            completions: vec![
                CompletionSpec::new("complete", "final_answer"),
                CompletionSpec::new("return_control_to_user", "final_answer"),
            ],
            state: Mutex::new(CompletionState::default()),
        }
    }

    /// Replace the completion tools (the reviewer uses a dedicated one).
    pub fn with_completions(mut self, completions: Vec<CompletionSpec>) -> Self {
        self.completions = completions;
        self
    }

    pub fn with_max_output_chars(mut self, max: usize) -> Self {
        self.max_output_chars = max.max(64);
        self
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Descriptors for the LLM client.
    pub fn definitions(&self) -> Vec<axon_domain::tool::ToolDefinition> {
        self.registry.definitions()
    }

    /// The target tool's own timeout, when it declares one. The controller
    /// clamps this against the system ceiling and enforces it externally.
    pub fn timeout_for(&self, action: &Action) -> Option<std::time::Duration> {
        let invocation = action.as_tool_call()?;
        self.registry.get(&invocation.tool_name)?.timeout()
    }

    /// True once a completion tool has been invoked this session.
    pub fn should_stop(&self) -> bool {
        self.state.lock().should_stop
    }

    /// The argument of the completion tool that stopped the loop.
    pub fn final_answer(&self) -> String {
        self.state.lock().final_answer.clone()
    }

    /// Clear completion state for a fresh run.
    pub fn reset(&self) {
        *self.state.lock() = CompletionState::default();
    }

    /// Convert an Action into an Observation by invoking the named tool.
    ///
    /// `cause` is the event id of the action, stamped into the observation.
    pub async fn handle_action(&self, action: &Action, cause: Option<EventId>) -> Observation {
        let Some(invocation) = action.as_tool_call() else {
            return failure(
                "(none)",
                "",
                cause,
                FailureKind::InvalidInput,
                "action is not runnable".to_owned(),
            );
        };

        // Cancellation is level-triggered: short-circuit before dispatch.
        if self.ctx.cancel.is_cancelled() {
            return Observation::Interruption {
                content: TOOL_INTERRUPT_MESSAGE.to_owned(),
                cause,
            };
        }

        let ToolInvocation {
            tool_name,
            tool_input,
            tool_call_id,
            ..
        } = invocation;

        let Some(tool) = self.registry.get(&tool_name) else {
            return failure(
                &tool_name,
                &tool_call_id,
                cause,
                FailureKind::UnknownTool,
                format!(
                    "unknown tool '{tool_name}'. Available: {}",
                    self.registry.names().join(", ")
                ),
            );
        };

        if let Err(violation) = schema::validate(&tool_input, &tool.input_schema()) {
            return failure(
                &tool_name,
                &tool_call_id,
                cause,
                FailureKind::InvalidInput,
                violation,
            );
        }

        let started = std::time::Instant::now();
        let result = tool.run(tool_input.clone(), &self.ctx).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        TraceEvent::ToolDispatch {
            tool_name: tool_name.clone(),
            duration_ms,
            is_error: result.is_err(),
        }
        .emit();

        match result {
            Ok(output) => {
                let content = truncate_middle(&output.into_text(), self.max_output_chars);
                self.note_completion(&tool_name, &tool_input);
                self.success_observation(action, &tool_name, &tool_call_id, cause, content)
            }
            Err(Error::Cancelled(_)) => Observation::Interruption {
                content: TOOL_INTERRUPT_MESSAGE.to_owned(),
                cause,
            },
            Err(Error::Timeout(msg)) => {
                failure(&tool_name, &tool_call_id, cause, FailureKind::Timeout, msg)
            }
            Err(e) => failure(
                &tool_name,
                &tool_call_id,
                cause,
                FailureKind::ToolExecution,
                e.to_string(),
            ),
        }
    }

    fn note_completion(&self, tool_name: &str, tool_input: &Value) {
        let Some(spec) = self.completions.iter().find(|c| c.tool_name == tool_name) else {
            return;
        };
        let answer = tool_input
            .get(&spec.answer_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let mut state = self.state.lock();
        state.should_stop = true;
        state.final_answer = answer;
    }

    /// Build the observation for a successful run; typed actions get their
    /// typed result variants.
    fn success_observation(
        &self,
        action: &Action,
        tool_name: &str,
        tool_call_id: &str,
        cause: Option<EventId>,
        content: String,
    ) -> Observation {
        match action {
            Action::FileRead { path, .. } => Observation::FileReadResult {
                path: path.clone(),
                content,
                tool_call_id: tool_call_id.to_owned(),
                cause,
            },
            Action::FileWrite { path, content: written, .. } => Observation::FileWriteResult {
                path: path.clone(),
                bytes_written: written.len() as u64,
                tool_call_id: tool_call_id.to_owned(),
                cause,
            },
            Action::FileEdit { path, .. } => Observation::FileEditResult {
                path: path.clone(),
                content,
                tool_call_id: tool_call_id.to_owned(),
                cause,
            },
            Action::CmdRun { command, .. } => Observation::CmdOutput {
                command: command.clone(),
                exit_code: Some(0),
                output: content,
                tool_call_id: tool_call_id.to_owned(),
                cause,
            },
            Action::BrowseUrl { url, .. } => Observation::BrowseResult {
                url: url.clone(),
                content,
                tool_call_id: tool_call_id.to_owned(),
                cause,
            },
            _ => Observation::ToolResult {
                tool_name: tool_name.to_owned(),
                tool_call_id: tool_call_id.to_owned(),
                content,
                success: true,
                error_message: None,
                error_kind: None,
                cause,
                metadata: None,
            },
        }
    }
}

fn failure(
    tool_name: &str,
    tool_call_id: &str,
    cause: Option<EventId>,
    kind: FailureKind,
    message: String,
) -> Observation {
    Observation::ToolResult {
        tool_name: tool_name.to_owned(),
        tool_call_id: tool_call_id.to_owned(),
        content: format!("Error: {message}"),
        success: false,
        error_message: Some(message),
        error_kind: Some(kind),
        cause,
        metadata: None,
    }
}

/// Cap `s` at `max_chars`, cutting from the middle so both the head and the
/// tail of the output survive.
pub fn truncate_middle(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_owned();
    }
    let keep_head = max_chars / 2;
    let keep_tail = max_chars - keep_head;

    let mut head_end = keep_head;
    while head_end > 0 && !s.is_char_boundary(head_end) {
        head_end -= 1;
    }
    let mut tail_start = s.len() - keep_tail;
    while tail_start < s.len() && !s.is_char_boundary(tail_start) {
        tail_start += 1;
    }

    let omitted = tail_start - head_end;
    format!(
        "{}\n\n[... output truncated: {omitted} of {} chars omitted ...]\n\n{}",
        &s[..head_end],
        s.len(),
        &s[tail_start..]
    )
}
