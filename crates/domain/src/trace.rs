use serde::Serialize;

/// Structured trace events emitted across all axon crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        is_new: bool,
    },
    SessionDeleted {
        session_id: String,
    },
    LlmRequest {
        provider: String,
        model: String,
        duration_ms: u64,
        attempts: u32,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    ToolDispatch {
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },
    ContextCompacted {
        turns_summarized: usize,
        summary_chars: usize,
    },
    ContextTruncated {
        turns_dropped: usize,
        tokens_after: usize,
    },
    EventAppend {
        session_id: String,
        event_id: u64,
    },
    TurnFinished {
        session_id: String,
        turns: u32,
        agent_state: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "axon_event");
    }
}
