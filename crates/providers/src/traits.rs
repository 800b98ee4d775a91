use axon_domain::error::Result;
use axon_domain::tool::{ToolCall, ToolDefinition};
use axon_domain::usage::LlmUsage;
use axon_domain::Message;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the model may use the supplied tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// The model decides (default).
    #[default]
    Auto,
    /// The model must call some tool.
    Any,
    /// Tool calls are disabled for this request.
    None,
}

/// A provider-agnostic generation request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// System prompt, sent the way each vendor expects it.
    pub system_prompt: Option<String>,
    /// Tool descriptors the model may invoke.
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
}

/// One content block of a normalized assistant response.
#[derive(Debug, Clone)]
pub enum AssistantBlock {
    Text(String),
    ToolCall(ToolCall),
}

/// A provider-agnostic generation response.
///
/// Text content is concatenated per assistant turn; tool call ids are
/// preserved verbatim. Downstream picks the first ToolCall if any, else
/// the first Text block.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub blocks: Vec<AssistantBlock>,
    pub usage: LlmUsage,
    /// The model that actually produced the response.
    pub model: String,
    /// The normalized stop reason (e.g. "stop", "tool_calls").
    pub finish_reason: Option<String>,
}

impl ChatResponse {
    pub fn first_tool_call(&self) -> Option<&ToolCall> {
        self.blocks.iter().find_map(|b| match b {
            AssistantBlock::ToolCall(tc) => Some(tc),
            AssistantBlock::Text(_) => None,
        })
    }

    pub fn first_text(&self) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            AssistantBlock::Text(t) => Some(t.as_str()),
            AssistantBlock::ToolCall(_) => None,
        })
    }

    /// The response as a raw JSON value, kept in tool-call metadata so the
    /// history can be rebuilt faithfully.
    pub fn to_raw(&self) -> serde_json::Value {
        let blocks: Vec<serde_json::Value> = self
            .blocks
            .iter()
            .map(|b| match b {
                AssistantBlock::Text(t) => serde_json::json!({ "type": "text", "text": t }),
                AssistantBlock::ToolCall(tc) => serde_json::json!({
                    "type": "tool_call",
                    "tool_call_id": tc.tool_call_id,
                    "tool_name": tc.tool_name,
                    "tool_input": tc.tool_input,
                }),
            })
            .collect();
        serde_json::json!({
            "model": self.model,
            "finish_reason": self.finish_reason,
            "blocks": blocks,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait that every vendor adapter must implement.
///
/// Implementations translate between the internal types and the wire
/// format of each vendor's HTTP API. Adapters are shared across sessions
/// and must be thread-safe; the retry policy lives above them in
/// [`crate::client::LlmClient`].
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send one generation request and wait for the normalized response.
    async fn generate(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;

    /// The model used when the request does not name one.
    fn default_model(&self) -> &str;
}
