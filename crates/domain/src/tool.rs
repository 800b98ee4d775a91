use serde::{Deserialize, Serialize};

use crate::message::ContentPart;

/// Internal tool call format (provider-agnostic).
/// Every adapter converts provider-specific tool calls to/from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub tool_input: serde_json::Value,
}

/// Tool descriptor exposed to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema (object subset) for the tool's parameters.
    pub input_schema: serde_json::Value,
}

/// What a tool run produces: plain text or a list of typed content blocks.
#[derive(Debug, Clone)]
pub enum ToolOutput {
    Text(String),
    Blocks(Vec<ContentPart>),
}

impl ToolOutput {
    /// Flatten the output into the text recorded in the observation.
    /// Image blocks are kept as their URL reference.
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(t) => t,
            ToolOutput::Blocks(parts) => parts
                .into_iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text),
                    ContentPart::Image { url, .. } => Some(url),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for ToolOutput {
    fn from(text: String) -> Self {
        ToolOutput::Text(text)
    }
}

impl From<&str> for ToolOutput {
    fn from(text: &str) -> Self {
        ToolOutput::Text(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_flatten_to_text() {
        let out = ToolOutput::Blocks(vec![
            ContentPart::Text { text: "first".into() },
            ContentPart::Image {
                url: "https://example.com/x.png".into(),
                media_type: None,
            },
        ]);
        assert_eq!(out.into_text(), "first\nhttps://example.com/x.png");
    }
}
