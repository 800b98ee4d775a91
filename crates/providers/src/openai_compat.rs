//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Ollama, vLLM, LM Studio, Together, and any other
//! endpoint that follows the OpenAI chat completions contract. Tool
//! descriptors are sent with `strict: true`; malformed tool-argument JSON
//! in a response fails the call instead of being papered over.

use serde_json::Value;

use axon_domain::config::ProviderConfig;
use axon_domain::error::{Error, Result};
use axon_domain::tool::{ToolCall, ToolDefinition};
use axon_domain::usage::LlmUsage;
use axon_domain::{ContentPart, Message, MessageContent, Role};

use crate::traits::{AssistantBlock, ChatRequest, ChatResponse, LlmProvider, ToolChoice};
use crate::util::{classify_status, from_reqwest, resolve_api_key};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new provider from the deserialized provider config.
    pub fn from_config(cfg: &ProviderConfig) -> Result<Self> {
        let api_key = resolve_api_key(cfg, "OPENAI_API_KEY")?;
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into());
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.into());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_sec))
            .pool_max_idle_per_host(cfg.max_connections)
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        messages.extend(req.messages.iter().map(msg_to_openai));

        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "max_tokens": req.max_tokens.max(1),
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
            body["tool_choice"] = match req.tool_choice {
                ToolChoice::Auto => Value::String("auto".into()),
                ToolChoice::Any => Value::String("required".into()),
                ToolChoice::None => Value::String("none".into()),
            };
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn generate(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, url = %url, "openai_compat chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(classify_status(&self.id, status.as_u16(), &resp_text));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => {
            let text = msg.content.extract_all_text();
            serde_json::json!({
                "role": role_to_str(msg.role),
                "content": text,
            })
        }
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => {
            text_parts.push(t.clone());
        }
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    if text_parts.is_empty() {
        obj["content"] = Value::Null;
    } else {
        obj["content"] = Value::String(text_parts.join("\n"));
    }
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    for part in msg.content.parts() {
        if let ContentPart::ToolResult {
            tool_use_id,
            content,
            ..
        } = part
        {
            return serde_json::json!({
                "role": "tool",
                "tool_call_id": tool_use_id,
                "content": content,
            });
        }
    }
    serde_json::json!({
        "role": "tool",
        "tool_call_id": "",
        "content": msg.content.extract_all_text(),
    })
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
            "strict": true,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::InvalidRequest("no choices in response".into()))?;

    let message = choice
        .get("message")
        .ok_or_else(|| Error::InvalidRequest("no message in choice".into()))?;

    let mut blocks: Vec<AssistantBlock> = Vec::new();
    if let Some(content) = message.get("content").and_then(|v| v.as_str()) {
        if !content.is_empty() {
            blocks.push(AssistantBlock::Text(content.to_string()));
        }
    }
    for tc in parse_openai_tool_calls(message)? {
        blocks.push(AssistantBlock::ToolCall(tc));
    }

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    let usage = body
        .get("usage")
        .and_then(parse_openai_usage)
        .unwrap_or_default();

    Ok(ChatResponse {
        blocks,
        usage,
        model,
        finish_reason,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Result<Vec<ToolCall>> {
    let arr = match message.get("tool_calls").and_then(|v| v.as_array()) {
        Some(a) => a,
        None => return Ok(Vec::new()),
    };
    let mut calls = Vec::with_capacity(arr.len());
    for tc in arr {
        let tool_call_id = tc
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidRequest("tool call without id".into()))?
            .to_string();
        let func = tc
            .get("function")
            .ok_or_else(|| Error::InvalidRequest("tool call without function".into()))?;
        let tool_name = func
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::InvalidRequest("tool call without name".into()))?
            .to_string();
        let args_str = func
            .get("arguments")
            .and_then(|v| v.as_str())
            .unwrap_or("{}");
        let args_trimmed = args_str.trim();
        let tool_input: Value = if args_trimmed.is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(args_trimmed).map_err(|e| {
                Error::InvalidRequest(format!(
                    "tool call '{tool_name}' has malformed arguments: {e}"
                ))
            })?
        };
        calls.push(ToolCall {
            tool_call_id,
            tool_name,
            tool_input,
        });
    }
    Ok(calls)
}

fn parse_openai_usage(v: &Value) -> Option<LlmUsage> {
    Some(LlmUsage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
        cost_usd: None,
        latency_ms: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_and_tool_calls() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "finish_reason": "tool_calls",
                "message": {
                    "content": "on it",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "cmd_run", "arguments": "{\"command\":\"ls\"}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8 }
        });
        let resp = parse_chat_response(&body).unwrap();
        assert_eq!(resp.first_text(), Some("on it"));
        let tc = resp.first_tool_call().unwrap();
        assert_eq!(tc.tool_name, "cmd_run");
        assert_eq!(tc.tool_input["command"], "ls");
        assert_eq!(resp.usage.total_tokens, 8);
    }

    #[test]
    fn malformed_arguments_fail_fast() {
        let body = serde_json::json!({
            "model": "gpt-4o",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "cmd_run", "arguments": "{not json" }
                    }]
                }
            }]
        });
        let err = parse_chat_response(&body).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let body = serde_json::json!({
            "model": "m",
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "noop", "arguments": "" }
                    }]
                }
            }]
        });
        let resp = parse_chat_response(&body).unwrap();
        let tc = resp.first_tool_call().unwrap();
        assert_eq!(tc.tool_input, serde_json::json!({}));
    }

    #[test]
    fn descriptors_are_strict() {
        let def = ToolDefinition {
            name: "file_read".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({ "type": "object", "properties": {} }),
        };
        let value = tool_to_openai(&def);
        assert_eq!(value["function"]["strict"], true);
    }

    #[test]
    fn missing_choices_is_invalid_request() {
        let err = parse_chat_response(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
