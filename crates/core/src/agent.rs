//! The thin agent policy: one state snapshot in, one action out.
//!
//! All decision-making is delegated to the LLM; this type only assembles
//! the request (projection + context budget) and normalizes the response
//! (first tool call if any, else first text, with the completion sentinel
//! converting a plain answer into a completion).

use std::sync::Arc;

use axon_context::{project_events, ContextManager, Summarizer};
use axon_domain::tool::ToolDefinition;
use axon_domain::usage::ToolCallMetadata;
use axon_domain::{Action, Message, Result, State};
use axon_providers::{ChatRequest, LlmClient, ToolChoice};

#[derive(Clone)]
pub struct Agent {
    llm: Arc<LlmClient>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    context: ContextManager,
    max_output_tokens: u32,
    temperature: Option<f32>,
    completion_sentinel: String,
    model: Option<String>,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<LlmClient>,
        system_prompt: impl Into<String>,
        tools: Vec<ToolDefinition>,
        context: ContextManager,
        max_output_tokens: u32,
        temperature: Option<f32>,
        completion_sentinel: impl Into<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            tools,
            context,
            max_output_tokens,
            temperature,
            completion_sentinel: completion_sentinel.into(),
            model,
        }
    }

    /// Produce the next action for the given state snapshot.
    pub async fn step(&self, state: &State) -> Result<Action> {
        // 1. Rebuild the LLM-facing history from the event log.
        let history = project_events(&state.history);
        let turns = history.project_for_llm();

        // 2. Keep it under the token budget. When even the protected head
        // overflows, the vendor surfaces the error; we only note it.
        let turns = self.context.apply(turns).await?;
        let tokens = axon_context::count_messages(&turns);
        if tokens > self.context.token_budget() {
            tracing::warn!(
                tokens,
                budget = self.context.token_budget(),
                "history exceeds the token budget even after reduction"
            );
        }

        // 3. Ask the model.
        let req = ChatRequest {
            messages: turns,
            system_prompt: Some(self.system_prompt.clone()),
            tools: self.tools.clone(),
            tool_choice: ToolChoice::Auto,
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
            model: self.model.clone(),
        };
        let response = self.llm.generate(&req).await?;

        // 4. Empty response means the model has nothing left to do.
        if response.blocks.is_empty() {
            return Ok(Action::Complete {
                final_answer: String::new(),
            });
        }

        // 5. First tool call wins; else the first text block.
        if let Some(tc) = response.first_tool_call() {
            // message_user is not dispatched; it surfaces as a MessageAction
            // so external observers see it in the event stream.
            if tc.tool_name == axon_tools::builtin::control::MESSAGE_USER {
                return Ok(Action::Message {
                    content: tc.tool_input["text"].as_str().unwrap_or_default().to_owned(),
                    wait_for_response: tc.tool_input["wait_for_response"]
                        .as_bool()
                        .unwrap_or(false),
                });
            }
            let metadata = ToolCallMetadata {
                function_name: tc.tool_name.clone(),
                tool_call_id: tc.tool_call_id.clone(),
                raw_response: response.to_raw(),
                usage: Some(response.usage.clone()),
            };
            return Ok(Action::from_tool_call(
                &tc.tool_name,
                tc.tool_input.clone(),
                tc.tool_call_id.clone(),
                Some(metadata),
            ));
        }

        let text = response.first_text().unwrap_or_default().to_owned();
        if !self.completion_sentinel.is_empty()
            && text
                .to_lowercase()
                .contains(&self.completion_sentinel.to_lowercase())
        {
            return Ok(Action::Complete { final_answer: text });
        }

        Ok(Action::Message {
            content: text,
            wait_for_response: false,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Summarizer wiring
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The context manager's LLM seam, backed by the shared client.
pub struct LlmSummarizer {
    llm: Arc<LlmClient>,
    model: Option<String>,
}

impl LlmSummarizer {
    pub fn new(llm: Arc<LlmClient>, model: Option<String>) -> Self {
        Self { llm, model }
    }
}

#[async_trait::async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, conversation: &str) -> Result<String> {
        let req = ChatRequest {
            messages: vec![Message::user(format!(
                "{}\n\nCONVERSATION:\n{conversation}",
                axon_context::manager::SUMMARY_PROMPT
            ))],
            system_prompt: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::None,
            temperature: Some(0.1),
            max_tokens: 2_000,
            model: self.model.clone(),
        };
        let response = self.llm.generate(&req).await?;
        Ok(response.first_text().unwrap_or_default().to_owned())
    }
}
