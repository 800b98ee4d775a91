//! Context manager — keeps the projected history under the token budget.
//!
//! Two strategies: pure truncation (drop oldest turns on pair boundaries)
//! and LLM-assisted summarization (collapse the tail into a synthetic
//! summary turn, truncation as the failure fallback). When even the
//! protected head exceeds the budget, the head is returned verbatim so the
//! LLM client surfaces the overflow instead of the user's question being
//! silently dropped.

use std::ops::Range;
use std::sync::Arc;

use axon_domain::config::{ContextConfig, ContextStrategyName};
use axon_domain::trace::TraceEvent;
use axon_domain::{ContentPart, Message, MessageContent, Result, Role};

use crate::tokens::count_messages;

/// The LLM seam used for tail summarization. The core wires this to the
/// LLM client; tests supply a fake.
#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, conversation: &str) -> Result<String>;
}

#[derive(Clone)]
enum Strategy {
    Truncate,
    Summarize(Arc<dyn Summarizer>),
    None,
}

#[derive(Clone)]
pub struct ContextManager {
    token_budget: usize,
    keep_recent_turns: usize,
    strategy: Strategy,
}

impl ContextManager {
    pub fn new(config: &ContextConfig, summarizer: Option<Arc<dyn Summarizer>>) -> Self {
        let strategy = match config.strategy {
            ContextStrategyName::None => Strategy::None,
            ContextStrategyName::Simple => Strategy::Truncate,
            ContextStrategyName::CompactifyMemory => match summarizer {
                Some(s) => Strategy::Summarize(s),
                None => Strategy::Truncate,
            },
        };
        Self {
            token_budget: config.token_budget,
            keep_recent_turns: config.keep_recent_turns.max(1),
            strategy,
        }
    }

    pub fn truncating(token_budget: usize) -> Self {
        Self {
            token_budget,
            keep_recent_turns: 10,
            strategy: Strategy::Truncate,
        }
    }

    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Bring a projected history under the budget.
    ///
    /// Returns the input unchanged when it already fits. Otherwise applies
    /// the configured strategy; if the protected head alone exceeds the
    /// budget it is returned verbatim.
    pub async fn apply(&self, turns: Vec<Message>) -> Result<Vec<Message>> {
        if count_messages(&turns) <= self.token_budget {
            return Ok(turns);
        }
        match &self.strategy {
            Strategy::None => Ok(turns),
            Strategy::Truncate => Ok(self.truncate(turns)),
            Strategy::Summarize(summarizer) => {
                match self.summarize(summarizer.as_ref(), &turns).await {
                    Ok(summarized) => Ok(summarized),
                    Err(e) => {
                        tracing::warn!(error = %e, "summarization failed, falling back to truncation");
                        Ok(self.truncate(turns))
                    }
                }
            }
        }
    }

    // ── Truncation ─────────────────────────────────────────────────

    /// Drop the oldest droppable units until under budget: non-user units
    /// first, then user turns. Never drops the most recent user turn, the
    /// most recent assistant unit, or half of a ToolCall/ToolResult pair.
    fn truncate(&self, turns: Vec<Message>) -> Vec<Message> {
        let mut units = group_units(&turns);
        let mut kept: Vec<bool> = vec![true; units.len()];

        let last_user_unit = units
            .iter()
            .rposition(|u| turns[u.start].role == Role::User);
        let last_assistant_unit = units
            .iter()
            .rposition(|u| turns[u.start].role == Role::Assistant);

        let mut dropped_turns = 0usize;
        loop {
            if self.count_kept(&turns, &units, &kept) <= self.token_budget {
                break;
            }
            let candidate = pick_droppable(&turns, &units, &kept, last_user_unit, last_assistant_unit);
            match candidate {
                Some(idx) => {
                    dropped_turns += units[idx].len();
                    kept[idx] = false;
                }
                None => break, // only protected turns remain: return them verbatim
            }
        }

        let tokens_after = self.count_kept(&turns, &units, &kept);
        if dropped_turns > 0 {
            TraceEvent::ContextTruncated {
                turns_dropped: dropped_turns,
                tokens_after,
            }
            .emit();
        }

        let mut result = Vec::new();
        for (unit, keep) in units.drain(..).zip(kept) {
            if keep {
                result.extend(turns[unit].iter().cloned());
            }
        }
        result
    }

    fn count_kept(&self, turns: &[Message], units: &[Range<usize>], kept: &[bool]) -> usize {
        let remaining: Vec<Message> = units
            .iter()
            .zip(kept)
            .filter(|(_, keep)| **keep)
            .flat_map(|(u, _)| turns[u.clone()].iter().cloned())
            .collect();
        count_messages(&remaining)
    }

    // ── Summarization ──────────────────────────────────────────────

    async fn summarize(
        &self,
        summarizer: &dyn Summarizer,
        turns: &[Message],
    ) -> Result<Vec<Message>> {
        let units = group_units(turns);
        // Head = the most recent `keep_recent_turns` turns, extended
        // backward to a unit boundary so no pair straddles the cut.
        let mut head_start_unit = units.len();
        let mut head_turns = 0usize;
        for (idx, unit) in units.iter().enumerate().rev() {
            head_start_unit = idx;
            head_turns += unit.len();
            if head_turns >= self.keep_recent_turns {
                break;
            }
        }
        let boundary = units
            .get(head_start_unit)
            .map(|u| u.start)
            .unwrap_or(0);

        let (tail, head) = turns.split_at(boundary);
        if tail.is_empty() {
            // Nothing to collapse; hand the head back and let the client
            // surface the overflow.
            return Ok(head.to_vec());
        }

        let conversation = conversation_text(tail);
        let summary = summarizer.summarize(&conversation).await?;

        TraceEvent::ContextCompacted {
            turns_summarized: tail.len(),
            summary_chars: summary.len(),
        }
        .emit();

        let mut result = Vec::with_capacity(head.len() + 1);
        result.push(Message::user(format!(
            "Summary of the conversation so far:\n{summary}"
        )));
        result.extend(head.iter().cloned());

        // The summary itself may not be enough; fall back to truncating
        // the combined result (which protects the head's recent turns).
        if count_messages(&result) > self.token_budget {
            return Ok(self.truncate(result));
        }
        Ok(result)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Unit grouping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Group turns into droppable units: an assistant turn carrying tool calls
/// forms one unit with the tool-result turns that answer it; every other
/// turn stands alone.
fn group_units(turns: &[Message]) -> Vec<Range<usize>> {
    let mut units = Vec::new();
    let mut idx = 0;
    while idx < turns.len() {
        let start = idx;
        let has_calls = turns[idx].role == Role::Assistant
            && turns[idx]
                .content
                .parts()
                .iter()
                .any(|p| matches!(p, ContentPart::ToolUse { .. }));
        idx += 1;
        if has_calls {
            while idx < turns.len() && turns[idx].role == Role::Tool {
                idx += 1;
            }
        }
        units.push(start..idx);
    }
    units
}

fn pick_droppable(
    turns: &[Message],
    units: &[Range<usize>],
    kept: &[bool],
    last_user_unit: Option<usize>,
    last_assistant_unit: Option<usize>,
) -> Option<usize> {
    let protected = |idx: usize| {
        Some(idx) == last_user_unit
            || Some(idx) == last_assistant_unit
            || turns[units[idx].start].role == Role::System
    };
    // Oldest non-user unit first.
    for (idx, unit) in units.iter().enumerate() {
        if kept[idx] && !protected(idx) && turns[unit.start].role != Role::User {
            return Some(idx);
        }
    }
    // Then oldest user turns.
    for (idx, unit) in units.iter().enumerate() {
        if kept[idx] && !protected(idx) && turns[unit.start].role == Role::User {
            return Some(idx);
        }
    }
    None
}

/// Flatten turns into the plain text block fed to the summarizer. Long
/// entries (tool output) are trimmed head+tail to keep the prompt small.
fn conversation_text(turns: &[Message]) -> String {
    let mut buf = String::new();
    for turn in turns {
        let label = match turn.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        };
        buf.push_str(label);
        buf.push_str(": ");
        let text = match &turn.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ToolUse { name, input, .. } => {
                        format!("[calls {name} with {input}]")
                    }
                    ContentPart::ToolResult { content, .. } => content.clone(),
                    ContentPart::Image { url, .. } => format!("[image {url}]"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.len() > 2000 {
            let head_end = floor_char_boundary(&text, 1000);
            let tail_start = ceil_char_boundary(&text, text.len() - 500);
            buf.push_str(&text[..head_end]);
            buf.push_str(" [...] ");
            buf.push_str(&text[tail_start..]);
        } else {
            buf.push_str(&text);
        }
        buf.push('\n');
    }
    buf
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// The prompt sent ahead of the flattened conversation when summarizing.
pub const SUMMARY_PROMPT: &str = "You are a conversation summarizer. Summarize the following conversation \
history into a concise summary that preserves:\n\
1. The current goal or plan being worked on\n\
2. Key decisions made\n\
3. Open questions or threads\n\
4. Important facts learned about the user or context\n\
5. Tool state (files written, commands run, pending work)\n\n\
Be concise but preserve all actionable context. Write in present tense.\n\
Omit greetings and pleasantries. Focus on substance.";

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSummarizer(&'static str);

    #[async_trait::async_trait]
    impl Summarizer for FixedSummarizer {
        async fn summarize(&self, _conversation: &str) -> Result<String> {
            Ok(self.0.to_owned())
        }
    }

    struct FailingSummarizer;

    #[async_trait::async_trait]
    impl Summarizer for FailingSummarizer {
        async fn summarize(&self, _conversation: &str) -> Result<String> {
            Err(axon_domain::Error::Internal("summarizer down".into()))
        }
    }

    fn long_history(turns: usize) -> Vec<Message> {
        let mut result = Vec::new();
        for i in 0..turns {
            result.push(Message::user(format!("question {i} {}", "x".repeat(400))));
            result.push(Message::assistant(format!("answer {i} {}", "y".repeat(400))));
        }
        result
    }

    #[tokio::test]
    async fn under_budget_history_is_untouched() {
        let manager = ContextManager::truncating(100_000);
        let turns = long_history(2);
        let before = turns.len();
        let after = manager.apply(turns).await.unwrap();
        assert_eq!(after.len(), before);
    }

    #[tokio::test]
    async fn truncation_brings_history_under_budget() {
        let manager = ContextManager::truncating(500);
        let turns = long_history(20);
        let after = manager.apply(turns).await.unwrap();
        assert!(count_messages(&after) <= 500);
    }

    #[tokio::test]
    async fn truncation_keeps_last_user_turn() {
        let manager = ContextManager::truncating(300);
        let mut turns = long_history(10);
        turns.push(Message::user("the current question"));
        let after = manager.apply(turns).await.unwrap();
        let texts: Vec<String> = after
            .iter()
            .map(|m| m.content.extract_all_text())
            .collect();
        assert!(
            texts.iter().any(|t| t.contains("the current question")),
            "last user turn must survive: {texts:?}"
        );
    }

    #[tokio::test]
    async fn truncation_never_splits_pairs() {
        let manager = ContextManager::truncating(400);
        let mut turns = Vec::new();
        for i in 0..12 {
            turns.push(Message::user(format!("step {i}")));
            turns.push(Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![ContentPart::ToolUse {
                    id: format!("tc_{i}"),
                    name: "cmd_run".into(),
                    input: serde_json::json!({ "command": format!("step {i} {}", "z".repeat(200)) }),
                }]),
            });
            turns.push(Message::tool_result(format!("tc_{i}"), "ok ".repeat(100)));
        }
        let after = manager.apply(turns).await.unwrap();

        // Every surviving tool result still has its call and vice versa.
        let mut calls = std::collections::HashSet::new();
        let mut results = std::collections::HashSet::new();
        for turn in &after {
            for part in turn.content.parts() {
                match part {
                    ContentPart::ToolUse { id, .. } => {
                        calls.insert(id.clone());
                    }
                    ContentPart::ToolResult { tool_use_id, .. } => {
                        results.insert(tool_use_id.clone());
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(calls, results, "pair halves must not be separated");
    }

    #[tokio::test]
    async fn oversized_protected_head_is_returned_verbatim() {
        let manager = ContextManager::truncating(10);
        let turns = vec![Message::user("w".repeat(4000))];
        let after = manager.apply(turns.clone()).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(
            after[0].content.extract_all_text(),
            turns[0].content.extract_all_text()
        );
    }

    #[tokio::test]
    async fn summarization_replaces_tail_with_summary_turn() {
        let config = ContextConfig {
            token_budget: 2_000,
            strategy: ContextStrategyName::CompactifyMemory,
            keep_recent_turns: 4,
        };
        let manager = ContextManager::new(&config, Some(Arc::new(FixedSummarizer("the gist"))));
        let turns = long_history(30);
        let after = manager.apply(turns).await.unwrap();

        assert!(count_messages(&after) <= 2_000);
        let first = after[0].content.extract_all_text();
        assert!(first.contains("the gist"), "summary turn missing: {first}");
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_truncation() {
        let config = ContextConfig {
            token_budget: 500,
            strategy: ContextStrategyName::CompactifyMemory,
            keep_recent_turns: 4,
        };
        let manager = ContextManager::new(&config, Some(Arc::new(FailingSummarizer)));
        let after = manager.apply(long_history(20)).await.unwrap();
        assert!(count_messages(&after) <= 500);
    }

    #[tokio::test]
    async fn none_strategy_passes_through() {
        let config = ContextConfig {
            token_budget: 10,
            strategy: ContextStrategyName::None,
            keep_recent_turns: 10,
        };
        let manager = ContextManager::new(&config, None);
        let turns = long_history(5);
        let before = turns.len();
        let after = manager.apply(turns).await.unwrap();
        assert_eq!(after.len(), before);
    }

    #[test]
    fn units_group_call_with_results() {
        let turns = vec![
            Message::user("go"),
            Message {
                role: Role::Assistant,
                content: MessageContent::Parts(vec![ContentPart::ToolUse {
                    id: "tc_1".into(),
                    name: "cmd_run".into(),
                    input: serde_json::json!({}),
                }]),
            },
            Message::tool_result("tc_1", "done"),
            Message::assistant("all set"),
        ];
        let units = group_units(&turns);
        assert_eq!(units, vec![0..1, 1..3, 3..4]);
    }
}
