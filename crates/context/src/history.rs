//! Message history — the LLM-facing projection of a session's event log.
//!
//! The event log is the source of truth; the history is rebuilt from it
//! lazily before each LLM call. Projection enforces the vendor constraints:
//! no orphaned tool calls or tool results, no progress turns, spacing
//! between consecutive user turns, at most one system turn at the head.

use std::collections::HashSet;

use axon_domain::{
    Action, ContentPart, Event, Message, MessageContent, Observation, Payload, Role,
};

/// An ordered list of turns, each turn one role's contribution.
#[derive(Debug, Clone, Default)]
pub struct MessageHistory {
    turns: Vec<Message>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Message>) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> &[Message] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a user turn. Attached file paths are listed after the text so
    /// the model can reference them.
    pub fn append_user(&mut self, text: &str, files: &[String]) {
        let content = if files.is_empty() {
            text.to_owned()
        } else {
            let listing: Vec<String> = files.iter().map(|f| format!("[attached: {f}]")).collect();
            format!("{text}\n{}", listing.join("\n"))
        };
        self.turns.push(Message::user(content));
    }

    /// Append an assistant turn of one or more blocks.
    pub fn append_assistant(&mut self, blocks: Vec<ContentPart>) {
        self.turns.push(Message {
            role: Role::Assistant,
            content: MessageContent::Parts(blocks),
        });
    }

    /// Append a tool-result turn answering `tool_call_id`.
    pub fn append_tool_result(&mut self, tool_call_id: &str, content: &str, is_error: bool) {
        self.turns
            .push(Message::tool_result_with(tool_call_id, content, is_error));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Discard turns from (and including) the most recent user turn.
    pub fn clear_from_last_user(&mut self) {
        if let Some(idx) = self.turns.iter().rposition(|m| m.role == Role::User) {
            self.turns.truncate(idx);
        }
    }

    /// The filtered, vendor-agnostic message list.
    pub fn project_for_llm(&self) -> Vec<Message> {
        project_turns(&self.turns)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event-stream projection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rebuild the message history from an event log.
///
/// Mapping: user-message observations become user turns; agent messages and
/// completions become assistant text turns; runnable actions become
/// assistant tool-use blocks (merged into a preceding assistant turn when
/// possible); tool results become tool turns. Hidden events and progress
/// observations are skipped.
pub fn project_events(events: &[Event]) -> MessageHistory {
    let mut turns: Vec<Message> = Vec::new();

    for event in events {
        if event.hidden {
            continue;
        }
        match &event.payload {
            Payload::Observation(obs) => match obs {
                Observation::UserMessage { content, files } => {
                    let mut history = MessageHistory::from_turns(std::mem::take(&mut turns));
                    history.append_user(content, files);
                    turns = history.turns;
                }
                Observation::AgentStateChanged { .. } | Observation::RuntimeError { .. } => {}
                Observation::Interruption { .. } => {
                    // No tool_call_id to answer; the matching call is
                    // filtered as an orphan during projection.
                }
                other => {
                    if let Some(call_id) = other.tool_call_id() {
                        turns.push(Message::tool_result_with(
                            call_id,
                            other.content(),
                            !other.success(),
                        ));
                    }
                }
            },
            Payload::Action(action) => match action {
                Action::Message { content, .. } => {
                    turns.push(Message::assistant(content.clone()));
                }
                Action::Complete { final_answer } => {
                    if !final_answer.is_empty() {
                        turns.push(Message::assistant(final_answer.clone()));
                    }
                }
                runnable => {
                    let Some(invocation) = runnable.as_tool_call() else {
                        continue;
                    };
                    let block = ContentPart::ToolUse {
                        id: invocation.tool_call_id,
                        name: invocation.tool_name,
                        input: invocation.tool_input,
                    };
                    // Merge into the previous assistant turn when it is one,
                    // so text + tool use form a single assistant message.
                    match turns.last_mut() {
                        Some(Message {
                            role: Role::Assistant,
                            content,
                        }) => match content {
                            MessageContent::Parts(parts) => parts.push(block),
                            MessageContent::Text(text) => {
                                let mut parts = Vec::new();
                                if !text.is_empty() {
                                    parts.push(ContentPart::Text { text: std::mem::take(text) });
                                }
                                parts.push(block);
                                *content = MessageContent::Parts(parts);
                            }
                        },
                        _ => turns.push(Message {
                            role: Role::Assistant,
                            content: MessageContent::Parts(vec![block]),
                        }),
                    }
                }
            },
        }
    }

    MessageHistory::from_turns(turns)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Projection filters
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn tool_use_ids(message: &Message) -> Vec<&str> {
    message
        .content
        .parts()
        .iter()
        .filter_map(|p| match p {
            ContentPart::ToolUse { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

fn tool_result_id(message: &Message) -> Option<&str> {
    if message.role != Role::Tool {
        return None;
    }
    message.content.parts().iter().find_map(|p| match p {
        ContentPart::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
        _ => None,
    })
}

fn is_blank(message: &Message) -> bool {
    match &message.content {
        MessageContent::Text(t) => t.trim().is_empty(),
        MessageContent::Parts(parts) => parts.is_empty(),
    }
}

/// Apply the projection rules to a turn list. Idempotent.
pub fn project_turns(turns: &[Message]) -> Vec<Message> {
    // Pass 1: collect call and result ids for orphan detection.
    let mut call_ids: HashSet<String> = HashSet::new();
    let mut result_ids: HashSet<String> = HashSet::new();
    for turn in turns {
        if turn.role == Role::Assistant {
            call_ids.extend(tool_use_ids(turn).into_iter().map(str::to_owned));
        }
        if let Some(id) = tool_result_id(turn) {
            result_ids.insert(id.to_owned());
        }
    }

    // Pass 2: rebuild, dropping orphans, blanks, and stray system turns.
    let mut projected: Vec<Message> = Vec::new();
    for (idx, turn) in turns.iter().enumerate() {
        match turn.role {
            Role::System => {
                // At most one system turn, and only at the head.
                if idx == 0 {
                    projected.push(turn.clone());
                }
            }
            Role::Tool => {
                let matched = tool_result_id(turn).is_some_and(|id| call_ids.contains(id));
                if matched {
                    projected.push(turn.clone());
                }
            }
            Role::Assistant => {
                let filtered: Vec<ContentPart> = turn
                    .content
                    .parts()
                    .iter()
                    .filter(|p| match p {
                        ContentPart::ToolUse { id, .. } => result_ids.contains(id),
                        _ => true,
                    })
                    .cloned()
                    .collect();
                match &turn.content {
                    MessageContent::Text(_) => {
                        if !is_blank(turn) {
                            projected.push(turn.clone());
                        }
                    }
                    MessageContent::Parts(_) => {
                        if !filtered.is_empty() {
                            projected.push(Message {
                                role: Role::Assistant,
                                content: MessageContent::Parts(filtered),
                            });
                        }
                    }
                }
            }
            Role::User => {
                let mut cloned = turn.clone();
                // Blank spacing between two consecutive user turns.
                if projected.last().map(|m| m.role) == Some(Role::User) {
                    if let MessageContent::Text(text) = &cloned.content {
                        if !text.starts_with("\n\n") {
                            cloned.content = MessageContent::Text(format!("\n\n{text}"));
                        }
                    }
                }
                if !is_blank(&cloned) {
                    projected.push(cloned);
                }
            }
        }
    }
    projected
}
