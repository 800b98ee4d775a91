//! Token estimation for messages and histories.
//!
//! Character-based approximation (1 token ≈ 4 characters) with a small
//! per-message overhead for role framing. The context manager only compares
//! the result against a budget, so relative accuracy is what matters.

use axon_domain::{ContentPart, Message, MessageContent};

/// Approximate per-message framing overhead, in characters.
const MESSAGE_OVERHEAD_CHARS: usize = 8;
/// Approximate per-conversation overhead, in characters.
const CONVERSATION_OVERHEAD_CHARS: usize = 16;

fn block_chars(part: &ContentPart) -> usize {
    match part {
        ContentPart::Text { text } => text.len(),
        ContentPart::ToolUse { id, name, input } => {
            id.len() + name.len() + input.to_string().len()
        }
        ContentPart::ToolResult {
            tool_use_id,
            content,
            ..
        } => tool_use_id.len() + content.len(),
        ContentPart::Image { url, .. } => url.len(),
    }
}

fn message_chars(message: &Message) -> usize {
    let content = match &message.content {
        MessageContent::Text(t) => t.len(),
        MessageContent::Parts(parts) => parts.iter().map(block_chars).sum(),
    };
    MESSAGE_OVERHEAD_CHARS + content
}

fn to_tokens(chars: usize) -> usize {
    // Ceiling division; rounding up keeps the estimate conservative.
    (chars + 3) / 4
}

/// Estimated token count of a single content block.
pub fn count_block(part: &ContentPart) -> usize {
    to_tokens(block_chars(part))
}

/// Estimated token count of a single message.
pub fn count_message(message: &Message) -> usize {
    to_tokens(message_chars(message))
}

/// Estimated token count of a full message list.
pub fn count_messages(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }
    let chars: usize =
        messages.iter().map(message_chars).sum::<usize>() + CONVERSATION_OVERHEAD_CHARS;
    to_tokens(chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_counts_zero() {
        assert_eq!(count_messages(&[]), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let messages = vec![Message::user("hello"), Message::assistant("world")];
        assert_eq!(count_messages(&messages), count_messages(&messages));
    }

    #[test]
    fn longer_content_counts_more() {
        let short = vec![Message::user("hi")];
        let long = vec![Message::user("hi ".repeat(500))];
        assert!(count_messages(&long) > count_messages(&short));
    }

    #[test]
    fn tool_use_blocks_are_counted() {
        let part = ContentPart::ToolUse {
            id: "tc_1".into(),
            name: "cmd_run".into(),
            input: serde_json::json!({ "command": "echo hello world" }),
        };
        assert!(count_block(&part) > 0);
    }

    #[test]
    fn four_chars_approximate_one_token() {
        let msg = Message::user("a".repeat(4000));
        let tokens = count_message(&msg);
        // 4000 chars + 8 overhead → just over 1000 tokens.
        assert!((1000..1010).contains(&tokens), "got {tokens}");
    }
}
