//! Context size management for conversation history.
//!
//! - [`estimate_tokens`]: cheap character-weighted token estimate
//! - [`compress_history`]: emergency compression after a context-overflow error
//! - [`split_for_summary`] / [`build_summary_prompt`]: inputs for background
//!   summarization
//!
//! These are pure functions over `Message` lists; callers own the I/O.

use crate::session::{Message, Role};

/// Fixed per-message overhead (role markers, separators).
pub const MESSAGE_OVERHEAD_TOKENS: f64 = 4.0;

const ASCII_CHAR_TOKENS: f64 = 0.25;
const WIDE_CHAR_TOKENS: f64 = 1.5;

fn weigh(text: &str) -> f64 {
    text.chars()
        .map(|c| {
            if c.is_ascii() {
                ASCII_CHAR_TOKENS
            } else {
                WIDE_CHAR_TOKENS
            }
        })
        .sum()
}

/// Estimate the token count of a message list.
///
/// Each message costs a fixed overhead plus 0.25 per ASCII character and 1.5
/// per non-ASCII character of its content and tool-call arguments. The sum is
/// truncated to an integer. This decides when to summarize; it is not a
/// tokenizer.
///
/// # Examples
/// ```
/// use attoclaw::agent::compaction::estimate_tokens;
/// use attoclaw::session::Message;
///
/// assert_eq!(estimate_tokens(&[]), 0);
/// assert_eq!(estimate_tokens(&[Message::user("Hello World!")]), 7);
/// assert_eq!(estimate_tokens(&[Message::user("你好世界")]), 10);
/// ```
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let total: f64 = messages
        .iter()
        .map(|msg| {
            let args: f64 = msg
                .tool_calls
                .iter()
                .flatten()
                .map(|call| weigh(&call.arguments))
                .sum();
            MESSAGE_OVERHEAD_TOKENS + weigh(&msg.content) + args
        })
        .sum();
    total as usize
}

/// Drop roughly the middle half of a conversation.
///
/// The first message (earliest context) and the newest half are kept. The
/// cut never lands inside a tool-call group: a kept tail never starts with
/// tool results whose request was dropped. A leading message that requests
/// tools is dropped with the middle, since its results go with it.
///
/// Returns the compressed list and how many messages were removed. Lists too
/// short to have a middle come back unchanged with a count of zero.
///
/// # Examples
/// ```
/// use attoclaw::agent::compaction::compress_history;
/// use attoclaw::session::Message;
///
/// let history: Vec<Message> = (0..8).map(|i| Message::user(&format!("m{}", i))).collect();
/// let (compressed, dropped) = compress_history(history);
/// assert_eq!(dropped, 3);
/// assert_eq!(compressed[0].content, "m0");
/// assert_eq!(compressed.last().unwrap().content, "m7");
/// ```
pub fn compress_history(messages: Vec<Message>) -> (Vec<Message>, usize) {
    let len = messages.len();
    if len < 3 {
        return (messages, 0);
    }

    // Everything between the first and the last message.
    let middle = len - 2;
    let mut cut = 1 + middle / 2;

    // Move past tool results whose request would be dropped; if that eats
    // the whole tail, move back to the request instead.
    let mut forward = cut;
    while forward < len && messages[forward].role == Role::Tool {
        forward += 1;
    }
    if forward < len {
        cut = forward;
    } else {
        while cut > 1 && !messages[cut].has_tool_calls() {
            cut -= 1;
        }
    }

    let keep_first = !messages[0].has_tool_calls();
    if messages[cut].role == Role::Tool || (cut <= 1 && keep_first) {
        return (messages, 0);
    }

    let before = len;
    let mut iter = messages.into_iter();
    let first = iter.next();
    let mut compressed: Vec<Message> = Vec::with_capacity(len - cut + 1);
    if keep_first {
        compressed.extend(first);
    }
    compressed.extend(iter.skip(cut - 1));

    let dropped = before - compressed.len();
    (compressed, dropped)
}

/// Index at which to split `messages` into "summarize" and "keep verbatim".
///
/// Keeps the last `keep_recent` messages, widened so the kept part never
/// starts with orphaned tool results. Returns `None` when there is nothing
/// worth summarizing.
pub fn split_for_summary(messages: &[Message], keep_recent: usize) -> Option<usize> {
    if messages.len() <= keep_recent {
        return None;
    }
    let mut split = messages.len() - keep_recent;
    while split > 0 && split < messages.len() && messages[split].role == Role::Tool {
        split -= 1;
    }
    (split > 0).then_some(split)
}

/// Build the prompt asking the model to condense `messages`.
///
/// A previous summary, if any, is folded in so older context is not lost.
///
/// # Examples
/// ```
/// use attoclaw::agent::compaction::build_summary_prompt;
/// use attoclaw::session::Message;
///
/// let msgs = vec![Message::user("Hello"), Message::assistant("Hi there!")];
/// let prompt = build_summary_prompt(None, &msgs);
/// assert!(prompt.contains("user: Hello"));
/// assert!(prompt.contains("assistant: Hi there!"));
/// ```
pub fn build_summary_prompt(previous: Option<&str>, messages: &[Message]) -> String {
    let mut transcript = String::new();
    for msg in messages {
        match msg.role {
            Role::Tool => transcript.push_str(&format!("tool result: {}\n", msg.content)),
            _ if msg.has_tool_calls() => {
                let names: Vec<&str> = msg
                    .tool_calls
                    .iter()
                    .flatten()
                    .map(|c| c.name.as_str())
                    .collect();
                transcript.push_str(&format!(
                    "{}: {} [called tools: {}]\n",
                    msg.role,
                    msg.content,
                    names.join(", ")
                ));
            }
            _ => transcript.push_str(&format!("{}: {}\n", msg.role, msg.content)),
        }
    }

    let mut prompt = String::from(
        "Summarize the following conversation focusing on key decisions, \
         information exchanged, and actions taken. Be concise.",
    );
    if let Some(previous) = previous.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\nExisting summary to extend:\n");
        prompt.push_str(previous);
    }
    prompt.push_str("\n\nConversation:\n");
    prompt.push_str(&transcript);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ToolCall;

    fn users(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(&format!("m{}", i))).collect()
    }

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "search", r#"{"q":"x"}"#)
    }

    // ── estimate_tokens ────────────────────────────────────────────────

    #[test]
    fn test_estimate_tokens_examples() {
        assert_eq!(estimate_tokens(&[]), 0);
        assert_eq!(estimate_tokens(&[Message::user("Hello World!")]), 7);
        assert_eq!(estimate_tokens(&[Message::user("你好世界")]), 10);
        assert_eq!(estimate_tokens(&[Message::user("Hello 你好")]), 8);
        assert_eq!(
            estimate_tokens(&[Message::user("test"), Message::user("test")]),
            10
        );
    }

    #[test]
    fn test_estimate_tokens_counts_tool_arguments() {
        let msg = Message::assistant_with_tools(
            "",
            vec![ToolCall::new(
                "c1",
                "web_search",
                r#"{"query":"openclaw","count":10}"#,
            )],
        );
        // 4 + 31 * 0.25 = 11.75
        assert_eq!(estimate_tokens(&[msg]), 11);
    }

    #[test]
    fn test_estimate_tokens_additive() {
        let a = vec![Message::user("abcdefgh")];
        let b = vec![Message::assistant("12345678")];
        let both: Vec<Message> = a.iter().chain(b.iter()).cloned().collect();
        assert_eq!(
            estimate_tokens(&both),
            estimate_tokens(&a) + estimate_tokens(&b)
        );
    }

    // ── compress_history ───────────────────────────────────────────────

    #[test]
    fn test_compress_short_history_unchanged() {
        let (out, dropped) = compress_history(users(2));
        assert_eq!(out.len(), 2);
        assert_eq!(dropped, 0);
    }

    #[test]
    fn test_compress_drops_middle_half() {
        let (out, dropped) = compress_history(users(7));
        // middle = 5, cut at 1 + 2 → keep m0 + m3..m6
        assert_eq!(dropped, 2);
        let contents: Vec<&str> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m0", "m3", "m4", "m5", "m6"]);
    }

    #[test]
    fn test_compress_skips_orphaned_tool_results() {
        let history = vec![
            Message::user("m0"),
            Message::user("m1"),
            Message::assistant_with_tools("", vec![call("a"), call("b")]),
            Message::tool_result("a", "ra"),
            Message::tool_result("b", "rb"),
            Message::assistant("done"),
            Message::user("m6"),
        ];
        let (out, dropped) = compress_history(history);
        assert!(dropped > 0);
        assert!(out.iter().all(|m| m.role != Role::Tool || m.tool_call_id.is_some()));
        // The kept tail never starts with a tool result.
        assert_ne!(out[1].role, Role::Tool);
        assert_eq!(out.last().unwrap().content, "m6");
    }

    #[test]
    fn test_compress_backs_up_to_request_when_tail_is_results() {
        let history = vec![
            Message::user("m0"),
            Message::user("m1"),
            Message::assistant_with_tools("", vec![call("a"), call("b"), call("c"), call("d")]),
            Message::tool_result("a", "ra"),
            Message::tool_result("b", "rb"),
            Message::tool_result("c", "rc"),
            Message::tool_result("d", "rd"),
        ];
        let (out, dropped) = compress_history(history);
        assert_eq!(dropped, 1);
        assert_eq!(out[0].content, "m0");
        assert!(out[1].has_tool_calls());
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_compress_never_starts_with_orphaned_results() {
        let history = vec![
            Message::assistant_with_tools("", vec![call("a"), call("b")]),
            Message::tool_result("a", "ra"),
            Message::tool_result("b", "rb"),
        ];
        let (out, dropped) = compress_history(history);
        assert_eq!(dropped, 0);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_compress_drops_leading_tool_request() {
        let history = vec![
            Message::assistant_with_tools("", vec![call("a")]),
            Message::tool_result("a", "ra"),
            Message::user("m2"),
            Message::assistant("m3"),
            Message::user("m4"),
        ];
        let (out, _) = compress_history(history);
        assert!(!out[0].has_tool_calls());
        assert_ne!(out[0].role, Role::Tool);
    }

    // ── split_for_summary ──────────────────────────────────────────────

    #[test]
    fn test_split_for_summary() {
        assert_eq!(split_for_summary(&users(4), 4), None);
        assert_eq!(split_for_summary(&users(10), 4), Some(6));
    }

    #[test]
    fn test_split_for_summary_keeps_tool_group_together() {
        let history = vec![
            Message::user("m0"),
            Message::user("m1"),
            Message::assistant_with_tools("", vec![call("a")]),
            Message::tool_result("a", "ra"),
            Message::assistant("m4"),
        ];
        // Keeping 2 would start at the tool result; widen to the request.
        assert_eq!(split_for_summary(&history, 2), Some(2));
    }

    // ── build_summary_prompt ───────────────────────────────────────────

    #[test]
    fn test_build_summary_prompt_includes_previous_summary() {
        let prompt = build_summary_prompt(Some("User likes tea."), &users(1));
        assert!(prompt.contains("Existing summary"));
        assert!(prompt.contains("User likes tea."));
        assert!(prompt.contains("user: m0"));
    }

    #[test]
    fn test_build_summary_prompt_names_called_tools() {
        let msgs = vec![
            Message::assistant_with_tools("checking", vec![call("a")]),
            Message::tool_result("a", "42"),
        ];
        let prompt = build_summary_prompt(None, &msgs);
        assert!(prompt.contains("[called tools: search]"));
        assert!(prompt.contains("tool result: 42"));
        assert!(!prompt.contains("Existing summary"));
    }
}
