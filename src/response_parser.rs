//! Response parsing — extracts a termination signal or a tool call from raw
//! model output.
//!
//! Two grammars, one per mode:
//!
//! 1. **Text grammar** — marker lines in plain text:
//!    ```text
//!    TOOL_CALL: tool_name
//!    ARGS: {"key": "value"}
//!    ```
//!    `DONE` anywhere terminates; a response without `TOOL_CALL:` is the
//!    final answer.
//!
//! 2. **Table grammar** — a JSON object in the response body:
//!    ```text
//!    {"tool": "tool_name", "args": {"key": "value"}}
//!    ```
//!    `DONE` anywhere terminates; a response without both `"tool"` and
//!    `"args"` keys is an unparsed miss (the loop skips it).
//!
//! Markers are matched as literal substrings. Argument objects are located
//! with the quote-aware scanner in [`crate::scan`]; none of this requires
//! well-formed JSON.

use crate::scan;

// ─── Markers ────────────────────────────────────────────────────────────────

pub(crate) const DONE_MARKER: &str = "DONE";
pub(crate) const TOOL_CALL_MARKER: &str = "TOOL_CALL:";
pub(crate) const ARGS_MARKER: &str = "ARGS:";

const TOOL_KEY: &str = "\"tool\"";
const ARGS_KEY: &str = "\"args\"";

/// Unresolved template syntax; a model echoing `{{placeholder}}` instead of
/// a real value must not reach a tool.
const PLACEHOLDER_OPEN: &str = "{{";
const PLACEHOLDER_CLOSE: &str = "}}";

// ─── Parse result ───────────────────────────────────────────────────────────

/// What one model response asks the loop to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResponse {
    /// Termination marker seen; the caller keeps the full response text.
    Done,
    /// No tool-call marker — the whole response is the final answer
    /// (text grammar only).
    Final,
    /// A tool call to dispatch. `args` is raw argument text, usually a JSON
    /// object, possibly empty when the response supplied none that balanced.
    ToolCall { name: String, args: String },
    /// Nothing recognizable (table grammar only); the loop moves on.
    Unparsed,
}

// ─── Text grammar ───────────────────────────────────────────────────────────

/// Parse a text-mode response.
///
/// Name: everything after `TOOL_CALL:` (leading spaces/newlines skipped) up
/// to the end of that line, right-trimmed. Arguments: after `ARGS:`, the
/// first balanced object; `ARGS:` absent → `{}`; `ARGS:` present with no
/// `{` after it → the rest of that line, trimmed; a `{` that never balances
/// → empty argument text.
pub fn parse_text_response(response: &str) -> ParsedResponse {
    if response.contains(DONE_MARKER) {
        return ParsedResponse::Done;
    }

    let marker = match response.find(TOOL_CALL_MARKER) {
        Some(pos) => pos,
        None => return ParsedResponse::Final,
    };

    let after = response[marker + TOOL_CALL_MARKER.len()..]
        .trim_start_matches([' ', '\n']);
    let name_end = after.find('\n').unwrap_or(after.len());
    let name = after[..name_end].trim_end().to_string();

    let args = match response.find(ARGS_MARKER) {
        None => "{}".to_string(),
        Some(args_pos) => {
            let tail = response[args_pos + ARGS_MARKER.len()..]
                .trim_start_matches([' ', '\n']);
            if tail.contains('{') {
                match scan::find_object(tail, 0) {
                    Some(range) => tail[range].to_string(),
                    // an opening brace that never balances
                    None => String::new(),
                }
            } else {
                let line_end = tail.find('\n').unwrap_or(tail.len());
                tail[..line_end].trim_end().to_string()
            }
        }
    };

    ParsedResponse::ToolCall { name, args }
}

// ─── Table grammar ──────────────────────────────────────────────────────────

/// Parse a table-mode response.
///
/// Requires both a `"tool"` and an `"args"` key somewhere in the text. Name:
/// the text between the pair of quotes following the first `"tool"`. Args:
/// the first balanced object after the first `"args"`; none balancing →
/// empty argument text (the call still dispatches).
pub fn parse_table_response(response: &str) -> ParsedResponse {
    if response.contains(DONE_MARKER) {
        return ParsedResponse::Done;
    }

    let tool_pos = match response.find(TOOL_KEY) {
        Some(pos) => pos,
        None => return ParsedResponse::Unparsed,
    };
    let args_pos = match response.find(ARGS_KEY) {
        Some(pos) => pos,
        None => return ParsedResponse::Unparsed,
    };

    // Name sits between the next two quotes after the "tool" key (the value
    // quotes, since the scan starts past the key's own closing quote).
    let after_tool = &response[tool_pos + TOOL_KEY.len()..];
    let name = match after_tool.find('"') {
        Some(q1) => {
            let rest = &after_tool[q1 + 1..];
            match rest.find('"') {
                Some(q2) => &rest[..q2],
                None => "",
            }
        }
        None => "",
    };
    if name.is_empty() {
        return ParsedResponse::Unparsed;
    }

    let args = match scan::find_object(response, args_pos + ARGS_KEY.len()) {
        Some(range) => response[range].to_string(),
        None => String::new(),
    };

    ParsedResponse::ToolCall {
        name: name.to_string(),
        args,
    }
}

// ─── Placeholder detection ──────────────────────────────────────────────────

/// True when argument text still carries `{{`/`}}` template syntax.
pub fn contains_placeholder(args: &str) -> bool {
    args.contains(PLACEHOLDER_OPEN) || args.contains(PLACEHOLDER_CLOSE)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
