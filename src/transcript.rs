//! Table-mode conversation transcript and tool-error tracking.
//!
//! The transcript is the append-only record of tool activity that becomes
//! the extraction prompt's source data. Appends are budget-truncated so a
//! verbose tool cannot crowd out the rest of the run. The error streak
//! watches for a model stuck re-issuing the same failing call and aborts
//! the loop before the iteration budget burns down.

use crate::budget::truncate_utf8;

// ─── Error classification ───────────────────────────────────────────────────

/// Literal, case-sensitive markers that classify a tool result as erroring:
/// the structured error flag, the common not-found status line, and the
/// failure phrasing tools tend to use.
const ERROR_MARKERS: &[&str] = &["\"isError\":true", "404 Not Found", "failed to"];

/// True when a tool result carries one of the known error markers.
pub fn is_error_result(result: &str) -> bool {
    ERROR_MARKERS.iter().any(|marker| result.contains(marker))
}

// ─── Transcript ─────────────────────────────────────────────────────────────

/// Append-only history of tool activity for one table-mode run.
#[derive(Debug, Default)]
pub struct Transcript {
    buffer: String,
}

impl Transcript {
    pub fn new() -> Self {
        Transcript::default()
    }

    /// Append one tool result. Results longer than `truncate_at` bytes are
    /// cut on a UTF-8 boundary and annotated with the limit so the
    /// extraction model knows data is missing.
    pub fn append_tool_result(&mut self, tool: &str, result: &str, truncate_at: usize) {
        if result.len() > truncate_at {
            let prefix = truncate_utf8(result, truncate_at);
            self.buffer.push_str(&format!(
                "Tool {tool} returned (truncated to {truncate_at} chars): {prefix}...\n"
            ));
        } else {
            self.buffer
                .push_str(&format!("Tool {tool} returned: {result}\n"));
        }
    }

    /// Append one error line (placeholder rejection, failed invocation).
    pub fn append_error_line(&mut self, message: &str) {
        self.buffer.push_str(message);
        self.buffer.push('\n');
    }

    /// UTF-8-safe prefix handed to the extraction prompt.
    pub fn excerpt(&self, max_bytes: usize) -> &str {
        truncate_utf8(&self.buffer, max_bytes)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }
}

// ─── Error streak ───────────────────────────────────────────────────────────

/// Disposition of one erroring tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorRepeat {
    /// New error signature; worth recording in the transcript.
    First,
    /// Same signature as the previous error; counted but not re-recorded.
    Repeated,
    /// The streak reached the threshold; the loop should stop.
    Abort,
}

/// Tracks consecutive identical tool errors.
///
/// Two errors are "identical" when their signatures — a fixed-length UTF-8
/// prefix of the result — match. Any non-error result resets the streak.
#[derive(Debug)]
pub struct ErrorStreak {
    threshold: u32,
    signature_len: usize,
    last_signature: String,
    count: u32,
}

impl ErrorStreak {
    pub fn new(threshold: u32, signature_len: usize) -> Self {
        ErrorStreak {
            // a threshold of zero would abort runs that never erred
            threshold: threshold.max(1),
            signature_len,
            last_signature: String::new(),
            count: 0,
        }
    }

    /// Record an erroring result and classify it.
    pub fn record_error(&mut self, result: &str) -> ErrorRepeat {
        let signature = truncate_utf8(result, self.signature_len);

        if self.count > 0 && signature == self.last_signature {
            self.count += 1;
            if self.count >= self.threshold {
                return ErrorRepeat::Abort;
            }
            return ErrorRepeat::Repeated;
        }

        self.last_signature.clear();
        self.last_signature.push_str(signature);
        self.count = 1;
        if self.count >= self.threshold {
            return ErrorRepeat::Abort;
        }
        ErrorRepeat::First
    }

    /// Record a non-error result, resetting the streak.
    pub fn record_success(&mut self) {
        self.count = 0;
        self.last_signature.clear();
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
