//! Context and truncation budgets for the agent loop.
//!
//! All sizes are measured in bytes of prompt text. Collaborators map bytes
//! to tokens internally; sizing on bytes overestimates for English prose,
//! which is the safe direction — the loop degrades by truncating tool
//! results earlier, never by overflowing the context.

// ─── Constants ──────────────────────────────────────────────────────────────

/// Smallest context capacity ever requested from the chat collaborator.
pub const MIN_CONTEXT_CAPACITY: usize = 4096;

/// The generated system prompt embeds the tool catalog once and the model
/// tends to echo tool schemas back, so the context must hold the catalog
/// roughly twice.
const CATALOG_CAPACITY_FACTOR: usize = 2;

/// Bytes reserved for the extraction prompt's rule block and headers, which
/// share the context with the conversation history at the end of a table run.
const EXTRACTION_PROMPT_OVERHEAD: usize = 2000;

/// Slack left unbudgeted to absorb formatting added around tool results.
const SAFETY_MARGIN: usize = 1024;

/// Floor for the space assumed available to tool results, even when the
/// catalog and prompt nominally consume the whole context. Small contexts
/// truncate aggressively instead of refusing to run.
const MIN_CONVERSATION_SPACE: usize = 8192;

/// Per-tool-result truncation bounds. The lower bound keeps at least one
/// meaningful page of a result; the upper bound stops a single verbose tool
/// from monopolizing the conversation history.
const MIN_TRUNCATE_AT: usize = 4096;
const MAX_TRUNCATE_AT: usize = 50_000;

// ─── Capacity ───────────────────────────────────────────────────────────────

/// Capacity the tool catalog alone demands of the chat context.
pub fn required_capacity(catalog_len: usize) -> usize {
    MIN_CONTEXT_CAPACITY.max(catalog_len * CATALOG_CAPACITY_FACTOR)
}

/// Capacity actually requested at loop start: never shrink a context the
/// collaborator already holds, never request less than the catalog demands.
pub fn effective_capacity(existing: usize, catalog_len: usize) -> usize {
    existing.max(required_capacity(catalog_len))
}

// ─── Table-loop budget ──────────────────────────────────────────────────────

/// Byte budget for one table-mode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
    /// Effective chat-context capacity for this run.
    pub capacity: usize,
    /// Hard per-tool-result truncation limit for history appends.
    pub truncate_at: usize,
}

impl ContextBudget {
    /// Size the per-result truncation limit so that roughly every second
    /// iteration can land a full-size tool result in the space left after
    /// the catalog, system prompt, extraction overhead, and safety margin.
    ///
    /// `truncate_at` is non-increasing in `max_iterations` and always lies
    /// in `[MIN_TRUNCATE_AT, MAX_TRUNCATE_AT]`.
    pub fn for_table_loop(
        capacity: usize,
        catalog_len: usize,
        prompt_len: usize,
        max_iterations: i64,
    ) -> ContextBudget {
        let mut available = capacity
            .saturating_sub(catalog_len)
            .saturating_sub(prompt_len)
            .saturating_sub(EXTRACTION_PROMPT_OVERHEAD)
            .saturating_sub(SAFETY_MARGIN);
        if available < MIN_CONVERSATION_SPACE {
            available = MIN_CONVERSATION_SPACE;
        }

        // Expect a tool result every other iteration; a non-positive cap
        // still budgets for one round.
        let rounds = ((max_iterations + 1) / 2).max(1) as usize;

        let truncate_at = (available / rounds).clamp(MIN_TRUNCATE_AT, MAX_TRUNCATE_AT);

        ContextBudget {
            capacity,
            truncate_at,
        }
    }
}

// ─── UTF-8 Safe Truncation ──────────────────────────────────────────────────

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char boundary.
///
/// Returns a `&str` that is always valid UTF-8 and at most `max_bytes` long.
/// If the byte at `max_bytes` is inside a multi-byte character, the slice is
/// shortened to the preceding character boundary.
pub(crate) fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    // Walk backward to find a valid char boundary
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ─── Tests ──────────────────────────────────────────────────────────────────
