//! Agent configuration loading and defaults.
//!
//! Every tunable has a serde default, so `AgentConfig::default()` (or an
//! empty YAML document) reproduces the stock behavior. Hosts embedding the
//! crate can carry the config in their own files; `from_yaml_str` resolves
//! `${VAR}` / `${VAR:-default}` environment references before parsing.

use serde::Deserialize;

use crate::errors::AgentError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime tunables for the agent loop, extraction, and embedding stages.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Iteration cap applied when a request leaves `max_iterations` unset.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: i64,

    /// Consecutive identical tool errors that abort the table-mode loop.
    #[serde(default = "default_error_repeat_threshold")]
    pub error_repeat_threshold: u32,

    /// Bytes of an erroring tool result compared when deciding whether two
    /// consecutive errors are "identical".
    #[serde(default = "default_error_signature_len")]
    pub error_signature_len: usize,

    /// Maximum bytes of conversation history handed to the extraction call.
    #[serde(default = "default_history_excerpt_limit")]
    pub history_excerpt_limit: usize,

    /// When `true`, the extraction response must parse as a well-formed JSON
    /// array of objects. Off by default: models routinely wrap or truncate
    /// their output, and the tolerant object scanner recovers those rows.
    #[serde(default)]
    pub strict_extraction_json: bool,

    /// Options string passed to `EmbeddingProvider::create_context`.
    #[serde(default = "default_embedding_options")]
    pub embedding_options: String,
}

fn default_max_iterations() -> i64 {
    5
}
fn default_error_repeat_threshold() -> u32 {
    3
}
fn default_error_signature_len() -> usize {
    200
}
fn default_history_excerpt_limit() -> usize {
    6000
}
fn default_embedding_options() -> String {
    "embedding_type=FLOAT32".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            default_max_iterations: default_max_iterations(),
            error_repeat_threshold: default_error_repeat_threshold(),
            error_signature_len: default_error_signature_len(),
            history_excerpt_limit: default_history_excerpt_limit(),
            strict_extraction_json: false,
            embedding_options: default_embedding_options(),
        }
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl AgentConfig {
    /// Parse a YAML document, resolving `${VAR}` and `${VAR:-default}`
    /// environment references in the raw text first.
    pub fn from_yaml_str(raw: &str) -> Result<Self, AgentError> {
        let interpolated = interpolate_env_vars(raw);
        serde_yaml::from_str(&interpolated).map_err(|e| AgentError::Config {
            reason: format!("failed to parse agent config: {e}"),
        })
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
