//! Agent error types.
//!
//! `AgentError` is the fatal taxonomy surfaced to callers. Conditions the
//! loop recovers from on its own (parse misses, placeholder rejections,
//! repeated tool errors, per-column embedding failures) never appear here —
//! they are logged and absorbed by the iteration state machine.

use thiserror::Error;

/// Errors that terminate an agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Bad arity, a null/empty goal, or an argument of an unsupported type.
    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// The tool provider has no active session, so no catalog is available.
    #[error("not connected: no tool session is established")]
    NotConnected,

    /// The chat collaborator could not create or resize its context.
    #[error("failed to create chat context ({capacity} bytes): {reason}")]
    ContextCreationFailed { capacity: usize, reason: String },

    /// The chat collaborator failed outright in text mode.
    #[error("chat provider unavailable: {reason}")]
    ChatUnavailable { reason: String },

    /// The target table does not exist or declares no columns.
    #[error("table '{table}' does not exist or has no columns")]
    TableUnavailable { table: String },

    /// The extraction call produced no usable response.
    #[error("extraction failed: {reason}")]
    ExtractionFailed { reason: String },

    /// A row failed to insert; the whole batch was rolled back.
    #[error("row insertion failed: {reason}")]
    InsertionFailed { reason: String },

    /// Storage operation failed.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// Configuration could not be parsed.
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl From<rusqlite::Error> for AgentError {
    fn from(e: rusqlite::Error) -> Self {
        AgentError::Database {
            reason: e.to_string(),
        }
    }
}

/// Error reported by an external collaborator (chat, tools, embeddings,
/// vector index). Opaque to the core: it is logged or folded into the
/// fatal taxonomy at the call site, never inspected.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ProviderError(String);

impl ProviderError {
    pub fn new(reason: impl Into<String>) -> Self {
        ProviderError(reason.into())
    }
}

impl From<String> for ProviderError {
    fn from(reason: String) -> Self {
        ProviderError(reason)
    }
}

impl From<&str> for ProviderError {
    fn from(reason: &str) -> Self {
        ProviderError(reason.to_string())
    }
}
