//! Collaborator traits: the seams between the orchestration core and the
//! systems it sequences.
//!
//! The core never performs inference, tool transport, or index construction
//! itself — it drives these four interfaces. All calls are blocking
//! round-trips on the caller's thread; no timeouts are enforced here, so a
//! stalled collaborator stalls the run. Every trait is taken by `&mut` for
//! the duration of a run: a single provider instance cannot serve two
//! concurrent runs without external synchronization.

use crate::errors::ProviderError;

/// Distance metric requested when building a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distance {
    Cosine,
    L2,
    Dot,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "cosine",
            Distance::L2 => "l2",
            Distance::Dot => "dot",
        }
    }
}

/// Conversational language-model collaborator.
///
/// The provider owns the conversation state ("context"): turn history
/// persists across `respond` calls until the context is re-created. The core
/// only controls the context's byte capacity.
pub trait ChatProvider {
    /// Create the chat context, or resize it to `capacity` bytes. May no-op
    /// when the existing capacity already suffices.
    fn create_context(&mut self, capacity: usize) -> Result<(), ProviderError>;

    /// Capacity of the current context in bytes; 0 when none exists.
    fn context_size(&self) -> usize;

    /// Send one prompt and return the model's reply. `Ok(None)` means the
    /// model produced no text, which is not an error.
    fn respond(&mut self, prompt: &str) -> Result<Option<String>, ProviderError>;
}

/// Tool-invocation collaborator (e.g. an MCP session).
///
/// Both operations signal failure with `None` rather than an error type:
/// the distinction between "transport broke" and "no session" lives inside
/// the provider, and the loop reacts the same way to either.
pub trait ToolProvider {
    /// Formatted catalog of callable tools, or `None` when no session is
    /// established.
    fn list_tools(&mut self) -> Option<String>;

    /// Invoke a tool with a JSON argument string. `None` signals the call
    /// did not complete; a returned string may still describe a tool-level
    /// error in its own payload.
    fn call_tool(&mut self, name: &str, args_json: &str) -> Option<String>;
}

/// Embedding-generation collaborator.
pub trait EmbeddingProvider {
    /// Create the embedding context from an options string
    /// (e.g. `embedding_type=FLOAT32`).
    fn create_context(&mut self, options: &str) -> Result<(), ProviderError>;

    /// Embed one text and return the raw vector blob.
    fn generate(&mut self, text: &str) -> Result<Vec<u8>, ProviderError>;

    /// Embedding dimensionality of the loaded model; 0 when unknown.
    fn dimension(&self) -> usize;
}

/// Vector-index construction collaborator.
pub trait VectorIndexProvider {
    /// Build (or rebuild) an index over `table.column` with the given
    /// dimensionality and distance metric.
    fn build_index(
        &mut self,
        table: &str,
        column: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<(), ProviderError>;
}
