//! In-database agent orchestration core.
//!
//! Given a natural-language goal, this crate drives an iterative
//! "think → call a tool → observe" loop against a chat provider and a tool
//! provider, then either returns free text or converts the gathered
//! transcript into typed rows inserted into a caller-supplied SQLite table,
//! optionally followed by embedding generation and vector-index
//! construction.
//!
//! The crate performs no inference, tool transport, or index building
//! itself; those collaborators are traits the caller implements (see
//! [`providers`]). Everything runs synchronously on the calling thread, and
//! every collaborator is borrowed mutably for the duration of a run —
//! callers wanting concurrency supply distinct provider instances and
//! database connections per run.
//!
//! ```no_run
//! # use rusqlite::Connection;
//! # use sqlite_agent::{Agent, AgentRequest};
//! # fn demo(
//! #     chat: &mut dyn sqlite_agent::ChatProvider,
//! #     tools: &mut dyn sqlite_agent::ToolProvider,
//! # ) -> Result<(), sqlite_agent::AgentError> {
//! let conn = Connection::open_in_memory()?;
//! let outcome = Agent::new(&conn, chat, tools)
//!     .run(AgentRequest::table("collect open issues", "issues"))?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod budget;
pub mod config;
pub mod embeddings;
pub mod errors;
pub mod extraction;
pub mod prompts;
pub mod providers;
pub mod request;
pub mod response_parser;
pub mod scan;
pub mod schema;
pub mod transcript;

pub use agent::Agent;
pub use config::AgentConfig;
pub use embeddings::EmbeddingReport;
pub use errors::{AgentError, ProviderError};
pub use providers::{
    ChatProvider, Distance, EmbeddingProvider, ToolProvider, VectorIndexProvider,
};
pub use request::{AgentOutcome, AgentRequest, Mode};
pub use response_parser::ParsedResponse;
pub use schema::{ColumnSpec, SqlType};

/// Crate version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
