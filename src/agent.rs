//! The agent: request dispatch, the per-mode iteration loops, and the
//! table-mode extraction/embedding handoff.
//!
//! Both loops share a shape — fetch the catalog once, size the chat
//! context, iterate up to the cap — but differ in what they send and how
//! they absorb faults. Text mode re-sends the full instruction prompt every
//! turn and treats a chat failure as fatal; table mode sends the prompt
//! once, continues with a bare `Continue` token, and rides out chat misses,
//! parse misses, and first-time tool errors, stopping early only when the
//! same error repeats past the configured threshold.

use rusqlite::types::Value;
use rusqlite::Connection;
use uuid::Uuid;

use crate::budget::{self, ContextBudget};
use crate::config::AgentConfig;
use crate::embeddings::{self, EmbeddingReport};
use crate::errors::AgentError;
use crate::extraction;
use crate::prompts::{self, CONTINUE_TOKEN};
use crate::providers::{ChatProvider, EmbeddingProvider, ToolProvider, VectorIndexProvider};
use crate::request::{AgentOutcome, AgentRequest, Mode};
use crate::response_parser::{contains_placeholder, ParsedResponse};
use crate::schema;
use crate::transcript::{is_error_result, ErrorRepeat, ErrorStreak, Transcript};

/// One agent instance: a database connection plus the collaborators a run
/// sequences. Borrows every collaborator mutably, so one instance serves
/// one run at a time.
pub struct Agent<'a> {
    conn: &'a Connection,
    chat: &'a mut dyn ChatProvider,
    tools: &'a mut dyn ToolProvider,
    embedder: Option<&'a mut dyn EmbeddingProvider>,
    index: Option<&'a mut dyn VectorIndexProvider>,
    config: AgentConfig,
}

impl<'a> Agent<'a> {
    pub fn new(
        conn: &'a Connection,
        chat: &'a mut dyn ChatProvider,
        tools: &'a mut dyn ToolProvider,
    ) -> Self {
        Agent {
            conn,
            chat,
            tools,
            embedder: None,
            index: None,
            config: AgentConfig::default(),
        }
    }

    /// Attach an embedding provider; without one the embedding stage is
    /// skipped entirely.
    pub fn with_embeddings(mut self, embedder: &'a mut dyn EmbeddingProvider) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Attach a vector-index provider; without one no indexes are requested.
    pub fn with_vector_index(mut self, index: &'a mut dyn VectorIndexProvider) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// Run a request built from positional SQL values (the `agent_run`
    /// surface).
    pub fn run_args(&mut self, args: &[Value]) -> Result<AgentOutcome, AgentError> {
        self.run(AgentRequest::from_args(args)?)
    }

    /// Execute one run to completion.
    pub fn run(&mut self, request: AgentRequest) -> Result<AgentOutcome, AgentError> {
        let run_id = Uuid::new_v4();
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.default_max_iterations);
        let system_prompt = request
            .system_prompt
            .as_deref()
            .filter(|p| !p.is_empty());

        tracing::info!(
            %run_id,
            goal = %request.goal,
            mode = request.mode.as_str(),
            max_iterations,
            "agent: starting run"
        );

        match &request.mode {
            Mode::TextResponse => {
                self.run_text(&request.goal, max_iterations, system_prompt)
            }
            Mode::TableExtraction { table } => {
                let table = table.clone();
                self.run_table(&request.goal, &table, max_iterations, system_prompt)
            }
        }
    }

    // ─── Text mode ──────────────────────────────────────────────────────

    fn run_text(
        &mut self,
        goal: &str,
        max_iterations: i64,
        system_prompt: Option<&str>,
    ) -> Result<AgentOutcome, AgentError> {
        let catalog = self.fetch_catalog()?;
        self.create_loop_context(&catalog)?;

        let mut final_result = String::new();

        let mut iteration = 0;
        while iteration < max_iterations {
            iteration += 1;
            tracing::debug!(iteration, max_iterations, "agent: text iteration");

            // The full instruction prompt goes out every turn; the loop
            // never relies on the collaborator remembering the catalog.
            let prompt = match system_prompt {
                Some(prompt) => prompt.to_string(),
                None => prompts::text_instructions(&catalog, goal),
            };

            let response = match self.chat.respond(&prompt) {
                Ok(Some(response)) => response,
                Ok(None) => {
                    tracing::warn!(iteration, "agent: model gave no text, ending loop");
                    break;
                }
                Err(e) => {
                    return Err(AgentError::ChatUnavailable {
                        reason: e.to_string(),
                    })
                }
            };

            match Mode::TextResponse.parse_response(&response) {
                ParsedResponse::Done => {
                    tracing::info!(iteration, "agent: model said DONE");
                    final_result = response;
                    break;
                }
                ParsedResponse::Final => {
                    tracing::info!(iteration, "agent: no tool-call marker, taking final answer");
                    final_result = response;
                    break;
                }
                ParsedResponse::ToolCall { name, args } => {
                    tracing::debug!(tool = %name, args = %args, "agent: dispatching tool");
                    match self.tools.call_tool(&name, &args) {
                        None => {
                            tracing::warn!(tool = %name, "agent: tool invocation failed, ending loop");
                            final_result =
                                format!("{{\"error\": \"Failed to execute tool {name}\"}}");
                            break;
                        }
                        Some(result) => {
                            if result.contains("\"error\"") {
                                tracing::debug!(tool = %name, "agent: tool result carries an error, continuing");
                            }
                            // the latest tool result stands as the running
                            // answer until something better arrives
                            final_result = result;
                        }
                    }
                }
                // the text grammar never produces Unparsed
                ParsedResponse::Unparsed => unreachable!(),
            }
        }

        Ok(AgentOutcome::Text(final_result))
    }

    // ─── Table mode ─────────────────────────────────────────────────────

    fn run_table(
        &mut self,
        goal: &str,
        table: &str,
        max_iterations: i64,
        system_prompt: Option<&str>,
    ) -> Result<AgentOutcome, AgentError> {
        let columns = schema::table_columns(self.conn, table)?;
        if columns.is_empty() {
            return Err(AgentError::TableUnavailable {
                table: table.to_string(),
            });
        }

        let catalog = self.fetch_catalog()?;
        let capacity = self.create_loop_context(&catalog)?;

        let schema_desc = prompts::schema_description(&columns);
        let mode = Mode::TableExtraction {
            table: table.to_string(),
        };
        let prompt = match system_prompt {
            Some(prompt) => prompt.to_string(),
            None => mode.instructions(&catalog, &schema_desc, goal),
        };

        let budget =
            ContextBudget::for_table_loop(capacity, catalog.len(), prompt.len(), max_iterations);
        tracing::debug!(
            capacity = budget.capacity,
            truncate_at = budget.truncate_at,
            "agent: table budget"
        );

        let mut transcript = Transcript::new();
        let mut streak = ErrorStreak::new(
            self.config.error_repeat_threshold,
            self.config.error_signature_len,
        );

        let mut iteration = 0;
        'iterations: while iteration < max_iterations {
            iteration += 1;
            tracing::debug!(iteration, max_iterations, "agent: table iteration");

            // Full prompt once; the persisted context carries it forward.
            let message = if iteration == 1 {
                prompt.as_str()
            } else {
                CONTINUE_TOKEN
            };

            let response = match self.chat.respond(message) {
                Ok(Some(response)) => response,
                Ok(None) => {
                    tracing::warn!(iteration, "agent: model gave no text, ending loop");
                    break;
                }
                Err(e) => {
                    tracing::warn!(iteration, error = %e, "agent: chat failed, skipping iteration");
                    continue;
                }
            };

            let (name, args) = match mode.parse_response(&response) {
                ParsedResponse::Done => {
                    tracing::info!(iteration, "agent: model said DONE");
                    break;
                }
                ParsedResponse::Unparsed => {
                    tracing::warn!(iteration, "agent: no tool object in response, continuing");
                    continue;
                }
                ParsedResponse::ToolCall { name, args } => (name, args),
                // the table grammar never produces Final
                ParsedResponse::Final => unreachable!(),
            };

            if contains_placeholder(&args) {
                tracing::warn!(tool = %name, "agent: rejecting unresolved template placeholder");
                transcript.append_error_line(&format!(
                    "ERROR: Tool args contain invalid template syntax: {}",
                    budget::truncate_utf8(&args, 200)
                ));
                continue;
            }

            tracing::debug!(tool = %name, args = %args, "agent: dispatching tool");
            let result = match self.tools.call_tool(&name, &args) {
                Some(result) => result,
                None => {
                    tracing::warn!(tool = %name, "agent: tool returned no result");
                    transcript
                        .append_error_line(&format!("ERROR: tool '{name}' returned no result"));
                    continue;
                }
            };

            if is_error_result(&result) {
                match streak.record_error(&result) {
                    ErrorRepeat::First => {
                        transcript.append_tool_result(&name, &result, budget.truncate_at);
                    }
                    ErrorRepeat::Repeated => {
                        tracing::warn!(
                            tool = %name,
                            repeats = streak.count(),
                            "agent: identical error repeated"
                        );
                    }
                    ErrorRepeat::Abort => {
                        tracing::warn!(
                            tool = %name,
                            repeats = streak.count(),
                            "agent: aborting loop on repeated identical errors"
                        );
                        break 'iterations;
                    }
                }
            } else {
                streak.record_success();
                transcript.append_tool_result(&name, &result, budget.truncate_at);
            }
        }

        tracing::info!(
            transcript_len = transcript.len(),
            "agent: loop finished, extracting"
        );

        let rows_inserted = extraction::extract_and_insert(
            self.conn,
            self.chat,
            table,
            &columns,
            &transcript,
            &self.config,
        )?;

        let has_embedding_targets = columns.iter().any(|c| c.is_embedding_target);
        if has_embedding_targets && rows_inserted > 0 {
            if let Some(embedder) = self.embedder.as_deref_mut() {
                let report: EmbeddingReport = embeddings::run_embedding_stage(
                    self.conn,
                    self.chat,
                    embedder,
                    self.index.as_deref_mut(),
                    table,
                    &columns,
                    &self.config,
                );
                tracing::info!(
                    rows_embedded = report.rows_embedded,
                    indexes_built = report.indexes_built,
                    "agent: embedding stage finished"
                );
            } else {
                tracing::debug!("agent: no embedding provider, skipping embedding stage");
            }
        }

        Ok(AgentOutcome::RowsInserted(rows_inserted))
    }

    // ─── Shared steps ───────────────────────────────────────────────────

    /// Fetch the tool catalog, the first external touch of every run.
    fn fetch_catalog(&mut self) -> Result<String, AgentError> {
        let raw = self.tools.list_tools().ok_or(AgentError::NotConnected)?;
        let catalog = prompts::catalog_description(&raw);
        tracing::debug!(catalog_len = catalog.len(), "agent: tool catalog fetched");
        Ok(catalog)
    }

    /// Size and create the chat context for the loop; returns the capacity
    /// actually requested.
    fn create_loop_context(&mut self, catalog: &str) -> Result<usize, AgentError> {
        let capacity = budget::effective_capacity(self.chat.context_size(), catalog.len());
        self.chat
            .create_context(capacity)
            .map_err(|e| AgentError::ContextCreationFailed {
                capacity,
                reason: e.to_string(),
            })?;
        Ok(capacity)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
