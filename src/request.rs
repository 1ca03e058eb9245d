//! Request parsing, mode selection, and run outcomes.
//!
//! A run's mode is decided once, here, from the shape of the arguments:
//! a second positional argument that is an integer sets the iteration cap
//! and leaves no table targeted; text names the extraction target. The
//! `Mode` enum then carries both the instruction template and the parsing
//! grammar for the whole run.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::prompts;
use crate::response_parser::{self, ParsedResponse};

// ─── Mode ───────────────────────────────────────────────────────────────────

/// The two operating variants of the agent loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Free-text answer via the `TOOL_CALL:`/`ARGS:`/`DONE` marker grammar.
    TextResponse,
    /// Typed-row extraction into `table` via the JSON tool-object grammar.
    TableExtraction { table: String },
}

impl Mode {
    /// Parse one model response with this mode's grammar.
    pub fn parse_response(&self, response: &str) -> ParsedResponse {
        match self {
            Mode::TextResponse => response_parser::parse_text_response(response),
            Mode::TableExtraction { .. } => response_parser::parse_table_response(response),
        }
    }

    /// Render this mode's instruction prompt. `schema` is only consulted in
    /// table mode.
    pub fn instructions(&self, catalog: &str, schema: &str, goal: &str) -> String {
        match self {
            Mode::TextResponse => prompts::text_instructions(catalog, goal),
            Mode::TableExtraction { .. } => prompts::table_instructions(catalog, schema, goal),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::TextResponse => "text",
            Mode::TableExtraction { .. } => "table",
        }
    }
}

// ─── Request ────────────────────────────────────────────────────────────────

/// One agent invocation: what to do, where to put it, how long to try.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub goal: String,
    pub mode: Mode,
    /// Iteration cap; the config default applies when unset.
    pub max_iterations: Option<i64>,
    /// Verbatim replacement for the generated instruction prompt. An empty
    /// string is treated as absent.
    pub system_prompt: Option<String>,
}

impl AgentRequest {
    /// A text-mode request.
    pub fn text(goal: impl Into<String>) -> Self {
        AgentRequest {
            goal: goal.into(),
            mode: Mode::TextResponse,
            max_iterations: None,
            system_prompt: None,
        }
    }

    /// A table-mode request targeting `table`.
    pub fn table(goal: impl Into<String>, table: impl Into<String>) -> Self {
        AgentRequest {
            goal: goal.into(),
            mode: Mode::TableExtraction {
                table: table.into(),
            },
            max_iterations: None,
            system_prompt: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: i64) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Build a request from positional SQL values, the shapes being
    /// `(goal)`, `(goal, max_iterations)`, `(goal, table)`,
    /// `(goal, table, max_iterations)`, and
    /// `(goal, table, max_iterations, system_prompt)`.
    ///
    /// The second argument classifies by type: an integer is the iteration
    /// cap (no table targeted), text is the table name — so `(goal, 5)` and
    /// `(goal, "5")` route to different modes. An empty or null table name
    /// means no table.
    pub fn from_args(args: &[Value]) -> Result<Self, AgentError> {
        if args.is_empty() || args.len() > 4 {
            return Err(AgentError::InvalidArguments {
                reason: format!(
                    "expected 1-4 arguments (goal, [table_name], [max_iterations], \
                     [system_prompt]), got {}",
                    args.len()
                ),
            });
        }

        let goal = match &args[0] {
            Value::Text(goal) if !goal.is_empty() => goal.clone(),
            Value::Text(_) | Value::Null => {
                return Err(AgentError::InvalidArguments {
                    reason: "goal must be non-empty text".to_string(),
                })
            }
            other => {
                return Err(AgentError::InvalidArguments {
                    reason: format!("goal must be text, got {other:?}"),
                })
            }
        };

        let mut table: Option<String> = None;
        let mut max_iterations: Option<i64> = None;

        if let Some(second) = args.get(1) {
            match second {
                Value::Integer(cap) => max_iterations = Some(*cap),
                Value::Text(name) if name.is_empty() => {}
                Value::Text(name) => table = Some(name.clone()),
                Value::Null => {}
                other => {
                    return Err(AgentError::InvalidArguments {
                        reason: format!(
                            "second argument must be a table name or an iteration cap, \
                             got {other:?}"
                        ),
                    })
                }
            }
        }

        if let Some(third) = args.get(2) {
            match third {
                Value::Integer(cap) => max_iterations = Some(*cap),
                other => {
                    return Err(AgentError::InvalidArguments {
                        reason: format!("max_iterations must be an integer, got {other:?}"),
                    })
                }
            }
        }

        let system_prompt = match args.get(3) {
            None | Some(Value::Null) => None,
            Some(Value::Text(prompt)) if prompt.is_empty() => None,
            Some(Value::Text(prompt)) => Some(prompt.clone()),
            Some(other) => {
                return Err(AgentError::InvalidArguments {
                    reason: format!("system_prompt must be text, got {other:?}"),
                })
            }
        };

        let mode = match table {
            Some(table) => Mode::TableExtraction { table },
            None => Mode::TextResponse,
        };

        Ok(AgentRequest {
            goal,
            mode,
            max_iterations,
            system_prompt,
        })
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

/// The run's terminal result: free text, or the number of rows committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentOutcome {
    Text(String),
    RowsInserted(usize),
}

impl AgentOutcome {
    /// The text result, if this was a text-mode run.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AgentOutcome::Text(text) => Some(text),
            AgentOutcome::RowsInserted(_) => None,
        }
    }

    /// The committed row count, if this was a table-mode run.
    pub fn rows_inserted(&self) -> Option<usize> {
        match self {
            AgentOutcome::Text(_) => None,
            AgentOutcome::RowsInserted(count) => Some(*count),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Value {
        Value::Text(s.to_string())
    }

    #[test]
    fn test_goal_only_is_text_mode() {
        let request = AgentRequest::from_args(&[text("summarize the repo")]).unwrap();
        assert_eq!(request.mode, Mode::TextResponse);
        assert_eq!(request.goal, "summarize the repo");
        assert_eq!(request.max_iterations, None);
        assert_eq!(request.system_prompt, None);
    }

    #[test]
    fn test_integer_second_arg_is_iteration_cap() {
        let request = AgentRequest::from_args(&[text("g"), Value::Integer(5)]).unwrap();
        assert_eq!(request.mode, Mode::TextResponse);
        assert_eq!(request.max_iterations, Some(5));
    }

    #[test]
    fn test_text_second_arg_is_table_even_when_numeric_looking() {
        // `(goal, "5")` targets a table literally named "5"; `(goal, 5)`
        // caps iterations. The two shapes must route to different modes.
        let as_table = AgentRequest::from_args(&[text("g"), text("5")]).unwrap();
        assert_eq!(
            as_table.mode,
            Mode::TableExtraction {
                table: "5".to_string()
            }
        );
        assert_eq!(as_table.max_iterations, None);

        let as_cap = AgentRequest::from_args(&[text("g"), Value::Integer(5)]).unwrap();
        assert_eq!(as_cap.mode, Mode::TextResponse);
        assert_eq!(as_cap.max_iterations, Some(5));
    }

    #[test]
    fn test_empty_or_null_table_name_means_no_table() {
        let empty = AgentRequest::from_args(&[text("g"), text("")]).unwrap();
        assert_eq!(empty.mode, Mode::TextResponse);
        let null = AgentRequest::from_args(&[text("g"), Value::Null]).unwrap();
        assert_eq!(null.mode, Mode::TextResponse);
    }

    #[test]
    fn test_four_argument_shape() {
        let request = AgentRequest::from_args(&[
            text("collect listings"),
            text("listings"),
            Value::Integer(8),
            text("custom prompt"),
        ])
        .unwrap();
        assert_eq!(
            request.mode,
            Mode::TableExtraction {
                table: "listings".to_string()
            }
        );
        assert_eq!(request.max_iterations, Some(8));
        assert_eq!(request.system_prompt.as_deref(), Some("custom prompt"));
    }

    #[test]
    fn test_empty_system_prompt_is_absent() {
        let request = AgentRequest::from_args(&[
            text("g"),
            text("t"),
            Value::Integer(3),
            text(""),
        ])
        .unwrap();
        assert_eq!(request.system_prompt, None);
    }

    #[test]
    fn test_bad_arity_rejected() {
        assert!(matches!(
            AgentRequest::from_args(&[]),
            Err(AgentError::InvalidArguments { .. })
        ));
        let five = vec![text("g"), text("t"), Value::Integer(1), text("p"), text("x")];
        assert!(matches!(
            AgentRequest::from_args(&five),
            Err(AgentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_null_or_empty_goal_rejected() {
        assert!(matches!(
            AgentRequest::from_args(&[Value::Null]),
            Err(AgentError::InvalidArguments { .. })
        ));
        assert!(matches!(
            AgentRequest::from_args(&[text("")]),
            Err(AgentError::InvalidArguments { .. })
        ));
        assert!(matches!(
            AgentRequest::from_args(&[Value::Integer(1)]),
            Err(AgentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_real_or_blob_second_arg_rejected() {
        assert!(matches!(
            AgentRequest::from_args(&[text("g"), Value::Real(2.0)]),
            Err(AgentError::InvalidArguments { .. })
        ));
        assert!(matches!(
            AgentRequest::from_args(&[text("g"), Value::Blob(vec![1])]),
            Err(AgentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_non_integer_third_arg_rejected() {
        assert!(matches!(
            AgentRequest::from_args(&[text("g"), text("t"), text("3")]),
            Err(AgentError::InvalidArguments { .. })
        ));
        assert!(matches!(
            AgentRequest::from_args(&[text("g"), text("t"), Value::Null]),
            Err(AgentError::InvalidArguments { .. })
        ));
    }

    #[test]
    fn test_builders() {
        let request = AgentRequest::table("g", "items")
            .with_max_iterations(7)
            .with_system_prompt("p");
        assert_eq!(
            request.mode,
            Mode::TableExtraction {
                table: "items".to_string()
            }
        );
        assert_eq!(request.max_iterations, Some(7));
        assert_eq!(request.system_prompt.as_deref(), Some("p"));
    }

    #[test]
    fn test_mode_dispatches_grammars() {
        let table_mode = Mode::TableExtraction {
            table: "t".to_string(),
        };
        // prose with no tool object: final answer in text mode, a miss in
        // table mode
        assert_eq!(
            Mode::TextResponse.parse_response("just words"),
            ParsedResponse::Final
        );
        assert_eq!(
            table_mode.parse_response("just words"),
            ParsedResponse::Unparsed
        );
    }

    #[test]
    fn test_mode_instruction_templates() {
        let table_mode = Mode::TableExtraction {
            table: "t".to_string(),
        };
        let text_prompt = Mode::TextResponse.instructions("catalog", "", "goal");
        assert!(text_prompt.contains("TOOL_CALL:"));
        let table_prompt = table_mode.instructions("catalog", "Table columns:\n", "goal");
        assert!(table_prompt.contains("{\"tool\": \"tool_name\""));
    }
}
