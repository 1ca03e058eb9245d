//! Extraction of typed rows from the table-mode transcript, and their
//! all-or-nothing insertion.
//!
//! One further chat call turns the gathered tool output into a JSON array of
//! objects keyed by column name. The response is not trusted to be
//! well-formed: by default the object scanner pulls out whatever balanced
//! objects it can find, and per-column value lookup is a substring search
//! inside each object's span. `strict_extraction_json` switches the whole
//! response over to serde parsing for callers that want malformed output
//! rejected instead of salvaged.
//!
//! Insertion is a single transaction. One bad row discards the whole batch.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use crate::budget;
use crate::config::AgentConfig;
use crate::errors::AgentError;
use crate::prompts;
use crate::providers::ChatProvider;
use crate::scan::{self, ObjectScanner};
use crate::schema::{quote_ident, ColumnSpec, SqlType};
use crate::transcript::Transcript;

/// Run the extraction call and insert the resulting rows into `table`.
///
/// Returns the number of rows committed; zero rows is a success. Chat
/// failure or an empty response is `ExtractionFailed`; any row failing to
/// insert rolls the whole batch back as `InsertionFailed`.
pub fn extract_and_insert(
    conn: &Connection,
    chat: &mut dyn ChatProvider,
    table: &str,
    columns: &[ColumnSpec],
    transcript: &Transcript,
    config: &AgentConfig,
) -> Result<usize, AgentError> {
    let schema_desc = prompts::schema_description(columns);
    let prompt = prompts::extraction_instructions(
        &schema_desc,
        transcript.excerpt(config.history_excerpt_limit),
    );

    // Fresh context for the extraction turn, reusing the collaborator's
    // reported capacity. The original ignored failures here, so a refusal
    // only costs us the recreate, not the run.
    let capacity = chat.context_size().max(budget::MIN_CONTEXT_CAPACITY);
    if let Err(e) = chat.create_context(capacity) {
        tracing::warn!(capacity, error = %e, "extraction: context recreate failed, continuing");
    }

    let response = match chat.respond(&prompt) {
        Ok(Some(response)) => response,
        Ok(None) => {
            return Err(AgentError::ExtractionFailed {
                reason: "model produced no extraction response".to_string(),
            })
        }
        Err(e) => {
            return Err(AgentError::ExtractionFailed {
                reason: format!("chat provider failed: {e}"),
            })
        }
    };

    tracing::debug!(response_len = response.len(), "extraction: model response received");

    let rows = if config.strict_extraction_json {
        parse_rows_strict(&response, columns)?
    } else {
        parse_rows_tolerant(&response, columns)
    };

    insert_rows(conn, table, columns, &rows)
}

// ─── Row parsing ────────────────────────────────────────────────────────────

/// One extracted row: values for the non-embedding columns, in declaration
/// order.
type ExtractedRow = Vec<Value>;

/// Scan the response for balanced objects; each yields one row.
fn parse_rows_tolerant(response: &str, columns: &[ColumnSpec]) -> Vec<ExtractedRow> {
    ObjectScanner::new(response)
        .map(|object| {
            columns
                .iter()
                .filter(|c| !c.is_embedding_target)
                .map(|column| column_value(object, column))
                .collect()
        })
        .collect()
}

/// Strict path: the outermost `[...]` span must parse as a JSON array of
/// objects.
fn parse_rows_strict(
    response: &str,
    columns: &[ColumnSpec],
) -> Result<Vec<ExtractedRow>, AgentError> {
    let start = response.find('[').ok_or_else(|| AgentError::ExtractionFailed {
        reason: "strict mode: no JSON array in extraction response".to_string(),
    })?;
    let end = response.rfind(']').ok_or_else(|| AgentError::ExtractionFailed {
        reason: "strict mode: unterminated JSON array in extraction response".to_string(),
    })?;
    if end < start {
        return Err(AgentError::ExtractionFailed {
            reason: "strict mode: malformed JSON array span".to_string(),
        });
    }

    let objects: Vec<serde_json::Map<String, serde_json::Value>> =
        serde_json::from_str(&response[start..=end]).map_err(|e| {
            AgentError::ExtractionFailed {
                reason: format!("strict mode: extraction response is not a JSON array of objects: {e}"),
            }
        })?;

    Ok(objects
        .iter()
        .map(|object| {
            columns
                .iter()
                .filter(|c| !c.is_embedding_target)
                .map(|column| json_value(object.get(&column.name), column.sql_type))
                .collect()
        })
        .collect())
}

/// Bind a serde value under the column's storage class (strict path).
fn json_value(value: Option<&serde_json::Value>, sql_type: SqlType) -> Value {
    let Some(value) = value else {
        return Value::Null;
    };
    match (sql_type, value) {
        (_, serde_json::Value::Null) => Value::Null,
        (SqlType::Integer, serde_json::Value::Number(n)) => {
            n.as_i64().map(Value::Integer).unwrap_or(Value::Null)
        }
        (SqlType::Integer, serde_json::Value::String(s)) => {
            parse_leading_i64(s).map(Value::Integer).unwrap_or(Value::Null)
        }
        (SqlType::Real, serde_json::Value::Number(n)) => {
            n.as_f64().map(Value::Real).unwrap_or(Value::Null)
        }
        (SqlType::Real, serde_json::Value::String(s)) => {
            parse_leading_f64(s).map(Value::Real).unwrap_or(Value::Null)
        }
        (SqlType::Text | SqlType::Blob, serde_json::Value::String(s)) => Value::Text(s.clone()),
        _ => Value::Null,
    }
}

/// Locate and type one column's value inside an object's span.
///
/// The key is `"name"` followed by optional spaces/tabs and a colon; absence
/// or the literal `null` bind SQL null. Numeric columns accept bare or
/// quoted numerals (leading-prefix parse, so `"123abc"` binds 123);
/// unparseable numerals bind null. Text and non-embedding blob columns
/// accept a quoted string with standard escapes decoded; anything else
/// binds null.
fn column_value(object: &str, column: &ColumnSpec) -> Value {
    let key = format!("\"{}\"", column.name);
    let Some(key_pos) = object.find(&key) else {
        return Value::Null;
    };

    let after_key = &object[key_pos + key.len()..];
    let trimmed = after_key.trim_start_matches([' ', '\t']);
    let Some(rest) = trimmed.strip_prefix(':') else {
        return Value::Null;
    };
    let value_text = rest.trim_start_matches([' ', '\t']);

    if value_text.starts_with("null") {
        return Value::Null;
    }

    match column.sql_type {
        SqlType::Integer => numeral(value_text)
            .and_then(|n| parse_leading_i64(&n))
            .map(Value::Integer)
            .unwrap_or(Value::Null),
        SqlType::Real => numeral(value_text)
            .and_then(|n| parse_leading_f64(&n))
            .map(Value::Real)
            .unwrap_or(Value::Null),
        SqlType::Text | SqlType::Blob => {
            if value_text.starts_with('"') {
                scan::read_quoted(value_text, 0)
                    .map(|(content, _)| Value::Text(content))
                    .unwrap_or(Value::Null)
            } else {
                Value::Null
            }
        }
    }
}

/// The numeral text for an integer/real value: the quoted content when the
/// value is quoted, otherwise the raw tail (the leading-prefix parsers stop
/// at the first non-numeric byte).
fn numeral(value_text: &str) -> Option<String> {
    if value_text.starts_with('"') {
        scan::read_quoted(value_text, 0).map(|(content, _)| content)
    } else {
        Some(value_text.to_string())
    }
}

/// Parse the longest leading integer, `atoll`-style. No digits → `None`.
fn parse_leading_i64(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    s[..end].parse().ok()
}

/// Parse the longest leading decimal number, `atof`-style.
fn parse_leading_f64(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    // optional exponent: e/E, optional sign, at least one digit
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }
    s[..end].parse().ok()
}

// ─── Insertion ──────────────────────────────────────────────────────────────

/// Insert every row inside one transaction. A single failure rolls the
/// whole batch back.
fn insert_rows(
    conn: &Connection,
    table: &str,
    columns: &[ColumnSpec],
    rows: &[ExtractedRow],
) -> Result<usize, AgentError> {
    if rows.is_empty() {
        tracing::info!(table, "extraction: no objects found, nothing to insert");
        return Ok(0);
    }

    let insert_columns: Vec<&ColumnSpec> = columns
        .iter()
        .filter(|c| !c.is_embedding_target)
        .collect();

    let column_list = insert_columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let value_list = vec!["?"; insert_columns.len()].join(", ");
    let insert_sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list,
        value_list
    );

    let tx = conn.unchecked_transaction()?;
    let mut inserted = 0usize;
    {
        let mut stmt = tx.prepare(&insert_sql).map_err(|e| AgentError::InsertionFailed {
            reason: format!("failed to prepare insert: {e}"),
        })?;

        for row in rows {
            stmt.execute(params_from_iter(row.iter()))
                .map_err(|e| AgentError::InsertionFailed {
                    reason: format!("row {}: {e}", inserted + 1),
                })?;
            inserted += 1;
        }
    }
    // dropping the transaction without this rolls the batch back
    tx.commit()?;

    tracing::info!(table, rows = inserted, "extraction: batch committed");
    Ok(inserted)
}

// ─── Tests ──────────────────────────────────────────────────────────────────
