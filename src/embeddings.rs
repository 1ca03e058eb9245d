//! Embedding population and vector-index construction after a committed
//! table-mode batch.
//!
//! Every step here is best-effort: the rows are already committed, so a
//! chat miss, a generation failure, or an index refusal costs a column, not
//! the run. The model picks which text columns feed each embedding column;
//! its answer is validated against the real schema before any SQL is built.

use rusqlite::{params, Connection};

use crate::config::AgentConfig;
use crate::prompts;
use crate::providers::{ChatProvider, Distance, EmbeddingProvider, VectorIndexProvider};
use crate::schema::{quote_ident, ColumnSpec, SqlType};

/// What the embedding stage accomplished, for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingReport {
    /// Rows whose null embedding was filled, summed over all columns.
    pub rows_embedded: usize,
    /// Vector indexes successfully built.
    pub indexes_built: usize,
}

/// Fill null embedding columns and request per-column vector indexes.
///
/// Never fails: per-column problems are logged and skipped.
pub fn run_embedding_stage(
    conn: &Connection,
    chat: &mut dyn ChatProvider,
    embedder: &mut dyn EmbeddingProvider,
    mut index: Option<&mut (dyn VectorIndexProvider + '_)>,
    table: &str,
    columns: &[ColumnSpec],
    config: &AgentConfig,
) -> EmbeddingReport {
    let mut report = EmbeddingReport::default();

    let embedding_columns: Vec<&ColumnSpec> =
        columns.iter().filter(|c| c.is_embedding_target).collect();
    if embedding_columns.is_empty() {
        return report;
    }

    if let Err(e) = embedder.create_context(&config.embedding_options) {
        tracing::warn!(
            options = %config.embedding_options,
            error = %e,
            "embeddings: context creation failed, attempting generation anyway"
        );
    }

    for embedding_column in &embedding_columns {
        match embed_column(conn, chat, embedder, table, columns, embedding_column) {
            Ok(rows) => {
                tracing::info!(table, column = %embedding_column.name, rows, "embeddings: column populated");
                report.rows_embedded += rows;
            }
            Err(reason) => {
                tracing::warn!(table, column = %embedding_column.name, %reason, "embeddings: column skipped");
            }
        }
    }

    let dimension = embedder.dimension();
    if dimension == 0 {
        tracing::warn!(table, "embeddings: dimension unknown, skipping vector indexes");
        return report;
    }

    if let Some(index) = index.as_deref_mut() {
        for embedding_column in &embedding_columns {
            match index.build_index(table, &embedding_column.name, dimension, Distance::Cosine) {
                Ok(()) => {
                    tracing::info!(table, column = %embedding_column.name, dimension, "embeddings: vector index built");
                    report.indexes_built += 1;
                }
                Err(e) => {
                    tracing::warn!(table, column = %embedding_column.name, error = %e, "embeddings: index build failed");
                }
            }
        }
    }

    report
}

/// Populate one embedding column over its still-null rows.
///
/// Returns the number of rows updated, or a skip reason.
fn embed_column(
    conn: &Connection,
    chat: &mut dyn ChatProvider,
    embedder: &mut dyn EmbeddingProvider,
    table: &str,
    columns: &[ColumnSpec],
    embedding_column: &ColumnSpec,
) -> Result<usize, String> {
    let text_columns: Vec<&str> = columns
        .iter()
        .filter(|c| !c.is_embedding_target && c.sql_type == SqlType::Text)
        .map(|c| c.name.as_str())
        .collect();
    if text_columns.is_empty() {
        return Err("no text columns available as embedding sources".to_string());
    }

    let prompt = prompts::embedding_source_prompt(&text_columns.join(", "), &embedding_column.name);
    let answer = match chat.respond(&prompt) {
        Ok(Some(answer)) => answer,
        Ok(None) => return Err("model gave no source-column answer".to_string()),
        Err(e) => return Err(format!("chat provider failed: {e}")),
    };

    // Comma-separated column names; anything not in the schema is dropped.
    let selected: Vec<&str> = answer
        .split(',')
        .map(str::trim)
        .filter(|name| columns.iter().any(|c| c.name == *name))
        .collect();
    if selected.is_empty() {
        return Err(format!("no valid source columns in model answer {answer:?}"));
    }

    tracing::debug!(column = %embedding_column.name, sources = ?selected, "embeddings: source mapping");

    // Null-coalesced concatenation of the selected columns, restricted to
    // rows still missing their embedding so re-running is a no-op.
    let concat = selected
        .iter()
        .map(|name| format!("COALESCE({}, '')", quote_ident(name)))
        .collect::<Vec<_>>()
        .join(" || ' | ' || ");
    let select_sql = format!(
        "SELECT rowid, {concat} FROM {} WHERE {} IS NULL",
        quote_ident(table),
        quote_ident(&embedding_column.name)
    );
    let update_sql = format!(
        "UPDATE {} SET {} = ?1 WHERE rowid = ?2",
        quote_ident(table),
        quote_ident(&embedding_column.name)
    );

    let pending: Vec<(i64, String)> = (|| -> Result<_, rusqlite::Error> {
        let mut stmt = conn.prepare(&select_sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect()
    })()
    .map_err(|e| format!("source query failed: {e}"))?;

    let mut updated = 0usize;
    for (rowid, source_text) in pending {
        let blob = embedder
            .generate(&source_text)
            .map_err(|e| format!("generation failed at rowid {rowid}: {e}"))?;
        conn.execute(&update_sql, params![blob, rowid])
            .map_err(|e| format!("update failed at rowid {rowid}: {e}"))?;
        updated += 1;
    }

    Ok(updated)
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use crate::schema::table_columns;
    use std::collections::VecDeque;

    struct ScriptedChat {
        replies: VecDeque<Result<Option<String>, ProviderError>>,
    }

    impl ScriptedChat {
        fn answering(answers: &[&str]) -> Self {
            ScriptedChat {
                replies: answers
                    .iter()
                    .map(|a| Ok(Some(a.to_string())))
                    .collect(),
            }
        }
    }

    impl ChatProvider for ScriptedChat {
        fn create_context(&mut self, _capacity: usize) -> Result<(), ProviderError> {
            Ok(())
        }

        fn context_size(&self) -> usize {
            0
        }

        fn respond(&mut self, _prompt: &str) -> Result<Option<String>, ProviderError> {
            self.replies.pop_front().unwrap_or(Ok(None))
        }
    }

    struct FakeEmbedder {
        dimension: usize,
        generated: Vec<String>,
    }

    impl FakeEmbedder {
        fn new(dimension: usize) -> Self {
            FakeEmbedder {
                dimension,
                generated: Vec::new(),
            }
        }
    }

    impl EmbeddingProvider for FakeEmbedder {
        fn create_context(&mut self, _options: &str) -> Result<(), ProviderError> {
            Ok(())
        }

        fn generate(&mut self, text: &str) -> Result<Vec<u8>, ProviderError> {
            self.generated.push(text.to_string());
            Ok(vec![1, 2, 3, 4])
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        built: Vec<(String, String, usize, Distance)>,
        fail_on: Option<String>,
    }

    impl VectorIndexProvider for FakeIndex {
        fn build_index(
            &mut self,
            table: &str,
            column: &str,
            dimension: usize,
            distance: Distance,
        ) -> Result<(), ProviderError> {
            if self.fail_on.as_deref() == Some(column) {
                return Err(ProviderError::new("index backend refused"));
            }
            self.built
                .push((table.to_string(), column.to_string(), dimension, distance));
            Ok(())
        }
    }

    fn docs_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE docs (id INTEGER, title TEXT, body TEXT, embedding BLOB);
             INSERT INTO docs (id, title, body) VALUES
               (1, 'First', 'alpha'),
               (2, 'Second', 'beta');",
        )
        .unwrap();
        conn
    }

    fn run(
        conn: &Connection,
        chat: &mut ScriptedChat,
        embedder: &mut FakeEmbedder,
        index: Option<&mut dyn VectorIndexProvider>,
    ) -> EmbeddingReport {
        let columns = table_columns(conn, "docs").unwrap();
        run_embedding_stage(
            conn,
            chat,
            embedder,
            index,
            "docs",
            &columns,
            &AgentConfig::default(),
        )
    }

    #[test]
    fn test_fills_null_embeddings_and_builds_index() {
        let conn = docs_db();
        let mut chat = ScriptedChat::answering(&["title, body"]);
        let mut embedder = FakeEmbedder::new(384);
        let mut index = FakeIndex::default();

        let report = run(&conn, &mut chat, &mut embedder, Some(&mut index));
        assert_eq!(report.rows_embedded, 2);
        assert_eq!(report.indexes_built, 1);

        // concatenation uses the selected columns joined with " | "
        assert_eq!(embedder.generated, vec!["First | alpha", "Second | beta"]);

        let null_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM docs WHERE embedding IS NULL", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(null_count, 0);

        assert_eq!(
            index.built,
            vec![("docs".to_string(), "embedding".to_string(), 384, Distance::Cosine)]
        );
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let conn = docs_db();
        let mut embedder = FakeEmbedder::new(384);

        let mut chat = ScriptedChat::answering(&["title"]);
        let first = run(&conn, &mut chat, &mut embedder, None);
        assert_eq!(first.rows_embedded, 2);

        // no null embeddings left: the second pass updates nothing
        let mut chat = ScriptedChat::answering(&["title"]);
        let second = run(&conn, &mut chat, &mut embedder, None);
        assert_eq!(second.rows_embedded, 0);
        assert_eq!(embedder.generated.len(), 2);
    }

    #[test]
    fn test_unknown_source_columns_dropped() {
        let conn = docs_db();
        let mut chat = ScriptedChat::answering(&["title, nonexistent, body"]);
        let mut embedder = FakeEmbedder::new(8);

        let report = run(&conn, &mut chat, &mut embedder, None);
        assert_eq!(report.rows_embedded, 2);
        assert_eq!(embedder.generated[0], "First | alpha");
    }

    #[test]
    fn test_all_unknown_columns_skips_column() {
        let conn = docs_db();
        let mut chat = ScriptedChat::answering(&["made_up, also_fake"]);
        let mut embedder = FakeEmbedder::new(8);

        let report = run(&conn, &mut chat, &mut embedder, None);
        assert_eq!(report.rows_embedded, 0);
    }

    #[test]
    fn test_chat_failure_skips_column_not_run() {
        let conn = docs_db();
        let mut chat = ScriptedChat {
            replies: VecDeque::from([Err(ProviderError::new("down"))]),
        };
        let mut embedder = FakeEmbedder::new(8);
        let mut index = FakeIndex::default();

        // the column is skipped but the index request still goes out
        let report = run(&conn, &mut chat, &mut embedder, Some(&mut index));
        assert_eq!(report.rows_embedded, 0);
        assert_eq!(report.indexes_built, 1);
    }

    #[test]
    fn test_zero_dimension_skips_indexes() {
        let conn = docs_db();
        let mut chat = ScriptedChat::answering(&["title"]);
        let mut embedder = FakeEmbedder::new(0);
        let mut index = FakeIndex::default();

        let report = run(&conn, &mut chat, &mut embedder, Some(&mut index));
        assert_eq!(report.rows_embedded, 2);
        assert_eq!(report.indexes_built, 0);
        assert!(index.built.is_empty());
    }

    #[test]
    fn test_index_failure_does_not_stop_other_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE docs (
                id INTEGER, title TEXT,
                embedding BLOB, title_embedding BLOB
            );
             INSERT INTO docs (id, title) VALUES (1, 'One');",
        )
        .unwrap();
        let columns = table_columns(&conn, "docs").unwrap();

        let mut chat = ScriptedChat::answering(&["title", "title"]);
        let mut embedder = FakeEmbedder::new(16);
        let mut index = FakeIndex {
            fail_on: Some("embedding".to_string()),
            ..FakeIndex::default()
        };

        let report = run_embedding_stage(
            &conn,
            &mut chat,
            &mut embedder,
            Some(&mut index),
            "docs",
            &columns,
            &AgentConfig::default(),
        );
        assert_eq!(report.rows_embedded, 2);
        assert_eq!(report.indexes_built, 1);
        assert_eq!(index.built[0].1, "title_embedding");
    }

    #[test]
    fn test_no_embedding_columns_is_a_noop() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE plain (id INTEGER, title TEXT)")
            .unwrap();
        let columns = table_columns(&conn, "plain").unwrap();

        let mut chat = ScriptedChat::answering(&[]);
        let mut embedder = FakeEmbedder::new(8);
        let report = run_embedding_stage(
            &conn,
            &mut chat,
            &mut embedder,
            None,
            "plain",
            &columns,
            &AgentConfig::default(),
        );
        assert_eq!(report, EmbeddingReport::default());
    }
}
