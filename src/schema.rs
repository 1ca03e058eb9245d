//! Target-table schema introspection.
//!
//! Read once per table run; the resulting `ColumnSpec` list drives prompt
//! rendering, extraction binding, and embedding-column detection.

use rusqlite::Connection;

use crate::errors::AgentError;

/// Storage class a column binds with during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Real,
    Text,
    Blob,
}

impl SqlType {
    /// Map a declared column type to its binding class. `INTEGER`, `REAL`,
    /// and `BLOB` match case-insensitively; every other declaration
    /// (`TEXT`, `VARCHAR(40)`, none at all) binds as text.
    fn from_decl(decl: &str) -> SqlType {
        if decl.eq_ignore_ascii_case("INTEGER") {
            SqlType::Integer
        } else if decl.eq_ignore_ascii_case("REAL") {
            SqlType::Real
        } else if decl.eq_ignore_ascii_case("BLOB") {
            SqlType::Blob
        } else {
            SqlType::Text
        }
    }
}

/// One column of the target table.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    /// Declared type as written in the schema, used verbatim in prompts.
    pub decl_type: String,
    pub sql_type: SqlType,
    /// BLOB column named `embedding` or ending in `_embedding`: filled by
    /// the embedding stage, excluded from extraction and prompts.
    pub is_embedding_target: bool,
}

/// Read the target table's columns in declaration order.
///
/// An empty result means the table does not exist or declares no columns —
/// the caller decides whether that is fatal.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<ColumnSpec>, AgentError> {
    let mut stmt =
        conn.prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, decl_type) = row?;
        let sql_type = SqlType::from_decl(&decl_type);
        let is_embedding_target = sql_type == SqlType::Blob
            && (name == "embedding" || name.ends_with("_embedding"));
        columns.push(ColumnSpec {
            name,
            decl_type,
            sql_type,
            is_embedding_target,
        });
    }

    Ok(columns)
}

/// Double-quote an identifier for interpolation into SQL.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_table_columns_types_and_order() {
        let conn = test_db();
        conn.execute_batch(
            "CREATE TABLE listings (
                id INTEGER PRIMARY KEY,
                title TEXT,
                price REAL,
                notes VARCHAR(40),
                raw BLOB
            )",
        )
        .unwrap();

        let columns = table_columns(&conn, "listings").unwrap();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "title", "price", "notes", "raw"]);
        assert_eq!(columns[0].sql_type, SqlType::Integer);
        assert_eq!(columns[1].sql_type, SqlType::Text);
        assert_eq!(columns[2].sql_type, SqlType::Real);
        // unknown declarations bind as text
        assert_eq!(columns[3].sql_type, SqlType::Text);
        assert_eq!(columns[3].decl_type, "VARCHAR(40)");
        assert_eq!(columns[4].sql_type, SqlType::Blob);
    }

    #[test]
    fn test_embedding_target_detection() {
        let conn = test_db();
        conn.execute_batch(
            "CREATE TABLE docs (
                id INTEGER,
                embedding BLOB,
                notes_embedding BLOB,
                notes_embedding_v2 BLOB,
                embedding_model TEXT,
                raw BLOB
            )",
        )
        .unwrap();

        let columns = table_columns(&conn, "docs").unwrap();
        let targets: Vec<&str> = columns
            .iter()
            .filter(|c| c.is_embedding_target)
            .map(|c| c.name.as_str())
            .collect();
        // the name must equal "embedding" or end with "_embedding", and
        // only BLOB columns qualify
        assert_eq!(targets, ["embedding", "notes_embedding"]);
    }

    #[test]
    fn test_missing_table_is_empty() {
        let conn = test_db();
        let columns = table_columns(&conn, "nope").unwrap();
        assert!(columns.is_empty());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("title"), "\"title\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
