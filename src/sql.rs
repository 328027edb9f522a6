//! SQL statement builders for dynamically shaped tables.
//!
//! Table and column names come from fetched fragments, so they are
//! validated and always emitted as quoted identifiers. Values never appear
//! in statement text: every statement uses placeholders and the stores
//! bind values separately.

use idx_sync_core::models::{DOCUMENT_COLUMN, PATH_COLUMN};
use idx_sync_core::store::ColumnKind;

use crate::error::SyncError;

/// PostgreSQL silently truncates identifiers beyond this many bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `n`.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Dialect::Sqlite => "?".to_string(),
            Dialect::Postgres => format!("${}", n),
        }
    }

    fn column_type(&self, kind: ColumnKind) -> &'static str {
        match (self, kind) {
            (_, ColumnKind::Text) => "TEXT",
            (Dialect::Sqlite, ColumnKind::Document) => "TEXT",
            (Dialect::Postgres, ColumnKind::Document) => "JSONB",
        }
    }
}

/// Reject names that cannot round-trip as identifiers.
pub fn validate_identifier(name: &str) -> Result<(), SyncError> {
    let reason = if name.is_empty() {
        "empty"
    } else if name.contains('\0') {
        "contains NUL"
    } else if name.len() > MAX_IDENTIFIER_BYTES {
        "longer than 63 bytes"
    } else {
        return Ok(());
    };
    Err(SyncError::InvalidIdentifier {
        name: name.to_string(),
        reason,
    })
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_table(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({} TEXT PRIMARY KEY)",
        quote_ident(table),
        quote_ident(PATH_COLUMN)
    )
}

/// `ALTER TABLE .. ADD COLUMN`.
///
/// SQLite has no `IF NOT EXISTS` form; the SQLite store checks the catalog
/// first and tolerates duplicate-column errors instead.
pub fn add_column(dialect: Dialect, table: &str, column: &str, kind: ColumnKind) -> String {
    let if_absent = match dialect {
        Dialect::Sqlite => "",
        Dialect::Postgres => "IF NOT EXISTS ",
    };
    format!(
        "ALTER TABLE {} ADD COLUMN {}{} {}",
        quote_ident(table),
        if_absent,
        quote_ident(column),
        dialect.column_type(kind)
    )
}

/// Insert `path` plus `columns`; on `path` conflict overwrite every
/// supplied column with the new value.
///
/// Parameters: `path` first, then one per column in order.
pub fn upsert_columns(dialect: Dialect, table: &str, columns: &[String]) -> String {
    let mut names = vec![quote_ident(PATH_COLUMN)];
    names.extend(columns.iter().map(|c| quote_ident(c)));
    let placeholders: Vec<String> = (1..=names.len()).map(|n| dialect.placeholder(n)).collect();

    let on_conflict = if columns.is_empty() {
        "DO NOTHING".to_string()
    } else {
        let sets: Vec<String> = columns
            .iter()
            .map(|c| {
                let q = quote_ident(c);
                format!("{} = excluded.{}", q, q)
            })
            .collect();
        format!("DO UPDATE SET {}", sets.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) {}",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", "),
        quote_ident(PATH_COLUMN),
        on_conflict
    )
}

/// Insert `(path, entries)`; on conflict replace the document wholesale.
///
/// Parameters: `path`, serialized entries.
pub fn upsert_document(dialect: Dialect, table: &str) -> String {
    let doc_param = match dialect {
        Dialect::Sqlite => dialect.placeholder(2),
        Dialect::Postgres => format!("{}::text::jsonb", dialect.placeholder(2)),
    };
    let doc = quote_ident(DOCUMENT_COLUMN);
    format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT ({}) DO UPDATE SET {} = excluded.{}",
        quote_ident(table),
        quote_ident(PATH_COLUMN),
        doc,
        dialect.placeholder(1),
        doc_param,
        quote_ident(PATH_COLUMN),
        doc,
        doc
    )
}

/// Select `columns` of one row by `path`, each cast to text on PostgreSQL.
pub fn select_row(dialect: Dialect, table: &str, columns: &[String]) -> String {
    let selected: Vec<String> = columns
        .iter()
        .map(|c| match dialect {
            Dialect::Sqlite => quote_ident(c),
            Dialect::Postgres => format!("{}::text", quote_ident(c)),
        })
        .collect();
    format!(
        "SELECT {} FROM {} WHERE {} = {}",
        selected.join(", "),
        quote_ident(table),
        quote_ident(PATH_COLUMN),
        dialect.placeholder(1)
    )
}

pub fn count_rows(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn quote_escapes_embedded_quotes() {
        assert_eq!(quote_ident("basic"), "\"basic\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            quote_ident("x\"; DROP TABLE y; --"),
            "\"x\"\"; DROP TABLE y; --\""
        );
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("title").is_ok());
        assert!(validate_identifier("with space").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a\0b").is_err());
        assert!(validate_identifier(&"x".repeat(63)).is_ok());
        assert!(validate_identifier(&"x".repeat(64)).is_err());
    }

    #[test]
    fn create_table_has_path_primary_key() {
        assert_eq!(
            create_table("basic"),
            "CREATE TABLE IF NOT EXISTS \"basic\" (\"path\" TEXT PRIMARY KEY)"
        );
    }

    #[test]
    fn add_column_per_dialect() {
        assert_eq!(
            add_column(Dialect::Sqlite, "basic", "title", ColumnKind::Text),
            "ALTER TABLE \"basic\" ADD COLUMN \"title\" TEXT"
        );
        assert_eq!(
            add_column(Dialect::Postgres, "basic", "entries", ColumnKind::Document),
            "ALTER TABLE \"basic\" ADD COLUMN IF NOT EXISTS \"entries\" JSONB"
        );
    }

    #[test]
    fn upsert_columns_sqlite() {
        let sql = upsert_columns(Dialect::Sqlite, "basic", &cols(&["title", "extra"]));
        assert_eq!(
            sql,
            "INSERT INTO \"basic\" (\"path\", \"title\", \"extra\") VALUES (?, ?, ?) \
             ON CONFLICT (\"path\") DO UPDATE SET \"title\" = excluded.\"title\", \
             \"extra\" = excluded.\"extra\""
        );
    }

    #[test]
    fn upsert_columns_postgres_numbers_placeholders() {
        let sql = upsert_columns(Dialect::Postgres, "basic", &cols(&["title"]));
        assert!(sql.contains("VALUES ($1, $2)"));
    }

    #[test]
    fn upsert_without_value_columns_does_nothing_on_conflict() {
        let sql = upsert_columns(Dialect::Sqlite, "basic", &[]);
        assert!(sql.ends_with("ON CONFLICT (\"path\") DO NOTHING"));
    }

    #[test]
    fn upsert_document_replaces_entries() {
        let sql = upsert_document(Dialect::Postgres, "basic");
        assert_eq!(
            sql,
            "INSERT INTO \"basic\" (\"path\", \"entries\") VALUES ($1, $2::text::jsonb) \
             ON CONFLICT (\"path\") DO UPDATE SET \"entries\" = excluded.\"entries\""
        );
    }

    #[test]
    fn select_row_casts_on_postgres() {
        let sql = select_row(Dialect::Postgres, "basic", &cols(&["path", "entries"]));
        assert_eq!(
            sql,
            "SELECT \"path\"::text, \"entries\"::text FROM \"basic\" WHERE \"path\" = $1"
        );
    }
}
