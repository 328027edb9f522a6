//! Core data models used throughout idx-sync.
//!
//! These types describe the index fragments fetched per document, the
//! per-table schema tracked during a run, and how entry values are encoded
//! into text cells.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Primary key column present in every synchronized table.
pub const PATH_COLUMN: &str = "path";

/// The single document column used in JSON mode.
pub const DOCUMENT_COLUMN: &str = "entries";

/// Field name → value mapping for one table inside a fragment.
///
/// Keys keep the order they had in the fetched document, which is the
/// order new columns are appended in.
pub type Entries = serde_json::Map<String, Value>;

/// Storage representation, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One text column per entry field.
    #[default]
    Columnar,
    /// All entry fields in one JSON document column.
    Json,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Columnar => "columnar",
            StorageMode::Json => "json",
        }
    }
}

/// Which entry values become SQL NULL in columnar mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullPolicy {
    /// Absent, null, `""`, numeric zero and `false` are all stored as NULL.
    #[default]
    Falsy,
    /// Only absent and null values are stored as NULL.
    Missing,
}

/// Schema of one destination table as known to the current run.
///
/// `path` is always the first column. Columns are only ever appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    mode: StorageMode,
    columns: Vec<String>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, mode: StorageMode) -> Self {
        Self {
            name: name.into(),
            mode,
            columns: vec![PATH_COLUMN.to_string()],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> StorageMode {
        self.mode
    }

    /// All columns, `path` first, in the order they were added.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Columns other than `path`.
    pub fn value_columns(&self) -> &[String] {
        &self.columns[1..]
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Append `column` unless it is already present.
    ///
    /// Returns `true` when the column was new.
    pub fn add_column(&mut self, column: &str) -> bool {
        if self.has_column(column) {
            return false;
        }
        self.columns.push(column.to_string());
        true
    }

    /// Entry keys that are not yet columns, in entry order.
    ///
    /// An entry named `path` never becomes a column.
    pub fn missing_columns<'a>(&self, entries: &'a Entries) -> Vec<&'a str> {
        entries
            .keys()
            .map(String::as_str)
            .filter(|key| !self.has_column(key))
            .collect()
    }
}

/// One table's slice of a fragment: `{"entries": {...}}`.
///
/// Other keys the renderer emits (such as `name`) are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableFragment {
    #[serde(default)]
    pub entries: Entries,
}

/// Index fragment for one document, keyed by table name.
#[derive(Debug, Clone)]
pub struct DocumentFragment {
    /// Row key used for every table this fragment writes to.
    pub path: String,
    pub tables: BTreeMap<String, TableFragment>,
}

impl DocumentFragment {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tables: BTreeMap::new(),
        }
    }

    /// Add (or replace) the entries for `table`.
    pub fn with_table(mut self, table: impl Into<String>, entries: Entries) -> Self {
        self.tables.insert(table.into(), TableFragment { entries });
        self
    }

    /// Parse a fetched fragment body.
    ///
    /// The body must be a JSON object mapping table names to
    /// `{"entries": {...}}` objects.
    pub fn from_json(path: impl Into<String>, body: Value) -> Result<Self> {
        let path = path.into();
        let tables: BTreeMap<String, TableFragment> = serde_json::from_value(body)
            .with_context(|| format!("Malformed index fragment for {}", path))?;
        Ok(Self { path, tables })
    }
}

/// JavaScript-style falsiness over JSON values.
///
/// Arrays and objects are truthy even when empty.
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Encode one entry value for a text column.
///
/// `None` means the cell is stored as SQL NULL.
pub fn encode_column_value(value: Option<&Value>, policy: NullPolicy) -> Option<String> {
    let value = value?;
    let null = match policy {
        NullPolicy::Falsy => is_falsy(value),
        NullPolicy::Missing => value.is_null(),
    };
    if null {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(v: Value) -> Entries {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_schema_starts_with_path() {
        let schema = TableSchema::new("basic", StorageMode::Columnar);
        assert_eq!(schema.columns(), &["path".to_string()]);
        assert!(schema.value_columns().is_empty());
    }

    #[test]
    fn add_column_is_idempotent() {
        let mut schema = TableSchema::new("basic", StorageMode::Columnar);
        assert!(schema.add_column("title"));
        assert!(!schema.add_column("title"));
        assert!(!schema.add_column("path"));
        assert_eq!(schema.columns(), &["path", "title"]);
    }

    #[test]
    fn missing_columns_keep_entry_order_and_skip_path() {
        let mut schema = TableSchema::new("basic", StorageMode::Columnar);
        schema.add_column("title");
        let e = entries(json!({"zeta": 1, "title": "x", "path": "/p", "alpha": 2}));
        assert_eq!(schema.missing_columns(&e), vec!["zeta", "alpha"]);
    }

    #[test]
    fn fragment_parses_tables_and_ignores_extra_keys() {
        let body = json!({
            "basic": {"name": "basic", "entries": {"title": "T1"}},
            "images": {"entries": {"images": ["a.png"]}}
        });
        let fragment = DocumentFragment::from_json("/a.md", body).unwrap();
        assert_eq!(fragment.path, "/a.md");
        assert_eq!(fragment.tables.len(), 2);
        assert_eq!(fragment.tables["basic"].entries["title"], json!("T1"));
    }

    #[test]
    fn fragment_without_entries_is_empty_table() {
        let fragment = DocumentFragment::from_json("/a.md", json!({"basic": {}})).unwrap();
        assert!(fragment.tables["basic"].entries.is_empty());
    }

    #[test]
    fn fragment_rejects_non_object_body() {
        assert!(DocumentFragment::from_json("/a.md", json!([1, 2])).is_err());
    }

    #[test]
    fn falsy_values() {
        for v in [json!(null), json!(false), json!(0), json!(0.0), json!("")] {
            assert!(is_falsy(&v), "{} should be falsy", v);
        }
        for v in [json!(true), json!(1), json!("0"), json!([]), json!({})] {
            assert!(!is_falsy(&v), "{} should be truthy", v);
        }
    }

    #[test]
    fn falsy_policy_maps_falsy_to_null() {
        let p = NullPolicy::Falsy;
        assert_eq!(encode_column_value(None, p), None);
        assert_eq!(encode_column_value(Some(&json!("")), p), None);
        assert_eq!(encode_column_value(Some(&json!(0)), p), None);
        assert_eq!(encode_column_value(Some(&json!(false)), p), None);
        assert_eq!(
            encode_column_value(Some(&json!("T1")), p),
            Some("\"T1\"".to_string())
        );
        assert_eq!(
            encode_column_value(Some(&json!(["a", "b"])), p),
            Some("[\"a\",\"b\"]".to_string())
        );
    }

    #[test]
    fn missing_policy_keeps_falsy_values() {
        let p = NullPolicy::Missing;
        assert_eq!(encode_column_value(None, p), None);
        assert_eq!(encode_column_value(Some(&json!(null)), p), None);
        assert_eq!(
            encode_column_value(Some(&json!("")), p),
            Some("\"\"".to_string())
        );
        assert_eq!(encode_column_value(Some(&json!(0)), p), Some("0".to_string()));
        assert_eq!(
            encode_column_value(Some(&json!(false)), p),
            Some("false".to_string())
        );
    }
}
