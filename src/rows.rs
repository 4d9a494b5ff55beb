//! Row storage and batch edits.
//!
//! Rows are open-ended maps from column id to [`Value`]. Values written under a
//! known column id are run through the codec on the way in; keys that match no
//! column are stored verbatim and survive until explicitly overwritten.
//!
//! [`Table::batch_apply`] is the one place where errors are not propagated:
//! every operation runs, and each outcome lands in either
//! [`BatchReport::results`] or [`BatchReport::errors`].

use std::{collections::BTreeMap, fmt};

use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    data::{Value, decode, default_value_on, today},
    error::{EntityKind, Result, TableError},
    schema::{Column, Table},
};

pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Row {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    pub fn get(&self, column_id: &str) -> Option<&Value> {
        self.fields.get(column_id)
    }

    /// The cell as the column sees it: decoded when present, the type default
    /// when missing.
    pub fn value_or_default(&self, column: &Column) -> Value {
        match self.fields.get(&column.id) {
            Some(raw) => decode(column, raw),
            None => default_value_on(column.column_type, today()),
        }
    }

    pub fn display(&self, column: &Column) -> String {
        self.value_or_default(column).as_display()
    }
}

/// Converts a JSON object into a field map without any type coercion.
pub fn fields_from_json(object: serde_json::Map<String, serde_json::Value>) -> Fields {
    object
        .into_iter()
        .map(|(key, value)| (key, Value::from_json(value)))
        .collect()
}

impl Table {
    pub fn row(&self, row_id: &str) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == row_id)
    }

    pub fn require_row(&self, row_id: &str) -> Result<&Row> {
        self.row(row_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Row, row_id))
    }

    fn row_index(&self, row_id: &str) -> Option<usize> {
        self.rows.iter().position(|r| r.id == row_id)
    }

    fn coerce_known(&self, fields: Fields) -> Fields {
        fields
            .into_iter()
            .map(|(key, value)| match self.column(&key) {
                Some(column) => {
                    let decoded = decode(column, &value);
                    (key, decoded)
                }
                None => (key, value),
            })
            .collect()
    }

    /// Appends a row. Columns absent from `fields` receive their default.
    pub fn create_row(&self, id: Option<String>, fields: Fields) -> Result<(Table, Row)> {
        let id = match id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty()) {
            Some(id) if self.row(&id).is_some() => {
                return Err(TableError::conflict(EntityKind::Row, id));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        let mut fields = self.coerce_known(fields);
        let today = today();
        for column in &self.columns {
            fields
                .entry(column.id.clone())
                .or_insert_with(|| default_value_on(column.column_type, today));
        }
        let row = Row::new(id, fields);
        let mut next = self.clone();
        next.rows.push(row.clone());
        Ok((next, row))
    }

    /// Shallow merge: keys in `partial` overwrite, all others are untouched.
    pub fn update_row(&self, row_id: &str, partial: Fields) -> Result<(Table, Row)> {
        let index = self
            .row_index(row_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Row, row_id))?;
        let partial = self.coerce_known(partial);
        let mut next = self.clone();
        let row = &mut next.rows[index];
        row.fields.extend(partial);
        let updated = row.clone();
        Ok((next, updated))
    }

    pub fn delete_row(&self, row_id: &str) -> Result<(Table, Row)> {
        let index = self
            .row_index(row_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Row, row_id))?;
        let mut next = self.clone();
        let removed = next.rows.remove(index);
        Ok((next, removed))
    }

    pub fn batch_apply(&self, operations: &[BatchOperation]) -> (Table, BatchReport) {
        let mut current = self.clone();
        let mut report = BatchReport::default();
        for operation in operations {
            match operation {
                BatchOperation::Create { id, fields } => {
                    match current.create_row(id.clone(), fields.clone()) {
                        Ok((next, row)) => {
                            current = next;
                            report.succeeded(BatchKind::Create, row.id);
                        }
                        Err(err) => report.failed(BatchKind::Create.as_str(), id.clone(), &err),
                    }
                }
                BatchOperation::Update { row_id, fields } => {
                    match current.update_row(row_id, fields.clone()) {
                        Ok((next, _)) => {
                            current = next;
                            report.succeeded(BatchKind::Update, row_id.clone());
                        }
                        Err(err) => {
                            report.failed(BatchKind::Update.as_str(), Some(row_id.clone()), &err)
                        }
                    }
                }
                BatchOperation::Delete { row_ids } => {
                    for row_id in row_ids {
                        match current.delete_row(row_id) {
                            Ok((next, _)) => {
                                current = next;
                                report.succeeded(BatchKind::Delete, row_id.clone());
                            }
                            Err(err) => report.failed(
                                BatchKind::Delete.as_str(),
                                Some(row_id.clone()),
                                &err,
                            ),
                        }
                    }
                }
                BatchOperation::Malformed {
                    operation,
                    id,
                    reason,
                } => {
                    report.errors.push(BatchFailure {
                        operation: operation.clone(),
                        id: id.clone(),
                        error: reason.clone(),
                    });
                }
            }
        }
        debug!(
            "Batch on table '{}': {} succeeded, {} failed",
            self.id,
            report.results.len(),
            report.errors.len()
        );
        (current, report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    Create,
    Update,
    Delete,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchKind::Create => "create",
            BatchKind::Update => "update",
            BatchKind::Delete => "delete",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    Create { id: Option<String>, fields: Fields },
    Update { row_id: String, fields: Fields },
    /// One delete may name several rows; each is reported on its own.
    Delete { row_ids: Vec<String> },
    /// An entry that could not be understood. It still occupies its slot in
    /// the batch and is reported as an error.
    Malformed {
        operation: String,
        id: Option<String>,
        reason: String,
    },
}

impl BatchOperation {
    pub fn create(fields: Fields) -> Self {
        BatchOperation::Create { id: None, fields }
    }

    pub fn update(row_id: impl Into<String>, fields: Fields) -> Self {
        BatchOperation::Update {
            row_id: row_id.into(),
            fields,
        }
    }

    pub fn delete(row_id: impl Into<String>) -> Self {
        BatchOperation::Delete {
            row_ids: vec![row_id.into()],
        }
    }

    /// Reads one entry of the wire format:
    ///
    /// ```json
    /// {"type": "create", "rowData": {"id": "optional", "name": "Amy"}}
    /// {"type": "update", "rowId": "r1", "rowData": {"active": true}}
    /// {"type": "delete", "rowId": "r1"}
    /// {"type": "delete", "rowIds": ["r1", "r2"]}
    /// ```
    ///
    /// Numeric ids are taken as their decimal text. A `rowIds` list holding
    /// anything else is split so each id keeps its place and the bad ones are
    /// reported.
    pub fn from_json(entry: &serde_json::Value) -> Vec<Self> {
        let kind = entry
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();
        let malformed = |id: Option<String>, reason: &str| BatchOperation::Malformed {
            operation: kind.clone(),
            id,
            reason: reason.to_string(),
        };
        let row_data = entry.get("rowData").and_then(|d| d.as_object()).cloned();
        let row_id = entry.get("rowId").map(wire_id);
        let operation = match kind.as_str() {
            "create" => {
                let Some(mut data) = row_data else {
                    return vec![malformed(None, "create requires a rowData object")];
                };
                let id = match data.remove("id").or_else(|| entry.get("id").cloned()) {
                    None | Some(serde_json::Value::Null) => None,
                    Some(raw) => match wire_id(&raw) {
                        Ok(id) => Some(id),
                        Err(text) => {
                            return vec![malformed(Some(text), "row id must be a string or number")];
                        }
                    },
                };
                BatchOperation::Create {
                    id,
                    fields: fields_from_json(data),
                }
            }
            "update" => match (row_id, row_data) {
                (Some(Ok(row_id)), Some(mut data)) => {
                    data.remove("id");
                    BatchOperation::Update {
                        row_id,
                        fields: fields_from_json(data),
                    }
                }
                (Some(Err(text)), _) => malformed(Some(text), BAD_ROW_ID),
                _ => malformed(None, "update requires rowId and a rowData object"),
            },
            "delete" => match (row_id, entry.get("rowIds")) {
                (Some(Ok(row_id)), _) => BatchOperation::delete(row_id),
                (Some(Err(text)), _) => malformed(Some(text), BAD_ROW_ID),
                (None, Some(serde_json::Value::Array(ids))) if ids.is_empty() => {
                    malformed(None, "rowIds must name at least one row")
                }
                (None, Some(serde_json::Value::Array(ids))) => {
                    if let Some(row_ids) = ids.iter().map(|id| wire_id(id).ok()).collect::<Option<Vec<_>>>() {
                        BatchOperation::Delete { row_ids }
                    } else {
                        return ids
                            .iter()
                            .map(|id| match wire_id(id) {
                                Ok(id) => BatchOperation::delete(id),
                                Err(text) => malformed(Some(text), BAD_ROW_ID),
                            })
                            .collect();
                    }
                }
                _ => malformed(None, "delete requires rowId or rowIds"),
            },
            _ => malformed(None, "Unknown operation type"),
        };
        vec![operation]
    }
}

const BAD_ROW_ID: &str = "rowId must be a string or number";

/// A row id as sent on the wire. Strings and integers are accepted; anything
/// else comes back as its JSON text for the error report.
fn wire_id(value: &serde_json::Value) -> Result<String, String> {
    match value {
        serde_json::Value::String(id) => Ok(id.clone()),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(other.to_string()),
    }
}

/// Parses a batch document: either a bare array of operations or an object
/// with an `operations` array.
pub fn parse_batch(document: &serde_json::Value) -> Result<Vec<BatchOperation>> {
    let entries = document
        .as_array()
        .or_else(|| document.get("operations").and_then(|ops| ops.as_array()))
        .ok_or_else(|| {
            TableError::invalid("Batch document must be an array or contain an 'operations' array")
        })?;
    Ok(entries.iter().flat_map(BatchOperation::from_json).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub operation: BatchKind,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub operation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub errors: Vec<BatchFailure>,
}

impl BatchReport {
    fn succeeded(&mut self, operation: BatchKind, id: String) {
        self.results.push(BatchResult { operation, id });
    }

    fn failed(&mut self, operation: &str, id: Option<String>, err: &TableError) {
        self.errors.push(BatchFailure {
            operation: operation.to_string(),
            id,
            error: err.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, NewColumn};

    fn staff() -> Table {
        Table::new(
            "t1",
            "Staff",
            vec![
                NewColumn::new("Name", ColumnType::Text).with_id("name"),
                NewColumn::new("Active", ColumnType::Boolean).with_id("active"),
                NewColumn::new("Salary", ColumnType::Number).with_id("salary"),
            ],
        )
        .unwrap()
    }

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn create_row_fills_defaults_and_coerces() {
        let (table, row) = staff()
            .create_row(None, fields(&[("name", Value::text("Amy")), ("salary", Value::text("oops"))]))
            .unwrap();
        assert_eq!(row.get("active"), Some(&Value::Boolean(false)));
        assert_eq!(row.get("salary"), Some(&Value::Number(0.0)));
        assert_eq!(table.rows.len(), 1);
        assert!(!row.id.is_empty());
    }

    #[test]
    fn create_row_rejects_duplicate_supplied_id() {
        let (table, _) = staff().create_row(Some("r1".into()), Fields::new()).unwrap();
        let err = table.create_row(Some("r1".into()), Fields::new()).unwrap_err();
        assert_eq!(err, TableError::conflict(EntityKind::Row, "r1"));
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn update_row_merges_shallowly() {
        let (table, _) = staff()
            .create_row(Some("r1".into()), fields(&[("name", Value::text("Amy"))]))
            .unwrap();
        let (table, row) = table
            .update_row("r1", fields(&[("active", Value::text("true")), ("extra", Value::text("x"))]))
            .unwrap();
        assert_eq!(row.get("name"), Some(&Value::text("Amy")));
        assert_eq!(row.get("active"), Some(&Value::Boolean(true)));
        assert_eq!(row.get("extra"), Some(&Value::text("x")));
        assert!(table.update_row("nope", Fields::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn delete_missing_row_is_an_error() {
        let table = staff();
        assert!(table.delete_row("ghost").unwrap_err().is_not_found());
    }

    #[test]
    fn batch_collects_failures_without_stopping() {
        let (table, _) = staff().create_row(Some("r1".into()), Fields::new()).unwrap();
        let ops = vec![
            BatchOperation::Create {
                id: Some("r2".into()),
                fields: fields(&[("name", Value::text("Bo"))]),
            },
            BatchOperation::update("missing", fields(&[("name", Value::text("X"))])),
            BatchOperation::delete("r1"),
        ];
        let (next, report) = table.batch_apply(&ops);
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].id.as_deref(), Some("missing"));
        let ids: Vec<&str> = next.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r2"]);
    }

    #[test]
    fn batch_wire_format_is_parsed_per_entry() {
        let doc = serde_json::json!([
            {"type": "create", "rowData": {"id": "a", "name": "Amy"}},
            {"type": "update", "rowId": "a", "rowData": {"active": true}},
            {"type": "delete", "rowIds": ["a", "b"]},
            {"type": "archive", "rowId": "a"}
        ]);
        let ops = parse_batch(&doc).unwrap();
        assert!(matches!(&ops[0], BatchOperation::Create { id: Some(id), .. } if id == "a"));
        assert!(matches!(&ops[1], BatchOperation::Update { row_id, .. } if row_id == "a"));
        assert!(matches!(&ops[2], BatchOperation::Delete { row_ids } if row_ids.len() == 2));
        assert!(matches!(&ops[3], BatchOperation::Malformed { operation, .. } if operation == "archive"));

        let (_, report) = staff().batch_apply(&ops);
        assert_eq!(report.results.len(), 3);
        let failed: Vec<&str> = report.errors.iter().map(|e| e.operation.as_str()).collect();
        assert_eq!(failed, vec!["delete", "archive"]);
    }

    #[test]
    fn every_wire_id_gets_an_outcome() {
        let doc = serde_json::json!([
            {"type": "create", "rowData": {"id": "a"}},
            {"type": "delete", "rowIds": ["a", false, "ghost"]},
            {"type": "delete", "rowIds": []}
        ]);
        let ops = parse_batch(&doc).unwrap();
        assert_eq!(ops.len(), 5);

        let (next, report) = staff().batch_apply(&ops);
        assert!(next.rows.is_empty());
        let ok: Vec<&str> = report.results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ok, vec!["a", "a"]);
        let failed: Vec<(&str, Option<&str>)> = report
            .errors
            .iter()
            .map(|e| (e.operation.as_str(), e.id.as_deref()))
            .collect();
        assert_eq!(
            failed,
            vec![("delete", Some("false")), ("delete", Some("ghost")), ("delete", None)]
        );
        assert_eq!(report.errors[0].error, "rowId must be a string or number");
    }

    #[test]
    fn numeric_create_id_is_kept_as_text() {
        let doc = serde_json::json!([
            {"type": "create", "rowData": {"id": 42, "name": "Amy"}},
            {"type": "create", "rowData": {"id": {"n": 1}, "name": "Bo"}},
            {"type": "delete", "rowId": 42}
        ]);
        let ops = parse_batch(&doc).unwrap();
        let (next, report) = staff().batch_apply(&ops);
        assert!(next.rows.is_empty());
        assert_eq!(report.results[0].id, "42");
        assert_eq!(report.results[1].operation, BatchKind::Delete);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].operation, "create");
        assert_eq!(report.errors[0].id.as_deref(), Some(r#"{"n":1}"#));
    }
}
