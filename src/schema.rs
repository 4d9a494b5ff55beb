//! Table and column model.
//!
//! A [`Table`] is an ordered list of [`Column`] definitions plus the rows that
//! populate them. Structural operations never mutate the receiver: each one
//! validates its input, then returns a fresh [`Table`] snapshot, so a failed
//! call leaves the original exactly as it was.
//!
//! Column ids are immutable once assigned and so is a column's type. The first
//! column is the table's primary (title) column.

use std::{collections::HashSet, fmt, str::FromStr};

use heck::ToSnakeCase;
use serde::{Deserialize, Serialize};

use crate::{
    error::{EntityKind, Result, TableError},
    rows::Row,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Number,
    Date,
    Boolean,
    Select,
    Email,
    Phone,
    Url,
    File,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Boolean => "boolean",
            ColumnType::Select => "select",
            ColumnType::Email => "email",
            ColumnType::Phone => "phone",
            ColumnType::Url => "url",
            ColumnType::File => "file",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &[
            "text", "number", "date", "boolean", "select", "email", "phone", "url", "file",
        ]
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = TableError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "text" | "string" => Ok(ColumnType::Text),
            "number" | "float" | "integer" => Ok(ColumnType::Number),
            "date" => Ok(ColumnType::Date),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "select" => Ok(ColumnType::Select),
            "email" => Ok(ColumnType::Email),
            "phone" => Ok(ColumnType::Phone),
            "url" => Ok(ColumnType::Url),
            "file" => Ok(ColumnType::File),
            _ => Err(TableError::invalid(format!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl Column {
    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or_default()
    }
}

/// Request for a new column. The id is optional; a fresh one is derived from
/// the name when it is absent.
#[derive(Debug, Clone, PartialEq)]
pub struct NewColumn {
    pub id: Option<String>,
    pub name: String,
    pub column_type: ColumnType,
    pub options: Vec<String>,
}

impl NewColumn {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            id: None,
            name: name.into(),
            column_type,
            options: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Parses `name:type[:opt1|opt2]` as accepted on the command line.
    pub fn parse(spec: &str) -> Result<Self> {
        let mut parts = spec.splitn(3, ':');
        let name = parts
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TableError::invalid(format!("Column definition '{spec}' is missing a name")))?;
        let column_type = match parts.next() {
            Some(token) => token.parse()?,
            None => ColumnType::Text,
        };
        let options: Vec<String> = parts
            .next()
            .map(|raw| raw.split('|').map(|o| o.to_string()).collect())
            .unwrap_or_default();
        Ok(NewColumn::new(name, column_type).with_options(options))
    }

    fn into_column(self, existing: &[Column]) -> Result<Column> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(TableError::invalid("Column name must not be empty"));
        }
        let id = match self.id.map(|id| id.trim().to_string()) {
            Some(id) if id.is_empty() => {
                return Err(TableError::invalid("Column id must not be empty"));
            }
            Some(id) => {
                if existing.iter().any(|c| c.id == id) {
                    return Err(TableError::conflict(EntityKind::Column, id));
                }
                id
            }
            None => fresh_column_id(&name, existing),
        };
        let options = match self.column_type {
            ColumnType::Select => Some(clean_options(self.options)),
            _ => None,
        };
        Ok(Column {
            id,
            name,
            column_type: self.column_type,
            options,
        })
    }
}

fn clean_options(options: Vec<String>) -> Vec<String> {
    options
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn fresh_column_id(name: &str, existing: &[Column]) -> String {
    let mut base = name.to_snake_case();
    if base.is_empty() {
        base = "column".to_string();
    }
    let taken: HashSet<&str> = existing.iter().map(|c| c.id.as_str()).collect();
    if !taken.contains(base.as_str()) {
        return base;
    }
    (2..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or(base)
}

/// Table listing entry; rows are deliberately excluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSummary {
    pub id: String,
    pub name: String,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    pub columns: Vec<Column>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(id: impl Into<String>, name: &str, columns: Vec<NewColumn>) -> Result<Self> {
        let name = validate_table_name(name)?;
        let mut built: Vec<Column> = Vec::with_capacity(columns.len());
        for spec in columns {
            let column = spec.into_column(&built)?;
            built.push(column);
        }
        Ok(Table {
            id: id.into(),
            name,
            columns: built,
            rows: Vec::new(),
        })
    }

    pub fn summary(&self) -> TableSummary {
        TableSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            columns: self.columns.clone(),
        }
    }

    pub fn column(&self, column_id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    pub fn column_index(&self, column_id: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.id == column_id)
    }

    pub fn require_column(&self, column_id: &str) -> Result<&Column> {
        self.column(column_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Column, column_id))
    }

    pub fn primary_column(&self) -> Option<&Column> {
        self.columns.first()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn rename(&self, new_name: &str) -> Result<Table> {
        let name = validate_table_name(new_name)?;
        Ok(Table {
            name,
            ..self.clone()
        })
    }

    pub fn add_column(&self, spec: NewColumn) -> Result<Table> {
        let column = spec.into_column(&self.columns)?;
        let mut next = self.clone();
        next.columns.push(column);
        Ok(next)
    }

    /// Renames a column's display label. A blank name leaves the table as is.
    pub fn rename_column(&self, column_id: &str, new_name: &str) -> Result<Table> {
        let index = self
            .column_index(column_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Column, column_id))?;
        let trimmed = new_name.trim();
        let mut next = self.clone();
        if !trimmed.is_empty() {
            next.columns[index].name = trimmed.to_string();
        }
        Ok(next)
    }

    /// Drops the column and strips its key from every row. Keys that belong to
    /// no column are left alone.
    pub fn remove_column(&self, column_id: &str) -> Result<Table> {
        let index = self
            .column_index(column_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Column, column_id))?;
        let mut next = self.clone();
        next.columns.remove(index);
        for row in &mut next.rows {
            row.fields.remove(column_id);
        }
        Ok(next)
    }

    pub fn reorder_columns<S: AsRef<str>>(&self, order: &[S]) -> Result<Table> {
        if order.len() != self.columns.len() {
            return Err(TableError::invalid(format!(
                "Reorder expects {} column id(s) but received {}",
                self.columns.len(),
                order.len()
            )));
        }
        let mut seen = HashSet::with_capacity(order.len());
        let mut reordered = Vec::with_capacity(order.len());
        for id in order {
            let id = id.as_ref();
            if !seen.insert(id) {
                return Err(TableError::invalid(format!(
                    "Column id '{id}' appears more than once in reorder"
                )));
            }
            let column = self.column(id).ok_or_else(|| {
                TableError::invalid(format!("Column id '{id}' is not part of this table"))
            })?;
            reordered.push(column.clone());
        }
        Ok(Table {
            columns: reordered,
            ..self.clone()
        })
    }

    /// Replaces the column list wholesale. Existing ids keep their type;
    /// columns that disappear are stripped from every row like
    /// [`Table::remove_column`].
    pub fn replace_columns(&self, columns: Vec<Column>) -> Result<Table> {
        let mut ids = HashSet::with_capacity(columns.len());
        for column in &columns {
            if column.id.trim().is_empty() {
                return Err(TableError::invalid("Column id must not be empty"));
            }
            if column.name.trim().is_empty() {
                return Err(TableError::invalid(format!(
                    "Column '{}' must have a name",
                    column.id
                )));
            }
            if !ids.insert(column.id.as_str()) {
                return Err(TableError::conflict(EntityKind::Column, column.id.clone()));
            }
            if let Some(existing) = self.column(&column.id)
                && existing.column_type != column.column_type
            {
                return Err(TableError::invalid(format!(
                    "Column '{}' cannot change type from {} to {}",
                    column.id, existing.column_type, column.column_type
                )));
            }
        }
        let dropped: Vec<&str> = self
            .columns
            .iter()
            .map(|c| c.id.as_str())
            .filter(|id| !ids.contains(id))
            .collect();
        let mut next = self.clone();
        for row in &mut next.rows {
            for id in &dropped {
                row.fields.remove(*id);
            }
        }
        next.columns = columns
            .into_iter()
            .map(|mut column| {
                column.options = match column.column_type {
                    ColumnType::Select => Some(clean_options(column.options.unwrap_or_default())),
                    _ => None,
                };
                column
            })
            .collect();
        Ok(next)
    }
}

fn validate_table_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(TableError::invalid("Table name must not be empty"));
    }
    Ok(trimmed.to_string())
}
