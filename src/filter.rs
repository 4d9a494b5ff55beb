//! Per-column filter predicates and free-text search.
//!
//! Filters arrive as a flat map of `key -> value`. A key is either a column id
//! or a column id with a range suffix: `_min`/`_max` for number columns and
//! `_start`/`_end` for date columns. Blank values are inactive. A row passes
//! only if it satisfies every active predicate.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::debug;

use crate::{
    data::{Value, coerce_boolean, default_value_on, parse_naive_date, today},
    error::{Result, TableError},
    rows::Row,
    schema::{Column, ColumnType, Table},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match against `"true"` / `"false"`.
    Boolean(String),
    /// Exact match against the selected option.
    Select(String),
    /// Inclusive range; `None` bounds are unconstrained.
    NumberRange { min: Option<f64>, max: Option<f64> },
    DateRange {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
    /// Case-insensitive substring; the needle is stored lowercased.
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnFilter {
    pub column: Column,
    pub predicate: Predicate,
}

impl ColumnFilter {
    pub fn matches(&self, row: &Row) -> bool {
        let column = &self.column;
        match &self.predicate {
            Predicate::Boolean(expected) => {
                let actual = row.get(&column.id).map(coerce_boolean).unwrap_or(false);
                actual.to_string() == *expected
            }
            Predicate::Select(expected) => row.display(column) == *expected,
            Predicate::NumberRange { min, max } => {
                let Some(value) = numeric_cell(row, column) else {
                    return true;
                };
                min.is_none_or(|m| value >= m) && max.is_none_or(|m| value <= m)
            }
            Predicate::DateRange { start, end } => {
                let Some(value) = parse_naive_date(&row.display(column)) else {
                    return true;
                };
                start.is_none_or(|s| value >= s) && end.is_none_or(|e| value <= e)
            }
            Predicate::Contains(needle) => row.display(column).to_lowercase().contains(needle),
        }
    }
}

/// The number a range filter should test, or `None` when the cell holds
/// something non-numeric (those rows are not excluded).
fn numeric_cell(row: &Row, column: &Column) -> Option<f64> {
    match row.get(&column.id) {
        None => match default_value_on(column.column_type, today()) {
            Value::Number(n) => Some(n),
            _ => None,
        },
        Some(Value::Number(n)) => Some(*n),
        Some(Value::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        Some(_) => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
    Min,
    Max,
    Start,
    End,
}

const RANGE_SUFFIXES: &[(&str, Bound)] = &[
    ("_min", Bound::Min),
    ("_max", Bound::Max),
    ("_start", Bound::Start),
    ("_end", Bound::End),
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    filters: Vec<ColumnFilter>,
}

impl FilterSet {
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn filters(&self) -> &[ColumnFilter] {
        &self.filters
    }

    /// Builds predicates for `table` from a key/value map. Keys that name no
    /// column (directly or through a range suffix valid for its type) are
    /// rejected.
    pub fn parse(table: &Table, raw: &BTreeMap<String, String>) -> Result<Self> {
        let mut filters: Vec<ColumnFilter> = Vec::new();
        for (key, value) in raw {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            if let Some(column) = table.column(key) {
                let predicate = match column.column_type {
                    ColumnType::Boolean => Predicate::Boolean(value.to_string()),
                    ColumnType::Select => Predicate::Select(value.to_string()),
                    _ => Predicate::Contains(value.to_lowercase()),
                };
                filters.push(ColumnFilter {
                    column: column.clone(),
                    predicate,
                });
                continue;
            }
            let (column, bound) = resolve_range_key(table, key)?;
            apply_bound(&mut filters, column, bound, value);
        }
        Ok(FilterSet { filters })
    }

    /// Parses `key=value` pairs as given on the command line.
    pub fn from_pairs<S: AsRef<str>>(table: &Table, pairs: &[S]) -> Result<Self> {
        let mut raw = BTreeMap::new();
        for pair in pairs {
            let pair = pair.as_ref();
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                TableError::invalid(format!("Filter '{pair}' must look like key=value"))
            })?;
            raw.insert(key.trim().to_string(), value.to_string());
        }
        Self::parse(table, &raw)
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.filters.iter().all(|f| f.matches(row))
    }
}

fn resolve_range_key<'a>(table: &'a Table, key: &str) -> Result<(&'a Column, Bound)> {
    for (suffix, bound) in RANGE_SUFFIXES {
        let Some(column_id) = key.strip_suffix(suffix) else {
            continue;
        };
        let Some(column) = table.column(column_id) else {
            continue;
        };
        let valid = match bound {
            Bound::Min | Bound::Max => column.column_type == ColumnType::Number,
            Bound::Start | Bound::End => column.column_type == ColumnType::Date,
        };
        if valid {
            return Ok((column, *bound));
        }
        return Err(TableError::invalid(format!(
            "Filter '{key}' does not apply to {} column '{column_id}'",
            column.column_type
        )));
    }
    Err(TableError::invalid(format!(
        "Filter key '{key}' does not match any column"
    )))
}

fn apply_bound(filters: &mut Vec<ColumnFilter>, column: &Column, bound: Bound, raw: &str) {
    let existing = filters.iter().position(|f| {
        f.column.id == column.id
            && matches!(
                f.predicate,
                Predicate::NumberRange { .. } | Predicate::DateRange { .. }
            )
    });
    let index = match existing {
        Some(index) => index,
        None => {
            let predicate = if column.column_type == ColumnType::Number {
                Predicate::NumberRange {
                    min: None,
                    max: None,
                }
            } else {
                Predicate::DateRange {
                    start: None,
                    end: None,
                }
            };
            filters.push(ColumnFilter {
                column: column.clone(),
                predicate,
            });
            filters.len() - 1
        }
    };
    match (&mut filters[index].predicate, bound) {
        (Predicate::NumberRange { min, .. }, Bound::Min) => *min = parse_number_bound(raw),
        (Predicate::NumberRange { max, .. }, Bound::Max) => *max = parse_number_bound(raw),
        (Predicate::DateRange { start, .. }, Bound::Start) => *start = parse_date_bound(raw),
        (Predicate::DateRange { end, .. }, Bound::End) => *end = parse_date_bound(raw),
        _ => {}
    }
}

fn parse_number_bound(raw: &str) -> Option<f64> {
    let parsed = raw.parse::<f64>().ok().filter(|n| n.is_finite());
    if parsed.is_none() {
        debug!("Ignoring non-numeric range bound '{raw}'");
    }
    parsed
}

fn parse_date_bound(raw: &str) -> Option<NaiveDate> {
    let parsed = parse_naive_date(raw);
    if parsed.is_none() {
        debug!("Ignoring unparseable date bound '{raw}'");
    }
    parsed
}

/// True when any column's cell, rendered as the grid and card views show it,
/// contains `term` case-insensitively. Missing cells show their default and
/// file cells show the file name.
pub fn matches_search(table: &Table, row: &Row, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    table
        .columns
        .iter()
        .any(|column| row.display(column).to_lowercase().contains(&needle))
}
