//! Derived views over a table: search, filter, then sort.
//!
//! A query never touches the table it reads. It returns a fresh `Vec` of row
//! references in display order.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    data::compare,
    error::{EntityKind, Result, TableError},
    filter::{FilterSet, matches_search},
    rows::Row,
    schema::Table,
};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }

    /// Asc becomes desc and vice versa, as when a column header is clicked
    /// twice.
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            key: key.into(),
            direction,
        }
    }
}

impl FromStr for SortSpec {
    type Err = TableError;

    /// `column[:asc|desc]`, ascending when the direction is omitted.
    fn from_str(spec: &str) -> Result<Self> {
        let mut parts = spec.split(':');
        let key = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| TableError::invalid("Sort directive is missing a column"))?;
        let direction = match parts
            .next()
            .unwrap_or("asc")
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => {
                return Err(TableError::invalid(format!(
                    "Unknown sort direction '{other}'"
                )));
            }
        };
        Ok(SortSpec::new(key, direction))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Query {
    pub search: String,
    pub filters: FilterSet,
    pub sort: Option<SortSpec>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = term.into();
        self
    }

    pub fn filters(mut self, filters: FilterSet) -> Self {
        self.filters = filters;
        self
    }

    pub fn sort(mut self, sort: SortSpec) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn run<'a>(&self, table: &'a Table) -> Result<Vec<&'a Row>> {
        let mut rows: Vec<&Row> = table
            .rows
            .iter()
            .filter(|row| matches_search(table, row, &self.search))
            .filter(|row| self.filters.matches(row))
            .collect();
        if let Some(sort) = &self.sort {
            sort_rows(table, &mut rows, sort)?;
        }
        Ok(rows)
    }
}

/// Stable sort on a single column. Rows with equal keys keep their relative
/// order in both directions.
pub fn sort_rows(table: &Table, rows: &mut [&Row], sort: &SortSpec) -> Result<()> {
    let column = table
        .column(&sort.key)
        .ok_or_else(|| TableError::not_found(EntityKind::Column, sort.key.clone()))?;
    let mut keyed: Vec<_> = rows
        .iter()
        .map(|row| (row.value_or_default(column), *row))
        .collect();
    keyed.sort_by(|(a, _), (b, _)| {
        let ordering = compare(a, b, column.column_type);
        if sort.direction.is_ascending() {
            ordering
        } else {
            ordering.reverse()
        }
    });
    for (slot, (_, row)) in rows.iter_mut().zip(keyed) {
        *slot = row;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        rows::Fields,
        schema::{ColumnType, NewColumn},
    };

    fn scores() -> Table {
        let mut table = Table::new(
            "t",
            "Scores",
            vec![
                NewColumn::new("Name", ColumnType::Text).with_id("name"),
                NewColumn::new("Score", ColumnType::Number).with_id("score"),
            ],
        )
        .unwrap();
        for (id, name, score) in [("a", "Ann", 2.0), ("b", "Ben", 10.0), ("c", "Cat", 2.0), ("d", "Dan", 1.0)] {
            let mut fields = Fields::new();
            fields.insert("name".into(), Value::text(name));
            fields.insert("score".into(), Value::Number(score));
            table = table.create_row(Some(id.into()), fields).unwrap().0;
        }
        table
    }

    fn ids(rows: &[&Row]) -> Vec<String> {
        rows.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn sort_spec_parses_direction() {
        assert_eq!("score".parse::<SortSpec>().unwrap(), SortSpec::new("score", SortDirection::Asc));
        assert_eq!(
            "score:DESC".parse::<SortSpec>().unwrap(),
            SortSpec::new("score", SortDirection::Desc)
        );
        assert!("score:up".parse::<SortSpec>().is_err());
        assert!(":asc".parse::<SortSpec>().is_err());
    }

    #[test]
    fn numeric_sort_is_stable_both_ways() {
        let table = scores();
        let asc = Query::new()
            .sort(SortSpec::new("score", SortDirection::Asc))
            .run(&table)
            .unwrap();
        assert_eq!(ids(&asc), vec!["d", "a", "c", "b"]);
        let desc = Query::new()
            .sort(SortSpec::new("score", SortDirection::Desc))
            .run(&table)
            .unwrap();
        assert_eq!(ids(&desc), vec!["b", "a", "c", "d"]);
    }

    #[test]
    fn query_does_not_reorder_the_table() {
        let table = scores();
        let before = table.clone();
        let _ = Query::new()
            .sort(SortSpec::new("name", SortDirection::Desc))
            .run(&table)
            .unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn search_and_filters_are_conjunctive() {
        let table = scores();
        let filters = FilterSet::from_pairs(&table, &["score_min=2"]).unwrap();
        let rows = Query::new().search("a").filters(filters).run(&table).unwrap();
        assert_eq!(ids(&rows), vec!["a", "c"]);
    }

    #[test]
    fn unknown_sort_column_is_not_found() {
        let table = scores();
        let err = Query::new()
            .sort(SortSpec::new("ghost", SortDirection::Asc))
            .run(&table)
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn toggling_direction_flips() {
        assert_eq!(SortDirection::Asc.toggled(), SortDirection::Desc);
        assert_eq!(SortDirection::Desc.toggled().toggled(), SortDirection::Desc);
    }
}
