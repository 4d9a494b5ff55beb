//! Owned, in-memory collection of tables.
//!
//! Every mutation goes through [`Repository::apply`], which computes a new
//! [`Table`] snapshot from the current one and swaps it in only on success.
//! Callers receive the snapshot, so a stale copy held elsewhere is easy to spot
//! in tests.

use log::info;
use uuid::Uuid;

use crate::{
    error::{EntityKind, Result, TableError},
    rows::{BatchOperation, BatchReport, Fields, Row},
    schema::{Column, NewColumn, Table, TableSummary},
};

/// Partial table update; `None` fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableUpdate {
    pub name: Option<String>,
    pub columns: Option<Vec<Column>>,
}

#[derive(Debug, Clone, Default)]
pub struct Repository {
    tables: Vec<Table>,
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: Vec<Table>) -> Result<Self> {
        let mut repo = Self::new();
        for table in tables {
            repo.insert_table(table)?;
        }
        Ok(repo)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn list_tables(&self) -> Vec<TableSummary> {
        self.tables.iter().map(Table::summary).collect()
    }

    pub fn get_table(&self, table_id: &str) -> Result<&Table> {
        self.tables
            .iter()
            .find(|t| t.id == table_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Table, table_id))
    }

    fn position(&self, table_id: &str) -> Result<usize> {
        self.tables
            .iter()
            .position(|t| t.id == table_id)
            .ok_or_else(|| TableError::not_found(EntityKind::Table, table_id))
    }

    /// Adds a fully formed table, e.g. one reloaded from storage.
    pub fn insert_table(&mut self, table: Table) -> Result<()> {
        if self.tables.iter().any(|t| t.id == table.id) {
            return Err(TableError::conflict(EntityKind::Table, table.id));
        }
        self.tables.push(table);
        Ok(())
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<NewColumn>) -> Result<Table> {
        let table = Table::new(Uuid::new_v4().to_string(), name, columns)?;
        self.tables.push(table.clone());
        info!("Created table '{}' ({})", table.name, table.id);
        Ok(table)
    }

    pub fn update_table(&mut self, table_id: &str, update: TableUpdate) -> Result<Table> {
        self.apply(table_id, |table| {
            let renamed = match &update.name {
                Some(name) => table.rename(name)?,
                None => table.clone(),
            };
            match update.columns.clone() {
                Some(columns) => renamed.replace_columns(columns),
                None => Ok(renamed),
            }
        })
    }

    /// Removes the table and, with it, every row it owns.
    pub fn delete_table(&mut self, table_id: &str) -> Result<Table> {
        let index = self.position(table_id)?;
        let removed = self.tables.remove(index);
        info!(
            "Deleted table '{}' with {} row(s)",
            removed.name,
            removed.rows.len()
        );
        Ok(removed)
    }

    /// Runs `mutate` against the current table and installs its result. On
    /// error the stored table is left exactly as it was.
    pub fn apply<F>(&mut self, table_id: &str, mutate: F) -> Result<Table>
    where
        F: FnOnce(&Table) -> Result<Table>,
    {
        let index = self.position(table_id)?;
        let next = mutate(&self.tables[index])?;
        self.tables[index] = next.clone();
        Ok(next)
    }

    pub fn add_column(&mut self, table_id: &str, spec: NewColumn) -> Result<Table> {
        self.apply(table_id, |table| table.add_column(spec))
    }

    pub fn rename_column(&mut self, table_id: &str, column_id: &str, name: &str) -> Result<Table> {
        self.apply(table_id, |table| table.rename_column(column_id, name))
    }

    pub fn remove_column(&mut self, table_id: &str, column_id: &str) -> Result<Table> {
        self.apply(table_id, |table| table.remove_column(column_id))
    }

    pub fn reorder_columns<S: AsRef<str>>(&mut self, table_id: &str, order: &[S]) -> Result<Table> {
        self.apply(table_id, |table| table.reorder_columns(order))
    }

    pub fn list_rows(&self, table_id: &str) -> Result<&[Row]> {
        Ok(&self.get_table(table_id)?.rows)
    }

    pub fn create_row(
        &mut self,
        table_id: &str,
        id: Option<String>,
        fields: Fields,
    ) -> Result<Row> {
        let mut created = None;
        self.apply(table_id, |table| {
            let (next, row) = table.create_row(id, fields)?;
            created = Some(row);
            Ok(next)
        })?;
        created.ok_or_else(|| TableError::invalid("row creation produced no row"))
    }

    pub fn update_row(&mut self, table_id: &str, row_id: &str, fields: Fields) -> Result<Row> {
        let mut updated = None;
        self.apply(table_id, |table| {
            let (next, row) = table.update_row(row_id, fields)?;
            updated = Some(row);
            Ok(next)
        })?;
        updated.ok_or_else(|| TableError::not_found(EntityKind::Row, row_id))
    }

    pub fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<Row> {
        let mut removed = None;
        self.apply(table_id, |table| {
            let (next, row) = table.delete_row(row_id)?;
            removed = Some(row);
            Ok(next)
        })?;
        removed.ok_or_else(|| TableError::not_found(EntityKind::Row, row_id))
    }

    /// Only a missing table fails the call; per-operation failures are in the
    /// returned report.
    pub fn batch_rows(
        &mut self,
        table_id: &str,
        operations: &[BatchOperation],
    ) -> Result<(Table, BatchReport)> {
        let mut report = BatchReport::default();
        let table = self.apply(table_id, |table| {
            let (next, outcome) = table.batch_apply(operations);
            report = outcome;
            Ok(next)
        })?;
        Ok((table, report))
    }
}
