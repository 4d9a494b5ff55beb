//! Local-first reconciliation between the in-memory [`Repository`] and a
//! [`TableStore`].
//!
//! Every mutation is applied to memory first. The matching store writes are
//! then handed to the store as one group under the adapter's
//! [`RetryPolicy`]. A group that still fails is parked in a FIFO pending queue and the caller gets a
//! [`Synced`] value whose [`notice`](Synced::notice) reports the failure; the
//! in-memory change stays in place. Later writes queue behind earlier ones so
//! the store always sees them in order (last writer wins per record).

use std::{collections::VecDeque, fmt};

use chrono::Utc;
use log::{debug, info, warn};

use crate::{
    error::{Result, TableError},
    repository::{Repository, TableUpdate},
    retry::RetryPolicy,
    rows::{BatchKind, BatchOperation, BatchReport, Fields, Row},
    schema::{NewColumn, Table, TableSummary},
    store::{RowRecord, StoreWrite, TableRecord, TableStore},
};

/// The store writes of one mutation. They reach the store, or wait in the
/// pending queue, together.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingWrite {
    pub action: String,
    pub writes: Vec<StoreWrite>,
}

impl fmt::Display for PendingWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.writes.as_slice() {
            [write] => write!(f, "{write}"),
            writes => write!(f, "save {} record(s) for '{}'", writes.len(), self.action),
        }
    }
}

/// User-facing outcome of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Success(String),
    Failure(String),
}

impl Notice {
    pub fn is_success(&self) -> bool {
        matches!(self, Notice::Success(_))
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Success(message) | Notice::Failure(message) => f.write_str(message),
        }
    }
}

/// Result of a mutation that succeeded in memory. `persisted` tells whether
/// the store caught up.
#[derive(Debug, Clone, PartialEq)]
pub struct Synced<T> {
    pub value: T,
    pub action: String,
    pub persisted: Result<()>,
}

impl<T> Synced<T> {
    pub fn is_persisted(&self) -> bool {
        self.persisted.is_ok()
    }

    pub fn notice(&self) -> Notice {
        match &self.persisted {
            Ok(()) => Notice::Success(self.action.clone()),
            Err(err) => Notice::Failure(format!(
                "{} locally, but saving failed: {err}",
                self.action
            )),
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

pub struct SyncAdapter<S: TableStore> {
    repo: Repository,
    store: S,
    retry: RetryPolicy,
    pending: VecDeque<PendingWrite>,
}

impl<S: TableStore> SyncAdapter<S> {
    /// Loads every table from `store` into memory.
    pub fn open(store: S, retry: RetryPolicy) -> Result<Self> {
        let tables = retry.run("load tables", || store.load_tables())?;
        debug!("Loaded {} table(s) from store", tables.len());
        Ok(Self {
            repo: Repository::from_tables(tables)?,
            store,
            retry,
            pending: VecDeque::new(),
        })
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> impl Iterator<Item = &PendingWrite> {
        self.pending.iter()
    }

    /// Replays queued groups oldest first, stopping at the first one that
    /// still fails. Returns how many groups were written.
    pub fn flush_pending(&mut self) -> Result<usize> {
        let mut written = 0;
        while let Some(pending) = self.pending.front() {
            let label = pending.to_string();
            let store = &mut self.store;
            if let Err(err) = self.retry.run(&label, || store.apply(&pending.writes)) {
                warn!(
                    "Flush stopped at '{label}' with {} write(s) pending: {err}",
                    self.pending.len()
                );
                return Err(err);
            }
            self.pending.pop_front();
            written += 1;
        }
        if written > 0 {
            info!("Flushed {written} pending write(s)");
        }
        Ok(written)
    }

    /// Replaces the in-memory state with what the store holds. Pending writes
    /// are flushed first; if that fails nothing is reloaded.
    pub fn reload(&mut self) -> Result<()> {
        self.flush_pending()?;
        let store = &self.store;
        let tables = self.retry.run("reload tables", || store.load_tables())?;
        self.repo = Repository::from_tables(tables)?;
        Ok(())
    }

    fn persist(&mut self, pending: PendingWrite) -> Result<()> {
        if pending.writes.is_empty() {
            return Ok(());
        }
        if !self.pending.is_empty() && self.flush_pending().is_err() {
            self.pending.push_back(pending);
            return Err(TableError::storage(format!(
                "queued behind {} earlier pending write(s)",
                self.pending.len() - 1
            )));
        }
        let label = pending.to_string();
        let store = &mut self.store;
        if let Err(err) = self.retry.run(&label, || store.apply(&pending.writes)) {
            warn!("Could not {label}; queued for a later flush");
            self.pending.push_back(pending);
            return Err(err);
        }
        Ok(())
    }

    fn synced<T>(&mut self, value: T, action: String, writes: Vec<StoreWrite>) -> Synced<T> {
        let persisted = self.persist(PendingWrite {
            action: action.clone(),
            writes,
        });
        if persisted.is_ok() {
            info!("{action}");
        }
        Synced {
            value,
            action,
            persisted,
        }
    }

    fn table_write(table: &Table) -> Result<StoreWrite> {
        Ok(StoreWrite::UpsertTable(TableRecord::encode(table, Utc::now())?))
    }

    fn row_write(table_id: &str, row: &Row) -> Result<StoreWrite> {
        Ok(StoreWrite::UpsertRow(RowRecord::encode(
            table_id,
            row,
            Utc::now(),
        )?))
    }

    /// The table record followed by every one of its rows, for schema changes
    /// that rewrite row data.
    fn table_and_rows_writes(table: &Table) -> Result<Vec<StoreWrite>> {
        let mut writes = vec![Self::table_write(table)?];
        for row in &table.rows {
            writes.push(Self::row_write(&table.id, row)?);
        }
        Ok(writes)
    }

    pub fn list_tables(&self) -> Vec<TableSummary> {
        self.repo.list_tables()
    }

    pub fn get_table(&self, table_id: &str) -> Result<&Table> {
        self.repo.get_table(table_id)
    }

    pub fn list_rows(&self, table_id: &str) -> Result<&[Row]> {
        self.repo.list_rows(table_id)
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<NewColumn>) -> Result<Synced<Table>> {
        let table = self.repo.create_table(name, columns)?;
        let writes = Self::table_and_rows_writes(&table)?;
        let action = format!("Created table '{}'", table.name);
        Ok(self.synced(table, action, writes))
    }

    /// Stores a fully formed table, rows included, under its own id.
    pub fn import_table(&mut self, table: Table) -> Result<Synced<Table>> {
        self.repo.insert_table(table.clone())?;
        let writes = Self::table_and_rows_writes(&table)?;
        let action = format!(
            "Imported table '{}' with {} row(s)",
            table.name,
            table.rows.len()
        );
        Ok(self.synced(table, action, writes))
    }

    pub fn update_table(&mut self, table_id: &str, update: TableUpdate) -> Result<Synced<Table>> {
        let rewrites_rows = update.columns.is_some();
        let table = self.repo.update_table(table_id, update)?;
        let writes = if rewrites_rows {
            Self::table_and_rows_writes(&table)?
        } else {
            vec![Self::table_write(&table)?]
        };
        let action = format!("Updated table '{}'", table.name);
        Ok(self.synced(table, action, writes))
    }

    pub fn delete_table(&mut self, table_id: &str) -> Result<Synced<Table>> {
        let table = self.repo.delete_table(table_id)?;
        let action = format!("Deleted table '{}'", table.name);
        let writes = vec![StoreWrite::DeleteTable(table.id.clone())];
        Ok(self.synced(table, action, writes))
    }

    pub fn add_column(&mut self, table_id: &str, spec: NewColumn) -> Result<Synced<Table>> {
        let table = self.repo.add_column(table_id, spec)?;
        let action = match table.columns.last() {
            Some(column) => format!("Added column '{}' ({})", column.name, column.id),
            None => "Added column".to_string(),
        };
        let writes = vec![Self::table_write(&table)?];
        Ok(self.synced(table, action, writes))
    }

    pub fn rename_column(
        &mut self,
        table_id: &str,
        column_id: &str,
        name: &str,
    ) -> Result<Synced<Table>> {
        let table = self.repo.rename_column(table_id, column_id, name)?;
        if name.trim().is_empty() {
            let action = format!("Column '{column_id}' left unchanged");
            return Ok(self.synced(table, action, Vec::new()));
        }
        let action = format!("Renamed column '{column_id}'");
        let writes = vec![Self::table_write(&table)?];
        Ok(self.synced(table, action, writes))
    }

    pub fn remove_column(&mut self, table_id: &str, column_id: &str) -> Result<Synced<Table>> {
        let table = self.repo.remove_column(table_id, column_id)?;
        let action = format!("Removed column '{column_id}'");
        let writes = Self::table_and_rows_writes(&table)?;
        Ok(self.synced(table, action, writes))
    }

    pub fn reorder_columns<T: AsRef<str>>(
        &mut self,
        table_id: &str,
        order: &[T],
    ) -> Result<Synced<Table>> {
        let table = self.repo.reorder_columns(table_id, order)?;
        let action = format!("Reordered columns of '{}'", table.name);
        let writes = vec![Self::table_write(&table)?];
        Ok(self.synced(table, action, writes))
    }

    pub fn create_row(
        &mut self,
        table_id: &str,
        id: Option<String>,
        fields: Fields,
    ) -> Result<Synced<Row>> {
        let row = self.repo.create_row(table_id, id, fields)?;
        let action = format!("Created row '{}'", row.id);
        let writes = vec![Self::row_write(table_id, &row)?];
        Ok(self.synced(row, action, writes))
    }

    pub fn update_row(
        &mut self,
        table_id: &str,
        row_id: &str,
        fields: Fields,
    ) -> Result<Synced<Row>> {
        let row = self.repo.update_row(table_id, row_id, fields)?;
        let action = format!("Updated row '{}'", row.id);
        let writes = vec![Self::row_write(table_id, &row)?];
        Ok(self.synced(row, action, writes))
    }

    pub fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<Synced<Row>> {
        let row = self.repo.delete_row(table_id, row_id)?;
        let action = format!("Deleted row '{}'", row.id);
        let writes = vec![StoreWrite::DeleteRow {
            table_id: table_id.to_string(),
            row_id: row.id.clone(),
        }];
        Ok(self.synced(row, action, writes))
    }

    /// Applies the batch in memory, then persists one write per successful
    /// item in the order they ran.
    pub fn batch_rows(
        &mut self,
        table_id: &str,
        operations: &[BatchOperation],
    ) -> Result<Synced<BatchReport>> {
        let (table, report) = self.repo.batch_rows(table_id, operations)?;
        let mut writes = Vec::with_capacity(report.results.len());
        for result in &report.results {
            match result.operation {
                BatchKind::Create | BatchKind::Update => {
                    // Rows created and deleted within the same batch have
                    // nothing left to save.
                    if let Some(row) = table.row(&result.id) {
                        writes.push(Self::row_write(table_id, row)?);
                    }
                }
                BatchKind::Delete => writes.push(StoreWrite::DeleteRow {
                    table_id: table_id.to_string(),
                    row_id: result.id.clone(),
                }),
            }
        }
        let action = format!(
            "Batch applied: {} succeeded, {} failed",
            report.results.len(),
            report.errors.len()
        );
        Ok(self.synced(report, action, writes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::Value,
        schema::ColumnType,
        store::{MemoryStore, RowRecord, TableRecord},
    };
    use std::time::Duration;

    /// Memory store that refuses writes while `down` is set.
    #[derive(Default)]
    struct Flaky {
        inner: MemoryStore,
        down: bool,
        attempts: usize,
    }

    impl Flaky {
        fn guard(&mut self) -> Result<()> {
            self.attempts += 1;
            if self.down {
                Err(TableError::storage("store offline"))
            } else {
                Ok(())
            }
        }
    }

    impl TableStore for Flaky {
        fn list_tables(&self) -> Result<Vec<TableRecord>> {
            self.inner.list_tables()
        }
        fn list_rows(&self, table_id: &str) -> Result<Vec<RowRecord>> {
            self.inner.list_rows(table_id)
        }
        fn upsert_table(&mut self, record: TableRecord) -> Result<()> {
            self.guard()?;
            self.inner.upsert_table(record)
        }
        fn delete_table(&mut self, table_id: &str) -> Result<()> {
            self.guard()?;
            self.inner.delete_table(table_id)
        }
        fn upsert_row(&mut self, record: RowRecord) -> Result<()> {
            self.guard()?;
            self.inner.upsert_row(record)
        }
        fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<()> {
            self.guard()?;
            self.inner.delete_row(table_id, row_id)
        }
        fn apply(&mut self, writes: &[StoreWrite]) -> Result<()> {
            self.guard()?;
            self.inner.apply(writes)
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::default()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1))
    }

    fn staff(adapter: &mut SyncAdapter<Flaky>) -> String {
        adapter
            .create_table(
                "Staff",
                vec![NewColumn::new("Name", ColumnType::Text).with_id("name")],
            )
            .unwrap()
            .value
            .id
    }

    fn named(name: &str) -> Fields {
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::text(name));
        fields
    }

    #[test]
    fn writes_reach_the_store_and_reload_matches_memory() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        let created = adapter.create_row(&id, Some("r1".into()), named("Amy")).unwrap();
        assert!(created.notice().is_success());

        let before = adapter.get_table(&id).unwrap().clone();
        adapter.reload().unwrap();
        assert_eq!(adapter.get_table(&id).unwrap(), &before);
    }

    #[test]
    fn failed_write_keeps_memory_and_queues_for_flush() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        adapter.store_mut().down = true;

        let created = adapter.create_row(&id, Some("r1".into()), named("Amy")).unwrap();
        assert!(!created.is_persisted());
        assert!(matches!(created.notice(), Notice::Failure(_)));
        assert_eq!(adapter.list_rows(&id).unwrap().len(), 1);
        assert_eq!(adapter.pending_len(), 1);
        // table write, then one try and one retry for the row
        assert_eq!(adapter.store().attempts, 3);

        adapter.update_row(&id, "r1", named("Bea")).unwrap();
        assert_eq!(adapter.pending_len(), 2);
        assert!(adapter.flush_pending().is_err());

        adapter.store_mut().down = false;
        assert_eq!(adapter.flush_pending().unwrap(), 2);
        let stored = adapter.store().list_rows(&id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].decode().unwrap().get("name"), Some(&Value::text("Bea")));
    }

    #[test]
    fn caller_errors_do_not_touch_the_store() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        let attempts = adapter.store().attempts;
        assert!(adapter.delete_row(&id, "ghost").unwrap_err().is_not_found());
        assert!(adapter.get_table("ghost").unwrap_err().is_not_found());
        assert_eq!(adapter.store().attempts, attempts);
        assert_eq!(adapter.pending_len(), 0);
    }

    #[test]
    fn remove_column_rewrites_stored_rows() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        adapter.create_row(&id, Some("r1".into()), named("Amy")).unwrap();
        adapter.remove_column(&id, "name").unwrap();

        let stored = adapter.store().list_rows(&id).unwrap();
        assert!(stored[0].decode().unwrap().fields.is_empty());
        let tables = adapter.store().load_tables().unwrap();
        assert!(tables[0].columns.is_empty());
    }

    #[test]
    fn schema_change_reaches_the_store_as_one_group() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        for n in 0..5 {
            adapter.create_row(&id, None, named(&format!("p{n}"))).unwrap();
        }
        let attempts = adapter.store().attempts;
        adapter.remove_column(&id, "name").unwrap();
        assert_eq!(adapter.store().attempts, attempts + 1);

        adapter.store_mut().down = true;
        let table = adapter
            .add_column(&id, NewColumn::new("Dept", ColumnType::Text))
            .unwrap();
        assert!(!table.is_persisted());
        adapter.store_mut().down = false;
        adapter
            .update_table(
                &id,
                TableUpdate {
                    name: None,
                    columns: Some(Vec::new()),
                },
            )
            .unwrap();
        assert_eq!(adapter.pending_len(), 0);
        let stored = adapter.store().list_rows(&id).unwrap();
        assert_eq!(stored.len(), 5);
        assert!(stored.iter().all(|r| r.decode().unwrap().fields.is_empty()));
    }

    #[test]
    fn blank_column_rename_skips_the_store() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        let attempts = adapter.store().attempts;
        let synced = adapter.rename_column(&id, "name", "  ").unwrap();
        assert_eq!(synced.notice(), Notice::Success("Column 'name' left unchanged".into()));
        assert_eq!(synced.value.columns[0].name, "Name");
        assert_eq!(adapter.store().attempts, attempts);
        assert!(adapter.rename_column(&id, "ghost", "  ").unwrap_err().is_not_found());
    }

    #[test]
    fn batch_persists_each_successful_item() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        adapter.create_row(&id, Some("old".into()), named("Old")).unwrap();
        let ops = vec![
            BatchOperation::create(named("New")),
            BatchOperation::update("ghost", named("x")),
            BatchOperation::delete("old"),
        ];
        let synced = adapter.batch_rows(&id, &ops).unwrap();
        assert!(synced.is_persisted());
        assert_eq!(synced.value.results.len(), 2);
        assert_eq!(synced.value.errors.len(), 1);

        let stored = adapter.store().list_rows(&id).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].decode().unwrap().get("name"), Some(&Value::text("New")));
    }

    #[test]
    fn delete_table_cascades_in_store() {
        let mut adapter = SyncAdapter::open(Flaky::default(), fast_retry()).unwrap();
        let id = staff(&mut adapter);
        adapter.create_row(&id, None, named("Amy")).unwrap();
        adapter.delete_table(&id).unwrap();
        assert!(adapter.store().list_tables().unwrap().is_empty());
        assert!(adapter.store().list_rows(&id).unwrap().is_empty());
    }
}
