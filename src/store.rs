//! Backing-store contract and the two stores shipped with the crate.
//!
//! Storage sees only flat records. A table's column list and a row's field map
//! are stored as encoded JSON text (`TableRecord::columns`,
//! `RowRecord::data`); the dynamic schema is never projected onto the storage
//! layout.
//!
//! - [`MemoryStore`] keeps records in process memory.
//! - [`FileStore`] keeps them in a single JSON document under a data
//!   directory, rewritten atomically (temp file + rename) once per
//!   [`TableStore::apply`] call.

use std::{
    collections::HashMap,
    fmt, fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TableError},
    rows::{Fields, Row},
    schema::{Column, Table},
};

pub const STORE_FILE_NAME: &str = "tables.json";
const STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub id: String,
    pub name: String,
    /// JSON-encoded `Vec<Column>`.
    pub columns: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TableRecord {
    pub fn encode(table: &Table, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: table.id.clone(),
            name: table.name.clone(),
            columns: serde_json::to_string(&table.columns)?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn decode_columns(&self) -> Result<Vec<Column>> {
        serde_json::from_str(&self.columns).map_err(|err| {
            TableError::storage(format!("table '{}' has unreadable columns: {err}", self.id))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    pub id: String,
    pub table_id: String,
    /// JSON-encoded field map.
    pub data: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RowRecord {
    pub fn encode(table_id: &str, row: &Row, now: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            id: row.id.clone(),
            table_id: table_id.to_string(),
            data: serde_json::to_string(&row.fields)?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn decode(&self) -> Result<Row> {
        let fields: Fields = serde_json::from_str(&self.data).map_err(|err| {
            TableError::storage(format!("row '{}' has unreadable data: {err}", self.id))
        })?;
        Ok(Row::new(self.id.clone(), fields))
    }
}

/// One record-level change, as produced by a single model mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    UpsertTable(TableRecord),
    DeleteTable(String),
    UpsertRow(RowRecord),
    DeleteRow { table_id: String, row_id: String },
}

impl fmt::Display for StoreWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreWrite::UpsertTable(record) => write!(f, "save table '{}'", record.id),
            StoreWrite::DeleteTable(id) => write!(f, "delete table '{id}'"),
            StoreWrite::UpsertRow(record) => {
                write!(f, "save row '{}' of table '{}'", record.id, record.table_id)
            }
            StoreWrite::DeleteRow { table_id, row_id } => {
                write!(f, "delete row '{row_id}' of table '{table_id}'")
            }
        }
    }
}

/// CRUD over flat records. Deletes of absent records succeed; the in-memory
/// model has already decided whether the id existed.
pub trait TableStore {
    fn list_tables(&self) -> Result<Vec<TableRecord>>;

    /// Rows of one table ordered by creation time.
    fn list_rows(&self, table_id: &str) -> Result<Vec<RowRecord>>;

    /// Inserts or replaces by id. An existing record keeps its `created_at`.
    fn upsert_table(&mut self, record: TableRecord) -> Result<()>;

    /// Deletes the table record and all of its rows.
    fn delete_table(&mut self, table_id: &str) -> Result<()>;

    fn upsert_row(&mut self, record: RowRecord) -> Result<()>;

    fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<()>;

    /// Applies a group of writes in order. Stores that can commit the group
    /// in one step should override this. Every write is idempotent, so a
    /// group that failed part-way may be applied again from the start.
    fn apply(&mut self, writes: &[StoreWrite]) -> Result<()> {
        for write in writes {
            match write {
                StoreWrite::UpsertTable(record) => self.upsert_table(record.clone())?,
                StoreWrite::DeleteTable(table_id) => self.delete_table(table_id)?,
                StoreWrite::UpsertRow(record) => self.upsert_row(record.clone())?,
                StoreWrite::DeleteRow { table_id, row_id } => self.delete_row(table_id, row_id)?,
            }
        }
        Ok(())
    }

    fn load_tables(&self) -> Result<Vec<Table>> {
        let mut tables = Vec::new();
        for record in self.list_tables()? {
            let rows = self
                .list_rows(&record.id)?
                .iter()
                .map(RowRecord::decode)
                .collect::<Result<Vec<_>>>()?;
            tables.push(Table {
                columns: record.decode_columns()?,
                id: record.id,
                name: record.name,
                rows,
            });
        }
        Ok(tables)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreState {
    version: u32,
    #[serde(default)]
    tables: Vec<TableRecord>,
    #[serde(default)]
    rows: Vec<RowRecord>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            tables: Vec::new(),
            rows: Vec::new(),
        }
    }
}

impl StoreState {
    fn list_rows(&self, table_id: &str) -> Vec<RowRecord> {
        let mut rows: Vec<RowRecord> = self
            .rows
            .iter()
            .filter(|r| r.table_id == table_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.created_at);
        rows
    }

    fn upsert_table(&mut self, mut record: TableRecord) {
        match self.tables.iter_mut().find(|t| t.id == record.id) {
            Some(existing) => {
                record.created_at = existing.created_at;
                *existing = record;
            }
            None => self.tables.push(record),
        }
    }

    fn delete_table(&mut self, table_id: &str) {
        self.tables.retain(|t| t.id != table_id);
        self.rows.retain(|r| r.table_id != table_id);
    }

    fn upsert_row(&mut self, mut record: RowRecord) {
        match self
            .rows
            .iter_mut()
            .find(|r| r.table_id == record.table_id && r.id == record.id)
        {
            Some(existing) => {
                record.created_at = existing.created_at;
                *existing = record;
            }
            None => self.rows.push(record),
        }
    }

    fn delete_row(&mut self, table_id: &str, row_id: &str) {
        self.rows
            .retain(|r| !(r.table_id == table_id && r.id == row_id));
    }

    /// Applies a write group in one pass. Rows are addressed through an
    /// index so the cost stays linear in the number of records.
    fn apply(&mut self, writes: &[StoreWrite]) {
        let mut rows: Vec<Option<RowRecord>> =
            std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        let mut positions: HashMap<(String, String), usize> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, r)| r.as_ref().map(|r| ((r.table_id.clone(), r.id.clone()), index)))
            .collect();
        for write in writes {
            match write {
                StoreWrite::UpsertTable(record) => self.upsert_table(record.clone()),
                StoreWrite::DeleteTable(table_id) => {
                    self.tables.retain(|t| &t.id != table_id);
                    for slot in rows.iter_mut() {
                        if slot.as_ref().is_some_and(|r| &r.table_id == table_id) {
                            *slot = None;
                        }
                    }
                    positions.retain(|(owner, _), _| owner != table_id);
                }
                StoreWrite::UpsertRow(record) => {
                    let key = (record.table_id.clone(), record.id.clone());
                    let mut record = record.clone();
                    if let Some(&index) = positions.get(&key)
                        && let Some(existing) = &rows[index]
                    {
                        record.created_at = existing.created_at;
                        rows[index] = Some(record);
                    } else {
                        positions.insert(key, rows.len());
                        rows.push(Some(record));
                    }
                }
                StoreWrite::DeleteRow { table_id, row_id } => {
                    if let Some(index) = positions.remove(&(table_id.clone(), row_id.clone())) {
                        rows[index] = None;
                    }
                }
            }
        }
        self.rows = rows.into_iter().flatten().collect();
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: StoreState,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TableStore for MemoryStore {
    fn list_tables(&self) -> Result<Vec<TableRecord>> {
        Ok(self.state.tables.clone())
    }

    fn list_rows(&self, table_id: &str) -> Result<Vec<RowRecord>> {
        Ok(self.state.list_rows(table_id))
    }

    fn upsert_table(&mut self, record: TableRecord) -> Result<()> {
        self.state.upsert_table(record);
        Ok(())
    }

    fn delete_table(&mut self, table_id: &str) -> Result<()> {
        self.state.delete_table(table_id);
        Ok(())
    }

    fn upsert_row(&mut self, record: RowRecord) -> Result<()> {
        self.state.upsert_row(record);
        Ok(())
    }

    fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<()> {
        self.state.delete_row(table_id, row_id);
        Ok(())
    }

    fn apply(&mut self, writes: &[StoreWrite]) -> Result<()> {
        self.state.apply(writes);
        Ok(())
    }
}

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    state: StoreState,
}

impl FileStore {
    /// Opens (or starts) the store document inside `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|err| {
            TableError::storage(format!("creating data directory {data_dir:?}: {err}"))
        })?;
        let path = data_dir.join(STORE_FILE_NAME);
        let state = if path.exists() {
            let file = fs::File::open(&path)
                .map_err(|err| TableError::storage(format!("opening {path:?}: {err}")))?;
            let state: StoreState = serde_json::from_reader(BufReader::new(file))
                .map_err(|err| TableError::storage(format!("parsing {path:?}: {err}")))?;
            if state.version != STORE_VERSION {
                return Err(TableError::storage(format!(
                    "{path:?} has store version {} but {} is required",
                    state.version, STORE_VERSION
                )));
            }
            state
        } else {
            StoreState::default()
        };
        debug!(
            "Opened store {:?} with {} table(s) and {} row(s)",
            path,
            state.tables.len(),
            state.rows.len()
        );
        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn mutate<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut StoreState),
    {
        let mut next = self.state.clone();
        change(&mut next);
        self.write(&next)?;
        self.state = next;
        Ok(())
    }

    fn write(&self, state: &StoreState) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let write_tmp = || -> std::io::Result<()> {
            let mut writer = BufWriter::new(fs::File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, state)?;
            writer.flush()?;
            Ok(())
        };
        write_tmp().map_err(|err| TableError::storage(format!("writing {tmp:?}: {err}")))?;
        fs::rename(&tmp, &self.path)
            .map_err(|err| TableError::storage(format!("replacing {:?}: {err}", self.path)))
    }
}

impl TableStore for FileStore {
    fn list_tables(&self) -> Result<Vec<TableRecord>> {
        Ok(self.state.tables.clone())
    }

    fn list_rows(&self, table_id: &str) -> Result<Vec<RowRecord>> {
        Ok(self.state.list_rows(table_id))
    }

    fn upsert_table(&mut self, record: TableRecord) -> Result<()> {
        self.mutate(|state| state.upsert_table(record))
    }

    fn delete_table(&mut self, table_id: &str) -> Result<()> {
        self.mutate(|state| state.delete_table(table_id))
    }

    fn upsert_row(&mut self, record: RowRecord) -> Result<()> {
        self.mutate(|state| state.upsert_row(record))
    }

    fn delete_row(&mut self, table_id: &str, row_id: &str) -> Result<()> {
        self.mutate(|state| state.delete_row(table_id, row_id))
    }

    fn apply(&mut self, writes: &[StoreWrite]) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        self.mutate(|state| state.apply(writes))
    }
}
