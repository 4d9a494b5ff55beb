//! Demo content: a small employee directory.

use log::info;

use crate::{
    data::Value,
    error::Result,
    rows::Fields,
    schema::{ColumnType, NewColumn, Table},
    store::TableStore,
    sync::{SyncAdapter, Synced},
};

pub const SAMPLE_TABLE_ID: &str = "sample-employees";

pub fn sample_table() -> Result<Table> {
    let columns = vec![
        NewColumn::new("Name", ColumnType::Text).with_id("name"),
        NewColumn::new("Department", ColumnType::Select)
            .with_id("department")
            .with_options(["Engineering", "Marketing", "People", "Finance"]),
        NewColumn::new("Salary", ColumnType::Number).with_id("salary"),
        NewColumn::new("Hired", ColumnType::Date).with_id("hired_date"),
        NewColumn::new("Email", ColumnType::Email).with_id("email"),
        NewColumn::new("Phone", ColumnType::Phone).with_id("phone"),
        NewColumn::new("Active", ColumnType::Boolean).with_id("active"),
    ];
    let mut table = Table::new(SAMPLE_TABLE_ID, "Employees", columns)?;
    let people = [
        (
            "emp1",
            "Ming Zhang",
            "Engineering",
            65000.0,
            "2023-01-15",
            "ming.zhang@company.com",
            "0912-345-678",
        ),
        (
            "emp2",
            "Hua Li",
            "Marketing",
            58000.0,
            "2023-03-22",
            "hua.li@company.com",
            "0923-456-789",
        ),
    ];
    for (id, name, department, salary, hired, email, phone) in people {
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::text(name));
        fields.insert("department".into(), Value::text(department));
        fields.insert("salary".into(), Value::Number(salary));
        fields.insert("hired_date".into(), Value::text(hired));
        fields.insert("email".into(), Value::text(email));
        fields.insert("phone".into(), Value::text(phone));
        fields.insert("active".into(), Value::Boolean(true));
        table = table.create_row(Some(id.to_string()), fields)?.0;
    }
    Ok(table)
}

/// Seeds the sample table into an empty store. Does nothing once any table
/// exists.
pub fn seed<S: TableStore>(adapter: &mut SyncAdapter<S>) -> Result<Option<Synced<Table>>> {
    if !adapter.repository().is_empty() {
        return Ok(None);
    }
    info!("Inserting sample data");
    adapter.import_table(sample_table()?).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{retry::RetryPolicy, store::MemoryStore};

    #[test]
    fn seeds_once() {
        let mut adapter = SyncAdapter::open(MemoryStore::new(), RetryPolicy::no_retry()).unwrap();
        let seeded = seed(&mut adapter).unwrap().unwrap();
        assert!(seeded.is_persisted());
        assert_eq!(seeded.value.rows.len(), 2);
        assert!(seed(&mut adapter).unwrap().is_none());
        assert_eq!(adapter.list_tables().len(), 1);
        assert_eq!(adapter.store().list_rows(SAMPLE_TABLE_ID).unwrap().len(), 2);
    }
}
