//! Command handlers behind the CLI. Each opens the file store from the
//! effective configuration, performs one operation and prints its outcome.

use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow, bail};
use log::debug;

use crate::{
    cli::{
        ColumnCommand, CreateTableArgs, ExportArgs, InitArgs, QueryArgs, RowCommand, TableCommand,
    },
    config::AppConfig,
    data::Value,
    error::{EntityKind, TableError},
    export,
    filter::FilterSet,
    query::{Query, SortSpec},
    repository::TableUpdate,
    rows::{BatchOperation, Fields, Row, parse_batch},
    sample,
    schema::{NewColumn, Table},
    store::{FileStore, TableStore},
    sync::{Notice, SyncAdapter, Synced},
    table,
};

pub fn open_store(config: &AppConfig) -> Result<SyncAdapter<FileStore>> {
    let store = FileStore::open(&config.data_dir)
        .with_context(|| format!("Opening table store in {:?}", config.data_dir))?;
    let mut adapter = SyncAdapter::open(store, config.retry_policy())
        .with_context(|| format!("Loading tables from {:?}", config.data_dir))?;
    if config.seed_sample_data
        && let Some(seeded) = sample::seed(&mut adapter)?
    {
        report(seeded)?;
    }
    Ok(adapter)
}

/// Prints a success notice and hands back the value. A write that never
/// reached the store is an error here: the process exits and the pending
/// queue goes with it.
fn report<T>(synced: Synced<T>) -> Result<T> {
    match synced.notice() {
        Notice::Success(message) => {
            println!("{message}");
            Ok(synced.into_value())
        }
        Notice::Failure(message) => Err(anyhow!(message)),
    }
}

/// Accepts a table id, or a table name when exactly one table carries it.
fn resolve_table<'a, S: TableStore>(adapter: &'a SyncAdapter<S>, key: &str) -> Result<&'a Table> {
    if let Ok(table) = adapter.get_table(key) {
        return Ok(table);
    }
    let matches: Vec<&Table> = adapter
        .repository()
        .tables()
        .iter()
        .filter(|t| t.name.eq_ignore_ascii_case(key))
        .collect();
    match matches.as_slice() {
        [table] => Ok(*table),
        [] => Err(TableError::not_found(EntityKind::Table, key).into()),
        _ => bail!("Table name '{key}' is ambiguous; use the table id"),
    }
}

fn table_id<S: TableStore>(adapter: &SyncAdapter<S>, key: &str) -> Result<String> {
    Ok(resolve_table(adapter, key)?.id.clone())
}

/// Parses `column=value` assignments. A value that is a JSON object (such as
/// a file reference) is kept structured; anything else is text for the codec
/// to coerce.
pub fn parse_assignments(assignments: &[String]) -> Result<Fields> {
    let mut fields = Fields::new();
    for assignment in assignments {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected column=value but got '{assignment}'"))?;
        let key = key.trim();
        if key.is_empty() {
            bail!("Assignment '{assignment}' is missing a column id");
        }
        let value = match serde_json::from_str::<serde_json::Value>(value) {
            Ok(json @ serde_json::Value::Object(_)) => Value::from_json(json),
            _ => Value::text(value),
        };
        fields.insert(key.to_string(), value);
    }
    Ok(fields)
}

pub fn init(config: &AppConfig, args: &InitArgs) -> Result<()> {
    let mut adapter = open_store(config)?;
    if args.sample
        && let Some(seeded) = sample::seed(&mut adapter)?
    {
        report(seeded)?;
    }
    println!(
        "Store ready at {:?} with {} table(s)",
        adapter.store().path(),
        adapter.list_tables().len()
    );
    Ok(())
}

pub fn table(config: &AppConfig, command: &TableCommand) -> Result<()> {
    let mut adapter = open_store(config)?;
    match command {
        TableCommand::List => {
            let cells: Vec<Vec<String>> = adapter
                .repository()
                .tables()
                .iter()
                .map(|t| {
                    vec![
                        t.id.clone(),
                        t.name.clone(),
                        t.columns.len().to_string(),
                        t.rows.len().to_string(),
                    ]
                })
                .collect();
            let headers = ["id", "name", "columns", "rows"].map(String::from);
            print!("{}", table::render_lines(&headers, &cells));
        }
        TableCommand::Show { table } => {
            let table = resolve_table(&adapter, table)?;
            println!("{} ({})", table.name, table.id);
            let cells: Vec<Vec<String>> = table
                .columns
                .iter()
                .map(|c| {
                    vec![
                        c.id.clone(),
                        c.name.clone(),
                        c.column_type.to_string(),
                        c.options().join("|"),
                    ]
                })
                .collect();
            let headers = ["id", "name", "type", "options"].map(String::from);
            print!("{}", table::render_lines(&headers, &cells));
            println!("{} row(s)", table.rows.len());
        }
        TableCommand::Create(CreateTableArgs { name, columns }) => {
            let columns = columns
                .iter()
                .map(|spec| NewColumn::parse(spec))
                .collect::<Result<Vec<_>, _>>()?;
            let created = report(adapter.create_table(name, columns)?)?;
            println!("{}", created.id);
        }
        TableCommand::Rename { table, name } => {
            let id = table_id(&adapter, table)?;
            let update = TableUpdate {
                name: Some(name.clone()),
                columns: None,
            };
            report(adapter.update_table(&id, update)?)?;
        }
        TableCommand::Delete { table } => {
            let id = table_id(&adapter, table)?;
            report(adapter.delete_table(&id)?)?;
        }
    }
    Ok(())
}

pub fn column(config: &AppConfig, command: &ColumnCommand) -> Result<()> {
    let mut adapter = open_store(config)?;
    match command {
        ColumnCommand::Add(args) => {
            let id = table_id(&adapter, &args.table)?;
            let mut spec = NewColumn::new(&args.name, args.column_type)
                .with_options(args.options.iter().cloned());
            if let Some(column_id) = &args.id {
                spec = spec.with_id(column_id);
            }
            report(adapter.add_column(&id, spec)?)?;
        }
        ColumnCommand::Rename {
            table,
            column,
            name,
        } => {
            let id = table_id(&adapter, table)?;
            report(adapter.rename_column(&id, column, name)?)?;
        }
        ColumnCommand::Remove { table, column } => {
            let id = table_id(&adapter, table)?;
            report(adapter.remove_column(&id, column)?)?;
        }
        ColumnCommand::Reorder { table, order } => {
            let id = table_id(&adapter, table)?;
            let order: Vec<&str> = order.iter().map(|s| s.trim()).collect();
            report(adapter.reorder_columns(&id, &order)?)?;
        }
    }
    Ok(())
}

pub fn row(config: &AppConfig, command: &RowCommand) -> Result<()> {
    let mut adapter = open_store(config)?;
    match command {
        RowCommand::Add {
            table,
            set,
            id: row_id,
        } => {
            let id = table_id(&adapter, table)?;
            let fields = parse_assignments(set)?;
            let row = report(adapter.create_row(&id, row_id.clone(), fields)?)?;
            println!("{}", row.id);
        }
        RowCommand::Update { table, row, set } => {
            let id = table_id(&adapter, table)?;
            let fields = parse_assignments(set)?;
            report(adapter.update_row(&id, row, fields)?)?;
        }
        RowCommand::Delete { table, row } => {
            let id = table_id(&adapter, table)?;
            report(adapter.delete_row(&id, row)?)?;
        }
        RowCommand::Batch { table, operations } => {
            let id = table_id(&adapter, table)?;
            let operations = load_batch(operations)?;
            debug!("Applying {} batch operation(s)", operations.len());
            let outcome = report(adapter.batch_rows(&id, &operations)?)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Serializing batch report")?
            );
        }
    }
    Ok(())
}

fn load_batch(path: &Path) -> Result<Vec<BatchOperation>> {
    let raw = fs::read_to_string(path).with_context(|| format!("Reading batch file {path:?}"))?;
    let document: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("Parsing batch file {path:?}"))?;
    Ok(parse_batch(&document)?)
}

pub fn query(config: &AppConfig, args: &QueryArgs) -> Result<()> {
    let adapter = open_store(config)?;
    let table = resolve_table(&adapter, &args.table)?;
    let mut query = Query::new().filters(FilterSet::from_pairs(table, &args.filters)?);
    if let Some(term) = &args.search {
        query = query.search(term);
    }
    if let Some(sort) = &args.sort {
        query = query.sort(sort.parse::<SortSpec>()?);
    }
    let mut rows: Vec<&Row> = query.run(table)?;
    let matched = rows.len();
    if let Some(limit) = args.limit {
        rows.truncate(limit);
    }
    let view = args.view.unwrap_or(config.default_view);
    print!("{}", view.render(table, &rows));
    debug!("{} of {} row(s) matched", matched, table.rows.len());
    Ok(())
}

pub fn export(config: &AppConfig, args: &ExportArgs) -> Result<()> {
    let adapter = open_store(config)?;
    let table = resolve_table(&adapter, &args.table)?;
    let dir = std::env::current_dir().context("Resolving current directory")?;
    let written = export::export_table(
        table,
        args.format,
        args.output.as_deref(),
        &dir,
        args.output_encoding.as_deref(),
    )?;
    if let Some(path) = written {
        println!("Exported '{}' to {}", table.name, path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FileRef;

    #[test]
    fn assignments_split_on_first_equals() {
        let fields = parse_assignments(&["note=a=b".to_string(), " age =31".to_string()]).unwrap();
        assert_eq!(fields.get("note"), Some(&Value::text("a=b")));
        assert_eq!(fields.get("age"), Some(&Value::text("31")));
    }

    #[test]
    fn json_object_assignment_becomes_file_reference() {
        let raw = r#"cv={"name":"cv.pdf","size":10,"mimeType":"application/pdf","contentRef":"blob:1","lastModified":0}"#;
        let fields = parse_assignments(&[raw.to_string()]).unwrap();
        match fields.get("cv") {
            Some(Value::File(FileRef { name, .. })) => assert_eq!(name, "cv.pdf"),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn malformed_assignments_fail() {
        assert!(parse_assignments(&["novalue".to_string()]).is_err());
        assert!(parse_assignments(&["=x".to_string()]).is_err());
    }
}
