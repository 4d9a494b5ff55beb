//! Table exports: a full snapshot as JSON or YAML, or the rows as CSV.
//!
//! CSV holds column names in the header and display values in column order;
//! file cells are written as their file name.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::ValueEnum;
use heck::ToKebabCase;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    io_utils,
    rows::Row,
    schema::{Column, Table},
    yaml,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Yaml,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Yaml => "yaml",
            ExportFormat::Csv => "csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: String,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub exported_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn of(table: &Table) -> Self {
        Self {
            id: table.id.clone(),
            name: table.name.clone(),
            columns: table.columns.clone(),
            rows: table.rows.clone(),
            exported_at: Utc::now(),
        }
    }

    pub fn into_table(self) -> Table {
        Table {
            id: self.id,
            name: self.name,
            columns: self.columns,
            rows: self.rows,
        }
    }
}

/// `kebab-case(name).ext`, falling back to `table.ext` for names with no
/// usable characters.
pub fn default_file_name(table: &Table, format: ExportFormat) -> String {
    let slug = table.name.to_kebab_case();
    let slug = if slug.is_empty() { "table".to_string() } else { slug };
    format!("{slug}.{}", format.extension())
}

pub fn write_csv<W: Write>(table: &Table, rows: &[&Row], writer: W) -> Result<()> {
    let mut csv = io_utils::csv_writer(writer);
    csv.write_record(table.headers())
        .context("Writing CSV header")?;
    for row in rows {
        let record: Vec<String> = table.columns.iter().map(|c| row.display(c)).collect();
        csv.write_record(&record)
            .with_context(|| format!("Writing CSV row '{}'", row.id))?;
    }
    csv.flush().context("Flushing CSV output")?;
    Ok(())
}

pub fn write_export<W: Write>(table: &Table, format: ExportFormat, mut writer: W) -> Result<()> {
    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &Snapshot::of(table))
                .context("Serializing JSON snapshot")?;
            writeln!(writer)?;
        }
        ExportFormat::Yaml => {
            let rendered = yaml::to_string(&Snapshot::of(table))?;
            writer.write_all(rendered.as_bytes())?;
        }
        ExportFormat::Csv => {
            let rows: Vec<&Row> = table.rows.iter().collect();
            write_csv(table, &rows, &mut writer)?;
        }
    }
    writer.flush().context("Flushing export output")?;
    Ok(())
}

/// Writes the export to `output`, or to `dir/<default file name>` when no
/// output is given. `-` writes to stdout. Returns the file written, if any.
pub fn export_table(
    table: &Table,
    format: ExportFormat,
    output: Option<&Path>,
    dir: &Path,
    encoding: Option<&str>,
) -> Result<Option<PathBuf>> {
    let encoding = io_utils::resolve_encoding(encoding)?;
    let target = match output {
        Some(path) if io_utils::is_dash(path) => None,
        Some(path) => Some(path.to_path_buf()),
        None => Some(dir.join(default_file_name(table, format))),
    };
    let writer = io_utils::open_output(target.as_deref(), encoding)?;
    write_export(table, format, writer)
        .with_context(|| format!("Exporting table '{}' as {}", table.name, format.extension()))?;
    if let Some(path) = &target {
        info!(
            "Exported {} row(s) of '{}' to {:?}",
            table.rows.len(),
            table.name,
            path
        );
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{FileRef, Value},
        rows::Fields,
        schema::{ColumnType, NewColumn},
    };

    fn contacts() -> Table {
        let table = Table::new(
            "t",
            "My Contacts",
            vec![
                NewColumn::new("Full Name", ColumnType::Text).with_id("name"),
                NewColumn::new("Photo", ColumnType::File).with_id("photo"),
                NewColumn::new("Score", ColumnType::Number).with_id("score"),
            ],
        )
        .unwrap();
        let mut fields = Fields::new();
        fields.insert("name".into(), Value::text("Lee, Amy"));
        fields.insert(
            "photo".into(),
            Value::File(FileRef::new("amy.png", 2048, "image/png")),
        );
        fields.insert("score".into(), Value::Number(7.5));
        table.create_row(Some("r1".into()), fields).unwrap().0
    }

    #[test]
    fn csv_uses_names_and_display_values() {
        let table = contacts();
        let mut out = Vec::new();
        write_export(&table, ExportFormat::Csv, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Full Name,Photo,Score\n\"Lee, Amy\",amy.png,7.5\n");
    }

    #[test]
    fn json_snapshot_reads_back_as_the_same_table() {
        let table = contacts();
        let mut out = Vec::new();
        write_export(&table, ExportFormat::Json, &mut out).unwrap();
        let snapshot: Snapshot = serde_json::from_slice(&out).unwrap();
        assert_eq!(snapshot.into_table(), table);
    }

    #[test]
    fn yaml_snapshot_reads_back_as_the_same_table() {
        let table = contacts();
        let mut out = Vec::new();
        write_export(&table, ExportFormat::Yaml, &mut out).unwrap();
        let snapshot: Snapshot = yaml::parse(std::str::from_utf8(&out).unwrap()).unwrap();
        assert_eq!(snapshot.into_table(), table);
    }

    #[test]
    fn default_name_is_slugged() {
        let table = contacts();
        assert_eq!(default_file_name(&table, ExportFormat::Csv), "my-contacts.csv");
        let unnamed = table.rename("!!!").unwrap();
        assert_eq!(default_file_name(&unnamed, ExportFormat::Json), "table.json");
    }

    #[test]
    fn export_without_output_lands_in_dir() {
        let dir = tempfile::tempdir().expect("temp dir");
        let table = contacts();
        let written = export_table(&table, ExportFormat::Json, None, dir.path(), None)
            .unwrap()
            .unwrap();
        assert_eq!(written, dir.path().join("my-contacts.json"));
        assert!(written.exists());
    }
}
