use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{export::ExportFormat, schema::ColumnType, table::ViewMode};

#[derive(Debug, Parser)]
#[command(author, version, about = "Build and query typed tables from the command line", long_about = None)]
pub struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Directory holding the table store (overrides config and TABLE_BUILDER_DATA_DIR)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the data directory and store, optionally seeding sample data
    Init(InitArgs),
    /// Create, inspect, rename and delete tables
    #[command(subcommand)]
    Table(TableCommand),
    /// Add, rename, remove and reorder columns
    #[command(subcommand)]
    Column(ColumnCommand),
    /// Create, update and delete rows
    #[command(subcommand)]
    Row(RowCommand),
    /// Search, filter and sort the rows of a table
    Query(QueryArgs),
    /// Export a table as JSON, YAML or CSV
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Seed the employee sample table when the store is empty
    #[arg(long)]
    pub sample: bool,
}

#[derive(Debug, Subcommand)]
pub enum TableCommand {
    /// List every table with its column count
    List,
    /// Print a table's columns
    Show { table: String },
    /// Create a table
    Create(CreateTableArgs),
    /// Rename a table
    Rename { table: String, name: String },
    /// Delete a table and all of its rows
    Delete { table: String },
}

#[derive(Debug, Args)]
pub struct CreateTableArgs {
    pub name: String,
    /// Column definitions of the form `name:type[:option|option]`
    #[arg(long = "column", action = clap::ArgAction::Append)]
    pub columns: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum ColumnCommand {
    /// Append a column
    Add(AddColumnArgs),
    /// Change a column's display name
    Rename {
        table: String,
        column: String,
        name: String,
    },
    /// Remove a column and its values from every row
    Remove { table: String, column: String },
    /// Reorder columns; takes every column id exactly once
    Reorder {
        table: String,
        #[arg(value_delimiter = ',', required = true)]
        order: Vec<String>,
    },
}

#[derive(Debug, Args)]
pub struct AddColumnArgs {
    pub table: String,
    pub name: String,
    /// Column type (text, number, date, boolean, select, email, phone, url, file)
    #[arg(long = "type", default_value = "text")]
    pub column_type: ColumnType,
    /// Explicit column id (derived from the name when omitted)
    #[arg(long)]
    pub id: Option<String>,
    /// Allowed value for select columns
    #[arg(long = "option", action = clap::ArgAction::Append)]
    pub options: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum RowCommand {
    /// Add a row
    Add {
        table: String,
        /// Field assignments `column=value`
        #[arg(long = "set", action = clap::ArgAction::Append)]
        set: Vec<String>,
        /// Explicit row id
        #[arg(long)]
        id: Option<String>,
    },
    /// Merge field assignments into an existing row
    Update {
        table: String,
        row: String,
        #[arg(long = "set", action = clap::ArgAction::Append, required = true)]
        set: Vec<String>,
    },
    /// Delete a row
    Delete { table: String, row: String },
    /// Apply a JSON list of create/update/delete operations
    Batch { table: String, operations: PathBuf },
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    pub table: String,
    /// Case-insensitive text searched across every column
    #[arg(long)]
    pub search: Option<String>,
    /// Column filters such as `active=true`, `salary_min=50000` or `hired_date_start=2023-01-01`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Sort directive of the form `column[:asc|desc]`
    #[arg(long)]
    pub sort: Option<String>,
    /// Output layout (defaults to the configured view)
    #[arg(long, value_enum)]
    pub view: Option<ViewMode>,
    /// Limit number of rows printed
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    pub table: String,
    #[arg(long, value_enum, default_value = "json")]
    pub format: ExportFormat,
    /// Output file (`-` for stdout; a name derived from the table otherwise)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Character encoding of the output (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}
