pub mod cli;
pub mod commands;
pub mod config;
pub mod data;
pub mod error;
pub mod export;
pub mod filter;
pub mod io_utils;
pub mod query;
pub mod repository;
pub mod retry;
pub mod rows;
pub mod sample;
pub mod schema;
pub mod store;
pub mod sync;
pub mod table;
pub mod yaml;

use std::{env, sync::OnceLock};

use anyhow::Result;
use clap::Parser;
use log::{LevelFilter, debug};

use crate::{
    cli::{Cli, Commands},
    config::AppConfig,
};

pub use crate::{
    error::TableError,
    repository::Repository,
    schema::{Column, ColumnType, Table},
    sync::SyncAdapter,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("table_builder", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?.with_data_dir(cli.data_dir.clone());
    config.validate()?;
    debug!("Using data directory {:?}", config.data_dir);
    match &cli.command {
        Commands::Init(args) => commands::init(&config, args),
        Commands::Table(command) => commands::table(&config, command),
        Commands::Column(command) => commands::column(&config, command),
        Commands::Row(command) => commands::row(&config, command),
        Commands::Query(args) => commands::query(&config, args),
        Commands::Export(args) => commands::export(&config, args),
    }
}
