pub mod cli;
pub mod data;
pub mod database;
pub mod export;
pub mod integrate;
pub mod io_utils;
pub mod mapping;
pub mod summary;
pub mod table;
pub mod view;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands, ConfigArgs},
    database::{WorkingDatabase, WorkingMode},
    mapping::{IntegrationConfig, RecordKind},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("sales_view", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Integrate(args) => integrate::execute(&args),
        Commands::Sql(args) => handle_sql(&args),
        Commands::Mapping(args) => handle_mapping(&args),
        Commands::Tables(args) => handle_tables(&args),
        Commands::Summary(args) => summary::execute(&args),
    }
}

/// Loads the mapping file (or defaults), applies CLI overrides, and validates.
pub(crate) fn load_config(args: &ConfigArgs) -> Result<IntegrationConfig> {
    let mut config = match &args.config {
        Some(path) => IntegrationConfig::load(path)
            .with_context(|| format!("Loading mapping from {path:?}"))?,
        None => IntegrationConfig::default(),
    };
    if let Some(view) = &args.view {
        config.view_name = view.clone();
    }
    config.validate().context("Invalid column mapping")?;
    Ok(config)
}

fn handle_sql(args: &cli::SqlArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    println!("{};", view::build_view_sql(&config));
    if args.cleaned_views {
        for kind in RecordKind::ALL {
            println!();
            println!("{};", view::build_source_view_sql(&config, kind));
        }
    }
    Ok(())
}

fn handle_mapping(args: &cli::MappingArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    if let Some(path) = &args.write {
        config
            .save(path)
            .with_context(|| format!("Writing mapping to {path:?}"))?;
        info!(
            "Mapping with {} column(s) written to {:?}",
            config.columns.len(),
            path
        );
        return Ok(());
    }

    let headers = vec![
        "#".to_string(),
        "standard".to_string(),
        config.plan_table.clone(),
        config.actual_table.clone(),
        "transform".to_string(),
    ];
    let rows = config
        .columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            vec![
                (idx + 1).to_string(),
                column.standard.clone(),
                column.plan.clone(),
                column.actual.clone(),
                column.transform.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "View '{}' tags rows with '{}' = '{}' / '{}'",
        config.view_name, config.discriminator, config.plan_label, config.actual_label
    );
    Ok(())
}

fn handle_tables(args: &cli::TablesArgs) -> Result<()> {
    let mut working = WorkingDatabase::open(&args.input, WorkingMode::Copy)?;
    let objects = database::list_objects(working.connection()?)
        .with_context(|| format!("Inspecting {:?}", args.input))?;
    if objects.is_empty() {
        info!("{:?} contains no tables or views", args.input);
        return Ok(());
    }
    let headers = vec!["name".to_string(), "type".to_string(), "rows".to_string()];
    let rows = objects
        .iter()
        .map(|object| {
            vec![
                object.name.clone(),
                object.kind.clone(),
                object.rows.map(|n| n.to_string()).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!("Listed {} object(s) from {:?}", objects.len(), args.input);
    Ok(())
}
