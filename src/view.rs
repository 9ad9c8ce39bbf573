//! SQL generation for the integrated and cleaned views.
//!
//! Each view is built by walking the column mapping in order: the period
//! column is wrapped in `STRFTIME`, every other column is aliased straight to
//! its standard name. The integrated view prepends a discriminator literal to
//! each arm and joins the two arms with `UNION ALL`.
//!
//! Source columns are not checked here. SQLite accepts a view over a missing
//! column and reports the error when the view is read.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{debug, info};
use rusqlite::Connection;

use crate::mapping::{ColumnMapping, ColumnTransform, IntegrationConfig, RecordKind};

/// Quotes an SQL identifier, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes an SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_expr(column: &ColumnMapping, kind: RecordKind, period_format: &str) -> String {
    let source = quote_ident(column.source(kind));
    let alias = quote_ident(&column.standard);
    match column.transform {
        ColumnTransform::Direct => format!("{source} AS {alias}"),
        ColumnTransform::YearMonth => {
            format!("STRFTIME({}, {source}) AS {alias}", quote_literal(period_format))
        }
    }
}

/// Comma-joined projection of every mapped column for one source table.
pub fn select_list(config: &IntegrationConfig, kind: RecordKind) -> String {
    config
        .columns
        .iter()
        .map(|column| column_expr(column, kind, &config.period_format))
        .join(", ")
}

fn tagged_select(config: &IntegrationConfig, kind: RecordKind) -> String {
    format!(
        "SELECT {} AS {}, {} FROM {}",
        quote_literal(config.label(kind)),
        quote_ident(&config.discriminator),
        select_list(config, kind),
        quote_ident(config.source_table(kind))
    )
}

pub fn build_view_sql(config: &IntegrationConfig) -> String {
    format!(
        "CREATE VIEW {} AS\n{}\nUNION ALL\n{}",
        quote_ident(&config.view_name),
        tagged_select(config, RecordKind::Plan),
        tagged_select(config, RecordKind::Actual)
    )
}

pub fn build_source_view_sql(config: &IntegrationConfig, kind: RecordKind) -> String {
    format!(
        "CREATE VIEW {} AS\nSELECT {} FROM {}",
        quote_ident(&config.cleaned_view_name(kind)),
        select_list(config, kind),
        quote_ident(config.source_table(kind))
    )
}

fn replace_view(conn: &mut Connection, name: &str, create_sql: &str) -> Result<()> {
    debug!("Creating view '{name}':\n{create_sql}");
    let tx = conn
        .transaction()
        .with_context(|| format!("Starting transaction for view '{name}'"))?;
    tx.execute_batch(&format!("DROP VIEW IF EXISTS {}", quote_ident(name)))
        .with_context(|| format!("Dropping view '{name}'"))?;
    tx.execute_batch(create_sql)
        .with_context(|| format!("Creating view '{name}'"))?;
    tx.commit()
        .with_context(|| format!("Committing view '{name}'"))?;
    Ok(())
}

/// Drops and recreates the integrated view. Safe to call repeatedly.
pub fn create_integrated_view(conn: &mut Connection, config: &IntegrationConfig) -> Result<()> {
    replace_view(conn, &config.view_name, &build_view_sql(config))?;
    info!(
        "Created view '{}' over '{}' and '{}' ({} column(s))",
        config.view_name,
        config.plan_table,
        config.actual_table,
        config.columns.len() + 1
    );
    Ok(())
}

/// Drops and recreates one cleaned view per source table. Returns the view names.
pub fn create_source_views(
    conn: &mut Connection,
    config: &IntegrationConfig,
) -> Result<Vec<String>> {
    let mut created = Vec::with_capacity(RecordKind::ALL.len());
    for kind in RecordKind::ALL {
        let name = config.cleaned_view_name(kind);
        replace_view(conn, &name, &build_source_view_sql(config, kind))?;
        info!("Created view '{name}' over '{}'", config.source_table(kind));
        created.push(name);
    }
    Ok(created)
}
