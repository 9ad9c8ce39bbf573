use std::{fmt, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile sales plan and actual tables into one SQLite view",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the integrated plan/actual view, preview it, and optionally export it
    Integrate(IntegrateArgs),
    /// Print the SQL that would create the views
    Sql(SqlArgs),
    /// List the column mapping or write it out as a YAML template
    Mapping(MappingArgs),
    /// List tables and views in a SQLite database
    Tables(TablesArgs),
    /// Summarize plan versus actual totals per period
    Summary(SummaryArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// YAML file overriding table names, labels, and the column mapping
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Name of the integrated view (overrides the config file)
    #[arg(long = "view")]
    pub view: Option<String>,
}

#[derive(Debug, Args)]
pub struct IntegrateArgs {
    /// Input SQLite database containing the plan and actual tables
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Modify the input database directly instead of a temporary copy
    #[arg(long = "in-place")]
    pub in_place: bool,
    /// Also create one cleaned view per source table
    #[arg(long = "cleaned-views")]
    pub cleaned_views: bool,
    /// Number of rows to preview
    #[arg(long, default_value_t = 20)]
    pub rows: usize,
    /// Skip the terminal preview
    #[arg(long = "no-preview")]
    pub no_preview: bool,
    /// Export the integrated view to this file (`-` for stdout)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Export format (inferred from the output extension when omitted)
    #[arg(long = "format", value_enum)]
    pub format: Option<ExportFormat>,
    /// Worksheet name for xlsx exports
    #[arg(long = "sheet", default_value = crate::export::DEFAULT_SHEET_NAME)]
    pub sheet: String,
    /// Character encoding for csv/tsv exports (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
    /// Save the database, including the new view(s), to this path
    #[arg(long = "save-db")]
    pub save_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
#[value(rename_all = "kebab-case")]
pub enum ExportFormat {
    Xlsx,
    Csv,
    Tsv,
    Json,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
            ExportFormat::Json => "json",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Args)]
pub struct SqlArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Also print the cleaned per-source view statements
    #[arg(long = "cleaned-views")]
    pub cleaned_views: bool,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Write the effective configuration as YAML to this path
    #[arg(long = "write")]
    pub write: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// SQLite database to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Input SQLite database containing the plan and actual tables
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Numeric columns to total (defaults to 수량 and 장부금액)
    #[arg(short = 'M', long = "measure", action = clap::ArgAction::Append)]
    pub measures: Vec<String>,
}
