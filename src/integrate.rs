//! The `integrate` command: build the view(s) on the working database, show a
//! preview, export, and optionally save the database.

use anyhow::{Context, Result};
use log::info;

use crate::{
    cli::IntegrateArgs,
    database::{self, WorkingDatabase, WorkingMode},
    export::{self, ExportOptions},
    io_utils, load_config, table, view,
};

pub fn execute(args: &IntegrateArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let mode = if args.in_place {
        WorkingMode::InPlace
    } else {
        WorkingMode::Copy
    };
    // Resolve export settings before touching the database.
    let export_target = match &args.output {
        Some(path) => Some((
            path,
            ExportOptions {
                format: export::resolve_format(path, args.format)?,
                sheet_name: &args.sheet,
                encoding: io_utils::resolve_encoding(args.output_encoding.as_deref())?,
            },
        )),
        None => None,
    };

    info!(
        "Integrating '{}' and '{}' from {:?}",
        config.plan_table, config.actual_table, args.input
    );
    let mut working = WorkingDatabase::open(&args.input, mode)?;
    let conn = working.connection()?;
    view::create_integrated_view(conn, &config)?;
    if args.cleaned_views {
        view::create_source_views(conn, &config)?;
    }

    let dataset = database::read_view(conn, &config.view_name, None)?;
    info!(
        "View '{}' holds {} row(s) across {} column(s)",
        config.view_name,
        dataset.len(),
        dataset.headers.len()
    );

    // Keep the preview off stdout when the export itself goes there.
    let exporting_to_stdout = args
        .output
        .as_deref()
        .is_some_and(io_utils::is_dash);
    if !args.no_preview && !exporting_to_stdout {
        print!("{}", table::render_dataset(&dataset, Some(args.rows)));
        if dataset.len() > args.rows {
            info!("Showing {} of {} row(s)", args.rows, dataset.len());
        }
    }

    if let Some((path, options)) = &export_target {
        export::export_dataset(&dataset, path, options)
            .with_context(|| format!("Exporting view '{}' to {path:?}", config.view_name))?;
    }

    if let Some(destination) = &args.save_db {
        working
            .persist_to(destination)
            .with_context(|| format!("Saving database to {destination:?}"))?;
    } else if args.in_place {
        info!("Updated {:?} in place", args.input);
    }
    Ok(())
}
