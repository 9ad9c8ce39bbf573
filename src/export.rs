//! Dataset export to xlsx, delimited text, and JSON.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use encoding_rs::Encoding;
use log::info;
use rust_xlsxwriter::{Format, Workbook};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::{
    cli::ExportFormat,
    data::{Cell, Dataset},
    io_utils,
};

pub const DEFAULT_SHEET_NAME: &str = "통합데이터";

#[derive(Debug, Clone)]
pub struct ExportOptions<'a> {
    pub format: ExportFormat,
    pub sheet_name: &'a str,
    pub encoding: &'static Encoding,
}

/// Picks the explicit format, falling back to the output file extension.
pub fn resolve_format(path: &Path, explicit: Option<ExportFormat>) -> Result<ExportFormat> {
    if let Some(format) = explicit {
        return Ok(format);
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("xlsx") => Ok(ExportFormat::Xlsx),
        Some("csv") => Ok(ExportFormat::Csv),
        Some("tsv") => Ok(ExportFormat::Tsv),
        Some("json") => Ok(ExportFormat::Json),
        _ if io_utils::is_dash(path) => Ok(ExportFormat::Csv),
        Some(other) => {
            bail!("Cannot infer export format from extension '.{other}'; use --format")
        }
        None => bail!("Cannot infer export format for {path:?}; use --format"),
    }
}

/// Writes every row of `dataset` to `path` (`-` for stdout). Returns the row count.
pub fn export_dataset(
    dataset: &Dataset,
    path: &Path,
    options: &ExportOptions<'_>,
) -> Result<usize> {
    match options.format {
        ExportFormat::Xlsx => write_xlsx(dataset, path, options.sheet_name)?,
        ExportFormat::Csv => write_delimited(dataset, path, b',', options.encoding)?,
        ExportFormat::Tsv => write_delimited(dataset, path, b'\t', options.encoding)?,
        ExportFormat::Json => write_json(dataset, path)?,
    }
    info!(
        "Exported {} row(s) as {} to {:?}",
        dataset.len(),
        options.format,
        path
    );
    Ok(dataset.len())
}

fn write_xlsx(dataset: &Dataset, path: &Path, sheet_name: &str) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(sheet_name)
        .with_context(|| format!("Naming worksheet '{sheet_name}'"))?;

    for (col, header) in dataset.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, xlsx_col(col)?, header, &header_format)
            .with_context(|| format!("Writing header '{header}'"))?;
    }
    for (row_idx, row) in dataset.rows.iter().enumerate() {
        let xlsx_row = u32::try_from(row_idx + 1).context("Too many rows for a worksheet")?;
        for (col, cell) in row.iter().enumerate() {
            let column = xlsx_col(col)?;
            let written = match cell {
                Cell::Null => continue,
                Cell::Integer(i) => worksheet.write_number(xlsx_row, column, *i as f64),
                Cell::Real(f) => worksheet.write_number(xlsx_row, column, *f),
                Cell::Text(text) => worksheet.write_string(xlsx_row, column, text),
                Cell::Blob(_) => worksheet.write_string(xlsx_row, column, cell.as_display()),
            };
            written.with_context(|| format!("Writing row {} column {}", row_idx + 2, col + 1))?;
        }
    }
    worksheet
        .set_freeze_panes(1, 0)
        .context("Freezing header row")?;
    worksheet.autofit();

    if io_utils::is_dash(path) {
        let buffer = workbook.save_to_buffer().context("Rendering workbook")?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(&buffer)?;
        stdout.flush()?;
    } else {
        workbook
            .save(path)
            .with_context(|| format!("Saving workbook {path:?}"))?;
    }
    Ok(())
}

fn xlsx_col(idx: usize) -> Result<u16> {
    u16::try_from(idx).context("Too many columns for a worksheet")
}

fn write_delimited(
    dataset: &Dataset,
    path: &Path,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut writer = io_utils::open_csv_writer(Some(path), delimiter, encoding)?;
    writer
        .write_record(&dataset.headers)
        .context("Writing header row")?;
    for (idx, row) in dataset.rows.iter().enumerate() {
        writer
            .write_record(row.iter().map(Cell::as_display))
            .with_context(|| format!("Writing row {}", idx + 2))?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}

struct JsonRow<'a> {
    headers: &'a [String],
    cells: &'a [Cell],
}

impl Serialize for JsonRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.headers.len()))?;
        for (header, cell) in self.headers.iter().zip(self.cells) {
            map.serialize_entry(header, cell)?;
        }
        map.end()
    }
}

fn write_json(dataset: &Dataset, path: &Path) -> Result<()> {
    let rows = dataset
        .rows
        .iter()
        .map(|cells| JsonRow {
            headers: &dataset.headers,
            cells,
        })
        .collect::<Vec<_>>();
    let mut writer: Box<dyn Write> = if io_utils::is_dash(path) {
        Box::new(io::stdout())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        ))
    };
    serde_json::to_writer_pretty(&mut writer, &rows).context("Writing JSON")?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
