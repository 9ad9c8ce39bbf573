//! Output plumbing for CSV exports.
//!
//! - **Encoding**: output transcoding via `encoding_rs`, defaulting to UTF-8.
//!   Legacy Korean spreadsheet tools expect `euc-kr` (`windows-949`).
//! - **stdout**: the `-` path convention routes through standard output.
//! - **Quoting**: CSV output uses `QuoteStyle::Always` so numeric-looking codes
//!   survive a round trip through spreadsheet tools.

use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_csv_writer(
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<csv::Writer<Box<dyn Write>>> {
    let base: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };

    let writer: Box<dyn Write> = if encoding == UTF_8 {
        base
    } else {
        Box::new(TranscodingWriter::new(base, encoding))
    };

    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}

struct TranscodingWriter<W: Write> {
    inner: W,
    encoding: &'static Encoding,
    buffer: Vec<u8>,
}

impl<W: Write> TranscodingWriter<W> {
    fn new(inner: W, encoding: &'static Encoding) -> Self {
        Self {
            inner,
            encoding,
            buffer: Vec::new(),
        }
    }

    fn flush_buffer(&mut self, force: bool) -> io::Result<()> {
        let mut idx = 0;
        while idx < self.buffer.len() {
            match std::str::from_utf8(&self.buffer[idx..]) {
                Ok(valid) => {
                    let text = valid.to_owned();
                    self.encode_and_write(&text)?;
                    self.buffer.clear();
                    return Ok(());
                }
                Err(err) => {
                    if let Some(error_len) = err.error_len() {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("Invalid UTF-8 sequence in output stream ({error_len} bytes)"),
                        ));
                    }
                    let valid_up_to = err.valid_up_to();
                    if valid_up_to > 0 {
                        let valid_slice = &self.buffer[idx..idx + valid_up_to];
                        let text = std::str::from_utf8(valid_slice)
                            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                            .to_owned();
                        self.encode_and_write(&text)?;
                        self.buffer.drain(..idx + valid_up_to);
                        idx = 0;
                        continue;
                    }
                    if force {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "Incomplete UTF-8 sequence at end of output stream",
                        ));
                    } else {
                        return Ok(());
                    }
                }
            }
        }
        if force && !self.buffer.is_empty() {
            let text = String::from_utf8(self.buffer.clone()).map_err(|_| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    "Invalid UTF-8 sequence at end of output stream",
                )
            })?;
            self.encode_and_write(&text)?;
            self.buffer.clear();
        }
        Ok(())
    }

    fn encode_and_write(&mut self, text: &str) -> io::Result<()> {
        let (encoded, _output_encoding, had_errors) = self.encoding.encode(text);
        if had_errors {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to encode text using {}", self.encoding.name()),
            ));
        }
        self.inner.write_all(encoded.as_ref())
    }
}

impl<W: Write> Write for TranscodingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.flush_buffer(false)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer(true)?;
        self.inner.flush()
    }
}
