//! CSV I/O for frames.
//!
//! BER extracts are frequently Windows-1252 rather than UTF-8, so reading
//! decodes through `encoding_rs` with a selectable input encoding. Delimiters
//! resolve from the file extension (`.tsv` means tab) with manual override.
//! Output must be `.csv` or `.tsv`; any other suffix is a configuration error
//! raised before a byte is written.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::data::Value;
use crate::frame::{Column, Frame};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Output suffix gate: the pipeline persists CSV/TSV only.
pub fn ensure_supported_output(path: &Path) -> Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") || ext.eq_ignore_ascii_case("tsv") => Ok(()),
        Some(other) => bail!("Unsupported output format '.{other}' (expected .csv or .tsv)"),
        None => bail!("Output path {path:?} has no file extension (expected .csv or .tsv)"),
    }
}

fn open_csv_reader(path: &Path, delimiter: u8) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).with_context(|| format!("Opening input file {path:?}"))?;
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(false);
    Ok(builder.from_reader(BufReader::new(file)))
}

fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads a CSV file into a frame of raw string cells (empty fields become
/// null). Typing happens in the standardizer, driven by dtype hints.
pub fn read_frame(path: &Path, delimiter: u8, encoding: &'static Encoding) -> Result<Frame> {
    let mut reader = open_csv_reader(path, delimiter)?;
    let headers = decode_record(&reader.byte_headers()?.clone(), encoding)
        .with_context(|| format!("Decoding headers of {path:?}"))?;
    let mut values: Vec<Vec<Option<Value>>> = vec![Vec::new(); headers.len()];
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {} of {path:?}", row_idx + 2))?;
        let decoded = decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {} of {path:?}", row_idx + 2))?;
        if decoded.len() != headers.len() {
            bail!(
                "Row {} of {path:?} has {} field(s), expected {}",
                row_idx + 2,
                decoded.len(),
                headers.len()
            );
        }
        for (column, field) in values.iter_mut().zip(decoded) {
            column.push(if field.is_empty() {
                None
            } else {
                Some(Value::String(field))
            });
        }
    }
    let columns = headers
        .into_iter()
        .zip(values)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    Frame::from_columns(columns).with_context(|| format!("Assembling frame from {path:?}"))
}

/// Writes a frame as UTF-8 CSV/TSV. Null cells render empty; everything is
/// quoted so padded labels survive a round trip.
pub fn write_frame(path: &Path, frame: &Frame, delimiter: Option<u8>) -> Result<()> {
    ensure_supported_output(path)?;
    let delimiter = resolve_input_delimiter(path, delimiter);
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .double_quote(true);
    let mut writer = builder.from_writer(BufWriter::new(file));
    writer
        .write_record(frame.headers())
        .context("Writing headers")?;
    for row in 0..frame.n_rows() {
        let record: Vec<String> = frame
            .columns()
            .iter()
            .map(|column| {
                column.values[row]
                    .as_ref()
                    .map(|v| v.as_display())
                    .unwrap_or_default()
            })
            .collect();
        writer
            .write_record(&record)
            .with_context(|| format!("Writing row {}", row + 2))?;
    }
    writer.flush().context("Flushing output")?;
    Ok(())
}

/// Reads a one-column id list (e.g. the valid 2016 small-area ids), returning
/// rendered values.
pub fn read_id_list(path: &Path, delimiter: Option<u8>, encoding: &'static Encoding) -> Result<Vec<String>> {
    let delimiter = resolve_input_delimiter(path, delimiter);
    let frame = read_frame(path, delimiter, encoding)?;
    let column = frame
        .columns()
        .first()
        .ok_or_else(|| anyhow!("Id list {path:?} has no columns"))?;
    Ok(column
        .values
        .iter()
        .filter_map(|value| value.as_ref().map(|v| v.as_display()))
        .collect())
}
