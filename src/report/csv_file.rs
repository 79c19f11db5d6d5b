//! Reading and writing report files.
//!
//! Values are written as plain text: strings verbatim, `null` as an empty cell and any other scalar through its
//! JSON rendering. Reading a report back therefore yields strings only.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::{info, trace};
use serde_json::Value;

use crate::ghgql_error::GhQueryError;
use crate::nested;
use crate::report::Row;

/// Writes `rows` into the CSV file at `path`, using the keys of the first row as columns.
/// <br/><br/>
/// Overwrites the file by default; with `append` the rows are added after the existing content. Either way a
/// header is only written when the file is (re)started, ie: when it did not exist yet or when overwriting.
/// Writing no rows at all does not touch the file system.
pub fn write_csv(path: &Path, rows: &[Row], append: bool) -> Result<(), GhQueryError> {
    let first_row = match rows.first() {
        Some(first_row) => first_row,
        None => {
            info!("No rows to write");
            return Ok(());
        }
    };

    let is_new_file = !path.exists();
    let fieldnames: Vec<&String> = first_row.keys().collect();

    let to_error = |e: anyhow::Error| {
        trace!("Error = {:?}", e);
        GhQueryError::CsvWriteError {
            path: path.display().to_string(),
            nested: e,
        }
    };

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .map_err(|e| to_error(nested!(e)))?;

    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);

    if is_new_file || !append {
        writer.write_record(&fieldnames).map_err(|e| to_error(nested!(e)))?;
    }

    for row in rows {
        writer
            .write_record(fieldnames.iter().map(|key| cell(row.get(key.as_str()))))
            .map_err(|e| to_error(nested!(e)))?;
    }

    writer.flush().map_err(|e| to_error(nested!(e)))?;

    let file_name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    info!("Wrote CSV:");
    info!(" - {}", file_name);
    info!(" - {} rows {}", rows.len(), if append { "appended" } else { "" });

    Ok(())
}

/// Reads a CSV file written by [`write_csv`]; every value comes back as a string.
pub fn read_csv(path: &Path) -> Result<Vec<Row>, GhQueryError> {
    let to_error = |e: csv::Error| {
        trace!("Error = {:?}", e);
        GhQueryError::CsvReadError {
            path: path.display().to_string(),
            nested: nested!(e),
        }
    };

    let file = File::open(path).map_err(|e| to_error(e.into()))?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers().map_err(to_error)?.clone();

    reader
        .records()
        .map(|record| -> Result<Row, GhQueryError> {
            let record = record.map_err(to_error)?;

            Ok(headers
                .iter()
                .zip(record.iter())
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect())
        })
        .collect()
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
