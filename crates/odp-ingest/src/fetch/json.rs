//! Raw JSON payloads and flattening them into tables

use std::io::Read;

use flate2::read::GzDecoder;
use odp_common::{Cell, Table};
use serde_json::Value;

use super::error::DecodeError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Parse JSON, transparently inflating gzip-compressed bodies
pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut inflated)
            .map_err(|e| DecodeError::new(format!("gzip body could not be inflated: {e}")))?;
        return parse(&inflated);
    }
    parse(bytes)
}

fn parse(bytes: &[u8]) -> Result<Value, DecodeError> {
    serde_json::from_slice(bytes).map_err(|e| DecodeError::new(format!("invalid JSON: {e}")))
}

fn json_cell(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell::Null,
        Some(Value::Number(n)) => match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => n.as_f64().map_or(Cell::Null, Cell::Real),
        },
        Some(Value::String(s)) => Cell::Str(s.clone()),
        Some(Value::Bool(b)) => Cell::Str(b.to_string()),
        Some(other) => Cell::Str(other.to_string()),
    }
}

/// Build a table from an array of JSON records.
///
/// `records` is a JSON pointer to the array (`""` for the document root);
/// each `(header, pointer)` pair names an output column and where to find it
/// inside one record. Missing fields become nulls.
pub fn table_from_records(
    document: &Value,
    records: &str,
    columns: &[(&str, &str)],
) -> Result<Table, DecodeError> {
    let items = document
        .pointer(records)
        .and_then(Value::as_array)
        .ok_or_else(|| DecodeError::new(format!("no array at JSON pointer '{records}'")))?;

    let mut table = Table::empty(columns.iter().map(|(name, _)| name.to_string()).collect());
    for item in items {
        let row = columns
            .iter()
            .map(|(_, pointer)| json_cell(item.pointer(pointer)))
            .collect();
        table.push_row(row)?;
    }
    Ok(table)
}
