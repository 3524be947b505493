//! Artifact codec
//!
//! Artifacts are written in one canonical form: UTF-8, comma delimiter, dot
//! decimal mark, ISO dates, empty string for null. Reading is lenient so that
//! files produced before the canonical form existed (semicolon delimited,
//! comma decimals, ISO-8859-1) still parse and compare equal to their
//! canonical re-encoding.

use std::path::Path;

use crate::error::{OdpError, Result};
use crate::table::{Cell, Table};

/// Delimiter of every artifact this crate writes
pub const CANONICAL_DELIMITER: u8 = b',';

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Character encoding of delimited text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    Utf8,
    /// ISO-8859-1, as served by most statistics portals
    #[default]
    Latin1,
}

/// How to read delimited text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub encoding: TextEncoding,
    pub decimal: char,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b';',
            encoding: TextEncoding::Latin1,
            decimal: ',',
        }
    }
}

impl CsvOptions {
    /// Options matching the canonical artifact form
    pub fn canonical() -> Self {
        Self {
            delimiter: CANONICAL_DELIMITER,
            encoding: TextEncoding::Utf8,
            decimal: '.',
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn decimal(mut self, decimal: char) -> Self {
        self.decimal = decimal;
        self
    }
}

/// Serialize a table to canonical artifact bytes
pub fn to_canonical_csv(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(CANONICAL_DELIMITER)
        .from_writer(Vec::new());
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_canonical()))?;
    }
    writer
        .into_inner()
        .map_err(|e| OdpError::artifact(format!("failed to flush artifact: {e}")))
}

pub fn write_artifact(table: &Table, path: impl AsRef<Path>) -> Result<()> {
    std::fs::write(path, to_canonical_csv(table)?)?;
    Ok(())
}

/// Parse artifact bytes, canonical or legacy
pub fn parse_artifact(bytes: &[u8]) -> Result<Table> {
    let text = decode_auto(bytes);
    let delimiter = sniff_delimiter(&text);
    let decimal = if delimiter == b';' { ',' } else { '.' };
    read_delimited(&text, delimiter, decimal)
}

pub fn read_artifact(path: impl AsRef<Path>) -> Result<Table> {
    parse_artifact(&std::fs::read(path)?)
}

/// Decode delimited text with explicit options. Cells stay textual.
pub fn decode_delimited(bytes: &[u8], options: &CsvOptions) -> Result<Table> {
    let text = decode_text(bytes, options.encoding)?;
    read_delimited(&text, options.delimiter, options.decimal)
}

/// Rewrite `"12,5"` as `"12.5"`. Returns `None` unless the text is a plain
/// signed decimal number with a single comma.
pub fn comma_decimal_to_dot(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let body = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    let (whole, fraction) = body.split_once(',')?;
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || !digits(fraction) {
        return None;
    }
    Some(trimmed.replacen(',', ".", 1))
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
}

fn decode_text(bytes: &[u8], encoding: TextEncoding) -> Result<String> {
    let bytes = strip_bom(bytes);
    match encoding {
        TextEncoding::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| OdpError::artifact(format!("invalid UTF-8: {e}"))),
        TextEncoding::Latin1 => Ok(latin1(bytes)),
    }
}

fn decode_auto(bytes: &[u8]) -> String {
    let bytes = strip_bom(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => latin1(bytes),
    }
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Records inspected when guessing the delimiter
const SNIFF_RECORDS: usize = 50;

/// Shape of a text sample split on one delimiter
struct Split {
    width: usize,
    consistent: bool,
    comma_decimals: bool,
}

fn split_sample(text: &str, delimiter: u8) -> Split {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut width = None;
    let mut consistent = true;
    let mut comma_decimals = false;
    for record in reader.records().take(SNIFF_RECORDS) {
        let Ok(record) = record else {
            consistent = false;
            break;
        };
        let expected = *width.get_or_insert(record.len());
        consistent &= record.len() == expected;
        comma_decimals |= record.iter().any(|field| comma_decimal_to_dot(field).is_some());
    }
    Split {
        width: width.unwrap_or(0),
        consistent,
        comma_decimals,
    }
}

/// Pick `;` or `,` from the header and the first records. A delimiter that
/// yields the same field count on every sampled line wins; between two such
/// candidates the wider split wins, then comma decimals mark the legacy form.
/// A one-column `;` split only counts when it holds comma decimals.
fn sniff_delimiter(text: &str) -> u8 {
    let legacy = split_sample(text, b';');
    let canonical = split_sample(text, CANONICAL_DELIMITER);

    match (legacy.consistent, canonical.consistent) {
        (true, false) if legacy.width > 1 || legacy.comma_decimals => b';',
        (false, true) => CANONICAL_DELIMITER,
        (true, true) if legacy.width > canonical.width => b';',
        (true, true) if legacy.width < canonical.width => CANONICAL_DELIMITER,
        (true, true) if legacy.width > 1 && legacy.comma_decimals => b';',
        _ => header_majority(text),
    }
}

fn header_majority(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        CANONICAL_DELIMITER
    }
}

fn read_delimited(text: &str, delimiter: u8, decimal: char) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
    let width = headers.len();
    let mut table = Table::empty(headers);

    for record in reader.records() {
        let record = record?;
        if record.len() > width {
            let line = record.position().map_or(0, |p| p.line());
            return Err(OdpError::artifact(format!(
                "line {line} has {} fields, header has {width}",
                record.len()
            )));
        }
        let mut row: Vec<Cell> = record.iter().map(|field| text_cell(field, decimal)).collect();
        row.resize(width, Cell::Null);
        table.push_row(row)?;
    }

    Ok(table)
}

fn text_cell(field: &str, decimal: char) -> Cell {
    if field.is_empty() {
        return Cell::Null;
    }
    if decimal == ',' {
        if let Some(normalized) = comma_decimal_to_dot(field) {
            return Cell::Str(normalized);
        }
    }
    Cell::Str(field.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_canonical_form() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let table = Table::new(
            vec!["Kommune".into(), "Andel".into(), "Dato".into(), "Merknad".into()],
            vec![
                vec!["Skien".into(), Cell::Real(12.5), Cell::Date(date), Cell::Null],
                vec!["Bø, Telemark".into(), Cell::Int(3), Cell::Null, "ok".into()],
            ],
        )
        .unwrap();

        let bytes = to_canonical_csv(&table).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Kommune,Andel,Dato,Merknad\nSkien,12.5,2024-12-31,\n\"Bø, Telemark\",3,,ok\n"
        );
    }

    #[test]
    fn test_parse_canonical_artifact() {
        let table = parse_artifact(b"Kommune,Andel\nSkien,12.5\nPorsgrunn,\n").unwrap();
        assert_eq!(table.headers(), vec!["Kommune", "Andel"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.row(0).unwrap()[1], &Cell::from("12.5"));
        assert_eq!(table.row(1).unwrap()[1], &Cell::Null);
    }

    #[test]
    fn test_parse_legacy_latin1_semicolon_artifact() {
        let bytes = b"Kommune;\xe5r;Andel\nSkien;2024;12,5\nB\xf8;2024;-0,25\n";
        let table = parse_artifact(bytes).unwrap();
        assert_eq!(table.headers(), vec!["Kommune", "år", "Andel"]);
        assert_eq!(table.row(0).unwrap()[2], &Cell::from("12.5"));
        assert_eq!(table.row(1).unwrap()[0], &Cell::from("Bø"));
        assert_eq!(table.row(1).unwrap()[2], &Cell::from("-0.25"));
    }

    #[test]
    fn test_bom_is_stripped() {
        let table = parse_artifact(b"\xEF\xBB\xBFKommune,Antall\nSkien,1\n").unwrap();
        assert_eq!(table.headers()[0], "Kommune");
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = decode_delimited(
            b"a;b;c\n1;2\n1;2;3\n",
            &CsvOptions::default().encoding(TextEncoding::Utf8),
        )
        .unwrap();
        assert_eq!(table.width(), 3);
        assert_eq!(table.row(0).unwrap()[2], &Cell::Null);
        assert_eq!(table.row(1).unwrap()[2], &Cell::from("3"));
    }

    #[test]
    fn test_wide_rows_are_rejected() {
        let err = decode_delimited(
            b"a;b;c\n1;2;3\n1;2;3;4\n",
            &CsvOptions::default().encoding(TextEncoding::Utf8),
        )
        .unwrap_err();
        assert!(matches!(err, OdpError::Artifact(_)));
        assert!(err.to_string().contains("4 fields"));
    }

    #[test]
    fn test_single_column_legacy_artifact() {
        let table = parse_artifact(b"Andel\n12,5\n7,25\n").unwrap();
        assert_eq!(table.headers(), vec!["Andel"]);
        assert_eq!(table.row(0).unwrap()[0], &Cell::from("12.5"));
        assert_eq!(table.row(1).unwrap()[0], &Cell::from("7.25"));
    }

    #[test]
    fn test_single_column_canonical_artifact() {
        let table = parse_artifact(b"Andel\n12.5\n7\n").unwrap();
        assert_eq!(table.headers(), vec!["Andel"]);
        assert_eq!(table.row(0).unwrap()[0], &Cell::from("12.5"));
    }

    #[test]
    fn test_legacy_header_with_comma_in_name() {
        let table = parse_artifact("Kommune;Andel, prosent\nSkien;12,5\n".as_bytes()).unwrap();
        assert_eq!(table.headers(), vec!["Kommune", "Andel, prosent"]);
        assert_eq!(table.row(0).unwrap(), vec![&Cell::from("Skien"), &Cell::from("12.5")]);
    }

    #[test]
    fn test_canonical_quoted_fields_keep_comma_delimiter() {
        let table = parse_artifact("Kommune,Andel\n\"Bø, Telemark\",3\nSkien,12.5\n".as_bytes()).unwrap();
        assert_eq!(table.headers(), vec!["Kommune", "Andel"]);
        assert_eq!(table.row(0).unwrap()[0], &Cell::from("Bø, Telemark"));
    }

    #[test]
    fn test_overlong_canonical_row_is_rejected() {
        let err = parse_artifact(b"Kommune,Andel\nSkien,12.5,x\nPorsgrunn,9.25\n").unwrap_err();
        assert!(matches!(err, OdpError::Artifact(_)));
    }

    #[test]
    fn test_comma_decimal_to_dot() {
        assert_eq!(comma_decimal_to_dot("12,5").as_deref(), Some("12.5"));
        assert_eq!(comma_decimal_to_dot(" -3,75 ").as_deref(), Some("-3.75"));
        assert_eq!(comma_decimal_to_dot("12"), None);
        assert_eq!(comma_decimal_to_dot("1,2,3"), None);
        assert_eq!(comma_decimal_to_dot("Bø, Telemark"), None);
        assert_eq!(comma_decimal_to_dot(",5"), None);
    }

    #[test]
    fn test_write_then_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("antall.csv");
        let table = Table::new(
            vec!["Kommune".into(), "Antall".into()],
            vec![vec!["Skien".into(), Cell::Int(7)]],
        )
        .unwrap();
        write_artifact(&table, &path).unwrap();
        let read = read_artifact(&path).unwrap();
        assert_eq!(read.row(0).unwrap()[1], &Cell::from("7"));
    }
}
