//! Minimal OOXML (`.xlsx`) workbook reader
//!
//! Reads every worksheet into a table whose header is the sheet's first row.
//! Only cell values are read; styles, formulas, and date formatting are
//! ignored, so dates arrive as Excel serial numbers.

use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};

use odp_common::{Cell, Table};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::error::DecodeError;

/// Sheet name to table
pub type Workbook = BTreeMap<String, Table>;

type Archive = zip::ZipArchive<Cursor<Vec<u8>>>;

fn xml_err(err: impl std::fmt::Display) -> DecodeError {
    DecodeError::new(format!("malformed workbook XML: {err}"))
}

fn read_part(archive: &mut Archive, name: &str) -> Result<Option<String>, DecodeError> {
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(DecodeError::new(format!("cannot open {name}: {e}"))),
    };
    let mut text = String::new();
    file.read_to_string(&mut text)
        .map_err(|e| DecodeError::new(format!("cannot read {name}: {e}")))?;
    Ok(Some(text))
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, DecodeError> {
    for attribute in e.attributes() {
        let attribute = attribute.map_err(xml_err)?;
        if attribute.key.as_ref() == name {
            return Ok(Some(attribute.unescape_value().map_err(xml_err)?.into_owned()));
        }
    }
    Ok(None)
}

/// `(name, relationship id)` for each sheet, in workbook order
fn sheet_list(xml: &str) -> Result<Vec<(String, String)>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"sheet" => {
                let name = attr(&e, b"name")?.ok_or_else(|| xml_err("sheet without name"))?;
                let rel = attr(&e, b"r:id")?.ok_or_else(|| xml_err("sheet without r:id"))?;
                sheets.push((name, rel));
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(sheets)
}

/// Relationship id to part path under `xl/`
fn relationships(xml: &str) -> Result<HashMap<String, String>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id")?, attr(&e, b"Target")?) {
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{target}"),
                    };
                    rels.insert(id, path);
                }
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(rels)
}

fn shared_strings(xml: &str) -> Result<Vec<String>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let (mut in_item, mut in_text, mut in_phonetic) = (false, false, false);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                },
                b"t" => in_text = true,
                b"rPh" => in_phonetic = true,
                _ => {},
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(t) if in_item && in_text && !in_phonetic => {
                current.push_str(&t.unescape().map_err(xml_err)?);
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                },
                b"t" => in_text = false,
                b"rPh" => in_phonetic = false,
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(strings)
}

/// Highest column a worksheet can have (`XFD`)
const MAX_COLUMN: usize = 16_383;

/// Zero-based column index from a reference like `AB12`; `None` without letters
fn column_index(reference: &str) -> Result<Option<usize>, DecodeError> {
    let letters = reference.bytes().take_while(u8::is_ascii_alphabetic);
    let mut index = 0usize;
    let mut seen = 0;
    for letter in letters {
        seen += 1;
        index = index * 26 + usize::from(letter.to_ascii_uppercase() - b'A') + 1;
        if index > MAX_COLUMN + 1 {
            return Err(DecodeError::new(format!("cell reference {reference} is beyond column XFD")));
        }
    }
    Ok((seen > 0).then(|| index - 1))
}

fn number_cell(raw: &str) -> Cell {
    let Ok(value) = raw.trim().parse::<f64>() else {
        return Cell::Str(raw.to_string());
    };
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Cell::Int(value as i64)
    } else {
        Cell::Real(value)
    }
}

#[derive(Default)]
struct PendingCell {
    column: usize,
    kind: Option<String>,
    text: String,
}

impl PendingCell {
    fn finish(self, shared: &[String]) -> Cell {
        match self.kind.as_deref() {
            _ if self.text.is_empty() => Cell::Null,
            Some("s") => self
                .text
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|i| shared.get(i))
                .map_or(Cell::Null, |s| Cell::Str(s.clone())),
            Some("str") | Some("inlineStr") => Cell::Str(self.text),
            Some("b") => Cell::Str(if self.text.trim() == "1" { "true" } else { "false" }.into()),
            Some("e") => Cell::Null,
            _ => number_cell(&self.text),
        }
    }
}

fn sheet_rows(xml: &str, shared: &[String]) -> Result<Vec<Vec<(usize, Cell)>>, DecodeError> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Vec<(usize, Cell)> = Vec::new();
    let mut cell: Option<PendingCell> = None;
    let mut in_value = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => row.clear(),
                b"c" => {
                    let reference = attr(&e, b"r")?;
                    let column = match reference.as_deref() {
                        Some(r) => column_index(r)?,
                        None => None,
                    }
                    .unwrap_or_else(|| row.last().map_or(0, |(c, _)| c + 1));
                    cell = Some(PendingCell {
                        column,
                        kind: attr(&e, b"t")?,
                        text: String::new(),
                    });
                },
                b"v" | b"t" => in_value = true,
                _ => {},
            },
            Event::Empty(e) if e.local_name().as_ref() == b"row" => rows.push(Vec::new()),
            Event::Text(t) if in_value => {
                if let Some(pending) = cell.as_mut() {
                    pending.text.push_str(&t.unescape().map_err(xml_err)?);
                }
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        let column = pending.column;
                        row.push((column, pending.finish(shared)));
                    }
                },
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {},
            },
            Event::Eof => break,
            _ => {},
        }
    }
    Ok(rows)
}

fn rows_to_table(rows: Vec<Vec<(usize, Cell)>>) -> Result<Table, DecodeError> {
    let width = rows
        .iter()
        .flat_map(|row| row.iter().map(|(c, _)| c + 1))
        .max()
        .unwrap_or(0);

    let dense = |row: Vec<(usize, Cell)>| {
        let mut cells = vec![Cell::Null; width];
        for (column, cell) in row {
            cells[column] = cell;
        }
        cells
    };

    let mut rows = rows.into_iter();
    let headers = rows
        .next()
        .map(&dense)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, cell)| match cell {
            Cell::Null => format!("Unnamed: {i}"),
            other => other.to_canonical(),
        })
        .collect();

    let mut table = Table::empty(headers);
    for row in rows {
        table.push_row(dense(row))?;
    }
    Ok(table)
}

/// Decode an `.xlsx` payload into one table per sheet
pub fn decode(bytes: Vec<u8>) -> Result<Workbook, DecodeError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| DecodeError::new(format!("not an xlsx archive: {e}")))?;

    let workbook = read_part(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| DecodeError::new("xl/workbook.xml is missing"))?;
    let rels = match read_part(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => relationships(&xml)?,
        None => HashMap::new(),
    };
    let shared = match read_part(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };

    let mut sheets = Workbook::new();
    for (position, (name, rel)) in sheet_list(&workbook)?.into_iter().enumerate() {
        let path = rels
            .get(&rel)
            .cloned()
            .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", position + 1));
        let xml = read_part(&mut archive, &path)?
            .ok_or_else(|| DecodeError::new(format!("worksheet {path} is missing")))?;
        sheets.insert(name, rows_to_table(sheet_rows(&xml, &shared)?)?);
    }
    Ok(sheets)
}
