//! HTML table scraping

use odp_common::{Cell, Table};
use scraper::{ElementRef, Html, Selector};

use super::error::DecodeError;

fn selector(css: &str) -> Result<Selector, DecodeError> {
    Selector::parse(css).map_err(|e| DecodeError::new(format!("bad selector '{css}': {e:?}")))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// The `index`-th `<table>` in the page. The first row is the header.
pub fn decode(bytes: &[u8], index: usize) -> Result<Table, DecodeError> {
    let page = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&page);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    let table = document
        .select(&tables)
        .nth(index)
        .ok_or_else(|| DecodeError::new(format!("page has no table at index {index}")))?;

    let mut grid: Vec<Vec<String>> = table
        .select(&rows)
        .map(|row| row.select(&cells).map(cell_text).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();
    if grid.is_empty() {
        return Err(DecodeError::new(format!("table {index} has no rows")));
    }

    let headers = grid.remove(0);
    let width = grid
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(headers.len()))
        .max()
        .unwrap_or(0);
    let headers = (0..width)
        .map(|i| headers.get(i).cloned().unwrap_or_else(|| format!("Unnamed: {i}")))
        .collect();

    let mut out = Table::empty(headers);
    for row in grid {
        let mut cells: Vec<Cell> = row
            .into_iter()
            .map(|text| if text.is_empty() { Cell::Null } else { Cell::Str(text) })
            .collect();
        cells.resize(width, Cell::Null);
        out.push_row(cells)?;
    }
    Ok(out)
}
