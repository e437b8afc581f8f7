//! Just enough A1-notation parsing for a three-column mirror.

use anyhow::{anyhow, Result};

/// Zero-based cell rectangle decoded from A1 notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub col_start: usize,
    pub row_start: usize,
    pub col_end: usize,
    pub row_end: usize,
}

/// Parse `A2:C100` (or a single cell like `B1`) into a zero-based rectangle.
/// Multi-letter columns never occur here and are rejected.
pub fn parse(range: &str) -> Result<Rect> {
    let (start, end) = match range.split_once(':') {
        Some((s, e)) => (s, e),
        None => (range, range),
    };
    let (col_start, row_start) = parse_cell(start)?;
    let (col_end, row_end) = parse_cell(end)?;
    if col_end < col_start || row_end < row_start {
        return Err(anyhow!("inverted range: {}", range));
    }
    Ok(Rect { col_start, row_start, col_end, row_end })
}

fn parse_cell(cell: &str) -> Result<(usize, usize)> {
    let mut chars = cell.chars();
    let col = match chars.next() {
        Some(c @ 'A'..='Z') => (c as usize) - ('A' as usize),
        _ => return Err(anyhow!("bad cell: {}", cell)),
    };
    let row: usize = chars
        .as_str()
        .parse()
        .map_err(|_| anyhow!("bad cell: {}", cell))?;
    if row == 0 {
        return Err(anyhow!("rows are 1-based: {}", cell));
    }
    Ok((col, row - 1))
}
