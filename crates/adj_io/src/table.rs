//! In-memory delimited table: one header row plus string cells.
//!
//! Contract:
//! - Cells are kept as trimmed strings; an empty cell means "missing".
//! - Every row has exactly `headers.len()` cells (short rows are an error on read).
//! - Year columns are headers matching `^[12][0-9]{3}$`.

use std::io::{Read, Write};
use std::path::Path;

use crate::{IoError, IoResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self { headers, rows: Vec::new() }
    }

    /// Build from headers and rows, checking row widths.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> IoResult<Self> {
        let mut t = Self::new(headers);
        for row in rows {
            t.push_row(row)?;
        }
        Ok(t)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> IoResult<()> {
        if row.len() != self.headers.len() {
            return Err(IoError::Csv(format!(
                "row {} has {} cells, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.headers.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Column index or a contract error naming the missing column.
    pub fn require_column(&self, name: &str) -> IoResult<usize> {
        self.column_index(name)
            .ok_or_else(|| IoError::Contract(format!("missing required column `{name}`")))
    }

    /// Cell text, `None` when empty.
    pub fn cell(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: String) {
        if let Some(c) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *c = value;
        }
    }

    /// Rename a header in place; returns false when `from` is absent.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column_index(from) {
            Some(i) => {
                self.headers[i] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// `(column index, year)` for each year header, in header order.
    pub fn year_columns(&self) -> Vec<(usize, i32)> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| is_year_header(h))
            .filter_map(|(i, h)| h.parse::<i32>().ok().map(|y| (i, y)))
            .collect()
    }

    /// Indices of every non-year header.
    pub fn id_columns(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !is_year_header(h))
            .map(|(i, _)| i)
            .collect()
    }

    // ------ CSV ------

    pub fn read_csv(path: &Path) -> IoResult<Self> {
        let f = std::fs::File::open(path)
            .map_err(|e| IoError::Path(format!("{}: {e}", path.display())))?;
        Self::from_reader(f).map_err(|e| match e {
            IoError::Csv(msg) => IoError::Csv(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> IoResult<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut t = Self::new(headers);
        for rec in rdr.records() {
            let rec = rec?;
            t.push_row(rec.iter().map(str::to_string).collect())?;
        }
        Ok(t)
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> IoResult<()> {
        let mut w = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
        w.write_record(&self.headers)?;
        for row in &self.rows {
            w.write_record(row)?;
        }
        w.flush()?;
        Ok(())
    }

    pub fn to_bytes(&self) -> IoResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.to_writer(&mut buf)?;
        Ok(buf)
    }

    /// Write to `path` atomically.
    pub fn write_csv(&self, path: &Path) -> IoResult<()> {
        let bytes = self.to_bytes()?;
        crate::canonical_json::write_atomic(path, &bytes)
            .map_err(|e| IoError::Path(format!("{}: {e}", path.display())))
    }
}

/// `^[12][0-9]{3}$`
pub fn is_year_header(h: &str) -> bool {
    let b = h.as_bytes();
    b.len() == 4 && matches!(b[0], b'1' | b'2') && b[1..].iter().all(u8::is_ascii_digit)
}
