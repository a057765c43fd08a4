//! Delimited tabular reports
//!
//! One header row naming each column, then one row per analysis position,
//! zone or cluster. Nodata is written as `NaN`.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Field separator of written tables
pub const TABLE_DELIMITER: char = ';';

/// An in-memory table of numeric cells with named columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Create an empty table with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data rows
    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row; its length must match the column count
    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::DimensionMismatch {
                context: "table row".into(),
                expected: (1, self.columns.len()),
                actual: (1, row.len()),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Write the table to any sink
    pub fn write_to<W: Write>(&self, mut out: W) -> Result<()> {
        let sep = TABLE_DELIMITER.to_string();
        writeln!(out, "{}", self.columns.join(&sep))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|v| format_cell(*v)).collect();
            writeln!(out, "{}", cells.join(&sep))?;
        }
        out.flush()?;
        Ok(())
    }

    /// Write the table to a file
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_to(BufWriter::new(file))
    }

    /// Read a table written by [`Table::write`]
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let reader = BufReader::new(File::open(path)?);
        let mut lines = reader.lines();

        let header = match lines.next() {
            Some(line) => line?,
            None => return Err(Error::parse(&source, 1, "empty table")),
        };
        let mut table = Table::new(split_fields(&header, TABLE_DELIMITER));

        for (idx, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = split_fields(&line, TABLE_DELIMITER)
                .iter()
                .map(|f| {
                    f.parse::<f64>()
                        .map_err(|_| Error::parse(&source, idx + 2, format!("invalid number '{f}'")))
                })
                .collect::<Result<Vec<f64>>>()?;
            table
                .push_row(row)
                .map_err(|e| Error::parse(&source, idx + 2, e.to_string()))?;
        }
        Ok(table)
    }
}

/// Shortest round-trip text of a cell, `NaN` for nodata
pub fn format_cell(v: f64) -> String {
    if v.is_nan() { "NaN".to_string() } else { v.to_string() }
}

/// Split a delimited line, trimming each field
pub(crate) fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    line.split(delimiter).map(|f| f.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_format() {
        let mut table = Table::new(vec!["X".into(), "Y".into(), "SHDI".into()]);
        table.push_row(vec![1.0, 2.0, 0.6931471805599453]).unwrap();
        table.push_row(vec![3.0, 4.0, f64::NAN]).unwrap();

        let mut buf = Vec::new();
        table.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "X;Y;SHDI\n1;2;0.6931471805599453\n3;4;NaN\n");
    }

    #[test]
    fn test_row_length_checked() {
        let mut table = Table::new(vec!["a".into()]);
        assert!(table.push_row(vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        let mut table = Table::new(vec!["id".into(), "size".into()]);
        table.push_row(vec![1.0, 3.0]).unwrap();
        table.push_row(vec![2.0, f64::NAN]).unwrap();
        table.write(&path).unwrap();

        let back = Table::read(&path).unwrap();
        assert_eq!(back.columns(), table.columns());
        assert_eq!(back.column("id").unwrap(), vec![1.0, 2.0]);
        assert!(back.rows()[1][1].is_nan());
    }
}
