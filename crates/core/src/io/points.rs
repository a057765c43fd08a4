//! Analysis point files
//!
//! Delimited text with a header row. Records are either pixel positions
//! (row/column fields) or map coordinates (x/y fields); the field names are
//! configurable and the delimiter is detected from the header.

use crate::error::{Error, Result};
use crate::io::table::split_fields;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// How a point file locates its records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointFields {
    /// Pixel positions in named row and column fields
    Pixel { row: String, col: String },
    /// Map coordinates in named x and y fields
    Coordinate { x: String, y: String },
}

impl PointFields {
    /// `row`/`col` pixel fields
    pub fn pixels() -> Self {
        PointFields::Pixel {
            row: "row".into(),
            col: "col".into(),
        }
    }

    /// `x`/`y` coordinate fields
    pub fn coordinates() -> Self {
        PointFields::Coordinate {
            x: "x".into(),
            y: "y".into(),
        }
    }
}

impl Default for PointFields {
    fn default() -> Self {
        Self::coordinates()
    }
}

/// One analysis point as read from a file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnalysisPoint {
    Pixel { row: isize, col: isize },
    Coordinate { x: f64, y: f64 },
}

/// Pick the delimiter among `;`, `,` and tab that splits the header the most
pub fn detect_delimiter(header: &str) -> char {
    [';', ',', '\t']
        .into_iter()
        .max_by_key(|d| header.matches(*d).count())
        .filter(|d| header.contains(*d))
        .unwrap_or(';')
}

/// Read analysis points from a delimited file
pub fn read_points<P: AsRef<Path>>(path: P, fields: &PointFields) -> Result<Vec<AnalysisPoint>> {
    let path = path.as_ref();
    let source = path.display().to_string();
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(Error::parse(&source, 1, "empty point file")),
    };
    let delimiter = detect_delimiter(&header);
    let names = split_fields(&header, delimiter);

    let find = |name: &str| {
        names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::parse(&source, 1, format!("no field named '{name}' in header")))
    };
    let (a, b) = match fields {
        PointFields::Pixel { row, col } => (find(row)?, find(col)?),
        PointFields::Coordinate { x, y } => (find(x)?, find(y)?),
    };

    let mut points = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        let line_no = idx + 2;
        if line.trim().is_empty() {
            continue;
        }
        let values = split_fields(&line, delimiter);
        let field = |i: usize| -> Result<f64> {
            let text = values
                .get(i)
                .ok_or_else(|| Error::parse(&source, line_no, "missing field"))?;
            text.parse::<f64>()
                .map_err(|_| Error::parse(&source, line_no, format!("invalid number '{text}'")))
        };
        let point = match fields {
            PointFields::Pixel { .. } => AnalysisPoint::Pixel {
                row: field(a)?.round() as isize,
                col: field(b)?.round() as isize,
            },
            PointFields::Coordinate { .. } => AnalysisPoint::Coordinate {
                x: field(a)?,
                y: field(b)?,
            },
        };
        points.push(point);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(detect_delimiter("id;x;y"), ';');
        assert_eq!(detect_delimiter("id,x,y"), ',');
        assert_eq!(detect_delimiter("id\tx\ty"), '\t');
        assert_eq!(detect_delimiter("x"), ';');
    }

    #[test]
    fn test_read_coordinate_points() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.csv");
        fs::write(&path, "ID,X,Y\n1,105.5,215.0\n2,120,200\n\n").unwrap();

        let pts = read_points(&path, &PointFields::coordinates()).unwrap();
        assert_eq!(pts.len(), 2);
        assert_eq!(pts[0], AnalysisPoint::Coordinate { x: 105.5, y: 215.0 });
    }

    #[test]
    fn test_read_pixel_points_with_custom_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixels.txt");
        fs::write(&path, "line;column\n0;4\n2;1\n").unwrap();

        let fields = PointFields::Pixel {
            row: "line".into(),
            col: "column".into(),
        };
        let pts = read_points(&path, &fields).unwrap();
        assert_eq!(pts, vec![
            AnalysisPoint::Pixel { row: 0, col: 4 },
            AnalysisPoint::Pixel { row: 2, col: 1 },
        ]);
    }

    #[test]
    fn test_missing_field_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "a;b\n1;2\n").unwrap();
        assert!(matches!(
            read_points(&path, &PointFields::coordinates()),
            Err(Error::Parse { .. })
        ));
    }
}
