//! ESRI ASCII grid reading/writing

use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Default `NODATA_value` written when a raster has no sentinel
pub const DEFAULT_ASCII_NODATA: f64 = -1.0;

#[derive(Debug, Default)]
struct Header {
    ncols: Option<usize>,
    nrows: Option<usize>,
    xll: Option<f64>,
    yll: Option<f64>,
    center: bool,
    cellsize: Option<f64>,
    nodata: Option<f64>,
}

/// Read an ESRI ASCII grid (`ncols`, `nrows`, `xllcorner`/`xllcenter`,
/// `yllcorner`/`yllcenter`, `cellsize`, optional `NODATA_value`).
pub fn read_ascii_grid<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let source = path.display().to_string();
    let reader = BufReader::new(File::open(path)?);

    let mut header = Header::default();
    let mut values: Vec<T> = Vec::new();
    let mut in_header = true;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if in_header {
            let mut parts = trimmed.split_whitespace();
            let key = parts.next().unwrap_or_default();
            if key.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
                let value = parts
                    .next()
                    .ok_or_else(|| Error::parse(&source, line_no, format!("missing value for '{key}'")))?;
                let num = value
                    .parse::<f64>()
                    .map_err(|_| Error::parse(&source, line_no, format!("invalid number '{value}'")))?;
                match key.to_ascii_lowercase().as_str() {
                    "ncols" => header.ncols = Some(num as usize),
                    "nrows" => header.nrows = Some(num as usize),
                    "xllcorner" => header.xll = Some(num),
                    "yllcorner" => header.yll = Some(num),
                    "xllcenter" => {
                        header.xll = Some(num);
                        header.center = true;
                    }
                    "yllcenter" => {
                        header.yll = Some(num);
                        header.center = true;
                    }
                    "cellsize" => header.cellsize = Some(num),
                    "nodata_value" => header.nodata = Some(num),
                    other => {
                        return Err(Error::parse(&source, line_no, format!("unknown header key '{other}'")));
                    }
                }
                continue;
            }
            in_header = false;
        }

        for token in trimmed.split_whitespace() {
            let v = token
                .parse::<f64>()
                .map_err(|_| Error::parse(&source, line_no, format!("invalid cell value '{token}'")))?;
            let cell = T::from_f64(v).ok_or_else(|| {
                Error::parse(&source, line_no, format!("value {v} does not fit the raster type"))
            })?;
            values.push(cell);
        }
    }

    let missing = |key: &str| Error::parse(&source, 0, format!("missing header key '{key}'"));
    let cols = header.ncols.ok_or_else(|| missing("ncols"))?;
    let rows = header.nrows.ok_or_else(|| missing("nrows"))?;
    let cellsize = header.cellsize.ok_or_else(|| missing("cellsize"))?;
    let mut x_min = header.xll.ok_or_else(|| missing("xllcorner"))?;
    let mut y_min = header.yll.ok_or_else(|| missing("yllcorner"))?;
    if header.center {
        x_min -= cellsize / 2.0;
        y_min -= cellsize / 2.0;
    }

    let mut raster = Raster::from_vec(values, rows, cols)?;
    raster.set_transform(GeoTransform::from_lower_left(x_min, y_min, cellsize, rows));
    raster.set_nodata(header.nodata.and_then(T::from_f64));
    Ok(raster)
}

/// Write a raster as an ESRI ASCII grid.
///
/// Nodata cells are written as the raster's sentinel, or
/// [`DEFAULT_ASCII_NODATA`] when it has none (or a NaN sentinel).
pub fn write_ascii_grid<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let mut out = BufWriter::new(File::create(path.as_ref())?);
    let (rows, cols) = raster.shape();
    let gt = raster.transform();
    let nodata = raster
        .nodata()
        .and_then(|v| v.to_f64())
        .filter(|v| !v.is_nan())
        .unwrap_or(DEFAULT_ASCII_NODATA);

    writeln!(out, "ncols         {cols}")?;
    writeln!(out, "nrows         {rows}")?;
    writeln!(out, "xllcorner     {}", gt.x_min())?;
    writeln!(out, "yllcorner     {}", gt.y_min(rows))?;
    writeln!(out, "cellsize      {}", gt.cell_size())?;
    writeln!(out, "NODATA_value  {nodata}")?;

    for row in raster.data().rows() {
        let mut first = true;
        for &v in row {
            if !first {
                out.write_all(b" ")?;
            }
            first = false;
            match v.to_f64() {
                Some(f) if !raster.is_nodata(v) => write!(out, "{f}")?,
                _ => write!(out, "{nodata}")?,
            }
        }
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
