//! Reading and writing rasters, tables, point files and properties

mod ascii;
mod native;
pub mod points;
pub mod properties;
pub mod table;

pub use ascii::{read_ascii_grid, write_ascii_grid, DEFAULT_ASCII_NODATA};
pub use native::{read_geotiff, write_geotiff};
pub use points::{read_points, AnalysisPoint, PointFields};
pub use properties::Properties;
pub use table::Table;

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use std::path::Path;
use tracing::debug;

/// Raster file formats understood by landgrid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    GeoTiff,
    AsciiGrid,
}

impl RasterFormat {
    /// Format implied by a file extension (`.tif`/`.tiff`, `.asc`/`.txt`)
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "tif" | "tiff" => Ok(RasterFormat::GeoTiff),
            "asc" | "txt" => Ok(RasterFormat::AsciiGrid),
            _ => Err(Error::UnsupportedDataType(format!(
                "unknown raster extension for {}",
                path.display()
            ))),
        }
    }
}

/// Read a raster, choosing the format from the extension
pub fn read_raster<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let format = RasterFormat::from_path(path)?;
    let raster = match format {
        RasterFormat::GeoTiff => read_geotiff(path)?,
        RasterFormat::AsciiGrid => read_ascii_grid(path)?,
    };
    debug!(
        path = %path.display(),
        ?format,
        rows = raster.rows(),
        cols = raster.cols(),
        "read raster"
    );
    Ok(raster)
}

/// Write a raster, choosing the format from the extension
pub fn write_raster<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let format = RasterFormat::from_path(path)?;
    debug!(path = %path.display(), ?format, "writing raster");
    match format {
        RasterFormat::GeoTiff => write_geotiff(raster, path),
        RasterFormat::AsciiGrid => write_ascii_grid(raster, path),
    }
}
