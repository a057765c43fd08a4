//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;
pub mod window;

pub use element::RasterElement;
pub use geotransform::GeoTransform;
pub use grid::{Raster, RasterStatistics};
pub use window::{Window, WindowMask, WindowOffset, WindowShape};
