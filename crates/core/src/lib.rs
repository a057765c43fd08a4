//! # landgrid core
//!
//! Core types, traits and I/O for the landgrid landscape-analysis engine.
//!
//! This crate provides:
//! - `Raster<T>`: georeferenced grid with explicit nodata handling
//! - `GeoTransform`: north-up georeferencing
//! - `Window`/`WindowShape`: analysis window geometry
//! - `CRS`: coordinate reference system metadata
//! - I/O for GeoTIFF, ESRI ASCII grids, delimited tables, point files and
//!   properties files

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement, Window, WindowShape};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement, Window, WindowShape};
    pub use crate::Algorithm;
}

/// Core trait for the engine's analyses.
///
/// Analyses are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}
