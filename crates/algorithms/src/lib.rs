//! # landgrid Algorithms
//!
//! Analyses over categorical rasters.
//!
//! ## Available Algorithm Categories
//!
//! - **landscape**: sliding-window, point, tile, map and entity metrics
//! - **distance**: Euclidean and friction distance, distance-decay weights
//! - **cluster**: connected clusters of selected values
//! - **classification**: interval classification, search and replace
//! - **combine**: cell-by-cell formulas over named factor rasters
//! - **run**: run configurations read from properties or JSON files

pub mod cancel;
pub mod classification;
pub mod cluster;
pub mod combine;
pub mod diagnostics;
pub mod distance;
pub mod landscape;
mod maybe_rayon;
pub mod run;

/// Class of a categorical cell value
#[inline]
pub(crate) fn class_of(v: f64) -> i64 {
    v.round() as i64
}

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::CancelToken;
    pub use crate::classification::{
        classify, search_and_replace, Classification, ClassificationConfig, DomainRule,
        ReplaceConfig, SearchReplace,
    };
    pub use crate::cluster::{cluster, ClusterConfig, ClusterType, Clustering};
    pub use crate::combine::{combine, Combination, CombineConfig, Factor, Formula};
    pub use crate::diagnostics::{Diagnostic, Diagnostics};
    pub use crate::distance::{
        distance_map, AnalyzeType, DistanceConfig, DistanceFunction, DistanceMap, DistanceType,
    };
    pub use crate::landscape::{
        entity_analysis, grid_analysis, map_analysis, AnalysisConfig, Positions, ScanOutputs,
        ScanReport, ScanStatus, SlidingWindow, WindowScanner, ZoneConfig, ZoneReport,
    };
    pub use crate::run::{RunConfig, Treatment};
    pub use landgrid_core::prelude::*;
}
