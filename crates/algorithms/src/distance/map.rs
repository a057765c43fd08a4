//! Distance map analysis
//!
//! Distance, in map units, from every cell to the nearest cell holding one
//! of the source values.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, info};

use landgrid_core::raster::Raster;
use landgrid_core::{Algorithm, Error, Result};

use crate::class_of;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::distance::edt::euclidean_distance;
use crate::distance::friction::{DistanceField, FrictionSurface};

/// Distance model of a distance map
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DistanceType {
    /// Straight-line distance
    #[default]
    #[strum(
        to_string = "euclidean",
        serialize = "euclidian distance",
        serialize = "euclidean distance",
        serialize = "euclidian",
        serialize = "euclidian_distance"
    )]
    Euclidean,
    /// Accumulated friction cost
    #[strum(
        to_string = "functional",
        serialize = "functional distance",
        serialize = "functional_distance"
    )]
    Functional,
}

/// Parameters for a distance map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceConfig {
    /// Values whose cells are distance sources
    pub sources: Vec<i64>,
    pub distance_type: DistanceType,
    /// Cells farther than this (map units) become nodata
    pub max_distance: Option<f64>,
}

/// Distance raster plus the run's diagnostics
#[derive(Debug, Clone)]
pub struct DistanceMapOutput {
    pub raster: Raster<f64>,
    pub diagnostics: Diagnostics,
}

/// Distance from every cell to the nearest cell whose class is in `values`.
///
/// Uses the exact Euclidean transform, or the friction transform over
/// `surface` for [`DistanceType::Functional`].
pub fn distance_to_values(
    grid: &Raster<f64>,
    values: &[i64],
    distance_type: DistanceType,
    surface: &FrictionSurface<'_>,
    max_distance: Option<f64>,
) -> DistanceField {
    let (rows, cols) = grid.shape();
    let mask: Vec<bool> = grid
        .data()
        .iter()
        .map(|v| !grid.is_nodata(*v) && values.contains(&class_of(*v)))
        .collect();

    match distance_type {
        DistanceType::Euclidean => euclidean_distance(&mask, rows, cols, grid.cell_size(), max_distance),
        DistanceType::Functional => {
            let sources: Vec<(usize, usize)> = mask
                .iter()
                .enumerate()
                .filter(|(_, s)| **s)
                .map(|(i, _)| (i / cols, i % cols))
                .collect();
            surface.transform(&sources, max_distance)
        }
    }
}

/// Compute a distance map.
///
/// Fails fast on an empty source set, a non-positive cutoff, a geographic
/// CRS or a friction raster whose geometry differs from `grid`.
pub fn distance_map(
    grid: &Raster<f64>,
    friction: Option<&Raster<f64>>,
    config: &DistanceConfig,
) -> Result<DistanceMapOutput> {
    if config.sources.is_empty() {
        return Err(Error::config("distance map needs at least one source value"));
    }
    if let Some(max) = config.max_distance
        && (max.is_nan() || max <= 0.0)
    {
        return Err(Error::config(format!("maximum distance must be positive, got {max}")));
    }
    if grid.crs().is_some_and(|c| c.is_geographic()) {
        return Err(Error::config("distance maps require a projected CRS"));
    }

    let mut diagnostics = Diagnostics::new();
    if friction.is_some() && config.distance_type == DistanceType::Euclidean {
        diagnostics.warn_config("friction raster is ignored by euclidean distance");
    }
    let surface = FrictionSurface::for_grid(grid, friction)?;

    debug!(
        sources = ?config.sources,
        distance_type = %config.distance_type,
        max_distance = ?config.max_distance,
        "distance map"
    );

    let field = distance_to_values(grid, &config.sources, config.distance_type, &surface, config.max_distance);

    let unreachable = field.unreachable_count();
    if unreachable == field.values().len() {
        diagnostics.warn_config(format!("no cell holds a source value among {:?}", config.sources));
    }
    if unreachable > 0 {
        diagnostics.push(Diagnostic::Unreachable {
            context: format!("{} distance", config.distance_type),
            cells: unreachable,
        });
    }

    let raster = field.to_raster(grid)?;
    info!(unreachable, "distance map done");
    Ok(DistanceMapOutput { raster, diagnostics })
}

/// Input of [`DistanceMap`]
#[derive(Debug, Clone)]
pub struct DistanceMapInput {
    pub grid: Raster<f64>,
    pub friction: Option<Raster<f64>>,
}

/// Distance map as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct DistanceMap;

impl Algorithm for DistanceMap {
    type Input = DistanceMapInput;
    type Output = DistanceMapOutput;
    type Params = DistanceConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Distance"
    }

    fn description(&self) -> &'static str {
        "Distance from every cell to the nearest cell holding a source value"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        distance_map(&input.grid, input.friction.as_ref(), &params)
    }
}
