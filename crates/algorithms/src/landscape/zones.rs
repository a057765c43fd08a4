//! Tile, whole-map and entity analyses
//!
//! Same metrics as the sliding window, evaluated once per zone instead of
//! once per position: non-overlapping square tiles, the whole raster, or
//! the zones of an entity raster. Zones carry no centre cell, so `Central`,
//! `pCentral` and `vCentral` are nodata here. With a friction raster `MD_x`
//! reads friction distances, otherwise Euclidean ones.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use landgrid_core::io::Table;
use landgrid_core::raster::Raster;
use landgrid_core::{Error, Result};

use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::distance::friction::{DistanceField, Extent, FrictionSurface};
use crate::distance::map::{distance_to_values, DistanceType};
use crate::landscape::metric::{expand_metrics, Metric};
use crate::landscape::sample::WindowSample;
use crate::landscape::scanner::MetricRaster;
use crate::landscape::summary::{SampleSummary, SummaryNeeds};
use crate::maybe_rayon::*;

/// Parameters shared by tile, map and entity analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub metrics: Vec<String>,
    /// Zones with a larger share of missing cells are skipped (0 to 1)
    pub max_missing_rate: f64,
    /// Skip patch metrics
    pub fast: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            max_missing_rate: 1.0,
            fast: false,
        }
    }
}

/// Result of a zone analysis
#[derive(Debug, Clone)]
pub struct ZoneReport {
    pub metrics: Vec<Metric>,
    /// One raster per metric (empty for the whole-map analysis)
    pub rasters: Vec<MetricRaster>,
    /// One row per zone
    pub table: Table,
    pub diagnostics: Diagnostics,
}

impl ZoneReport {
    /// Raster of the metric named `name`
    pub fn raster(&self, name: &str) -> Option<&Raster<f64>> {
        self.rasters
            .iter()
            .find(|r| r.metric.to_string() == name)
            .map(|r| &r.raster)
    }
}

struct ZonePlan {
    metrics: Vec<Metric>,
    needs: SummaryNeeds,
    fields: HashMap<i64, DistanceField>,
    max_missing_rate: f64,
}

impl ZonePlan {
    fn new(
        grid: &Raster<f64>,
        friction: Option<&Raster<f64>>,
        config: &ZoneConfig,
        diagnostics: &mut Diagnostics,
    ) -> Result<Self> {
        if config.metrics.is_empty() {
            return Err(Error::config("no metric selected"));
        }
        if !(0.0..=1.0).contains(&config.max_missing_rate) {
            return Err(Error::config(format!(
                "maximum missing-value rate must lie in [0, 1], got {}",
                config.max_missing_rate
            )));
        }
        let metrics = expand_metrics(&config.metrics, &grid.distinct_classes(), config.fast, diagnostics)?;
        if metrics.is_empty() {
            return Err(Error::config("metric selection resolves to no metric on this grid"));
        }
        let needs = SummaryNeeds::for_metrics(&metrics);
        if !needs.distance_classes.is_empty() && grid.crs().is_some_and(|c| c.is_geographic()) {
            return Err(Error::config("distance metrics require a projected CRS"));
        }

        let surface = FrictionSurface::for_grid(grid, friction)?;
        let distance_type = if surface.has_friction() {
            DistanceType::Functional
        } else {
            DistanceType::Euclidean
        };
        if surface.has_friction() && needs.distance_classes.is_empty() {
            diagnostics.warn_config("friction raster is not used by this analysis");
        }
        let mut fields = HashMap::new();
        for &class in &needs.distance_classes {
            debug!(class, %distance_type, "distance field");
            let field = distance_to_values(grid, &[class], distance_type, &surface, None);
            let cells = field.unreachable_count();
            if cells > 0 {
                diagnostics.push(Diagnostic::Unreachable {
                    context: format!("distance to class {class}"),
                    cells,
                });
            }
            fields.insert(class, field);
        }

        Ok(Self {
            metrics,
            needs,
            fields,
            max_missing_rate: config.max_missing_rate,
        })
    }

    /// Metric values of one zone, or its missing rate when skipped
    fn evaluate(&self, sample: &WindowSample) -> std::result::Result<Vec<f64>, f64> {
        let missing = sample.missing_rate();
        if missing > self.max_missing_rate {
            return Err(missing);
        }
        let summary = SampleSummary::compute(sample, &self.needs, &self.fields);
        Ok(self
            .metrics
            .iter()
            .map(|m| summary.evaluate(m).unwrap_or(f64::NAN))
            .collect())
    }

    fn columns(&self, keys: &[&str]) -> Vec<String> {
        keys.iter()
            .map(|k| k.to_string())
            .chain(self.metrics.iter().map(Metric::to_string))
            .collect()
    }

    fn row(&self, keys: &[f64], values: Option<&[f64]>) -> Vec<f64> {
        let mut row = keys.to_vec();
        match values {
            Some(v) => row.extend_from_slice(v),
            None => row.extend(std::iter::repeat_n(f64::NAN, self.metrics.len())),
        }
        row
    }

    fn into_report(self, rasters: Vec<Raster<f64>>, table: Table, diagnostics: Diagnostics) -> ZoneReport {
        ZoneReport {
            rasters: self
                .metrics
                .iter()
                .copied()
                .zip(rasters)
                .map(|(metric, raster)| MetricRaster { metric, raster })
                .collect(),
            metrics: self.metrics,
            table,
            diagnostics,
        }
    }
}

fn blank(rows: usize, cols: usize) -> Raster<f64> {
    let mut r = Raster::filled(rows, cols, f64::NAN);
    r.set_nodata(Some(f64::NAN));
    r
}

/// Evaluate metrics on non-overlapping `tile` × `tile` blocks.
///
/// The output rasters have one cell per tile (cell size × `tile`); tiles
/// cut by the right or bottom edge only cover their on-grid cells.
pub fn grid_analysis(
    grid: &Raster<f64>,
    friction: Option<&Raster<f64>>,
    tile: usize,
    config: &ZoneConfig,
) -> Result<ZoneReport> {
    if tile == 0 {
        return Err(Error::config("grid size must be at least 1"));
    }
    let mut diagnostics = Diagnostics::new();
    let plan = ZonePlan::new(grid, friction, config, &mut diagnostics)?;

    let (rows, cols) = grid.shape();
    let (out_rows, out_cols) = (rows.div_ceil(tile), cols.div_ceil(tile));
    debug!(tile, out_rows, out_cols, "grid analysis");

    let tiles: Vec<Extent> = (0..out_rows)
        .flat_map(|tr| (0..out_cols).map(move |tc| (tr, tc)))
        .map(|(tr, tc)| Extent {
            row0: tr * tile,
            col0: tc * tile,
            rows: tile.min(rows - tr * tile),
            cols: tile.min(cols - tc * tile),
        })
        .collect();

    let results: Vec<_> = tiles
        .par_iter()
        .map(|extent| plan.evaluate(&WindowSample::from_region(grid, *extent, |_, _| true)))
        .collect();

    let transform = grid.transform().coarsened(tile);
    let mut rasters: Vec<Raster<f64>> = (0..plan.metrics.len())
        .map(|_| {
            let mut r = blank(out_rows, out_cols);
            r.set_transform(transform);
            r.set_crs(grid.crs().cloned());
            r
        })
        .collect();
    let mut table = Table::new(plan.columns(&["row", "col", "X", "Y"]));

    for (i, result) in results.iter().enumerate() {
        let (tr, tc) = (i / out_cols, i % out_cols);
        let values = match result {
            Ok(values) => {
                for (raster, value) in rasters.iter_mut().zip(values) {
                    raster.set(tr, tc, *value)?;
                }
                Some(values.as_slice())
            }
            Err(missing_rate) => {
                diagnostics.push(Diagnostic::DataQuality {
                    row: tiles[i].row0 as isize,
                    col: tiles[i].col0 as isize,
                    missing_rate: *missing_rate,
                });
                None
            }
        };
        let (x, y) = transform.pixel_to_geo(tc, tr);
        table.push_row(plan.row(&[tr as f64, tc as f64, x, y], values))?;
    }

    diagnostics.log_summary("grid analysis");
    info!(tiles = results.len(), "grid analysis done");
    Ok(plan.into_report(rasters, table, diagnostics))
}

/// Evaluate metrics once over the whole raster
pub fn map_analysis(grid: &Raster<f64>, friction: Option<&Raster<f64>>, config: &ZoneConfig) -> Result<ZoneReport> {
    let mut diagnostics = Diagnostics::new();
    let plan = ZonePlan::new(grid, friction, config, &mut diagnostics)?;
    let (rows, cols) = grid.shape();

    let sample = WindowSample::from_region(grid, Extent::full(rows, cols), |_, _| true);
    let mut table = Table::new(plan.columns(&[]));
    match plan.evaluate(&sample) {
        Ok(values) => table.push_row(values)?,
        Err(missing_rate) => {
            diagnostics.push(Diagnostic::DataQuality { row: 0, col: 0, missing_rate });
            table.push_row(plan.row(&[], None))?;
        }
    }

    diagnostics.log_summary("map analysis");
    Ok(plan.into_report(Vec::new(), table, diagnostics))
}

/// Evaluate metrics once per entity of `entities`.
///
/// Cells whose entity is nodata or 0 belong to no entity. Every cell of
/// an entity carries the entity's values in the output rasters.
pub fn entity_analysis(
    grid: &Raster<f64>,
    entities: &Raster<i32>,
    friction: Option<&Raster<f64>>,
    config: &ZoneConfig,
) -> Result<ZoneReport> {
    grid.ensure_same_grid(entities, "entity raster")?;
    let mut diagnostics = Diagnostics::new();
    let plan = ZonePlan::new(grid, friction, config, &mut diagnostics)?;
    let (rows, cols) = grid.shape();

    let entity_at = |r: usize, c: usize| entities.value_at(r as isize, c as isize).filter(|id| *id != 0);

    // bounding box and first cell of every entity
    let mut zones: BTreeMap<i32, (usize, usize, usize, usize)> = BTreeMap::new();
    for r in 0..rows {
        for c in 0..cols {
            let Some(id) = entity_at(r, c) else { continue };
            let b = zones.entry(id).or_insert((r, c, r, c));
            b.1 = b.1.min(c);
            b.2 = b.2.max(r);
            b.3 = b.3.max(c);
        }
    }
    debug!(entities = zones.len(), "entity analysis");

    let zones: Vec<(i32, Extent)> = zones
        .into_iter()
        .map(|(id, (r0, c0, r1, c1))| {
            (id, Extent { row0: r0, col0: c0, rows: r1 - r0 + 1, cols: c1 - c0 + 1 })
        })
        .collect();

    let results: Vec<_> = zones
        .par_iter()
        .map(|(id, extent)| {
            let sample = WindowSample::from_region(grid, *extent, |r, c| entity_at(r, c) == Some(*id));
            plan.evaluate(&sample)
        })
        .collect();

    let mut table = Table::new(plan.columns(&["entity"]));
    let mut by_entity: HashMap<i32, &[f64]> = HashMap::new();
    for ((id, extent), result) in zones.iter().zip(&results) {
        let values = match result {
            Ok(values) => Some(values.as_slice()),
            Err(missing_rate) => {
                diagnostics.push(Diagnostic::DataQuality {
                    row: extent.row0 as isize,
                    col: extent.col0 as isize,
                    missing_rate: *missing_rate,
                });
                None
            }
        };
        if let Some(values) = values {
            by_entity.insert(*id, values);
        }
        table.push_row(plan.row(&[*id as f64], values))?;
    }

    let mut rasters: Vec<Raster<f64>> = (0..plan.metrics.len())
        .map(|_| {
            let mut r = grid.with_same_meta::<f64>(rows, cols);
            r.data_mut().fill(f64::NAN);
            r.set_nodata(Some(f64::NAN));
            r
        })
        .collect();
    for r in 0..rows {
        for c in 0..cols {
            let Some(values) = entity_at(r, c).and_then(|id| by_entity.get(&id)) else { continue };
            for (raster, value) in rasters.iter_mut().zip(values.iter()) {
                raster.set(r, c, *value)?;
            }
        }
    }

    diagnostics.log_summary("entity analysis");
    info!(entities = zones.len(), "entity analysis done");
    Ok(plan.into_report(rasters, table, diagnostics))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use landgrid_core::GeoTransform;

    fn config(metrics: &[&str]) -> ZoneConfig {
        ZoneConfig {
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn checker() -> Raster<f64> {
        // 4x5, left two columns class 1, the rest class 2
        let mut data = vec![2.0; 20];
        for r in 0..4 {
            data[r * 5] = 1.0;
            data[r * 5 + 1] = 1.0;
        }
        let mut grid = Raster::from_vec(data, 4, 5).unwrap();
        grid.set_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0));
        grid
    }

    #[test]
    fn test_tiles() {
        let report = grid_analysis(&checker(), None, 2, &config(&["Nclass", "N-total"])).unwrap();
        let nclass = report.raster("Nclass").unwrap();
        assert_eq!(nclass.shape(), (2, 3));
        assert_relative_eq!(nclass.cell_size(), 20.0);
        assert_relative_eq!(nclass.get(0, 0).unwrap(), 1.0);
        assert_relative_eq!(nclass.get(0, 1).unwrap(), 1.0);
        // edge tile covers one column
        assert_relative_eq!(report.raster("N-total").unwrap().get(1, 2).unwrap(), 2.0);
        assert_eq!(report.table.len(), 6);
    }

    #[test]
    fn test_whole_map() {
        let report = map_analysis(&checker(), None, &config(&["NV_", "Majority"])).unwrap();
        assert_eq!(report.table.columns(), ["NV_1", "NV_2", "Majority"]);
        assert_eq!(report.table.rows(), &[vec![8.0, 12.0, 2.0]]);
        assert!(report.rasters.is_empty());
    }

    #[test]
    fn test_entities() {
        let grid = checker();
        let mut entities: Raster<i32> = grid.with_same_meta(4, 5);
        for c in 0..5 {
            entities.set(0, c, 7).unwrap();
            entities.set(1, c, 7).unwrap();
            entities.set(2, c, 3).unwrap();
        }
        // row 3 stays 0: no entity
        let report = entity_analysis(&grid, &entities, None, &config(&["N-valid", "pNV_1"])).unwrap();

        assert_eq!(report.table.len(), 2);
        assert_relative_eq!(report.table.rows()[0][0], 3.0);
        assert_relative_eq!(report.table.rows()[0][1], 5.0);
        assert_relative_eq!(report.table.rows()[1][1], 10.0);
        assert_relative_eq!(report.table.rows()[1][2], 0.4);

        let n = report.raster("N-valid").unwrap();
        assert_relative_eq!(n.get(0, 4).unwrap(), 10.0);
        assert!(n.get(3, 0).unwrap().is_nan());
    }

    #[test]
    fn test_entity_grid_mismatch() {
        let entities: Raster<i32> = Raster::new(2, 2);
        assert!(matches!(
            entity_analysis(&checker(), &entities, None, &config(&["NP"])),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_friction_scales_mean_distance() {
        let grid = checker();
        let euclidean = map_analysis(&grid, None, &config(&["MD_1"])).unwrap();
        let friction = grid.like(2.0);
        let weighted = map_analysis(&grid, Some(&friction), &config(&["MD_1"])).unwrap();

        let plain = euclidean.table.rows()[0][0];
        assert_relative_eq!(plain, 12.0, epsilon = 1e-9);
        assert_relative_eq!(weighted.table.rows()[0][0], 2.0 * plain, epsilon = 1e-9);
        assert!(weighted.diagnostics.is_empty());

        let unused = grid_analysis(&grid, Some(&friction), 2, &config(&["SHDI"])).unwrap();
        assert_eq!(unused.diagnostics.len(), 1);

        let small = Raster::filled(2, 2, 1.0);
        assert!(matches!(
            map_analysis(&grid, Some(&small), &config(&["MD_1"])),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_rate_skips_tile() {
        let mut grid = checker();
        grid.set_nodata(Some(2.0));
        let cfg = ZoneConfig { max_missing_rate: 0.5, ..config(&["N-valid"]) };
        let report = grid_analysis(&grid, None, 2, &cfg).unwrap();
        assert!(report.raster("N-valid").unwrap().get(0, 1).unwrap().is_nan());
        assert_eq!(report.diagnostics.data_quality_count(), 4);
    }
}
