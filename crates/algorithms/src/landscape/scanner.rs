//! Sliding-window scanner
//!
//! Evaluates a metric selection at every analysis position of a grid: each
//! cell of a regular lattice, or a list of points. Positions are processed
//! in chunks, in parallel within a chunk; results land in position-indexed
//! slots so the output never depends on scheduling. Cancellation is checked
//! between chunks, which keeps the finished positions a prefix of the scan
//! order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use landgrid_core::io::{AnalysisPoint, Table};
use landgrid_core::raster::{Raster, Window, WindowShape};
use landgrid_core::{Algorithm, Error, GeoTransform, Result};

use crate::cancel::CancelToken;
use crate::class_of;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::distance::friction::{DistanceField, FrictionSurface};
use crate::distance::function::{AnalyzeType, DistanceFunction};
use crate::distance::map::{distance_to_values, DistanceType};
use crate::landscape::interpolate::nearest_sources;
use crate::landscape::metric::{expand_metrics, Metric};
use crate::landscape::sample::{Weighting, WindowSample};
use crate::landscape::summary::{SampleSummary, SummaryNeeds};
use crate::maybe_rayon::*;

/// Positions evaluated between two cancellation checks
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Where the scanner evaluates windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Positions {
    /// Every `delta`-th row and column, starting at (0, 0); `delta = 1` is
    /// the dense scan
    Lattice { delta: usize },
    /// Caller-supplied points, snapped to the cell containing them
    Points(Vec<AnalysisPoint>),
}

impl Default for Positions {
    fn default() -> Self {
        Positions::Lattice { delta: 1 }
    }
}

/// Output sinks of a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOutputs {
    /// One raster per metric
    pub raster: bool,
    /// One table row per position
    pub table: bool,
}

impl Default for ScanOutputs {
    fn default() -> Self {
        Self {
            raster: true,
            table: false,
        }
    }
}

/// Parameters of a sliding-window or point analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Metric names, per-class prefixes or family names
    pub metrics: Vec<String>,
    pub shape: WindowShape,
    /// Window size in cells (odd)
    pub size: usize,
    pub analyze_type: AnalyzeType,
    pub distance_function: DistanceFunction,
    /// Windows with a larger share of missing cells are skipped (0 to 1)
    pub max_missing_rate: f64,
    pub positions: Positions,
    /// Fill skipped and non-lattice cells from the nearest evaluated position
    pub interpolate: bool,
    /// Only evaluate positions whose centre class is listed (all when empty)
    pub filters: Vec<i64>,
    /// Never evaluate positions whose centre class is listed
    pub unfilters: Vec<i64>,
    /// Skip patch metrics
    pub fast: bool,
    pub outputs: ScanOutputs,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            metrics: Vec::new(),
            shape: WindowShape::Square,
            size: 3,
            analyze_type: AnalyzeType::Threshold,
            distance_function: DistanceFunction::default(),
            max_missing_rate: 1.0,
            positions: Positions::default(),
            interpolate: false,
            filters: Vec::new(),
            unfilters: Vec::new(),
            fast: false,
            outputs: ScanOutputs::default(),
        }
    }
}

impl AnalysisConfig {
    /// Check the configuration and build its window.
    ///
    /// Grid-dependent checks (CRS, metric expansion) happen in
    /// [`WindowScanner::run`].
    pub fn validate(&self) -> Result<Window> {
        if self.metrics.is_empty() {
            return Err(Error::config("no metric selected"));
        }
        if !self.outputs.raster && !self.outputs.table {
            return Err(Error::config("no output selected"));
        }
        if !(0.0..=1.0).contains(&self.max_missing_rate) {
            return Err(Error::config(format!(
                "maximum missing-value rate must lie in [0, 1], got {}",
                self.max_missing_rate
            )));
        }
        if self.positions == (Positions::Lattice { delta: 0 }) {
            return Err(Error::config("displacement delta must be at least 1"));
        }
        Window::new(self.shape.clone(), self.size)
    }

    pub fn weighting(&self) -> Weighting {
        Weighting {
            analyze_type: self.analyze_type,
            function: self.distance_function,
        }
    }

    /// Whether a position with this centre value is evaluated
    pub fn passes_filters(&self, center: Option<f64>) -> bool {
        let class = center.map(class_of);
        if !self.filters.is_empty() && !class.is_some_and(|c| self.filters.contains(&c)) {
            return false;
        }
        !class.is_some_and(|c| self.unfilters.contains(&c))
    }
}

/// How a scan ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStatus {
    Completed,
    /// Cancelled; the first `completed` positions in scan order are valid
    Interrupted { completed: usize, total: usize },
}

/// Output raster of one metric
#[derive(Debug, Clone)]
pub struct MetricRaster {
    pub metric: Metric,
    pub raster: Raster<f64>,
}

/// Result of one scan
#[derive(Debug, Clone)]
pub struct ScanReport {
    /// Resolved metrics, in output column order
    pub metrics: Vec<Metric>,
    pub rasters: Vec<MetricRaster>,
    /// `row;col;X;Y;<metrics>` rows, one per enumerated position
    pub table: Option<Table>,
    pub diagnostics: Diagnostics,
    pub status: ScanStatus,
}

impl ScanReport {
    pub fn is_complete(&self) -> bool {
        self.status == ScanStatus::Completed
    }

    /// Raster of the metric named `name`
    pub fn raster(&self, name: &str) -> Option<&Raster<f64>> {
        self.rasters
            .iter()
            .find(|r| r.metric.to_string() == name)
            .map(|r| &r.raster)
    }

    /// Turn an interrupted scan into [`Error::Interrupted`]
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ScanStatus::Completed => Ok(self),
            ScanStatus::Interrupted { completed, total } => Err(Error::Interrupted { completed, total }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    /// No window cell lies on the grid
    OutOfBounds,
    /// Centre value rejected by the filters
    Filtered,
    /// Too many missing cells
    MissingData(f64),
    Evaluated(Vec<f64>),
}

struct ScanPlan<'c> {
    config: &'c AnalysisConfig,
    window: Window,
    metrics: Vec<Metric>,
    needs: SummaryNeeds,
    weighting: Weighting,
}

type Progress<'a> = Box<dyn Fn(usize, usize) + Send + Sync + 'a>;

/// Runs [`AnalysisConfig`]s over one grid.
///
/// The friction surface and the request-wide distance fields are shared by
/// every run of the same scanner, so batch runs compute them once.
pub struct WindowScanner<'a> {
    grid: &'a Raster<f64>,
    surface: FrictionSurface<'a>,
    classes: Vec<i64>,
    distance_fields: HashMap<i64, DistanceField>,
    cancel: CancelToken,
    progress: Option<Progress<'a>>,
    chunk_size: usize,
}

impl<'a> WindowScanner<'a> {
    pub fn new(grid: &'a Raster<f64>) -> Self {
        let (rows, cols) = grid.shape();
        Self {
            grid,
            surface: FrictionSurface::uniform(rows, cols, grid.cell_size()),
            classes: grid.distinct_classes(),
            distance_fields: HashMap::new(),
            cancel: CancelToken::new(),
            progress: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Use a friction raster for functional windows and distance metrics.
    ///
    /// Fails with [`Error::DimensionMismatch`] when its geometry differs
    /// from the grid.
    pub fn with_friction(mut self, friction: &'a Raster<f64>) -> Result<Self> {
        self.surface = FrictionSurface::for_grid(self.grid, Some(friction))?;
        self.distance_fields.clear();
        Ok(self)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Called with (completed, total) positions after every chunk
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'a,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Run every configuration; each one is validated and reported on its own
    pub fn run_batch(&mut self, configs: &[AnalysisConfig]) -> Vec<Result<ScanReport>> {
        configs.iter().map(|config| self.run(config)).collect()
    }

    /// Run one configuration.
    ///
    /// Configuration errors are returned before any position is evaluated.
    /// Cancellation is not an error here: the report carries
    /// [`ScanStatus::Interrupted`] and the outputs of the finished prefix.
    pub fn run(&mut self, config: &AnalysisConfig) -> Result<ScanReport> {
        let (plan, mut diagnostics) = self.plan(config)?;

        self.prepare_distance_fields(&plan.needs.distance_classes, &mut diagnostics);

        let positions = self.positions(config, &mut diagnostics);
        let total = positions.len();
        debug!(
            shape = plan.window.shape().name(),
            size = plan.window.size(),
            metrics = plan.metrics.len(),
            positions = total,
            "scanning"
        );

        let scanner: &Self = self;
        let mut outcomes: Vec<Outcome> = Vec::with_capacity(total);
        let mut interrupted = false;
        let mut start = 0;
        while start < total {
            if scanner.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            let end = (start + scanner.chunk_size).min(total);
            let chunk: Vec<Outcome> = (start..end)
                .into_par_iter()
                .map(|i| scanner.evaluate(positions[i], &plan))
                .collect();
            outcomes.extend(chunk);
            if let Some(progress) = &scanner.progress {
                progress(end, total);
            }
            start = end;
        }

        let (mut rasters, table) = scanner.write(&plan, &positions, &outcomes, &mut diagnostics)?;

        let completed = outcomes.len();
        let status = if interrupted {
            warn!(completed, total, "scan interrupted");
            ScanStatus::Interrupted { completed, total }
        } else {
            if config.interpolate && !rasters.is_empty() {
                scanner.interpolate(&plan, &positions, &outcomes, &mut rasters);
            }
            ScanStatus::Completed
        };

        diagnostics.log_summary("sliding window");
        info!(completed, total, "scan done");

        Ok(ScanReport {
            rasters: plan
                .metrics
                .iter()
                .copied()
                .zip(rasters)
                .map(|(metric, raster)| MetricRaster { metric, raster })
                .collect(),
            metrics: plan.metrics,
            table,
            diagnostics,
            status,
        })
    }

    fn plan<'c>(&self, config: &'c AnalysisConfig) -> Result<(ScanPlan<'c>, Diagnostics)> {
        let window = config.validate()?;
        let mut diagnostics = Diagnostics::new();

        let metrics = expand_metrics(&config.metrics, &self.classes, config.fast, &mut diagnostics)?;
        if metrics.is_empty() {
            return Err(Error::config(format!(
                "metric selection {:?} resolves to no metric on this grid",
                config.metrics
            )));
        }
        let needs = SummaryNeeds::for_metrics(&metrics);

        let uses_distance = window.is_functional() || !needs.distance_classes.is_empty();
        if uses_distance && self.grid.crs().is_some_and(|c| c.is_geographic()) {
            return Err(Error::config(
                "functional windows and distance metrics require a projected CRS",
            ));
        }
        if self.surface.has_friction() && !uses_distance {
            diagnostics.warn_config("friction raster is not used by this analysis");
        }
        if let Some(both) = config.filters.iter().find(|v| config.unfilters.contains(v)) {
            diagnostics.warn_config(format!("value {both} is both a filter and an unfilter"));
        }
        if config.interpolate && !config.outputs.raster {
            diagnostics.warn_config("interpolation only applies to raster outputs");
        }

        let weighting = config.weighting();
        Ok((
            ScanPlan {
                config,
                window,
                metrics,
                needs,
                weighting,
            },
            diagnostics,
        ))
    }

    /// Compute the distance fields the metrics read, once per class
    fn prepare_distance_fields(&mut self, classes: &[i64], diagnostics: &mut Diagnostics) {
        let distance_type = if self.surface.has_friction() {
            DistanceType::Functional
        } else {
            DistanceType::Euclidean
        };
        for &class in classes {
            let field = self.distance_fields.entry(class).or_insert_with(|| {
                debug!(class, %distance_type, "distance field");
                distance_to_values(self.grid, &[class], distance_type, &self.surface, None)
            });
            let cells = field.unreachable_count();
            if cells > 0 {
                diagnostics.push(Diagnostic::Unreachable {
                    context: format!("distance to class {class}"),
                    cells,
                });
            }
        }
    }

    fn positions(&self, config: &AnalysisConfig, diagnostics: &mut Diagnostics) -> Vec<(isize, isize)> {
        let (rows, cols) = self.grid.shape();
        match &config.positions {
            Positions::Lattice { delta } => (0..rows)
                .step_by(*delta)
                .flat_map(|r| (0..cols).step_by(*delta).map(move |c| (r as isize, c as isize)))
                .collect(),
            Positions::Points(points) => {
                let mut out = Vec::with_capacity(points.len());
                for point in points {
                    match *point {
                        AnalysisPoint::Pixel { row, col } => out.push((row, col)),
                        AnalysisPoint::Coordinate { x, y } => match self.grid.geo_to_cell(x, y) {
                            Some(cell) => out.push(cell),
                            None => diagnostics.warn_config(format!("point ({x}, {y}) cannot be located")),
                        },
                    }
                }
                out
            }
        }
    }

    fn evaluate(&self, position: (isize, isize), plan: &ScanPlan<'_>) -> Outcome {
        let (rows, cols) = self.grid.shape();
        let radius = plan.window.radius() as isize;
        let (r, c) = position;
        if r + radius < 0 || c + radius < 0 || r - radius >= rows as isize || c - radius >= cols as isize {
            return Outcome::OutOfBounds;
        }
        if !plan.config.passes_filters(self.grid.value_at(r, c)) {
            return Outcome::Filtered;
        }

        let surface = plan.window.is_functional().then_some(&self.surface);
        let sample = WindowSample::extract(self.grid, position, &plan.window, plan.weighting, surface);
        if !sample.touches_grid(rows, cols) {
            return Outcome::OutOfBounds;
        }
        let missing = sample.missing_rate();
        if missing > plan.config.max_missing_rate {
            return Outcome::MissingData(missing);
        }

        let summary = SampleSummary::compute(&sample, &plan.needs, &self.distance_fields);
        Outcome::Evaluated(
            plan.metrics
                .iter()
                .map(|m| summary.evaluate(m).unwrap_or(f64::NAN))
                .collect(),
        )
    }

    fn blank(&self) -> Raster<f64> {
        let (rows, cols) = self.grid.shape();
        let mut out = self.grid.with_same_meta::<f64>(rows, cols);
        out.data_mut().fill(f64::NAN);
        out.set_nodata(Some(f64::NAN));
        out
    }

    fn write(
        &self,
        plan: &ScanPlan<'_>,
        positions: &[(isize, isize)],
        outcomes: &[Outcome],
        diagnostics: &mut Diagnostics,
    ) -> Result<(Vec<Raster<f64>>, Option<Table>)> {
        let n_metrics = plan.metrics.len();
        let mut rasters: Vec<Raster<f64>> = if plan.config.outputs.raster {
            (0..n_metrics).map(|_| self.blank()).collect()
        } else {
            Vec::new()
        };
        let mut table = plan.config.outputs.table.then(|| {
            let mut columns: Vec<String> = ["row", "col", "X", "Y"].iter().map(|s| s.to_string()).collect();
            columns.extend(plan.metrics.iter().map(Metric::to_string));
            Table::new(columns)
        });

        for (&(r, c), outcome) in positions.iter().zip(outcomes) {
            let values = match outcome {
                Outcome::Evaluated(values) => Some(values.as_slice()),
                Outcome::MissingData(missing_rate) => {
                    diagnostics.push(Diagnostic::DataQuality {
                        row: r,
                        col: c,
                        missing_rate: *missing_rate,
                    });
                    None
                }
                Outcome::OutOfBounds | Outcome::Filtered => None,
            };

            if let Some(values) = values
                && self.grid.in_bounds(r, c)
            {
                for (raster, value) in rasters.iter_mut().zip(values) {
                    raster.set(r as usize, c as usize, *value)?;
                }
            }

            if let Some(table) = table.as_mut() {
                let (x, y) = cell_center(self.grid.transform(), r, c);
                let mut row = Vec::with_capacity(4 + n_metrics);
                row.extend([r as f64, c as f64, x, y]);
                match values {
                    Some(values) => row.extend_from_slice(values),
                    None => row.extend(std::iter::repeat_n(f64::NAN, n_metrics)),
                }
                table.push_row(row)?;
            }
        }
        Ok((rasters, table))
    }

    /// Fill cells from the nearest evaluated position.
    ///
    /// Targets are positions skipped for missing data and, on a lattice,
    /// the cells between lattice nodes whose centre value passes the
    /// filters. Bounds and filter skips are never filled.
    fn interpolate(
        &self,
        plan: &ScanPlan<'_>,
        positions: &[(isize, isize)],
        outcomes: &[Outcome],
        rasters: &mut [Raster<f64>],
    ) {
        let (rows, cols) = self.grid.shape();
        let mut evaluated: Vec<Option<usize>> = vec![None; rows * cols];
        let mut targets = vec![false; rows * cols];

        if let Positions::Lattice { delta } = plan.config.positions {
            for r in 0..rows {
                for c in 0..cols {
                    let on_lattice = r % delta == 0 && c % delta == 0;
                    if !on_lattice {
                        let center = self.grid.value_at(r as isize, c as isize);
                        targets[r * cols + c] = plan.config.passes_filters(center);
                    }
                }
            }
        }
        for (scan, (&(r, c), outcome)) in positions.iter().zip(outcomes).enumerate() {
            if !self.grid.in_bounds(r, c) {
                continue;
            }
            let idx = r as usize * cols + c as usize;
            match outcome {
                Outcome::Evaluated(_) => {
                    evaluated[idx] = Some(scan);
                    targets[idx] = false;
                }
                Outcome::MissingData(_) => targets[idx] = evaluated[idx].is_none(),
                Outcome::OutOfBounds | Outcome::Filtered => {}
            }
        }

        let nearest = nearest_sources(&evaluated, &targets, rows, cols);
        let mut filled = 0usize;
        for (idx, source) in nearest.iter().enumerate() {
            let Some(source) = *source else { continue };
            let Outcome::Evaluated(values) = &outcomes[source] else { continue };
            for (raster, value) in rasters.iter_mut().zip(values) {
                raster.data_mut()[[idx / cols, idx % cols]] = *value;
            }
            filled += 1;
        }
        debug!(filled, "interpolated cells");
    }
}

/// Map coordinates of a cell centre, for cells on or off the grid
fn cell_center(transform: &GeoTransform, row: isize, col: isize) -> (f64, f64) {
    (
        transform.origin_x + (col as f64 + 0.5) * transform.pixel_width,
        transform.origin_y + (row as f64 + 0.5) * transform.pixel_height,
    )
}

/// Input of [`SlidingWindow`]
#[derive(Debug, Clone)]
pub struct SlidingWindowInput {
    pub grid: Raster<f64>,
    pub friction: Option<Raster<f64>>,
}

/// Sliding-window analysis as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct SlidingWindow;

impl Algorithm for SlidingWindow {
    type Input = SlidingWindowInput;
    type Output = ScanReport;
    type Params = AnalysisConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "SlidingWindow"
    }

    fn description(&self) -> &'static str {
        "Landscape metrics evaluated in a window centred on every analysis position"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let mut scanner = WindowScanner::new(&input.grid);
        if let Some(friction) = &input.friction {
            scanner = scanner.with_friction(friction)?;
        }
        scanner.run(&params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use landgrid_core::CRS;

    fn config(metrics: &[&str]) -> AnalysisConfig {
        AnalysisConfig {
            metrics: metrics.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn two_halves() -> Raster<f64> {
        let mut data = vec![1.0; 36];
        for r in 0..6 {
            for c in 3..6 {
                data[r * 6 + c] = 2.0;
            }
        }
        let mut grid = Raster::from_vec(data, 6, 6).unwrap();
        grid.set_nodata(Some(-9999.0));
        grid
    }

    #[test]
    fn test_validation_errors() {
        let grid = two_halves();
        let mut scanner = WindowScanner::new(&grid);

        assert!(scanner.run(&config(&[])).unwrap_err().is_configuration());

        let even = AnalysisConfig { size: 4, ..config(&["SHDI"]) };
        assert!(matches!(scanner.run(&even), Err(Error::InvalidWindowSize { size: 4 })));

        let no_output = AnalysisConfig {
            outputs: ScanOutputs { raster: false, table: false },
            ..config(&["SHDI"])
        };
        assert!(scanner.run(&no_output).unwrap_err().is_configuration());

        let bad_rate = AnalysisConfig { max_missing_rate: 1.5, ..config(&["SHDI"]) };
        assert!(scanner.run(&bad_rate).unwrap_err().is_configuration());
    }

    #[test]
    fn test_geographic_crs_rejected_for_distance() {
        let mut grid = two_halves();
        grid.set_crs(Some(CRS::wgs84()));
        let mut scanner = WindowScanner::new(&grid);
        assert!(scanner.run(&config(&["MD_2"])).unwrap_err().is_configuration());
        assert!(scanner.run(&config(&["SHDI"])).is_ok());
    }

    #[test]
    fn test_boundary_between_classes() {
        let grid = two_halves();
        let report = WindowScanner::new(&grid)
            .run(&config(&["Nclass", "HET"]))
            .unwrap();
        let nclass = report.raster("Nclass").unwrap();
        assert_relative_eq!(nclass.get(2, 0).unwrap(), 1.0);
        assert_relative_eq!(nclass.get(2, 2).unwrap(), 2.0);
        assert_relative_eq!(nclass.get(2, 3).unwrap(), 2.0);
        assert_relative_eq!(nclass.get(2, 5).unwrap(), 1.0);
        assert!(report.is_complete());
    }

    #[test]
    fn test_lattice_and_interpolation() {
        let grid = two_halves();
        let base = AnalysisConfig {
            positions: Positions::Lattice { delta: 2 },
            ..config(&["Central"])
        };
        let report = WindowScanner::new(&grid).run(&base).unwrap();
        let central = report.raster("Central").unwrap();
        assert_relative_eq!(central.get(0, 0).unwrap(), 1.0);
        assert!(central.get(0, 1).unwrap().is_nan());

        let interpolated = AnalysisConfig { interpolate: true, ..base };
        let report = WindowScanner::new(&grid).run(&interpolated).unwrap();
        let central = report.raster("Central").unwrap();
        // (0,1) is closest to the lattice node (0,0), tie with (0,2) broken by scan order
        assert_relative_eq!(central.get(0, 1).unwrap(), 1.0);
        assert!(central.data().iter().all(|v| !v.is_nan()));
    }

    #[test]
    fn test_filters_skip_positions() {
        let grid = two_halves();
        let cfg = AnalysisConfig {
            filters: vec![2],
            ..config(&["N-valid"])
        };
        let report = WindowScanner::new(&grid).run(&cfg).unwrap();
        let n = report.raster("N-valid").unwrap();
        assert!(n.get(0, 0).unwrap().is_nan());
        assert_relative_eq!(n.get(2, 4).unwrap(), 9.0);
    }

    #[test]
    fn test_table_output_for_points() {
        let grid = two_halves();
        let cfg = AnalysisConfig {
            positions: Positions::Points(vec![
                AnalysisPoint::Pixel { row: 2, col: 2 },
                AnalysisPoint::Pixel { row: 40, col: 40 },
            ]),
            outputs: ScanOutputs { raster: false, table: true },
            ..config(&["NC_"])
        };
        let report = WindowScanner::new(&grid).run(&cfg).unwrap();
        let table = report.table.unwrap();
        assert_eq!(table.columns(), ["row", "col", "X", "Y", "NC_1-1", "NC_1-2", "NC_2-2"]);
        assert_eq!(table.len(), 2);
        assert_relative_eq!(table.rows()[0][5], 3.0);
        assert!(table.rows()[1][4].is_nan());
        assert!(report.rasters.is_empty());
    }

    #[test]
    fn test_friction_must_match_grid() {
        let grid = two_halves();
        let friction = Raster::filled(3, 3, 1.0);
        assert!(matches!(
            WindowScanner::new(&grid).with_friction(&friction),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mean_distance_metric() {
        let grid = two_halves();
        let report = WindowScanner::new(&grid).run(&config(&["MD_2"])).unwrap();
        let md = report.raster("MD_2").unwrap();
        // window on column 0 spans columns 0..=1, at distances 3 and 2
        assert_relative_eq!(md.get(2, 0).unwrap(), 2.5);
        assert_relative_eq!(md.get(2, 4).unwrap(), 0.0);
    }
}
