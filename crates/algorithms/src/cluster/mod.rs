//! Cluster engine
//!
//! Groups cells holding the same target value. Two cells of a value are
//! linked when they are rook or queen neighbours, or when the Euclidean or
//! friction distance between their centres is at most the configured
//! maximum; clusters are the connected components of that relation
//! (single linkage).

mod union_find;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{debug, info};

use landgrid_core::io::Table;
use landgrid_core::raster::Raster;
use landgrid_core::{Algorithm, Error, Result};

use crate::class_of;
use crate::diagnostics::Diagnostics;
use crate::distance::friction::FrictionSurface;
use crate::maybe_rayon::*;
use union_find::UnionFind;

/// Linking criterion between two cells of the same value
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq,
    Serialize, Deserialize,
    Display, EnumString, EnumIter, IntoStaticStr, VariantNames,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ClusterType {
    /// 4-connectivity
    #[default]
    Rook,
    /// 8-connectivity
    Queen,
    /// Straight-line distance between cell centres
    #[strum(to_string = "euclidean", serialize = "distance", serialize = "euclidian distance")]
    Euclidean,
    /// Friction distance between cell centres
    #[strum(to_string = "functional", serialize = "functional distance")]
    Functional,
}

impl ClusterType {
    pub fn uses_distance(&self) -> bool {
        matches!(self, ClusterType::Euclidean | ClusterType::Functional)
    }
}

/// Parameters of a clustering run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Values whose cells are clustered
    pub values: Vec<i64>,
    pub cluster_type: ClusterType,
    /// Maximum linking distance in map units (distance types only)
    pub max_distance: Option<f64>,
}

/// Summary of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub id: i32,
    pub value: i64,
    /// Number of cells
    pub size: usize,
    /// Size × cell area, in squared map units
    pub area: f64,
    /// Mean map coordinates of the cell centres
    pub centroid: (f64, f64),
    pub row_min: usize,
    pub col_min: usize,
    pub row_max: usize,
    pub col_max: usize,
}

/// Cluster-id raster plus per-cluster summaries
#[derive(Debug, Clone)]
pub struct ClusterOutput {
    /// Cluster id per cell, 0 (nodata) outside every cluster
    pub raster: Raster<i32>,
    pub clusters: Vec<ClusterSummary>,
    pub diagnostics: Diagnostics,
}

impl ClusterOutput {
    /// One row per cluster
    pub fn table(&self) -> Result<Table> {
        let columns = ["id", "value", "size", "area", "X", "Y", "row_min", "col_min", "row_max", "col_max"];
        let mut table = Table::new(columns.iter().map(|s| s.to_string()).collect());
        for c in &self.clusters {
            table.push_row(vec![
                c.id as f64,
                c.value as f64,
                c.size as f64,
                c.area,
                c.centroid.0,
                c.centroid.1,
                c.row_min as f64,
                c.col_min as f64,
                c.row_max as f64,
                c.col_max as f64,
            ])?;
        }
        Ok(table)
    }
}

fn validate(grid: &Raster<f64>, friction: Option<&Raster<f64>>, config: &ClusterConfig) -> Result<Diagnostics> {
    if config.values.is_empty() {
        return Err(Error::config("clustering needs at least one value"));
    }
    let mut diagnostics = Diagnostics::new();
    if config.cluster_type.uses_distance() {
        match config.max_distance {
            Some(max) if max > 0.0 && max.is_finite() => {}
            other => {
                return Err(Error::config(format!(
                    "{} clustering needs a positive maximum distance, got {other:?}",
                    config.cluster_type
                )));
            }
        }
        if grid.crs().is_some_and(|c| c.is_geographic()) {
            return Err(Error::config("distance clustering requires a projected CRS"));
        }
    } else if config.max_distance.is_some() {
        diagnostics.warn_config(format!("maximum distance is ignored by {} clustering", config.cluster_type));
    }
    if friction.is_some() && config.cluster_type != ClusterType::Functional {
        diagnostics.warn_config(format!("friction raster is ignored by {} clustering", config.cluster_type));
    }
    Ok(diagnostics)
}

/// Forward neighbour offsets: each unordered pair of cells is visited once.
///
/// Distance offsets span at most `max_radius` cells, whatever the reach.
fn forward_offsets(cluster_type: ClusterType, reach: f64, max_radius: usize) -> Vec<(isize, isize)> {
    match cluster_type {
        ClusterType::Rook => vec![(0, 1), (1, 0)],
        ClusterType::Queen => vec![(0, 1), (1, -1), (1, 0), (1, 1)],
        ClusterType::Euclidean | ClusterType::Functional => {
            let radius = (reach.floor() as usize).min(max_radius) as isize;
            let mut out = Vec::new();
            for dr in 0..=radius {
                for dc in -radius..=radius {
                    let forward = dr > 0 || dc > 0;
                    if forward && within_reach(dr, dc, reach) {
                        out.push((dr, dc));
                    }
                }
            }
            out
        }
    }
}

#[inline]
fn within_reach(dr: isize, dc: isize, reach: f64) -> bool {
    ((dr * dr + dc * dc) as f64) <= reach * reach
}

/// Link every pair of same-valued target cells within `reach` cells
fn link_pairs(targets: &[Option<i64>], cols: usize, reach: f64, uf: &mut UnionFind) {
    let cells: Vec<usize> = (0..targets.len()).filter(|i| targets[*i].is_some()).collect();
    for (k, &i) in cells.iter().enumerate() {
        let (r, c) = ((i / cols) as isize, (i % cols) as isize);
        for &j in &cells[k + 1..] {
            if targets[j] != targets[i] {
                continue;
            }
            let (dr, dc) = ((j / cols) as isize - r, (j % cols) as isize - c);
            if within_reach(dr, dc, reach) {
                uf.union(i, j);
            }
        }
    }
}

fn link_offsets(targets: &[Option<i64>], rows: usize, cols: usize, offsets: &[(isize, isize)], uf: &mut UnionFind) {
    for r in 0..rows {
        for c in 0..cols {
            let Some(value) = targets[r * cols + c] else { continue };
            for &(dr, dc) in offsets {
                let (nr, nc) = (r as isize + dr, c as isize + dc);
                if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                    continue;
                }
                let j = nr as usize * cols + nc as usize;
                if targets[j] == Some(value) {
                    uf.union(r * cols + c, j);
                }
            }
        }
    }
}

/// Cluster the cells of `grid` holding one of `config.values`.
///
/// Ids start at 1 and follow the scan order of each cluster's first cell.
/// No matching cell is not an error: the output is empty.
pub fn cluster(grid: &Raster<f64>, friction: Option<&Raster<f64>>, config: &ClusterConfig) -> Result<ClusterOutput> {
    let mut diagnostics = validate(grid, friction, config)?;
    let surface = FrictionSurface::for_grid(grid, friction)?;

    let (rows, cols) = grid.shape();
    let targets: Vec<Option<i64>> = grid
        .data()
        .iter()
        .map(|v| {
            if grid.is_nodata(*v) {
                return None;
            }
            let class = class_of(*v);
            config.values.contains(&class).then_some(class)
        })
        .collect();
    let n_targets = targets.iter().filter(|t| t.is_some()).count();
    debug!(
        cluster_type = %config.cluster_type,
        values = ?config.values,
        cells = n_targets,
        "clustering"
    );

    let mut uf = UnionFind::new(rows * cols);
    if config.cluster_type == ClusterType::Functional {
        link_functional(&targets, rows, cols, &surface, config, &mut uf);
    } else {
        let reach = config.max_distance.unwrap_or(0.0) / grid.cell_size();
        let max_radius = rows.max(cols).saturating_sub(1);
        let offsets = forward_offsets(config.cluster_type, reach, max_radius);
        // a long reach over few cells is cheaper pair by pair
        if config.cluster_type == ClusterType::Euclidean && offsets.len() > n_targets {
            debug!(offsets = offsets.len(), cells = n_targets, "pairwise links");
            link_pairs(&targets, cols, reach, &mut uf);
        } else {
            link_offsets(&targets, rows, cols, &offsets, &mut uf);
        }
    }

    let mut raster = grid.with_same_meta::<i32>(rows, cols);
    raster.set_nodata(Some(0));
    let mut id_of_root: Vec<i32> = vec![0; rows * cols];
    let mut clusters: Vec<ClusterSummary> = Vec::new();
    let cell_area = grid.cell_size() * grid.cell_size();

    for r in 0..rows {
        for c in 0..cols {
            let i = r * cols + c;
            let Some(value) = targets[i] else { continue };
            let root = uf.find(i);
            if id_of_root[root] == 0 {
                clusters.push(ClusterSummary {
                    id: clusters.len() as i32 + 1,
                    value,
                    size: 0,
                    area: 0.0,
                    centroid: (0.0, 0.0),
                    row_min: r,
                    col_min: c,
                    row_max: r,
                    col_max: c,
                });
                id_of_root[root] = clusters.len() as i32;
            }
            let id = id_of_root[root];
            raster.set(r, c, id)?;

            let s = &mut clusters[id as usize - 1];
            let (x, y) = grid.pixel_to_geo(c, r);
            s.size += 1;
            s.centroid.0 += x;
            s.centroid.1 += y;
            s.col_min = s.col_min.min(c);
            s.row_max = s.row_max.max(r);
            s.col_max = s.col_max.max(c);
        }
    }
    for s in &mut clusters {
        s.centroid.0 /= s.size as f64;
        s.centroid.1 /= s.size as f64;
        s.area = s.size as f64 * cell_area;
    }

    if n_targets == 0 {
        diagnostics.warn_config(format!("no cell holds a value among {:?}", config.values));
    }
    diagnostics.log_summary("clustering");
    info!(clusters = clusters.len(), cells = n_targets, "clustering done");
    Ok(ClusterOutput {
        raster,
        clusters,
        diagnostics,
    })
}

/// Link cells within friction distance, one bounded transform per cell
fn link_functional(
    targets: &[Option<i64>],
    rows: usize,
    cols: usize,
    surface: &FrictionSurface<'_>,
    config: &ClusterConfig,
    uf: &mut UnionFind,
) {
    let max = config.max_distance.unwrap_or(0.0);
    let cells: Vec<usize> = (0..targets.len()).filter(|i| targets[*i].is_some()).collect();

    let links: Vec<Vec<usize>> = cells
        .par_iter()
        .map(|&i| {
            let (r, c) = (i / cols, i % cols);
            let extent = surface.reach_extent((r, c), max);
            let field = surface.transform_within(&[(r, c)], extent, Some(max));
            let mut out = Vec::new();
            for lr in extent.row0..extent.row0 + extent.rows {
                for lc in extent.col0..extent.col0 + extent.cols {
                    let j = lr * cols + lc;
                    if j > i && targets[j] == targets[i] && field.get(lr, lc) <= max {
                        out.push(j);
                    }
                }
            }
            out
        })
        .collect();

    for (&i, linked) in cells.iter().zip(&links) {
        for &j in linked {
            uf.union(i, j);
        }
    }
    debug!(rows, cells = cells.len(), "functional links");
}

/// Input of [`Clustering`]
#[derive(Debug, Clone)]
pub struct ClusterInput {
    pub grid: Raster<f64>,
    pub friction: Option<Raster<f64>>,
}

/// Cluster engine as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Clustering;

impl Algorithm for Clustering {
    type Input = ClusterInput;
    type Output = ClusterOutput;
    type Params = ClusterConfig;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Clustering"
    }

    fn description(&self) -> &'static str {
        "Clusters of cells holding target values, by adjacency or maximum distance"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        cluster(&input.grid, input.friction.as_ref(), &params)
    }
}
