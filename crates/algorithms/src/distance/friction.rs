//! Friction-weighted distance transform
//!
//! Accumulated traversal cost from one or more source cells, computed with
//! a multi-source Dijkstra on the 8-connected grid. The cost of a step is the
//! average friction of the two cells times the step length (cell size for
//! cardinal steps, cell size × √2 for diagonals), so distances come out in
//! map units weighted by friction. Without a friction raster every cell costs 1.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use landgrid_core::raster::{Raster, RasterElement};
use landgrid_core::{Error, Result};

/// Rectangular part of the grid a transform is restricted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub row0: usize,
    pub col0: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Extent {
    /// The whole grid
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            row0: 0,
            col0: 0,
            rows,
            cols,
        }
    }

    /// Square of `radius` cells around `center`, clipped to the grid
    pub fn around(center: (usize, usize), radius: usize, grid_rows: usize, grid_cols: usize) -> Self {
        let row0 = center.0.saturating_sub(radius);
        let col0 = center.1.saturating_sub(radius);
        let row1 = (center.0 + radius + 1).min(grid_rows);
        let col1 = (center.1 + radius + 1).min(grid_cols);
        Self {
            row0,
            col0,
            rows: row1.saturating_sub(row0),
            cols: col1.saturating_sub(col0),
        }
    }

    /// Part of this extent that lies on a `grid_rows` x `grid_cols` grid
    pub fn clipped_to(&self, grid_rows: usize, grid_cols: usize) -> Self {
        let row0 = self.row0.min(grid_rows);
        let col0 = self.col0.min(grid_cols);
        Self {
            row0,
            col0,
            rows: self.rows.min(grid_rows - row0),
            cols: self.cols.min(grid_cols - col0),
        }
    }

    /// Local buffer index of a global cell
    pub fn index(&self, row: usize, col: usize) -> Option<usize> {
        if row >= self.row0 && col >= self.col0 && row < self.row0 + self.rows && col < self.col0 + self.cols {
            Some((row - self.row0) * self.cols + (col - self.col0))
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulated distances over an extent; unreachable cells are `INFINITY`
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceField {
    extent: Extent,
    values: Vec<f64>,
}

impl DistanceField {
    pub(crate) fn new(extent: Extent, values: Vec<f64>) -> Self {
        Self { extent, values }
    }

    pub fn extent(&self) -> &Extent {
        &self.extent
    }

    /// Distance at a global cell; `INFINITY` outside the extent
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.extent
            .index(row, col)
            .map_or(f64::INFINITY, |i| self.values[i])
    }

    /// Distance at a signed global position; `INFINITY` off-grid
    pub fn get_signed(&self, row: isize, col: isize) -> f64 {
        if row < 0 || col < 0 {
            return f64::INFINITY;
        }
        self.get(row as usize, col as usize)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Cells inside the extent that no source reaches
    pub fn unreachable_count(&self) -> usize {
        self.values.iter().filter(|d| d.is_infinite()).count()
    }

    /// Full-grid raster with the template's georeferencing; unreachable cells are NaN
    pub fn to_raster<T: RasterElement>(&self, template: &Raster<T>) -> Result<Raster<f64>> {
        let (rows, cols) = template.shape();
        let mut data = vec![f64::NAN; rows * cols];
        for r in 0..self.extent.rows {
            for c in 0..self.extent.cols {
                let d = self.values[r * self.extent.cols + c];
                let (gr, gc) = (self.extent.row0 + r, self.extent.col0 + c);
                if d.is_finite() && gr < rows && gc < cols {
                    data[gr * cols + gc] = d;
                }
            }
        }
        let mut output = template.with_same_meta::<f64>(rows, cols);
        output.set_nodata(Some(f64::NAN));
        output.replace_data(data)?;
        Ok(output)
    }
}

/// State in the priority queue (min-heap via reversed ordering).
#[derive(Debug, Clone, PartialEq)]
struct State {
    cost: f64,
    row: usize,
    col: usize,
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed on cost, then row-major so equal costs pop deterministically
        other
            .cost
            .partial_cmp(&self.cost)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.row.cmp(&self.row))
            .then_with(|| other.col.cmp(&self.col))
    }
}

/// 8-connected neighbor offsets with their step length in cells.
const NEIGHBORS: [(isize, isize, f64); 8] = [
    (-1, -1, std::f64::consts::SQRT_2),
    (-1,  0, 1.0),
    (-1,  1, std::f64::consts::SQRT_2),
    ( 0, -1, 1.0),
    ( 0,  1, 1.0),
    ( 1, -1, std::f64::consts::SQRT_2),
    ( 1,  0, 1.0),
    ( 1,  1, std::f64::consts::SQRT_2),
];

/// Per-cell traversal cost over a grid.
///
/// Nodata and negative friction cells are impassable barriers.
#[derive(Debug, Clone, Copy)]
pub struct FrictionSurface<'a> {
    friction: Option<&'a Raster<f64>>,
    rows: usize,
    cols: usize,
    cell_size: f64,
    min_cost: f64,
}

impl<'a> FrictionSurface<'a> {
    /// Uniform cost 1 over a `rows` x `cols` grid
    pub fn uniform(rows: usize, cols: usize, cell_size: f64) -> Self {
        Self {
            friction: None,
            rows,
            cols,
            cell_size,
            min_cost: 1.0,
        }
    }

    /// Surface for `grid`, using `friction` when given.
    ///
    /// Fails with `DimensionMismatch` if the friction raster does not share
    /// the grid's geometry.
    pub fn for_grid<T: RasterElement>(grid: &Raster<T>, friction: Option<&'a Raster<f64>>) -> Result<Self> {
        let (rows, cols) = grid.shape();
        let cell_size = grid.cell_size();
        let Some(friction) = friction else {
            return Ok(Self::uniform(rows, cols, cell_size));
        };
        grid.ensure_same_grid(friction, "friction raster")?;

        let min_cost = friction
            .data()
            .iter()
            .filter(|v| !friction.is_nodata(**v) && **v >= 0.0)
            .fold(f64::INFINITY, |acc, v| acc.min(*v));

        Ok(Self {
            friction: Some(friction),
            rows,
            cols,
            cell_size,
            min_cost,
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Whether a friction raster is in use
    pub fn has_friction(&self) -> bool {
        self.friction.is_some()
    }

    /// Traversal cost of a cell, `None` if impassable
    #[inline]
    fn cost(&self, row: usize, col: usize) -> Option<f64> {
        match self.friction {
            None => Some(1.0),
            Some(f) => {
                let v = unsafe { f.get_unchecked(row, col) };
                if f.is_nodata(v) || v < 0.0 { None } else { Some(v) }
            }
        }
    }

    /// Smallest extent around `center` that can hold every cell within
    /// `max_distance` of it.
    pub fn reach_extent(&self, center: (usize, usize), max_distance: f64) -> Extent {
        let step = self.cell_size * self.min_cost;
        if step.is_nan() || step <= 0.0 || !max_distance.is_finite() {
            return Extent::full(self.rows, self.cols);
        }
        let radius = (max_distance / step).ceil() as usize + 1;
        Extent::around(center, radius, self.rows, self.cols)
    }

    /// Distance from the nearest source over the whole grid
    pub fn transform(&self, sources: &[(usize, usize)], max_distance: Option<f64>) -> DistanceField {
        self.transform_within(sources, Extent::full(self.rows, self.cols), max_distance)
    }

    /// Distance from the nearest source, restricted to `extent`.
    ///
    /// Cells farther than `max_distance` are left unreachable and never
    /// expanded. Sources outside the extent are ignored, and the extent is
    /// clipped to the grid.
    pub fn transform_within(
        &self,
        sources: &[(usize, usize)],
        extent: Extent,
        max_distance: Option<f64>,
    ) -> DistanceField {
        // every index below stays on the grid, which the unchecked reads rely on
        let extent = extent.clipped_to(self.rows, self.cols);
        let cutoff = max_distance.unwrap_or(f64::INFINITY);
        let mut dist = vec![f64::INFINITY; extent.len()];
        let mut heap = BinaryHeap::new();

        for &(r, c) in sources {
            if let Some(i) = extent.index(r, c) {
                dist[i] = 0.0;
                heap.push(State { cost: 0.0, row: r, col: c });
            }
        }

        while let Some(State { cost, row, col }) = heap.pop() {
            let Some(here) = extent.index(row, col) else {
                continue;
            };
            if cost > dist[here] {
                continue;
            }

            let cost_here = self.cost(row, col);

            for &(dr, dc, step) in &NEIGHBORS {
                let nr = row as isize + dr;
                let nc = col as isize + dc;
                if nr < 0 || nc < 0 {
                    continue;
                }
                let (nr, nc) = (nr as usize, nc as usize);
                let Some(next) = extent.index(nr, nc) else {
                    continue;
                };
                let Some(cost_next) = self.cost(nr, nc) else {
                    continue; // impassable
                };

                // an impassable source contributes only its neighbour's cost
                let avg = match cost_here {
                    Some(h) => (h + cost_next) / 2.0,
                    None => cost_next,
                };
                let new_cost = cost + avg * step * self.cell_size;

                if new_cost <= cutoff && new_cost < dist[next] {
                    dist[next] = new_cost;
                    heap.push(State { cost: new_cost, row: nr, col: nc });
                }
            }
        }

        DistanceField::new(extent, dist)
    }
}

/// Parameters for a friction distance run
#[derive(Debug, Clone, Default)]
pub struct FrictionDistanceParams {
    /// Source cells as (row, col) pairs
    pub sources: Vec<(usize, usize)>,
    /// Optional cutoff, in map units
    pub max_distance: Option<f64>,
}

/// Friction distance from source cells over `grid`'s geometry.
///
/// Returns a raster of accumulated cost with NaN for unreachable cells.
pub fn friction_distance<T: RasterElement>(
    grid: &Raster<T>,
    friction: Option<&Raster<f64>>,
    params: FrictionDistanceParams,
) -> Result<Raster<f64>> {
    if params.sources.is_empty() {
        return Err(Error::Algorithm("No source cells given for friction distance".into()));
    }
    let surface = FrictionSurface::for_grid(grid, friction)?;
    surface
        .transform(&params.sources, params.max_distance)
        .to_raster(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use landgrid_core::GeoTransform;

    fn uniform_grid(rows: usize, cols: usize, cell: f64) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, 1.0);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * cell, cell, -cell));
        r
    }

    #[test]
    fn test_uniform_matches_euclidean_on_axes_and_diagonals() {
        let grid = uniform_grid(10, 10, 1.0);
        let field = FrictionSurface::for_grid(&grid, None).unwrap().transform(&[(0, 0)], None);

        assert_relative_eq!(field.get(0, 0), 0.0);
        assert_relative_eq!(field.get(0, 7), 7.0, epsilon = 1e-10);
        assert_relative_eq!(field.get(5, 0), 5.0, epsilon = 1e-10);
        assert_relative_eq!(field.get(6, 6), 6.0 * std::f64::consts::SQRT_2, epsilon = 1e-10);
    }

    #[test]
    fn test_cell_size_scales_distances() {
        let grid = uniform_grid(5, 5, 25.0);
        let field = FrictionSurface::for_grid(&grid, None).unwrap().transform(&[(2, 2)], None);
        assert_relative_eq!(field.get(2, 4), 50.0, epsilon = 1e-10);
    }

    #[test]
    fn test_friction_average_cost() {
        let grid = uniform_grid(1, 3, 1.0);
        let mut friction = grid.like(1.0);
        friction.set(0, 1, 3.0).unwrap();
        friction.set(0, 2, 5.0).unwrap();

        let field = FrictionSurface::for_grid(&grid, Some(&friction))
            .unwrap()
            .transform(&[(0, 0)], None);
        assert_relative_eq!(field.get(0, 1), 2.0, epsilon = 1e-10);
        assert_relative_eq!(field.get(0, 2), 6.0, epsilon = 1e-10);
    }

    #[test]
    fn test_impassable_source_pays_neighbour_cost() {
        let grid = uniform_grid(2, 2, 1.0);
        let mut friction = grid.like(4.0);
        friction.set_nodata(Some(-9999.0));
        friction.set(0, 0, -9999.0).unwrap();
        friction.set(0, 1, 3.0).unwrap();

        let field = FrictionSurface::for_grid(&grid, Some(&friction))
            .unwrap()
            .transform(&[(0, 0)], None);
        assert_relative_eq!(field.get(0, 1), 3.0, epsilon = 1e-10);
        assert_relative_eq!(field.get(1, 1), 4.0 * std::f64::consts::SQRT_2, epsilon = 1e-10);
        assert_relative_eq!(field.get(1, 0), 4.0, epsilon = 1e-10);
    }

    #[test]
    fn test_barrier_is_unreachable() {
        let grid = uniform_grid(5, 5, 1.0);
        let mut friction = grid.like(1.0);
        friction.set_nodata(Some(-9999.0));
        for row in 0..5 {
            friction.set(row, 2, -9999.0).unwrap();
        }

        let field = FrictionSurface::for_grid(&grid, Some(&friction))
            .unwrap()
            .transform(&[(2, 0)], None);
        assert!(field.get(2, 4).is_infinite());
        assert_eq!(field.unreachable_count(), 15);

        let raster = field.to_raster(&grid).unwrap();
        assert!(raster.get(2, 4).unwrap().is_nan());
    }

    #[test]
    fn test_cutoff_bounds_propagation() {
        let grid = uniform_grid(10, 10, 1.0);
        let surface = FrictionSurface::for_grid(&grid, None).unwrap();
        let field = surface.transform(&[(0, 0)], Some(3.0));
        assert_relative_eq!(field.get(0, 3), 3.0, epsilon = 1e-10);
        assert!(field.get(0, 4).is_infinite());

        let extent = surface.reach_extent((5, 5), 2.0);
        assert_eq!(extent, Extent::around((5, 5), 3, 10, 10));
        let local = surface.transform_within(&[(5, 5)], extent, Some(2.0));
        assert_relative_eq!(local.get(5, 7), 2.0, epsilon = 1e-10);
        assert!(local.get(0, 0).is_infinite());
    }

    #[test]
    fn test_oversized_extent_is_clipped() {
        let grid = uniform_grid(2, 2, 1.0);
        let friction = grid.like(2.0);
        let surface = FrictionSurface::for_grid(&grid, Some(&friction)).unwrap();
        let extent = Extent {
            row0: 0,
            col0: 0,
            rows: 200,
            cols: 200,
        };
        let field = surface.transform_within(&[(0, 0), (150, 150)], extent, None);
        assert_eq!(*field.extent(), Extent::full(2, 2));
        assert_relative_eq!(field.get(0, 1), 2.0, epsilon = 1e-10);
        assert_relative_eq!(field.get(1, 1), 2.0 * std::f64::consts::SQRT_2, epsilon = 1e-10);
        assert!(field.get(150, 150).is_infinite());

        let outside = Extent {
            row0: 5,
            col0: 1,
            rows: 3,
            cols: 3,
        };
        assert!(surface.transform_within(&[(0, 0)], outside, None).values().is_empty());
    }

    #[test]
    fn test_friction_dimension_mismatch() {
        let grid = uniform_grid(5, 5, 1.0);
        let friction = uniform_grid(4, 5, 1.0);
        assert!(matches!(
            FrictionSurface::for_grid(&grid, Some(&friction)),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_no_sources() {
        let grid = uniform_grid(3, 3, 1.0);
        assert!(friction_distance(&grid, None, FrictionDistanceParams::default()).is_err());
    }
}
