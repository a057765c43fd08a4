//! Extraction of the cells a metric evaluation looks at
//!
//! A [`WindowSample`] is a small local grid copied out of the raster: each
//! cell knows whether it belongs to the window, its value (or `None` when
//! missing or off-grid) and its weight. Adjacency for couple and patch
//! metrics is taken inside this local grid only.

use landgrid_core::raster::{Raster, Window};

use crate::distance::friction::{Extent, FrictionSurface};
use crate::distance::function::{AnalyzeType, DistanceFunction};

/// How window cells are weighted
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighting {
    pub analyze_type: AnalyzeType,
    pub function: DistanceFunction,
}

impl Weighting {
    /// Every member weighs 1
    pub fn threshold() -> Self {
        Self {
            analyze_type: AnalyzeType::Threshold,
            function: DistanceFunction::default(),
        }
    }

    /// Weight of a member at `distance` cells from the centre
    #[inline]
    pub fn weight(&self, distance: f64, dmax: f64) -> f64 {
        match self.analyze_type {
            AnalyzeType::Threshold => 1.0,
            AnalyzeType::WeightedDistance => self.function.weight(distance, dmax),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct SampleCell {
    pub member: bool,
    pub value: Option<f64>,
    pub weight: f64,
}

const OUTSIDE: SampleCell = SampleCell {
    member: false,
    value: None,
    weight: 0.0,
};

/// Cells of one window (or zone) extracted from the grid
#[derive(Debug, Clone)]
pub struct WindowSample {
    /// Global (row, col) of local cell (0, 0)
    pub(crate) origin: (isize, isize),
    pub(crate) rows: usize,
    pub(crate) cols: usize,
    pub(crate) cells: Vec<SampleCell>,
    /// Local index of the centre cell, if the sample has one
    pub(crate) center: Option<usize>,
}

impl WindowSample {
    /// Extract the window centred on (row, col).
    ///
    /// Off-grid members count as missing values. For functional windows,
    /// `surface` decides membership: a cell belongs to the window when its
    /// friction distance from the centre is within the window radius
    /// (converted to map units), and that distance drives the weight.
    pub fn extract(
        grid: &Raster<f64>,
        center: (isize, isize),
        window: &Window,
        weighting: Weighting,
        surface: Option<&FrictionSurface<'_>>,
    ) -> Self {
        let size = window.size();
        let radius = window.radius() as isize;
        let dmax = window.radius() as f64;
        let origin = (center.0 - radius, center.1 - radius);
        let mut cells = vec![OUTSIDE; size * size];

        let local_field = match (window.is_functional(), surface) {
            (true, Some(surface)) if grid.in_bounds(center.0, center.1) => {
                let c = (center.0 as usize, center.1 as usize);
                let (rows, cols) = grid.shape();
                let extent = Extent::around(c, window.radius(), rows, cols);
                let cutoff = dmax * surface.cell_size();
                Some(surface.transform_within(&[c], extent, Some(cutoff)))
            }
            _ => None,
        };

        for off in window.offsets() {
            let (gr, gc) = (center.0 + off.dr, center.1 + off.dc);
            let distance = match (&local_field, window.is_functional()) {
                (Some(field), _) => {
                    let d = field.get_signed(gr, gc);
                    if d.is_infinite() {
                        continue;
                    }
                    d / grid.cell_size()
                }
                // a functional window with an off-grid centre has no member
                (None, true) => continue,
                (None, false) => off.distance,
            };
            let local = (off.dr + radius) as usize * size + (off.dc + radius) as usize;
            cells[local] = SampleCell {
                member: true,
                value: grid.value_at(gr, gc),
                weight: weighting.weight(distance, dmax),
            };
        }

        Self {
            origin,
            rows: size,
            cols: size,
            cells,
            center: Some((radius as usize) * size + radius as usize),
        }
    }

    /// Extract the cells of a rectangle for which `member(row, col)` holds.
    ///
    /// Used for tiles, whole maps and entities; every member weighs 1 and
    /// the sample has no centre.
    pub fn from_region<F>(grid: &Raster<f64>, extent: Extent, member: F) -> Self
    where
        F: Fn(usize, usize) -> bool,
    {
        let mut cells = Vec::with_capacity(extent.len());
        for r in extent.row0..extent.row0 + extent.rows {
            for c in extent.col0..extent.col0 + extent.cols {
                if member(r, c) {
                    cells.push(SampleCell {
                        member: true,
                        value: grid.value_at(r as isize, c as isize),
                        weight: 1.0,
                    });
                } else {
                    cells.push(OUTSIDE);
                }
            }
        }
        Self {
            origin: (extent.row0 as isize, extent.col0 as isize),
            rows: extent.rows,
            cols: extent.cols,
            cells,
            center: None,
        }
    }

    /// Number of member cells
    pub fn member_count(&self) -> usize {
        self.cells.iter().filter(|c| c.member).count()
    }

    /// Whether any member lies on the grid (valid or not)
    pub fn touches_grid(&self, grid_rows: usize, grid_cols: usize) -> bool {
        self.cells.iter().enumerate().any(|(i, c)| {
            let (r, col) = self.global(i);
            c.member && r >= 0 && col >= 0 && (r as usize) < grid_rows && (col as usize) < grid_cols
        })
    }

    /// Fraction of members holding no valid value; 1 for an empty sample
    pub fn missing_rate(&self) -> f64 {
        let members = self.member_count();
        if members == 0 {
            return 1.0;
        }
        let missing = self
            .cells
            .iter()
            .filter(|c| c.member && c.value.is_none())
            .count();
        missing as f64 / members as f64
    }

    /// Global (row, col) of a local index
    #[inline]
    pub(crate) fn global(&self, local: usize) -> (isize, isize) {
        (
            self.origin.0 + (local / self.cols) as isize,
            self.origin.1 + (local % self.cols) as isize,
        )
    }
}
