//! North-up georeferencing for rasters

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing the geometry of two grids
const GRID_TOLERANCE: f64 = 1e-6;

/// Georeferencing of a north-up raster grid.
///
/// Converts between pixel coordinates (col, row) and map coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width
/// y = origin_y + row * pixel_height
/// ```
///
/// `origin` is the upper-left corner and `pixel_height` is negative, so the
/// lower-left corner used by ASCII grids is `(origin_x, origin_y + rows * pixel_height)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, negative for north-up)
    pub pixel_height: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform from its upper-left corner
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// Create a transform from the lower-left corner of a grid with square cells
    pub fn from_lower_left(x_min: f64, y_min: f64, cell_size: f64, rows: usize) -> Self {
        Self::new(x_min, y_min + rows as f64 * cell_size, cell_size, -cell_size)
    }

    /// Map coordinates of the center of pixel (col, row)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + (col as f64 + 0.5) * self.pixel_width;
        let y = self.origin_y + (row as f64 + 0.5) * self.pixel_height;
        (x, y)
    }

    /// Map coordinates of the top-left corner of pixel (col, row)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let x = self.origin_x + col as f64 * self.pixel_width;
        let y = self.origin_y + row as f64 * self.pixel_height;
        (x, y)
    }

    /// Fractional pixel coordinates (col, row) of a map coordinate
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        if self.pixel_width.abs() < 1e-12 || self.pixel_height.abs() < 1e-12 {
            return (f64::NAN, f64::NAN);
        }
        (
            (x - self.origin_x) / self.pixel_width,
            (y - self.origin_y) / self.pixel_height,
        )
    }

    /// Cell size (square pixels)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// X coordinate of the left edge
    pub fn x_min(&self) -> f64 {
        self.origin_x
    }

    /// Y coordinate of the bottom edge of a grid with `rows` rows
    pub fn y_min(&self, rows: usize) -> f64 {
        self.origin_y + rows as f64 * self.pixel_height
    }

    /// Whether this is a north-up transform with square cells
    pub fn is_north_up(&self) -> bool {
        self.pixel_height < 0.0
            && self.pixel_width > 0.0
            && (self.pixel_width + self.pixel_height).abs() < GRID_TOLERANCE
    }

    /// Same cell size and origin as `other`
    pub fn same_grid(&self, other: &GeoTransform) -> bool {
        (self.origin_x - other.origin_x).abs() < GRID_TOLERANCE
            && (self.origin_y - other.origin_y).abs() < GRID_TOLERANCE
            && (self.pixel_width - other.pixel_width).abs() < GRID_TOLERANCE
            && (self.pixel_height - other.pixel_height).abs() < GRID_TOLERANCE
    }

    /// Transform of a grid whose cells aggregate `factor` x `factor` cells of this one
    pub fn coarsened(&self, factor: usize) -> Self {
        let f = factor as f64;
        Self::new(self.origin_x, self.origin_y, self.pixel_width * f, self.pixel_height * f)
    }

    /// Bounding box (min_x, min_y, max_x, max_y) for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(width, height);
        (x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_lower_left() {
        let gt = GeoTransform::from_lower_left(500.0, 1000.0, 25.0, 4);
        assert_relative_eq!(gt.origin_y, 1100.0);
        assert_relative_eq!(gt.y_min(4), 1000.0);
        assert!(gt.is_north_up());
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_coarsened() {
        let gt = GeoTransform::new(0.0, 10.0, 2.0, -2.0);
        let c = gt.coarsened(3);
        assert_relative_eq!(c.cell_size(), 6.0);
        assert!(c.same_grid(&GeoTransform::new(0.0, 10.0, 6.0, -6.0)));
    }
}
