//! Main Raster type

use std::collections::BTreeSet;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, RasterElement};
use ndarray::{Array2, ArrayView2};

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a dense row-major grid together
/// with its georeferencing and an optional no-data sentinel. Analyses never
/// mutate their input rasters; they build new output rasters with
/// [`Raster::with_same_meta`] or [`Raster::like`].
///
/// # Example
///
/// ```ignore
/// use landgrid_core::Raster;
///
/// let mut raster: Raster<f64> = Raster::new(100, 100);
/// raster.set(10, 20, 42.0)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Georeferencing
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self::from_array(Array2::from_elem((rows, cols), value))
    }

    /// Create a raster from row-major data.
    ///
    /// Fails with [`Error::DimensionMismatch`] when `data` does not hold
    /// exactly `rows * cols` values.
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::DimensionMismatch {
                context: "raster data length".into(),
                expected: (rows, cols),
                actual: (data.len(), 1),
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a zero-filled raster with the same georeferencing and a different value type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Create a raster with the same dimensions and metadata, filled with a value
    pub fn like(&self, fill_value: T) -> Self {
        Self {
            data: Array2::from_elem(self.data.dim(), fill_value),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: self.nodata,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether (row, col) lies inside the grid
    pub fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && col >= 0 && (row as usize) < self.rows() && (col as usize) < self.cols()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Valid value at a possibly out-of-grid position.
    ///
    /// Out-of-bounds positions and no-data cells both yield `None`, which is
    /// how window extraction treats cells falling outside the image.
    pub fn value_at(&self, row: isize, col: isize) -> Option<T> {
        if !self.in_bounds(row, col) {
            return None;
        }
        let v = unsafe { self.get_unchecked(row as usize, col as usize) };
        if self.is_nodata(v) { None } else { Some(v) }
    }

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    /// Replace the cell values, keeping the metadata
    pub fn replace_data(&mut self, data: Vec<T>) -> Result<()> {
        let (rows, cols) = self.shape();
        if data.len() != rows * cols {
            return Err(Error::DimensionMismatch {
                context: "replacement data length".into(),
                expected: (rows, cols),
                actual: (data.len(), 1),
            });
        }
        self.data = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;
        Ok(())
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.transform.bounds(self.cols(), self.rows())
    }

    /// Check that `other` shares this raster's dimensions, cell size and origin.
    ///
    /// Secondary grids (friction, entities) must match the primary grid
    /// exactly; resampling is the caller's job.
    pub fn ensure_same_grid<U: RasterElement>(&self, other: &Raster<U>, context: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(Error::DimensionMismatch {
                context: context.to_string(),
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        if !self.transform.same_grid(other.transform()) {
            return Err(Error::DimensionMismatch {
                context: format!("{context}: cell size or origin differs"),
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    // Coordinate conversion

    /// Convert pixel coordinates to map coordinates (cell center)
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Convert map coordinates to fractional pixel coordinates (col, row)
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    /// Cell (row, col) containing a map coordinate, as signed indices that
    /// may fall outside the grid
    pub fn geo_to_cell(&self, x: f64, y: f64) -> Option<(isize, isize)> {
        let (col, row) = self.geo_to_pixel(x, y);
        if col.is_finite() && row.is_finite() {
            Some((row.floor() as isize, col.floor() as isize))
        } else {
            None
        }
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Check if cell at (row, col) contains no-data
    pub fn is_nodata_at(&self, row: usize, col: usize) -> Result<bool> {
        let value = self.get(row, col)?;
        Ok(self.is_nodata(value))
    }

    /// Sorted set of integer classes present in the raster (values rounded)
    pub fn distinct_classes(&self) -> Vec<i64> {
        let classes: BTreeSet<i64> = self
            .data
            .iter()
            .filter(|v| !self.is_nodata(**v))
            .filter_map(|v| v.to_f64())
            .map(|v| v.round() as i64)
            .collect();
        classes.into_iter().collect()
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.is_none_or(|m| value < m) {
                min = Some(value);
            }
            if max.is_none_or(|m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_from_vec_dimension_mismatch() {
        let result = Raster::from_vec(vec![1.0f64; 5], 2, 3);
        assert!(matches!(result, Err(Error::DimensionMismatch { .. })));
    }

    #[test]
    fn test_value_at_out_of_bounds_is_nodata() {
        let mut raster: Raster<f64> = Raster::filled(3, 3, 1.0);
        raster.set_nodata(Some(-1.0));
        raster.set(1, 1, -1.0).unwrap();

        assert_eq!(raster.value_at(0, 0), Some(1.0));
        assert_eq!(raster.value_at(1, 1), None);
        assert_eq!(raster.value_at(-1, 0), None);
        assert_eq!(raster.value_at(0, 3), None);
    }

    #[test]
    fn test_ensure_same_grid() {
        let a: Raster<f64> = Raster::new(4, 4);
        let b: Raster<f64> = Raster::new(4, 5);
        let mut c: Raster<f64> = Raster::new(4, 4);
        c.set_transform(GeoTransform::new(0.0, 0.0, 2.0, -2.0));

        assert!(a.ensure_same_grid(&a.clone(), "same").is_ok());
        assert!(matches!(
            a.ensure_same_grid(&b, "friction"),
            Err(Error::DimensionMismatch { .. })
        ));
        assert!(a.ensure_same_grid(&c, "friction").is_err());
    }

    #[test]
    fn test_distinct_classes() {
        let mut raster = Raster::from_vec(vec![2.0, 1.0, 2.0, -1.0, 3.0, 1.0], 2, 3).unwrap();
        raster.set_nodata(Some(-1.0));
        assert_eq!(raster.distinct_classes(), vec![1, 2, 3]);
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(0.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 100);
    }
}
