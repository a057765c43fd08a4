//! Exact Euclidean distance transform
//!
//! Felzenszwalb & Huttenlocher: the squared distance is computed with a 1D
//! lower-envelope-of-parabolas pass along every column, then along every
//! row. Linear in the number of cells.

use crate::maybe_rayon::*;
use crate::distance::friction::{DistanceField, Extent};

const INF: f64 = 1e20;

/// 1D squared distance transform of `f` into `out`
fn transform_1d(f: &[f64], out: &mut [f64], v: &mut [usize], z: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut k = 0usize;
    v[0] = 0;
    z[0] = -INF;
    z[1] = INF;

    for q in 1..n {
        loop {
            let p = v[k];
            let s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64)) / (2.0 * q as f64 - 2.0 * p as f64);
            if s <= z[k] && k > 0 {
                k -= 1;
                continue;
            }
            if s <= z[k] {
                // k == 0: the new parabola replaces the first one
                v[0] = q;
                z[0] = -INF;
                z[1] = INF;
                break;
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = INF;
            break;
        }
    }

    k = 0;
    for (q, o) in out.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let d = q as f64 - p as f64;
        *o = d * d + f[p];
    }
}

/// Euclidean distance, in map units, from every cell to the nearest source.
///
/// `is_source` is a row-major mask of `rows * cols` cells. Cells farther
/// than `max_distance` (or every cell when there is no source) are
/// `INFINITY`.
pub fn euclidean_distance(
    is_source: &[bool],
    rows: usize,
    cols: usize,
    cell_size: f64,
    max_distance: Option<f64>,
) -> DistanceField {
    let extent = Extent::full(rows, cols);
    if !is_source.iter().any(|s| *s) {
        return DistanceField::new(extent, vec![f64::INFINITY; rows * cols]);
    }

    // columns
    let columns: Vec<Vec<f64>> = (0..cols)
        .into_par_iter()
        .map(|c| {
            let f: Vec<f64> = (0..rows)
                .map(|r| if is_source[r * cols + c] { 0.0 } else { INF })
                .collect();
            let mut out = vec![0.0; rows];
            let mut v = vec![0usize; rows];
            let mut z = vec![0.0; rows + 1];
            transform_1d(&f, &mut out, &mut v, &mut z);
            out
        })
        .collect();

    // rows
    let cutoff = max_distance.unwrap_or(f64::INFINITY);
    let values: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|r| {
            let f: Vec<f64> = (0..cols).map(|c| columns[c][r]).collect();
            let mut out = vec![0.0; cols];
            let mut v = vec![0usize; cols];
            let mut z = vec![0.0; cols + 1];
            transform_1d(&f, &mut out, &mut v, &mut z);
            out.into_iter()
                .map(|d2| {
                    if d2 >= INF / 2.0 {
                        return f64::INFINITY;
                    }
                    let d = d2.sqrt() * cell_size;
                    if d <= cutoff { d } else { f64::INFINITY }
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    DistanceField::new(extent, values)
}
