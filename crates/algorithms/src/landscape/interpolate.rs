//! Nearest-evaluated-position fill for skipped scan positions

use crate::maybe_rayon::*;

/// Source index of every target cell, by nearest evaluated position.
///
/// `sources[i]` holds the scan index of the position evaluated at cell `i`
/// (row-major), `targets[i]` marks cells to fill. Distance is Euclidean in
/// cells; ties go to the lowest scan index. The search walks square rings
/// around the target and stops once no closer source can exist.
pub fn nearest_sources(
    sources: &[Option<usize>],
    targets: &[bool],
    rows: usize,
    cols: usize,
) -> Vec<Option<usize>> {
    if !sources.iter().any(Option::is_some) {
        return vec![None; targets.len()];
    }
    let max_ring = rows.max(cols) as isize;

    (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![None; cols];
            for col in 0..cols {
                if !targets[row * cols + col] {
                    continue;
                }
                let mut best: Option<(isize, usize)> = None;
                for k in 0..=max_ring {
                    if let Some((d2, _)) = best
                        && k * k > d2
                    {
                        break;
                    }
                    for (r, c) in ring(row as isize, col as isize, k) {
                        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
                            continue;
                        }
                        let Some(scan) = sources[r as usize * cols + c as usize] else { continue };
                        let d2 = (r - row as isize).pow(2) + (c - col as isize).pow(2);
                        let better = match best {
                            None => true,
                            Some((bd, bs)) => d2 < bd || (d2 == bd && scan < bs),
                        };
                        if better {
                            best = Some((d2, scan));
                        }
                    }
                }
                row_data[col] = best.map(|(_, scan)| scan);
            }
            row_data
        })
        .collect()
}

/// Cells at Chebyshev distance exactly `k` from (row, col)
fn ring(row: isize, col: isize, k: isize) -> impl Iterator<Item = (isize, isize)> {
    (-k..=k).flat_map(move |d| {
        let top_bottom = [(row - k, col + d), (row + k, col + d)];
        // left and right columns without the corners
        let sides = if d.abs() < k {
            vec![(row + d, col - k), (row + d, col + k)]
        } else {
            Vec::new()
        };
        let n = if k == 0 { 1 } else { 2 };
        top_bottom.into_iter().take(n).chain(sides)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_sizes() {
        assert_eq!(ring(5, 5, 0).count(), 1);
        assert_eq!(ring(5, 5, 1).count(), 8);
        assert_eq!(ring(5, 5, 2).count(), 16);
    }

    #[test]
    fn test_fill_takes_nearest() {
        // sources at (0,0) scan 0 and (0,4) scan 1 on a 1x5 grid
        let mut sources = vec![None; 5];
        sources[0] = Some(0);
        sources[4] = Some(1);
        let targets = vec![false, true, true, true, false];
        let filled = nearest_sources(&sources, &targets, 1, 5);
        assert_eq!(filled, vec![None, Some(0), Some(0), Some(1), None]);
    }

    #[test]
    fn test_no_sources() {
        let filled = nearest_sources(&[None, None], &[true, true], 1, 2);
        assert!(filled.iter().all(Option::is_none));
    }

    #[test]
    fn test_diagonal_beats_far_straight() {
        // 4x4, source at (1,1) scan 5 and (0,3) scan 0; target (0,0)
        let mut sources = vec![None; 16];
        sources[5] = Some(5);
        sources[3] = Some(0);
        let mut targets = vec![false; 16];
        targets[0] = true;
        let filled = nearest_sources(&sources, &targets, 4, 4);
        assert_eq!(filled[0], Some(5));
    }
}
