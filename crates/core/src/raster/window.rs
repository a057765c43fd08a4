//! Analysis window shapes
//!
//! A [`Window`] is the set of cell offsets around a centre position that
//! belong to one metric evaluation. Sizes are counted in cells and must be
//! odd so that a unique centre exists.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Geometric kind of an analysis window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowShape {
    /// All offsets in `[-size/2, size/2]^2`
    Square,
    /// Offsets within Euclidean radius `size/2`, boundary included
    Circle,
    /// Annulus between the circle of `inner_size` and the outer circle
    Ring { inner_size: usize },
    /// Explicit membership mask
    Custom(WindowMask),
    /// Cells whose friction distance from the centre is within `size/2` cells.
    ///
    /// Membership depends on the friction grid, so the geometric offsets are
    /// the enclosing square and the scanner prunes them per position.
    Functional,
}

impl WindowShape {
    /// Textual identifier used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            WindowShape::Square => "SQUARE",
            WindowShape::Circle => "CIRCLE",
            WindowShape::Ring { .. } => "RING",
            WindowShape::Custom(_) => "CUSTOM",
            WindowShape::Functional => "FUNCTIONAL",
        }
    }
}

impl Default for WindowShape {
    fn default() -> Self {
        WindowShape::Square
    }
}

impl fmt::Display for WindowShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowShape::Ring { inner_size } => write!(f, "RING:{inner_size}"),
            WindowShape::Custom(mask) => write!(f, "CUSTOM:{mask}"),
            _ => f.write_str(self.name()),
        }
    }
}

/// Parses `SQUARE`, `CIRCLE`, `FUNCTIONAL`, `RING:<inner>` and
/// `CUSTOM:<rows>` where rows are `0`/`1` strings separated by `/`
/// (e.g. `CUSTOM:010/111/010`).
impl FromStr for WindowShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (kind, arg) = match s.split_once(':') {
            Some((k, a)) => (k.trim(), Some(a.trim())),
            None => (s, None),
        };
        match (kind.to_ascii_uppercase().as_str(), arg) {
            ("SQUARE", None) => Ok(WindowShape::Square),
            ("CIRCLE", None) => Ok(WindowShape::Circle),
            ("FUNCTIONAL", None) => Ok(WindowShape::Functional),
            ("RING", Some(a)) => {
                let inner_size = a
                    .parse::<usize>()
                    .map_err(|_| Error::config(format!("invalid ring inner size '{a}'")))?;
                Ok(WindowShape::Ring { inner_size })
            }
            ("CUSTOM", Some(a)) => Ok(WindowShape::Custom(a.parse()?)),
            _ => Err(Error::config(format!("unknown window shape '{s}'"))),
        }
    }
}

/// Square boolean mask for custom windows, row-major
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindowMask")]
pub struct WindowMask {
    size: usize,
    cells: Vec<bool>,
}

#[derive(Deserialize)]
struct RawWindowMask {
    size: usize,
    cells: Vec<bool>,
}

impl TryFrom<RawWindowMask> for WindowMask {
    type Error = Error;

    fn try_from(raw: RawWindowMask) -> Result<Self> {
        WindowMask::new(raw.size, raw.cells)
    }
}

impl WindowMask {
    /// Build a mask from row-major cells; the mask must be square with odd side
    pub fn new(size: usize, cells: Vec<bool>) -> Result<Self> {
        if size % 2 == 0 {
            return Err(Error::InvalidWindowSize { size });
        }
        if cells.len() != size * size {
            return Err(Error::DimensionMismatch {
                context: "custom window mask".into(),
                expected: (size, size),
                actual: (cells.len(), 1),
            });
        }
        Ok(Self { size, cells })
    }

    /// Side length of the mask
    pub fn size(&self) -> usize {
        self.size
    }

    fn contains(&self, dr: isize, dc: isize) -> bool {
        let r = (self.size / 2) as isize;
        if dr.abs() > r || dc.abs() > r {
            return false;
        }
        let idx = (dr + r) as usize * self.size + (dc + r) as usize;
        self.cells.get(idx).copied().unwrap_or(false)
    }
}

impl FromStr for WindowMask {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rows: Vec<&str> = s.split('/').map(str::trim).collect();
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for row in &rows {
            if row.chars().count() != size {
                return Err(Error::config(format!(
                    "custom window row '{row}' does not have {size} cells"
                )));
            }
            for c in row.chars() {
                match c {
                    '1' => cells.push(true),
                    '0' => cells.push(false),
                    other => {
                        return Err(Error::config(format!(
                            "invalid custom window cell '{other}'"
                        )));
                    }
                }
            }
        }
        WindowMask::new(size, cells)
    }
}

impl fmt::Display for WindowMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.cells.chunks(self.size).enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            for &c in row {
                f.write_str(if c { "1" } else { "0" })?;
            }
        }
        Ok(())
    }
}

/// One member of a window, relative to the centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowOffset {
    pub dr: isize,
    pub dc: isize,
    /// Euclidean distance from the centre, in cells
    pub distance: f64,
}

/// A validated window: a shape together with its odd size
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    shape: WindowShape,
    size: usize,
    offsets: Vec<WindowOffset>,
}

impl Window {
    /// Validate `size` for `shape` and precompute the offsets.
    ///
    /// Even sizes fail with [`Error::InvalidWindowSize`]. Custom masks carry
    /// their own size, which must equal `size`.
    pub fn new(shape: WindowShape, size: usize) -> Result<Self> {
        if size % 2 == 0 {
            return Err(Error::InvalidWindowSize { size });
        }
        match &shape {
            WindowShape::Ring { inner_size } if *inner_size >= size => {
                return Err(Error::config(format!(
                    "ring inner size {inner_size} must be smaller than window size {size}"
                )));
            }
            WindowShape::Custom(mask) if mask.size() != size => {
                return Err(Error::config(format!(
                    "custom mask of size {} used with window size {size}",
                    mask.size()
                )));
            }
            WindowShape::Custom(mask) if mask.cells.len() != size * size => {
                return Err(Error::config(format!(
                    "custom mask holds {} cells, expected {}",
                    mask.cells.len(),
                    size * size
                )));
            }
            _ => {}
        }

        let r = (size / 2) as isize;
        let mut offsets = Vec::with_capacity(size * size);
        for dr in -r..=r {
            for dc in -r..=r {
                if Self::shape_contains(&shape, size, dr, dc) {
                    let distance = ((dr * dr + dc * dc) as f64).sqrt();
                    offsets.push(WindowOffset { dr, dc, distance });
                }
            }
        }

        Ok(Self {
            shape,
            size,
            offsets,
        })
    }

    fn shape_contains(shape: &WindowShape, size: usize, dr: isize, dc: isize) -> bool {
        let r = (size / 2) as isize;
        if dr.abs() > r || dc.abs() > r {
            return false;
        }
        let d2 = dr * dr + dc * dc;
        match shape {
            WindowShape::Square | WindowShape::Functional => true,
            WindowShape::Circle => d2 <= r * r,
            WindowShape::Ring { inner_size } => {
                let inner = (*inner_size / 2) as isize;
                d2 <= r * r && d2 > inner * inner
            }
            WindowShape::Custom(mask) => mask.contains(dr, dc),
        }
    }

    /// Window shape
    pub fn shape(&self) -> &WindowShape {
        &self.shape
    }

    /// Window size (odd side length in cells)
    pub fn size(&self) -> usize {
        self.size
    }

    /// Half the window size, in cells
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    /// Whether a relative position belongs to the window
    pub fn contains(&self, dr: isize, dc: isize) -> bool {
        Self::shape_contains(&self.shape, self.size, dr, dc)
    }

    /// Member offsets in row-major order
    pub fn offsets(&self) -> &[WindowOffset] {
        &self.offsets
    }

    /// Number of member cells
    pub fn cell_count(&self) -> usize {
        self.offsets.len()
    }

    /// Whether membership is decided by friction distance
    pub fn is_functional(&self) -> bool {
        matches!(self.shape, WindowShape::Functional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_offsets() {
        let w = Window::new(WindowShape::Square, 3).unwrap();
        assert_eq!(w.cell_count(), 9);
        assert_eq!(w.offsets()[0].dr, -1);
        assert_eq!(w.offsets()[0].dc, -1);
        assert_eq!(w.offsets()[4].dr, 0);
        assert_eq!(w.offsets()[4].dc, 0);
    }

    #[test]
    fn test_circle_includes_boundary() {
        let w = Window::new(WindowShape::Circle, 5).unwrap();
        // radius 2: (0,±2) and (±2,0) on the boundary are members, corners are not
        assert!(w.contains(0, 2));
        assert!(w.contains(-2, 0));
        assert!(!w.contains(2, 2));
        assert!(!w.contains(1, 2));
        assert_eq!(w.cell_count(), 13);
    }

    #[test]
    fn test_even_size_rejected() {
        assert!(matches!(
            Window::new(WindowShape::Square, 4),
            Err(Error::InvalidWindowSize { size: 4 })
        ));
    }

    #[test]
    fn test_ring() {
        let w = Window::new(WindowShape::Ring { inner_size: 3 }, 5).unwrap();
        assert!(!w.contains(0, 0));
        assert!(!w.contains(0, 1));
        assert!(w.contains(1, 1));
        assert!(w.contains(0, 2));
        assert!(Window::new(WindowShape::Ring { inner_size: 5 }, 5).is_err());
    }

    #[test]
    fn test_custom_mask() {
        let shape: WindowShape = "CUSTOM:010/111/010".parse().unwrap();
        let w = Window::new(shape, 3).unwrap();
        assert_eq!(w.cell_count(), 5);
        assert!(!w.contains(1, 1));
        assert!(Window::new("CUSTOM:1".parse().unwrap(), 3).is_err());
    }

    #[test]
    fn test_shape_parsing() {
        assert_eq!("circle".parse::<WindowShape>().unwrap(), WindowShape::Circle);
        assert_eq!(
            "RING:3".parse::<WindowShape>().unwrap(),
            WindowShape::Ring { inner_size: 3 }
        );
        assert!("hexagon".parse::<WindowShape>().is_err());
        let mask: WindowMask = "101/010/101".parse().unwrap();
        assert_eq!(mask.to_string(), "101/010/101");
        assert_eq!(WindowShape::Custom(mask).to_string(), "CUSTOM:101/010/101");
        assert_eq!(WindowShape::Ring { inner_size: 3 }.to_string(), "RING:3");
    }
}
