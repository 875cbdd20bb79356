//! Screen geometry and viewport sizes

use std::fmt;

/// Terminal grid size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

impl Geometry {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    /// Validate a host-supplied size.
    ///
    /// Both values must be finite and at least one cell once truncated, and
    /// must fit in a `u16`. Anything else yields `None`.
    pub fn from_dimensions(cols: f64, rows: f64) -> Option<Self> {
        Some(Self {
            cols: cell_count(cols)?,
            rows: cell_count(rows)?,
        })
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

fn cell_count(value: f64) -> Option<u16> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    let cells = value.trunc();
    if cells < 1.0 || cells > f64::from(u16::MAX) {
        return None;
    }
    Some(cells as u16)
}

/// Size of the host container, in the same unit as [`CellSize`]
/// (pixels for a graphical host, cells for a terminal host)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportSize {
    pub width: f64,
    pub height: f64,
}

impl ViewportSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Size of one character cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f64,
    pub height: f64,
}

impl CellSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Cells of a text-mode host: one unit per cell
    pub const fn unit() -> Self {
        Self::new(1.0, 1.0)
    }

    /// Largest grid that fits in `viewport`, never smaller than 1x1
    pub fn fit(&self, viewport: ViewportSize) -> Geometry {
        let cols = Self::cells_along(viewport.width, self.width);
        let rows = Self::cells_along(viewport.height, self.height);
        Geometry::new(cols, rows)
    }

    fn cells_along(extent: f64, cell: f64) -> u16 {
        if !extent.is_finite() || !cell.is_finite() || cell <= 0.0 {
            return 1;
        }
        (extent / cell).floor().clamp(1.0, f64::from(u16::MAX)) as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dimensions_accepts_positive() {
        assert_eq!(Geometry::from_dimensions(80.0, 24.0), Some(Geometry::new(80, 24)));
        assert_eq!(Geometry::from_dimensions(100.7, 30.2), Some(Geometry::new(100, 30)));
    }

    #[test]
    fn test_from_dimensions_rejects_invalid() {
        let invalid = [
            (0.0, 24.0),
            (80.0, 0.0),
            (-1.0, 24.0),
            (80.0, -5.0),
            (f64::NAN, 24.0),
            (80.0, f64::NAN),
            (f64::INFINITY, 24.0),
            (80.0, f64::NEG_INFINITY),
            (0.5, 24.0),
            (70000.0, 24.0),
        ];
        for (cols, rows) in invalid {
            assert_eq!(Geometry::from_dimensions(cols, rows), None, "{} x {}", cols, rows);
        }
    }

    #[test]
    fn test_cell_fit() {
        let cell = CellSize::new(8.0, 16.0);
        assert_eq!(cell.fit(ViewportSize::new(800.0, 480.0)), Geometry::new(100, 30));
        assert_eq!(cell.fit(ViewportSize::new(805.0, 479.0)), Geometry::new(100, 29));
        // Collapsed container still yields a usable grid
        assert_eq!(cell.fit(ViewportSize::new(0.0, 0.0)), Geometry::new(1, 1));
    }

    #[test]
    fn test_unit_cells() {
        assert_eq!(CellSize::unit().fit(ViewportSize::new(120.0, 40.0)), Geometry::new(120, 40));
    }
}
