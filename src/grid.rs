// src/grid.rs

/// Rectangular node layout used by the reference field evaluator for
/// nearest-neighbour exchange. The integrator itself never looks at it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid2D {
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
}

impl Grid2D {
    /// Create a new 2D grid with nx × ny nodes and spacings dx, dy.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64) -> Self {
        Self { nx, ny, dx, dy }
    }

    /// Single node (macrospin).
    pub fn macrospin() -> Self {
        Self::new(1, 1, 1.0, 1.0)
    }

    /// Total number of nodes.
    pub fn n_nodes(&self) -> usize {
        self.nx * self.ny
    }

    /// Convert (i, j) indices to a flat node index.
    #[inline]
    pub fn idx(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny);
        j * self.nx + i
    }
}
