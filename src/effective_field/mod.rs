// src/effective_field/mod.rs
//
// The integrator treats the effective field as an opaque input recomputed once
// per global step. `FieldEvaluator` is that boundary; `ReferenceField` is a
// small local implementation (Zeeman + uniaxial anisotropy + nearest-neighbour
// exchange on a Grid2D) used by the CLI and the tests.

pub mod anisotropy;
pub mod exchange;
pub mod zeeman;

use crate::energy::{compute_energy, EnergyBreakdown};
use crate::error::{LlgError, Result};
use crate::grid::Grid2D;
use crate::params::Material;

/// H = F(m) over the whole mesh, one vector per node in the same indexing.
pub trait FieldEvaluator: Send + Sync {
    /// Overwrite `h` with the effective field for `m`.
    fn evaluate(&self, m: &[[f64; 3]], h: &mut [[f64; 3]]) -> Result<()>;

    /// Total energy for diagnostics, if the evaluator knows it.
    fn energy(&self, _m: &[[f64; 3]]) -> Option<f64> {
        None
    }

    /// Allocating convenience wrapper around `evaluate`.
    fn field(&self, m: &[[f64; 3]]) -> Result<Vec<[f64; 3]>> {
        let mut h = vec![[0.0; 3]; m.len()];
        self.evaluate(m, &mut h)?;
        Ok(h)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldMask {
    /// Zeeman only
    Zeeman,
    /// Zeeman + anisotropy (node-local)
    ZeemanAnis,
    /// Zeeman + anisotropy + exchange
    Full,
}

#[derive(Debug, Clone)]
pub struct ReferenceField {
    pub grid: Grid2D,
    pub material: Material,
    pub h_ext: [f64; 3],
    pub mask: FieldMask,
}

impl ReferenceField {
    pub fn new(grid: Grid2D, material: Material, h_ext: [f64; 3]) -> Self {
        Self {
            grid,
            material,
            h_ext,
            mask: FieldMask::Full,
        }
    }

    /// Uniform applied field only, on any number of independent nodes.
    pub fn uniform(n: usize, h_ext: [f64; 3]) -> Self {
        Self {
            grid: Grid2D::new(n, 1, 1.0, 1.0),
            material: Material::default(),
            h_ext,
            mask: FieldMask::Zeeman,
        }
    }

    pub fn with_mask(mut self, mask: FieldMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn energy_breakdown(&self, m: &[[f64; 3]]) -> EnergyBreakdown {
        let mut e = compute_energy(&self.grid, m, &self.material, self.h_ext);
        if self.mask == FieldMask::Zeeman {
            e.anisotropy = 0.0;
        }
        if self.mask != FieldMask::Full {
            e.exchange = 0.0;
        }
        e
    }
}

impl FieldEvaluator for ReferenceField {
    fn evaluate(&self, m: &[[f64; 3]], h: &mut [[f64; 3]]) -> Result<()> {
        let n = self.grid.n_nodes();
        if m.len() != n || h.len() != n {
            return Err(LlgError::Field(format!(
                "expected {n} nodes, got m={} h={}",
                m.len(),
                h.len()
            )));
        }

        zeeman::set_zeeman_field(h, self.h_ext);

        if matches!(self.mask, FieldMask::ZeemanAnis | FieldMask::Full) {
            anisotropy::add_uniaxial_anisotropy_field(m, h, &self.material);
        }
        if self.mask == FieldMask::Full {
            exchange::add_exchange_field(&self.grid, m, h, self.material.a_ex);
        }
        Ok(())
    }

    fn energy(&self, m: &[[f64; 3]]) -> Option<f64> {
        Some(self.energy_breakdown(m).total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_controls_which_terms_are_added() {
        let grid = Grid2D::new(2, 1, 1.0, 1.0);
        let material = Material {
            a_ex: 1.0,
            k_u: 0.5,
            easy_axis: [0.0, 0.0, 1.0],
        };
        let m = vec![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0]];

        let zee = ReferenceField::new(grid, material, [0.0, 1.0, 0.0]).with_mask(FieldMask::Zeeman);
        assert_eq!(zee.field(&m).unwrap(), vec![[0.0, 1.0, 0.0]; 2]);

        let anis = zee.clone().with_mask(FieldMask::ZeemanAnis);
        let h = anis.field(&m).unwrap();
        // 2 K_u (m·u) u on node 0, nothing on node 1
        assert_eq!(h[0], [0.0, 1.0, 1.0]);
        assert_eq!(h[1], [0.0, 1.0, 0.0]);

        let full = zee.with_mask(FieldMask::Full);
        let h = full.field(&m).unwrap();
        // exchange: 2 A (m_j - m_i) / dx^2
        assert_eq!(h[0], [2.0, 1.0, -1.0]);
        assert_eq!(h[1], [-2.0, 1.0, 2.0]);
    }

    #[test]
    fn wrong_node_count_is_an_error() {
        let f = ReferenceField::uniform(3, [0.0, 0.0, 1.0]);
        let mut h = vec![[0.0; 3]; 2];
        assert!(f.evaluate(&[[0.0, 0.0, 1.0]; 2], &mut h).is_err());
    }
}
