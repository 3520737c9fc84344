// src/effective_field/exchange.rs

use crate::grid::Grid2D;

/// Add the nearest-neighbour exchange field, free boundaries:
///   H_ex,i = 2 A Σ_j (m_j - m_i) / d_ij^2
/// which is -∂E/∂m_i for E = A Σ_bonds |m_j - m_i|^2 / d^2.
pub fn add_exchange_field(grid: &Grid2D, m: &[[f64; 3]], h: &mut [[f64; 3]], a_ex: f64) {
    if a_ex == 0.0 {
        return;
    }

    let nx = grid.nx;
    let ny = grid.ny;
    let cx = 2.0 * a_ex / (grid.dx * grid.dx);
    let cy = 2.0 * a_ex / (grid.dy * grid.dy);

    for j in 0..ny {
        for i in 0..nx {
            let idx = grid.idx(i, j);
            let mi = m[idx];
            let mut acc = [0.0; 3];

            let mut couple = |nb: usize, c: f64| {
                let mj = m[nb];
                for k in 0..3 {
                    acc[k] += c * (mj[k] - mi[k]);
                }
            };

            if i > 0 {
                couple(grid.idx(i - 1, j), cx);
            }
            if i + 1 < nx {
                couple(grid.idx(i + 1, j), cx);
            }
            if j > 0 {
                couple(grid.idx(i, j - 1), cy);
            }
            if j + 1 < ny {
                couple(grid.idx(i, j + 1), cy);
            }

            for k in 0..3 {
                h[idx][k] += acc[k];
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_state_has_no_exchange_field() {
        let grid = Grid2D::new(3, 3, 1.0, 2.0);
        let m = vec![[0.6, 0.0, 0.8]; 9];
        let mut h = vec![[0.0; 3]; 9];
        add_exchange_field(&grid, &m, &mut h, 1.3);
        assert!(h.iter().all(|v| *v == [0.0; 3]));
    }

    #[test]
    fn exchange_field_sums_to_zero_over_mesh() {
        // Pairwise-antisymmetric couplings cancel in total.
        let grid = Grid2D::new(3, 2, 1.0, 0.5);
        let m: Vec<[f64; 3]> = (0..6)
            .map(|k| {
                let t = k as f64 * 0.4;
                [t.sin(), 0.0, t.cos()]
            })
            .collect();
        let mut h = vec![[0.0; 3]; 6];
        add_exchange_field(&grid, &m, &mut h, 0.7);
        for k in 0..3 {
            let s: f64 = h.iter().map(|v| v[k]).sum();
            assert!(s.abs() < 1e-12, "component {k} sums to {s}");
        }
    }
}
