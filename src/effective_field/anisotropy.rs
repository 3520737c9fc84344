// src/effective_field/anisotropy.rs

use crate::params::Material;
use crate::vec3::dot;

/// Add the uniaxial anisotropy contribution.
///
/// For w_ani = K_u [1 - (m·u)^2], we get:
///   H_ani = 2 K_u (m·u) u
pub fn add_uniaxial_anisotropy_field(m: &[[f64; 3]], h: &mut [[f64; 3]], mat: &Material) {
    let k_u = mat.k_u;
    if k_u == 0.0 {
        return;
    }

    let coeff = 2.0 * k_u;
    let u = mat.easy_axis;

    for (m_cell, h_cell) in m.iter().zip(h.iter_mut()) {
        let mdotu = dot(*m_cell, u);
        h_cell[0] += coeff * mdotu * u[0];
        h_cell[1] += coeff * mdotu * u[1];
        h_cell[2] += coeff * mdotu * u[2];
    }
}
