// src/effective_field/zeeman.rs

/// Overwrite every node's field with the uniform applied field.
pub fn set_zeeman_field(h: &mut [[f64; 3]], h_ext: [f64; 3]) {
    for cell in h.iter_mut() {
        *cell = h_ext;
    }
}
