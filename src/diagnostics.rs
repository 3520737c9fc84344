// src/diagnostics.rs
//
// Mesh-level diagnostics consumed by the outer stopping logic:
// average magnetisation and torque |m × H| metrics.

use serde::{Deserialize, Serialize};

use crate::vec3::{cross, dot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TorqueMetric {
    /// max_i |m_i × H_i|
    #[default]
    Max,
    /// (1/N) Σ_i |m_i × H_i|
    Mean,
    /// sqrt( (1/N) Σ_i |m_i × H_i|^2 )
    Rms,
}

/// All three torque metrics from one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TorqueStats {
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
}

impl TorqueStats {
    pub fn get(&self, metric: TorqueMetric) -> f64 {
        match metric {
            TorqueMetric::Max => self.max,
            TorqueMetric::Mean => self.mean,
            TorqueMetric::Rms => self.rms,
        }
    }
}

/// Non-finite torques propagate into every metric (f64::max would drop NaN).
pub fn torque_stats(m: &[[f64; 3]], h: &[[f64; 3]]) -> TorqueStats {
    debug_assert_eq!(m.len(), h.len());
    let n = m.len() as f64;

    let mut maxv = 0.0_f64;
    let mut sum = 0.0;
    let mut sum2 = 0.0;
    for (mi, hi) in m.iter().zip(h.iter()) {
        let t = cross(*mi, *hi);
        let mag2 = dot(t, t);
        let mag = mag2.sqrt();
        maxv = maxv.max(mag);
        sum += mag;
        sum2 += mag2;
    }

    TorqueStats {
        max: if sum.is_nan() { f64::NAN } else { maxv },
        mean: sum / n.max(1.0),
        rms: (sum2 / n.max(1.0)).sqrt(),
    }
}

/// Arithmetic mean of m over all nodes (zero for an empty mesh).
pub fn average_magnetization(m: &[[f64; 3]]) -> [f64; 3] {
    if m.is_empty() {
        return [0.0; 3];
    }
    let mut acc = [0.0; 3];
    for v in m {
        acc[0] += v[0];
        acc[1] += v[1];
        acc[2] += v[2];
    }
    let inv = 1.0 / m.len() as f64;
    [acc[0] * inv, acc[1] * inv, acc[2] * inv]
}

/// max_i | |m_i| - 1 |
pub fn max_norm_deviation(m: &[[f64; 3]]) -> f64 {
    m.iter()
        .map(|v| (dot(*v, *v).sqrt() - 1.0).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torque_metrics_on_two_nodes() {
        let m = [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let h = [[0.0, 0.0, 2.0], [0.0, 0.0, 2.0]];
        let t = torque_stats(&m, &h);
        assert_eq!(t.max, 2.0);
        assert_eq!(t.mean, 1.0);
        assert!((t.rms - 2.0_f64.sqrt()).abs() < 1e-15);
        assert_eq!(t.get(TorqueMetric::Mean), 1.0);
    }

    #[test]
    fn nan_torque_is_not_folded_away() {
        let m = [[1.0, 0.0, 0.0], [1.0, 0.0, 0.0]];
        let h = [[f64::NAN, 0.0, 1.0], [0.0, 0.0, 1.0]];
        let t = torque_stats(&m, &h);
        assert!(t.max.is_nan());
        assert!(t.mean.is_nan());
        assert!(t.rms.is_nan());
    }

    #[test]
    fn average_of_empty_mesh_is_zero() {
        assert_eq!(average_magnetization(&[]), [0.0; 3]);
        assert_eq!(
            average_magnetization(&[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
            [0.5, 0.5, 0.0]
        );
    }
}
