// src/llg.rs
//
// Norm-preserving LLG time stepping for a single node.
//
//  - rotation_step: implicit Cayley-type step, unconditionally stable for the
//    precession term, renormalised to |m| = 1.
//  - extrapolate_half_field: H_{n+1/2} ≈ 1.5 H_n - 0.5 H_{n-1} (uniform dt).
//  - yang_step: predictor (rotation_step) + fixed-point corrector evaluated at
//    the half step. Second order in dt.
//
// Non-convergence of the corrector is reported in StepDiagnostics, never raised.

use nalgebra::{Matrix3, Vector3};

use crate::error::{LlgError, Result};
use crate::params::{validate_dt, HalfStepRule, NormPolicy, StepConfig};
use crate::state::NodeState;
use crate::vec3::{add, cross, is_finite, norm, scale, sub};

/// Outcome of one corrector run at one node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepDiagnostics {
    /// |m_new - m_pred| of the last corrector iteration.
    pub residual: f64,
    /// Corrector iterations actually performed (1..=max_attempts).
    pub iterations: usize,
    /// residual < tolerance at return.
    pub converged: bool,
}

/// M = I + damp * [m]_x^T, i.e.
///
/// ```text
/// [  1        damp*m3  -damp*m2 ]
/// [ -damp*m3  1         damp*m1 ]
/// [  damp*m2 -damp*m1   1       ]
/// ```
///
/// det(M) = 1 + damp^2 |m|^2 >= 1.
#[inline]
fn cayley_matrix(m: [f64; 3], damp: f64) -> Matrix3<f64> {
    let (a, b, c) = (damp * m[0], damp * m[1], damp * m[2]);
    Matrix3::new(
        1.0, c, -b, //
        -c, 1.0, a, //
        b, -a, 1.0,
    )
}

/// Solve M(m_mat) x = rhs.
fn solve_cayley(
    m_mat: [f64; 3],
    damp: f64,
    rhs: [f64; 3],
    context: &'static str,
) -> Result<[f64; 3]> {
    let x = cayley_matrix(m_mat, damp)
        .lu()
        .solve(&Vector3::new(rhs[0], rhs[1], rhs[2]))
        .ok_or(LlgError::NumericalInstability { context })?;
    let x = [x[0], x[1], x[2]];
    if !is_finite(x) {
        return Err(LlgError::NumericalInstability { context });
    }
    Ok(x)
}

/// Scale `v` to unit length; a zero or overflowing norm is an instability.
fn renormalize(v: [f64; 3], context: &'static str) -> Result<[f64; 3]> {
    let n = norm(v);
    if n == 0.0 || !n.is_finite() {
        return Err(LlgError::NumericalInstability { context });
    }
    Ok(scale(1.0 / n, v))
}

fn check_vector(param: &'static str, v: [f64; 3]) -> Result<()> {
    if !is_finite(v) {
        return Err(LlgError::invalid(param, format!("non-finite vector {v:?}")));
    }
    Ok(())
}

fn check_magnetisation(param: &'static str, m: [f64; 3]) -> Result<()> {
    check_vector(param, m)?;
    if norm(m) == 0.0 {
        return Err(LlgError::invalid(param, "zero-length magnetisation"));
    }
    Ok(())
}

/// Validate one node's inputs (finite vectors, nonzero m).
pub(crate) fn check_node(node: &NodeState) -> Result<()> {
    check_magnetisation("m", node.m)?;
    check_vector("m_prev", node.m_prev)?;
    check_vector("h", node.h)?;
    check_vector("h_prev", node.h_prev)
}

/// One implicit (Cayley-type) step: solve M(m) m' = m - dt (m × H), then
/// renormalise. Returns a unit vector for any dt > 0.
pub fn rotation_step(m: [f64; 3], h: [f64; 3], dt: f64, damp: f64) -> Result<[f64; 3]> {
    validate_dt(dt)?;
    check_magnetisation("m", m)?;
    check_vector("h", h)?;
    if !damp.is_finite() {
        return Err(LlgError::invalid("damp", format!("must be finite, got {damp}")));
    }
    rotation_step_unchecked(m, h, dt, damp)
}

fn rotation_step_unchecked(m: [f64; 3], h: [f64; 3], dt: f64, damp: f64) -> Result<[f64; 3]> {
    let rhs = sub(m, scale(dt, cross(m, h)));
    let x = solve_cayley(m, damp, rhs, "rotation step")?;
    renormalize(x, "rotation step")
}

/// Half-step field estimate by linear extrapolation: 1.5 H - 0.5 H_prev.
#[inline]
pub fn extrapolate_half_field(h: [f64; 3], h_prev: [f64; 3]) -> [f64; 3] {
    sub(scale(1.5, h), scale(0.5, h_prev))
}

#[inline]
fn half_step_magnetisation(
    rule: HalfStepRule,
    m_pred: [f64; 3],
    m: [f64; 3],
    m_half0: [f64; 3],
) -> [f64; 3] {
    match rule {
        HalfStepRule::Extrapolated => sub(add(m_pred, scale(3.0, m)), m_half0),
        HalfStepRule::Midpoint => scale(0.5, add(m_pred, m)),
    }
}

/// Advance one node from step n to n+1 (Yang predictor-corrector).
///
/// Validates both the config and the node; the driver's `advance_step`
/// is the whole-mesh version.
pub fn yang_step(node: &NodeState, cfg: &StepConfig) -> Result<([f64; 3], StepDiagnostics)> {
    cfg.validate()?;
    check_node(node)?;
    yang_step_prevalidated(node, cfg)
}

/// Same as `yang_step`, for callers that already validated `cfg` and the node.
pub(crate) fn yang_step_prevalidated(
    node: &NodeState,
    cfg: &StepConfig,
) -> Result<([f64; 3], StepDiagnostics)> {
    let NodeState { m_prev, m, h_prev, h } = *node;
    let (dt, damp) = (cfg.dt, cfg.damp);

    // Previous half step n - 1/2.
    let m_half0 = scale(0.5, add(m, m_prev));

    // Predictor.
    let mut m_pred = rotation_step_unchecked(m, h, dt, damp)?;
    let mut m_half = half_step_magnetisation(cfg.half_step, m_pred, m, m_half0);

    let h_half = extrapolate_half_field(h, h_prev);
    let drive = add(scale(damp, m), scale(dt, h_half));

    let mut residual = f64::INFINITY;
    let mut iterations = 0;

    while iterations < cfg.max_attempts {
        iterations += 1;

        let rhs = sub(m, cross(m_half, drive));
        let mut m_new = solve_cayley(m_half, damp, rhs, "corrector")?;

        if cfg.norm == NormPolicy::RenormalizeEachIteration {
            m_new = renormalize(m_new, "corrector")?;
        }

        residual = norm(sub(m_new, m_pred));
        m_pred = m_new;
        m_half = half_step_magnetisation(cfg.half_step, m_pred, m, m_half0);

        if residual < cfg.tolerance {
            break;
        }
    }

    if cfg.norm == NormPolicy::RenormalizeFinal {
        m_pred = renormalize(m_pred, "corrector")?;
    }

    Ok((
        m_pred,
        StepDiagnostics {
            residual,
            iterations,
            converged: residual < cfg.tolerance,
        },
    ))
}
