// src/driver.rs
//
// Whole-mesh time stepping.
//
// advance_step maps the Yang step over every node. Nodes are independent given
// their own (m_prev, m, h_prev, h), so the map runs as a rayon parallel
// iterator; the collect is the exit barrier. The input state is only borrowed,
// so no node can observe another node's new value within the step.
//
// Stepper owns the double buffer plus the field evaluator and runs the full
// cycle: advance -> evaluate H(m_next) -> commit -> diagnostics.

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::diagnostics::{average_magnetization, torque_stats, TorqueStats};
use crate::effective_field::FieldEvaluator;
use crate::error::{LlgError, Result};
use crate::llg::{yang_step_prevalidated, StepDiagnostics};
use crate::params::StepConfig;
use crate::state::MeshState;
use crate::vec3::is_finite;

/// Below this many nodes per rayon task the split overhead dominates.
const MIN_NODES_PER_TASK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Use rayon for the per-node map. Results are identical either way.
    /// Env `LLG_YANG_PAR=0` turns it off for the default settings.
    pub parallel: bool,
    /// Treat any non-converged node as an error instead of a warning.
    pub strict: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        let parallel = !matches!(std::env::var("LLG_YANG_PAR").as_deref(), Ok("0"));
        Self {
            parallel,
            strict: false,
        }
    }
}

/// Compute m at step n+1 for every node. Does not modify `state`.
pub fn advance_step(
    state: &MeshState,
    cfg: &StepConfig,
    settings: &DriverSettings,
) -> Result<(Vec<[f64; 3]>, Vec<StepDiagnostics>)> {
    cfg.validate()?;
    state.validate()?;

    let n = state.len();
    let results: Vec<([f64; 3], StepDiagnostics)> = if settings.parallel {
        (0..n)
            .into_par_iter()
            .with_min_len(MIN_NODES_PER_TASK)
            .map(|i| yang_step_prevalidated(&state.node(i), cfg))
            .collect::<Result<_>>()?
    } else {
        (0..n)
            .map(|i| yang_step_prevalidated(&state.node(i), cfg))
            .collect::<Result<_>>()?
    };

    Ok(results.into_iter().unzip())
}

/// Per-step summary for logging and stopping decisions.
#[derive(Debug, Clone)]
pub struct StepReport {
    /// Global step index just completed (1-based).
    pub step: usize,
    pub diagnostics: Vec<StepDiagnostics>,
    pub nonconverged: usize,
    pub max_residual: f64,
    pub max_iterations: usize,
    /// Mesh average of the new m.
    pub m_avg: [f64; 3],
    /// |m × H| statistics at the new state.
    pub torque: TorqueStats,
    pub energy: Option<f64>,
}

impl StepReport {
    pub fn all_converged(&self) -> bool {
        self.nonconverged == 0
    }
}

fn first_nonconverged(diag: &[StepDiagnostics]) -> Option<(usize, &StepDiagnostics)> {
    diag.iter().enumerate().find(|(_, d)| !d.converged)
}

/// The evaluator's output must cover every node with finite vectors.
fn check_field(h: &[[f64; 3]], n: usize) -> Result<()> {
    if h.len() != n {
        return Err(LlgError::invalid(
            "h_next",
            format!("evaluator returned {} vectors for {n} nodes", h.len()),
        ));
    }
    if let Some(i) = h.iter().position(|v| !is_finite(*v)) {
        return Err(LlgError::Field(format!(
            "non-finite field {:?} at node {i}",
            h[i]
        )));
    }
    Ok(())
}

pub struct Stepper<F: FieldEvaluator> {
    state: MeshState,
    evaluator: F,
    cfg: StepConfig,
    settings: DriverSettings,
    step: usize,
}

impl<F: FieldEvaluator> Stepper<F> {
    /// Validate the config and evaluate H(m). A state without history
    /// (m_prev == m) gets H_prev = H; otherwise H_prev = H(m_prev).
    pub fn new(
        mut state: MeshState,
        evaluator: F,
        cfg: StepConfig,
        settings: DriverSettings,
    ) -> Result<Self> {
        cfg.validate()?;
        let n = state.len();
        let h0 = evaluator.field(&state.m)?;
        check_field(&h0, n)?;
        if state.m_prev == state.m {
            state.prime_fields(h0)?;
        } else {
            let h_prev = evaluator.field(&state.m_prev)?;
            check_field(&h_prev, n)?;
            state.set_fields(h0, h_prev)?;
        }
        state.validate()?;
        Ok(Self {
            state,
            evaluator,
            cfg,
            settings,
            step: 0,
        })
    }

    pub fn state(&self) -> &MeshState {
        &self.state
    }

    pub fn evaluator(&self) -> &F {
        &self.evaluator
    }

    pub fn config(&self) -> &StepConfig {
        &self.cfg
    }

    pub fn steps_taken(&self) -> usize {
        self.step
    }

    pub fn time(&self) -> f64 {
        self.step as f64 * self.cfg.dt
    }

    /// Torque and energy of the current state, without stepping.
    pub fn current_torque(&self) -> TorqueStats {
        torque_stats(&self.state.m, &self.state.h)
    }

    pub fn current_energy(&self) -> Option<f64> {
        self.evaluator.energy(&self.state.m)
    }

    /// One global step. A failed step (non-convergence in strict mode, or a
    /// bad field from the evaluator) leaves the state untouched.
    pub fn step(&mut self) -> Result<StepReport> {
        let (m_next, diagnostics) = advance_step(&self.state, &self.cfg, &self.settings)?;

        let nonconverged = diagnostics.iter().filter(|d| !d.converged).count();
        let max_residual = diagnostics.iter().map(|d| d.residual).fold(0.0, f64::max);
        let max_iterations = diagnostics.iter().map(|d| d.iterations).max().unwrap_or(0);
        let step = self.step + 1;

        if let Some((node, d)) = first_nonconverged(&diagnostics) {
            if self.settings.strict {
                return Err(LlgError::NonConvergence {
                    node,
                    residual: d.residual,
                    iterations: d.iterations,
                });
            }
            warn!(
                step,
                nonconverged,
                first_node = node,
                residual = d.residual,
                iterations = d.iterations,
                "corrector did not converge"
            );
        }

        // Barrier passed: every node is done, H can be rebuilt from the new field.
        let h_next = self.evaluator.field(&m_next)?;
        check_field(&h_next, m_next.len())?;
        let torque = torque_stats(&m_next, &h_next);
        let energy = self.evaluator.energy(&m_next);
        let m_avg = average_magnetization(&m_next);

        self.state.commit(m_next, h_next)?;
        self.step = step;

        debug!(
            step,
            max_residual,
            max_iterations,
            torque_max = torque.max,
            "step complete"
        );

        Ok(StepReport {
            step,
            diagnostics,
            nonconverged,
            max_residual,
            max_iterations,
            m_avg,
            torque,
            energy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::effective_field::{FieldMask, ReferenceField};
    use crate::grid::Grid2D;
    use crate::params::{Material, NormPolicy};

    /// Uniform +z field that turns NaN after `good_calls` evaluations.
    struct PoisonedField {
        good_calls: usize,
        calls: AtomicUsize,
    }

    impl FieldEvaluator for PoisonedField {
        fn evaluate(&self, _m: &[[f64; 3]], h: &mut [[f64; 3]]) -> Result<()> {
            let k = self.calls.fetch_add(1, Ordering::SeqCst);
            let v = if k < self.good_calls {
                [0.0, 0.0, 1.0]
            } else {
                [f64::NAN, 0.0, 1.0]
            };
            h.fill(v);
            Ok(())
        }
    }

    fn noisy_state(n: usize) -> MeshState {
        let m = (0..n)
            .map(|i| {
                let t = 0.37 * i as f64;
                crate::vec3::normalize([t.cos(), t.sin(), 0.3 + 0.1 * (i % 7) as f64])
            })
            .collect();
        let mut s = MeshState::from_magnetization(m);
        let h: Vec<[f64; 3]> = (0..n).map(|i| [0.1 * (i % 5) as f64, 0.0, 1.0]).collect();
        s.prime_fields(h).unwrap();
        s
    }

    #[test]
    fn parallel_and_serial_paths_agree_exactly() {
        let state = noisy_state(2000);
        let cfg = StepConfig::new(0.05).with_damp(0.3);
        let par = DriverSettings {
            parallel: true,
            strict: false,
        };
        let ser = DriverSettings {
            parallel: false,
            strict: false,
        };
        let (m_par, d_par) = advance_step(&state, &cfg, &par).unwrap();
        let (m_ser, d_ser) = advance_step(&state, &cfg, &ser).unwrap();
        assert_eq!(m_par, m_ser);
        assert_eq!(d_par, d_ser);
    }

    #[test]
    fn advance_step_does_not_touch_input() {
        let state = noisy_state(10);
        let before = state.clone();
        let _ = advance_step(&state, &StepConfig::new(0.1), &DriverSettings::default()).unwrap();
        assert_eq!(state, before);
    }

    #[test]
    fn mismatched_lengths_are_invalid() {
        let mut state = noisy_state(4);
        state.h_prev.pop();
        let err = advance_step(&state, &StepConfig::new(0.1), &DriverSettings::default());
        assert!(matches!(
            err,
            Err(LlgError::InvalidArgument { param: "h_prev", .. })
        ));
    }

    #[test]
    fn strict_mode_rejects_nonconvergence_and_keeps_state() {
        let field = ReferenceField::uniform(1, [0.0, 1e8, 0.0]);
        let cfg = StepConfig::new(0.1).with_damp(0.1).with_max_attempts(1);
        let settings = DriverSettings {
            parallel: false,
            strict: true,
        };
        let mut stepper =
            Stepper::new(MeshState::new_uniform(1, [1.0, 0.0, 0.0]), field, cfg, settings).unwrap();
        let err = stepper.step();
        assert!(matches!(err, Err(LlgError::NonConvergence { node: 0, .. })));
        assert_eq!(stepper.state().m, vec![[1.0, 0.0, 0.0]]);
        assert_eq!(stepper.steps_taken(), 0);
    }

    #[test]
    fn lenient_mode_reports_nonconvergence() {
        let field = ReferenceField::uniform(1, [0.0, 1e8, 0.0]);
        let cfg = StepConfig::new(0.1).with_damp(0.1).with_max_attempts(1);
        let mut stepper = Stepper::new(
            MeshState::new_uniform(1, [1.0, 0.0, 0.0]),
            field,
            cfg,
            DriverSettings::default(),
        )
        .unwrap();
        let report = stepper.step().unwrap();
        assert_eq!(report.nonconverged, 1);
        assert!(!report.all_converged());
        assert!(crate::vec3::is_finite(stepper.state().m[0]));
    }

    #[test]
    fn step_commits_history() {
        let field = ReferenceField::uniform(3, [0.0, 0.0, 1.0]);
        let cfg = StepConfig::new(0.01)
            .with_damp(0.0)
            .with_norm(NormPolicy::RenormalizeEachIteration);
        let mut stepper = Stepper::new(
            MeshState::new_uniform(3, [1.0, 0.0, 0.0]),
            field,
            cfg,
            DriverSettings::default(),
        )
        .unwrap();
        let m0 = stepper.state().m.clone();
        let report = stepper.step().unwrap();
        assert_eq!(report.step, 1);
        assert_eq!(stepper.state().m_prev, m0);
        assert_eq!(stepper.state().h, vec![[0.0, 0.0, 1.0]; 3]);
        assert!((stepper.time() - 0.01).abs() < 1e-15);
    }

    #[test]
    fn non_finite_field_fails_the_step_and_keeps_state() {
        for strict in [false, true] {
            let field = PoisonedField {
                good_calls: 1,
                calls: AtomicUsize::new(0),
            };
            let settings = DriverSettings {
                parallel: false,
                strict,
            };
            let mut stepper = Stepper::new(
                MeshState::new_tilted(2, 30.0),
                field,
                StepConfig::new(0.05),
                settings,
            )
            .unwrap();
            let before = stepper.state().clone();

            let err = stepper.step();
            assert!(matches!(err, Err(LlgError::Field(_))), "strict={strict}: {err:?}");
            assert_eq!(stepper.state(), &before);
            assert_eq!(stepper.steps_taken(), 0);
        }
    }

    #[test]
    fn non_finite_initial_field_is_rejected() {
        let field = PoisonedField {
            good_calls: 0,
            calls: AtomicUsize::new(0),
        };
        let res = Stepper::new(
            MeshState::new_uniform(1, [1.0, 0.0, 0.0]),
            field,
            StepConfig::new(0.05),
            DriverSettings::default(),
        );
        assert!(matches!(res, Err(LlgError::Field(_))));
    }

    #[test]
    fn restart_with_history_evaluates_previous_field() {
        // H = 2 k_u (m·z) z = (0, 0, m_z)
        let material = Material {
            a_ex: 0.0,
            k_u: 0.5,
            easy_axis: [0.0, 0.0, 1.0],
        };
        let field = ReferenceField::new(Grid2D::macrospin(), material, [0.0; 3])
            .with_mask(FieldMask::ZeemanAnis);
        let mut state = MeshState::new_uniform(1, [1.0, 0.0, 0.0]);
        state.m_prev = vec![[0.0, 0.0, 1.0]];

        let stepper =
            Stepper::new(state, field, StepConfig::new(0.05), DriverSettings::default()).unwrap();
        assert_eq!(stepper.state().h, vec![[0.0, 0.0, 0.0]]);
        assert_eq!(stepper.state().h_prev, vec![[0.0, 0.0, 1.0]]);
        assert_eq!(stepper.state().m_prev, vec![[0.0, 0.0, 1.0]]);
    }
}
