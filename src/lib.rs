// src/lib.rs
//
// Norm-preserving predictor-corrector ("Yang step") integration of the
// Landau-Lifshitz-Gilbert equation. The effective field is supplied by a
// `FieldEvaluator`; this crate only advances m.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod effective_field;
pub mod energy;
pub mod error;
pub mod grid;
pub mod llg;
pub mod params;
pub mod simulation;
pub mod state;
pub mod vec3;
pub mod visualisation;

pub use driver::{advance_step, DriverSettings, StepReport, Stepper};
pub use effective_field::FieldEvaluator;
pub use error::{LlgError, Result};
pub use llg::{extrapolate_half_field, rotation_step, yang_step, StepDiagnostics};
pub use params::{HalfStepRule, NormPolicy, StepConfig};
pub use state::{MeshState, NodeState};
