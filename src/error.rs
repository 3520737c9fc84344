// src/error.rs

use thiserror::Error;

/// Errors surfaced by the integrator, the driver and the run loop.
///
/// Non-convergence of the corrector is normally *reported* through
/// `StepDiagnostics`; it only becomes an error when the driver runs in
/// strict mode.
#[derive(Debug, Error)]
pub enum LlgError {
    #[error("invalid argument `{param}`: {reason}")]
    InvalidArgument { param: &'static str, reason: String },

    #[error("numerical instability in {context}: non-finite or zero-length result")]
    NumericalInstability { context: &'static str },

    #[error(
        "corrector did not converge at node {node}: residual {residual:.3e} after {iterations} iterations"
    )]
    NonConvergence {
        node: usize,
        residual: f64,
        iterations: usize,
    },

    #[error("field evaluator failed: {0}")]
    Field(String),

    #[error("plotting failed: {0}")]
    Plot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LlgError {
    pub fn invalid(param: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            param,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LlgError>;
