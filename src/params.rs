// src/params.rs

use serde::{Deserialize, Serialize};

use crate::error::{LlgError, Result};

pub const DEFAULT_DAMP: f64 = 1.0;
pub const DEFAULT_TOLERANCE: f64 = 1e-5;
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

/// How the corrector estimates the half-step magnetisation from the
/// current prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HalfStepRule {
    /// m_half = m_pred + 3 m - m_half0, with m_half0 = (m + m_prev) / 2.
    #[default]
    Extrapolated,
    /// m_half = (m_pred + m) / 2.
    Midpoint,
}

impl HalfStepRule {
    pub fn from_arg(s: &str) -> Option<Self> {
        match s {
            "extrapolated" | "extrap" | "yang" => Some(Self::Extrapolated),
            "midpoint" | "mid" => Some(Self::Midpoint),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extrapolated => "extrapolated",
            Self::Midpoint => "midpoint",
        }
    }
}

/// Where the corrector projects back onto |m| = 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormPolicy {
    /// Raw corrector: iterates are never renormalised.
    Unconstrained,
    /// Only the returned m_next is renormalised.
    RenormalizeFinal,
    /// Every corrector iterate is renormalised before the residual is taken.
    #[default]
    RenormalizeEachIteration,
}

impl NormPolicy {
    pub fn from_arg(s: &str) -> Option<Self> {
        match s {
            "none" | "raw" | "unconstrained" => Some(Self::Unconstrained),
            "final" => Some(Self::RenormalizeFinal),
            "each" | "iteration" => Some(Self::RenormalizeEachIteration),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unconstrained => "none",
            Self::RenormalizeFinal => "final",
            Self::RenormalizeEachIteration => "each",
        }
    }
}

fn default_damp() -> f64 {
    DEFAULT_DAMP
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

/// Scalar parameters shared by every node for one global step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Time increment (> 0).
    pub dt: f64,
    /// Damping coefficient. Expected in [0, 1] but not enforced.
    #[serde(default = "default_damp")]
    pub damp: f64,
    /// Corrector convergence threshold on |m_new - m_pred|.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Corrector iteration cap.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default)]
    pub half_step: HalfStepRule,
    #[serde(default)]
    pub norm: NormPolicy,
}

impl StepConfig {
    /// Config with the given dt and default damping/tolerance/iteration cap.
    pub fn new(dt: f64) -> Self {
        Self {
            dt,
            damp: DEFAULT_DAMP,
            tolerance: DEFAULT_TOLERANCE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            half_step: HalfStepRule::default(),
            norm: NormPolicy::default(),
        }
    }

    pub fn with_damp(mut self, damp: f64) -> Self {
        self.damp = damp;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_half_step(mut self, rule: HalfStepRule) -> Self {
        self.half_step = rule;
        self
    }

    pub fn with_norm(mut self, norm: NormPolicy) -> Self {
        self.norm = norm;
        self
    }

    /// Reject configurations that cannot produce a meaningful step.
    pub fn validate(&self) -> Result<()> {
        validate_dt(self.dt)?;
        if !self.damp.is_finite() {
            return Err(LlgError::invalid(
                "damp",
                format!("must be finite, got {}", self.damp),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(LlgError::invalid(
                "tolerance",
                format!("must be finite and > 0, got {}", self.tolerance),
            ));
        }
        if self.max_attempts == 0 {
            return Err(LlgError::invalid("max_attempts", "must be >= 1"));
        }
        Ok(())
    }
}

pub(crate) fn validate_dt(dt: f64) -> Result<()> {
    if !(dt.is_finite() && dt > 0.0) {
        return Err(LlgError::invalid(
            "dt",
            format!("must be finite and > 0, got {dt}"),
        ));
    }
    Ok(())
}

/// Material parameters for the reference field evaluator (dimensionless units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Exchange coupling between nearest neighbours.
    pub a_ex: f64,
    /// Uniaxial anisotropy constant.
    pub k_u: f64,
    pub easy_axis: [f64; 3],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            a_ex: 0.0,
            k_u: 0.0,
            easy_axis: [0.0, 0.0, 1.0],
        }
    }
}
