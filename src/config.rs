use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::Result;
use crate::params::{Material, StepConfig};
use crate::simulation::RunSettings;

/// Everything needed to reproduce a run; written as `config.json` next to
/// the outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub geometry: GeometryConfig,
    pub material: Material,
    pub fields: FieldConfig,
    pub numerics: NumericsConfig,
    pub run: RunInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    pub nx: usize,
    pub ny: usize,
    pub dx: f64,
    pub dy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldConfig {
    pub h_ext: [f64; 3],
    #[serde(default)]
    pub exchange: bool,
    #[serde(default)]
    pub anisotropy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericsConfig {
    pub step: StepConfig,
    pub stop: RunSettings,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub binary: String,
    pub run_id: String,
    /// Initial state label, e.g. "uniform" or "tilt".
    pub init: String,

    // Optional provenance (can be filled later)
    #[serde(default)]
    pub git_commit: Option<String>,
    #[serde(default)]
    pub timestamp_utc: Option<String>,
}

impl RunConfig {
    pub fn write_to_dir(&self, out_dir: &Path) -> Result<()> {
        let path = out_dir.join("config.json");
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load a config and validate its step parameters.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let cfg: RunConfig = serde_json::from_reader(BufReader::new(file))?;
        cfg.numerics.step.validate()?;
        Ok(cfg)
    }
}
