// src/main.rs
//
// CLI for exploratory Yang-step runs with the reference field model
// (Zeeman + uniaxial anisotropy + nearest-neighbour exchange).
//
// Examples:
//
//   cargo run --release -- tilt damp=0.1 dt=0.05 steps=2000 torque=1e-4 plot
//       -> damped macrospin relaxing toward +z, stops on max torque.
//
//   cargo run --release -- tilt nx=64 ny=64 aex=0.5 ku=0.1 half=midpoint norm=each
//       -> 64×64 mesh with exchange, per-node update parallelised with rayon.
//
//   cargo run --release -- config=runs/<run_id>/config.json run=rerun
//       -> reproduce a previous run from its config.json.
//
// Outputs (per run directory):
//   runs/<run_id>/
//     ├── config.json
//     ├── avg_magnetisation.csv
//     ├── summary.json
//     ├── m_avg.png   (with `plot`)
//     └── torque.png  (with `plot`)
//
// Logging: RUST_LOG (default llg_yang=info).

use std::env;
use std::fs::{create_dir_all, File};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use llg_yang::config::{FieldConfig, GeometryConfig, NumericsConfig, RunConfig, RunInfo};
use llg_yang::diagnostics::{max_norm_deviation, TorqueMetric};
use llg_yang::driver::{DriverSettings, Stepper};
use llg_yang::effective_field::{FieldMask, ReferenceField};
use llg_yang::error::{LlgError, Result};
use llg_yang::grid::Grid2D;
use llg_yang::params::{HalfStepRule, Material, NormPolicy, StepConfig};
use llg_yang::simulation::{RunSettings, Simulation};
use llg_yang::state::MeshState;
use llg_yang::visualisation::{save_m_avg_plot, save_torque_plot};

fn print_usage() {
    eprintln!(
        r#"Usage:
  cargo run -- [uniform|tilt] [tilt=DEG] [config=PATH]
             [nx=N] [ny=N] [dx=VAL] [dy=VAL]
             [dt=VAL] [damp=VAL] [tol=VAL] [attempts=N]
             [half=extrapolated|midpoint] [norm=each|final|none]
             [steps=N] [torque=VAL] [metric=max|mean|rms] [record=N]
             [bx=VAL] [by=VAL] [bz=VAL] [aex=VAL] [ku=VAL]
             [strict] [serial] [plot] [out=DIR] [run=RUN_ID]

Notes:
  - Units are dimensionless (gamma = 1).
  - 'strict' aborts on the first step where any node's corrector fails to converge.
  - Arguments are applied left to right on top of config=PATH (if given).
"#
    );
}

fn default_config() -> RunConfig {
    RunConfig {
        geometry: GeometryConfig {
            nx: 1,
            ny: 1,
            dx: 1.0,
            dy: 1.0,
        },
        material: Material::default(),
        fields: FieldConfig {
            h_ext: [0.0, 0.0, 1.0],
            exchange: false,
            anisotropy: false,
        },
        numerics: NumericsConfig {
            step: StepConfig::new(0.05).with_damp(0.1),
            stop: RunSettings::default(),
            strict: false,
            parallel: true,
        },
        run: RunInfo {
            binary: "llg-yang".to_string(),
            run_id: String::new(),
            init: "tilt".to_string(),
            git_commit: None,
            timestamp_utc: None,
        },
    }
}

fn sanitize_run_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn default_run_id(init: &str, cfg: &StepConfig) -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    let ts = format!("{}{:03}", now.as_secs(), now.subsec_millis());
    format!("{}_{}_{}_{}", ts, init, cfg.half_step.as_str(), cfg.norm.as_str())
}

fn unique_run_dir(out_root: &str, run_id: &str) -> PathBuf {
    let base = PathBuf::from(out_root);
    let mut dir = base.join(run_id);
    if !dir.exists() {
        return dir;
    }
    for k in 1..1000 {
        let cand = base.join(format!("{}_{}", run_id, k));
        if !cand.exists() {
            dir = cand;
            break;
        }
    }
    dir
}

fn parse_value<T: std::str::FromStr>(param: &'static str, v: &str) -> Result<T> {
    v.trim()
        .parse::<T>()
        .map_err(|_| LlgError::invalid(param, format!("could not parse '{v}'")))
}

fn initial_state(init: &str, tilt_deg: f64, n: usize) -> Result<MeshState> {
    match init {
        "uniform" => Ok(MeshState::new_uniform(n, [0.0, 0.0, 1.0])),
        "tilt" => Ok(MeshState::new_tilted(n, tilt_deg)),
        other => Err(LlgError::invalid("init", format!("unknown initial state '{other}'"))),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("llg_yang=info")),
        )
        .init();

    let argv: Vec<String> = env::args().collect();

    let mut cfg = default_config();
    let mut tilt_deg = 10.0_f64;
    let mut make_plots = false;
    let mut out_root = "runs".to_string();
    let mut run_id_override: Option<String> = None;

    // config=PATH first so that the remaining arguments override it.
    if let Some(path) = argv.iter().skip(1).find_map(|a| a.strip_prefix("config=")) {
        cfg = RunConfig::from_json_file(Path::new(path))?;
        info!(path, "loaded config");
    }

    for arg in argv.iter().skip(1) {
        let arg = arg.as_str();
        if arg == "-h" || arg == "--help" || arg == "help" {
            print_usage();
            return Ok(());
        }

        match arg {
            "uniform" | "tilt" => {
                cfg.run.init = arg.to_string();
                continue;
            }
            "strict" => {
                cfg.numerics.strict = true;
                continue;
            }
            "serial" => {
                cfg.numerics.parallel = false;
                continue;
            }
            "plot" => {
                make_plots = true;
                continue;
            }
            _ => {}
        }

        let Some((key, v)) = arg.split_once('=') else {
            warn!("ignoring unknown argument '{arg}'");
            continue;
        };

        let step = &mut cfg.numerics.step;
        let stop = &mut cfg.numerics.stop;
        match key {
            "config" => {}
            "tilt" => tilt_deg = parse_value("tilt", v)?,
            "nx" => cfg.geometry.nx = parse_value("nx", v)?,
            "ny" => cfg.geometry.ny = parse_value("ny", v)?,
            "dx" => cfg.geometry.dx = parse_value("dx", v)?,
            "dy" => cfg.geometry.dy = parse_value("dy", v)?,
            "dt" => step.dt = parse_value("dt", v)?,
            "damp" => step.damp = parse_value("damp", v)?,
            "tol" => step.tolerance = parse_value("tolerance", v)?,
            "attempts" => step.max_attempts = parse_value("max_attempts", v)?,
            "half" => {
                step.half_step = HalfStepRule::from_arg(v)
                    .ok_or_else(|| LlgError::invalid("half", format!("unknown rule '{v}'")))?
            }
            "norm" => {
                step.norm = NormPolicy::from_arg(v)
                    .ok_or_else(|| LlgError::invalid("norm", format!("unknown policy '{v}'")))?
            }
            "steps" => stop.max_steps = parse_value("steps", v)?,
            "torque" => stop.torque_threshold = Some(parse_value("torque", v)?),
            "metric" => {
                stop.torque_metric = match v {
                    "max" => TorqueMetric::Max,
                    "mean" => TorqueMetric::Mean,
                    "rms" => TorqueMetric::Rms,
                    _ => return Err(LlgError::invalid("metric", format!("unknown metric '{v}'"))),
                }
            }
            "record" => stop.record_every = parse_value::<usize>("record", v)?.max(1),
            "bx" => cfg.fields.h_ext[0] = parse_value("bx", v)?,
            "by" => cfg.fields.h_ext[1] = parse_value("by", v)?,
            "bz" => cfg.fields.h_ext[2] = parse_value("bz", v)?,
            "aex" => {
                cfg.material.a_ex = parse_value("aex", v)?;
                cfg.fields.exchange = cfg.material.a_ex != 0.0;
            }
            "ku" => {
                cfg.material.k_u = parse_value("ku", v)?;
                cfg.fields.anisotropy = cfg.material.k_u != 0.0;
            }
            "out" => out_root = v.to_string(),
            "run" => run_id_override = Some(v.to_string()),
            _ => warn!("ignoring unknown argument '{arg}'"),
        }
    }

    // Invalid configuration aborts here, naming the parameter.
    cfg.numerics.step.validate()?;

    // -------- output directory setup --------
    create_dir_all(&out_root)?;
    let run_id = sanitize_run_id(
        &run_id_override.unwrap_or_else(|| default_run_id(&cfg.run.init, &cfg.numerics.step)),
    );
    let run_dir = unique_run_dir(&out_root, &run_id);
    create_dir_all(&run_dir)?;
    cfg.run.run_id = run_id;
    cfg.write_to_dir(&run_dir)?;

    // -------- model --------
    let g = cfg.geometry;
    let grid = Grid2D::new(g.nx, g.ny, g.dx, g.dy);
    let mask = match (cfg.fields.exchange, cfg.fields.anisotropy) {
        (true, _) => FieldMask::Full,
        (false, true) => FieldMask::ZeemanAnis,
        (false, false) => FieldMask::Zeeman,
    };
    let field = ReferenceField::new(grid, cfg.material, cfg.fields.h_ext).with_mask(mask);
    let state = initial_state(&cfg.run.init, tilt_deg, grid.n_nodes())?;

    let settings = DriverSettings {
        parallel: cfg.numerics.parallel,
        strict: cfg.numerics.strict,
    };
    let step_cfg = cfg.numerics.step;

    info!(
        run_dir = %run_dir.display(),
        nx = g.nx,
        ny = g.ny,
        dt = step_cfg.dt,
        damp = step_cfg.damp,
        tolerance = step_cfg.tolerance,
        max_attempts = step_cfg.max_attempts,
        half_step = step_cfg.half_step.as_str(),
        norm = step_cfg.norm.as_str(),
        ?mask,
        "llg-yang run config"
    );

    let stepper = Stepper::new(state, field, step_cfg, settings)?;
    let mut sim = Simulation::new(stepper);
    let (summary, series) = sim.run(&cfg.numerics.stop)?;

    series.write_csv(&run_dir.join("avg_magnetisation.csv"))?;
    let file = File::create(run_dir.join("summary.json"))?;
    serde_json::to_writer_pretty(file, &summary)?;

    if make_plots {
        save_m_avg_plot(&series, &run_dir.join("m_avg.png"))?;
        save_torque_plot(&series, &run_dir.join("torque.png"))?;
    }

    let norm_dev = max_norm_deviation(&sim.stepper().state().m);
    info!(
        steps = summary.steps,
        stop_reason = ?summary.stop_reason,
        final_torque = summary.final_torque,
        nonconverged_steps = summary.nonconverged_steps,
        max_norm_deviation = norm_dev,
        "done; wrote outputs to {}",
        run_dir.display()
    );

    Ok(())
}
