// src/simulation.rs
//
// Outer run loop around the Stepper:
//  - records one time-series sample every `record_every` steps, plus the
//    final state
//  - stops on max steps, on a torque threshold, or on an interrupt flag
//    (checked between steps only, never inside a step)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::diagnostics::{average_magnetization, TorqueMetric};
use crate::driver::Stepper;
use crate::effective_field::FieldEvaluator;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub max_steps: usize,
    /// Stop once the chosen torque metric drops to or below this value.
    pub torque_threshold: Option<f64>,
    #[serde(default)]
    pub torque_metric: TorqueMetric,
    /// Sample cadence for the time series (>= 1).
    pub record_every: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_steps: 1000,
            torque_threshold: None,
            torque_metric: TorqueMetric::Max,
            record_every: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxSteps,
    TorqueBelowThreshold,
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub step: usize,
    pub t: f64,
    pub m_avg: [f64; 3],
    pub torque: f64,
    pub energy: Option<f64>,
    pub nonconverged: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TimeSeries {
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    pub fn component(&self, k: usize) -> Vec<f64> {
        self.samples.iter().map(|s| s.m_avg[k]).collect()
    }

    /// `step,t,mx_avg,my_avg,mz_avg,torque,energy,nonconverged`
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut w = BufWriter::new(file);
        writeln!(w, "step,t,mx_avg,my_avg,mz_avg,torque,energy,nonconverged")?;
        for s in &self.samples {
            let energy = s.energy.map_or_else(String::new, |e| format!("{e:.16e}"));
            writeln!(
                w,
                "{},{:.16e},{:.16e},{:.16e},{:.16e},{:.16e},{},{}",
                s.step, s.t, s.m_avg[0], s.m_avg[1], s.m_avg[2], s.torque, energy, s.nonconverged
            )?;
        }
        w.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSummary {
    pub steps: usize,
    pub stop_reason: StopReason,
    pub final_torque: f64,
    /// Steps in which at least one node failed to converge.
    pub nonconverged_steps: usize,
    pub max_iterations: usize,
}

pub struct Simulation<F: FieldEvaluator> {
    stepper: Stepper<F>,
    interrupt: Arc<AtomicBool>,
}

impl<F: FieldEvaluator> Simulation<F> {
    pub fn new(stepper: Stepper<F>) -> Self {
        Self {
            stepper,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared flag; setting it stops the run before the next step starts.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn stepper(&self) -> &Stepper<F> {
        &self.stepper
    }

    pub fn into_stepper(self) -> Stepper<F> {
        self.stepper
    }

    pub fn run(&mut self, settings: &RunSettings) -> Result<(RunSummary, TimeSeries)> {
        let stride = settings.record_every.max(1);
        let metric = settings.torque_metric;
        let mut series = TimeSeries::default();

        let mut torque = self.stepper.current_torque().get(metric);
        series.samples.push(Sample {
            step: self.stepper.steps_taken(),
            t: self.stepper.time(),
            m_avg: average_magnetization(&self.stepper.state().m),
            torque,
            energy: self.stepper.current_energy(),
            nonconverged: 0,
        });

        info!(
            nodes = self.stepper.state().len(),
            dt = self.stepper.config().dt,
            damp = self.stepper.config().damp,
            max_steps = settings.max_steps,
            "run start"
        );

        let mut nonconverged_steps = 0;
        let mut max_iterations = 0;
        let mut taken = 0;
        let mut pending: Option<Sample> = None;

        let stop_reason = loop {
            if let Some(tau) = settings.torque_threshold {
                if torque <= tau {
                    break StopReason::TorqueBelowThreshold;
                }
            }
            if taken >= settings.max_steps {
                break StopReason::MaxSteps;
            }
            if self.interrupt.load(Ordering::Relaxed) {
                break StopReason::Interrupted;
            }

            let report = self.stepper.step()?;
            taken += 1;
            torque = report.torque.get(metric);
            max_iterations = max_iterations.max(report.max_iterations);
            if !report.all_converged() {
                nonconverged_steps += 1;
            }

            let sample = Sample {
                step: report.step,
                t: self.stepper.time(),
                m_avg: report.m_avg,
                torque,
                energy: report.energy,
                nonconverged: report.nonconverged,
            };
            if report.step % stride == 0 {
                series.samples.push(sample);
                pending = None;
            } else {
                pending = Some(sample);
            }
        };

        // Final state always lands in the series.
        if let Some(sample) = pending {
            series.samples.push(sample);
        }

        info!(
            steps = taken,
            ?stop_reason,
            final_torque = torque,
            nonconverged_steps,
            "run stop"
        );

        Ok((
            RunSummary {
                steps: taken,
                stop_reason,
                final_torque: torque,
                nonconverged_steps,
                max_iterations,
            },
            series,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverSettings;
    use crate::effective_field::ReferenceField;
    use crate::params::StepConfig;
    use crate::state::MeshState;

    fn macrospin(damp: f64) -> Simulation<ReferenceField> {
        let stepper = Stepper::new(
            MeshState::new_tilted(1, 30.0),
            ReferenceField::uniform(1, [0.0, 0.0, 1.0]),
            StepConfig::new(0.05).with_damp(damp),
            DriverSettings::default(),
        )
        .unwrap();
        Simulation::new(stepper)
    }

    #[test]
    fn stops_at_max_steps_and_records_every_stride() {
        let mut sim = macrospin(0.0);
        let settings = RunSettings {
            max_steps: 10,
            record_every: 5,
            ..RunSettings::default()
        };
        let (summary, series) = sim.run(&settings).unwrap();
        assert_eq!(summary.stop_reason, StopReason::MaxSteps);
        assert_eq!(summary.steps, 10);
        let steps: Vec<usize> = series.samples.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 5, 10]);
    }

    #[test]
    fn final_state_is_recorded_off_stride() {
        let mut sim = macrospin(0.0);
        let settings = RunSettings {
            max_steps: 7,
            record_every: 3,
            ..RunSettings::default()
        };
        let (summary, series) = sim.run(&settings).unwrap();
        assert_eq!(summary.steps, 7);
        let steps: Vec<usize> = series.samples.iter().map(|s| s.step).collect();
        assert_eq!(steps, vec![0, 3, 6, 7]);
        let last = series.samples.last().unwrap();
        assert_eq!(last.m_avg, average_magnetization(&sim.stepper().state().m));
    }

    #[test]
    fn damped_macrospin_reaches_torque_threshold() {
        let mut sim = macrospin(0.1);
        let settings = RunSettings {
            max_steps: 5000,
            torque_threshold: Some(1e-3),
            ..RunSettings::default()
        };
        let (summary, series) = sim.run(&settings).unwrap();
        assert_eq!(summary.stop_reason, StopReason::TorqueBelowThreshold);
        assert!(summary.final_torque <= 1e-3);
        assert!(summary.steps < 5000);
        let last = series.samples.last().unwrap();
        assert!(last.m_avg[2] > 0.99, "mz = {}", last.m_avg[2]);
    }

    #[test]
    fn interrupt_flag_stops_before_first_step() {
        let mut sim = macrospin(0.1);
        sim.interrupt_handle().store(true, Ordering::Relaxed);
        let (summary, series) = sim.run(&RunSettings::default()).unwrap();
        assert_eq!(summary.stop_reason, StopReason::Interrupted);
        assert_eq!(summary.steps, 0);
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn csv_has_header_and_one_row_per_sample() {
        let mut sim = macrospin(0.1);
        let (_, series) = sim
            .run(&RunSettings {
                max_steps: 3,
                ..RunSettings::default()
            })
            .unwrap();
        let path = std::env::temp_dir().join(format!("llg_yang_ts_{}.csv", std::process::id()));
        series.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "step,t,mx_avg,my_avg,mz_avg,torque,energy,nonconverged");
        assert_eq!(lines.len(), 1 + series.len());
        assert_eq!(lines.len(), 5);
    }
}
