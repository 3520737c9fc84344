// src/visualisation.rs

use std::path::Path;

use plotters::prelude::*;

use crate::error::{LlgError, Result};
use crate::simulation::TimeSeries;

/// Plot <m_x>, <m_y>, <m_z> versus time as a PNG.
pub fn save_m_avg_plot(series: &TimeSeries, filename: &Path) -> Result<()> {
    draw_m_avg(series, filename).map_err(|e| LlgError::Plot(e.to_string()))
}

/// Plot the recorded torque metric versus time (log y axis).
pub fn save_torque_plot(series: &TimeSeries, filename: &Path) -> Result<()> {
    draw_torque(series, filename).map_err(|e| LlgError::Plot(e.to_string()))
}

fn draw_m_avg(series: &TimeSeries, filename: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let (Some(first), Some(last)) = (series.samples.first(), series.samples.last()) else {
        return Ok(());
    };

    // Assume m is a unit vector, so components lie in [-1, 1].
    // Give a small margin so the lines don’t touch the frame.
    let y_min = -1.1;
    let y_max = 1.1;

    let t_min = first.t;
    let t_max = if last.t > t_min { last.t } else { t_min + 1.0 };

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Average magnetisation vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("time")
        .y_desc("average magnetisation component")
        .draw()?;

    for (k, (label, colour)) in [("m_x", RED), ("m_y", GREEN), ("m_z", BLUE)]
        .into_iter()
        .enumerate()
    {
        chart
            .draw_series(LineSeries::new(
                series.samples.iter().map(|s| (s.t, s.m_avg[k])),
                &colour,
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &colour));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .draw()?;

    root.present()?;
    Ok(())
}

fn draw_torque(series: &TimeSeries, filename: &Path) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let pts: Vec<(f64, f64)> = series
        .samples
        .iter()
        .filter(|s| s.torque > 0.0 && s.torque.is_finite())
        .map(|s| (s.t, s.torque))
        .collect();
    if pts.is_empty() {
        return Ok(());
    }

    let t_min = pts[0].0;
    let t_max = pts[pts.len() - 1].0.max(t_min + f64::EPSILON);
    let lo = pts.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
    let hi = pts.iter().map(|p| p.1).fold(0.0, f64::max);

    let root = BitMapBackend::new(filename, (1024, 768)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .caption("Torque |m × H| vs time", ("sans-serif", 30))
        .set_left_and_bottom_label_area_size(60)
        .build_cartesian_2d(t_min..t_max, (lo * 0.5..hi * 2.0).log_scale())?;

    chart
        .configure_mesh()
        .x_desc("time")
        .y_desc("torque")
        .draw()?;

    chart.draw_series(LineSeries::new(pts, &BLACK))?;

    root.present()?;
    Ok(())
}
