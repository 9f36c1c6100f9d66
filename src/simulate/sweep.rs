//! Bias as a function of the parallel-trends violation.
//!
//! Every sweep point reuses the same base seed, so each point sees the same
//! noise draws and differences in bias between points are driven only by the
//! trend gap.

use crate::data::ParameterSet;
use crate::error::{DidError, Result};
use crate::simulate::runner::{run_simulation_with, SimulationConfig};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::time::Instant;

/// Bias at one trend gap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiasCurvePoint {
    /// `beta_treated - beta_control`.
    pub trend_gap: f64,
    /// Mean bias of the difference-in-means estimator.
    pub mean_bias: f64,
    /// Mean bias of the regression estimator.
    pub mean_bias_regression: f64,
    /// Standard deviation of the estimates at this gap.
    pub bias_std: f64,
    /// Repetitions behind the point.
    pub n_reps: usize,
}

/// Ordered bias-vs-gap series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasCurve {
    /// Points in input gap order.
    pub points: Vec<BiasCurvePoint>,
    /// False when the sweep was cancelled; `points` then holds only the
    /// finished prefix.
    pub complete: bool,
    /// True effect used at every point.
    pub true_tau: f64,
    /// Base seed shared by every point.
    pub seed: u64,
}

impl BiasCurve {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when there are no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Trend gaps, in order.
    pub fn gaps(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.trend_gap).collect()
    }

    /// Mean biases, in order.
    pub fn biases(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean_bias).collect()
    }

    /// Least-squares slope of mean bias on trend gap.
    ///
    /// `None` with fewer than two distinct gaps.
    pub fn slope(&self) -> Option<f64> {
        let n = self.points.len();
        if n < 2 {
            return None;
        }
        let mean_x = self.points.iter().map(|p| p.trend_gap).sum::<f64>() / n as f64;
        let mean_y = self.points.iter().map(|p| p.mean_bias).sum::<f64>() / n as f64;
        let sxx: f64 = self.points.iter().map(|p| (p.trend_gap - mean_x).powi(2)).sum();
        if sxx <= 0.0 {
            return None;
        }
        let sxy: f64 = self
            .points
            .iter()
            .map(|p| (p.trend_gap - mean_x) * (p.mean_bias - mean_y))
            .sum();
        Some(sxy / sxx)
    }

    /// Write as CSV
    /// (`trend_gap,mean_bias,mean_bias_regression,bias_std,n_reps`).
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for p in &self.points {
            wtr.serialize(p)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// CSV as a string.
    pub fn to_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| DidError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl std::fmt::Display for BiasCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Bias vs Trend Gap")?;
        writeln!(f, "=================")?;
        writeln!(f, "True tau: {:.3}{}", self.true_tau, if self.complete { "" } else { " (incomplete)" })?;
        writeln!(f)?;
        writeln!(
            f,
            "{:>10} {:>12} {:>12} {:>10}",
            "Gap", "Bias (DiM)", "Bias (OLS)", "Std"
        )?;
        for p in &self.points {
            writeln!(
                f,
                "{:>10.3} {:>12.4} {:>12.4} {:>10.4}",
                p.trend_gap, p.mean_bias, p.mean_bias_regression, p.bias_std
            )?;
        }
        if let Some(slope) = self.slope() {
            write!(f, "\nSlope of bias on gap: {:.4}", slope)?;
        }
        Ok(())
    }
}

/// `n` evenly spaced values from `start` to `end` inclusive.
pub fn gap_grid(start: f64, end: f64, n: usize) -> Result<Vec<f64>> {
    if !start.is_finite() || !end.is_finite() {
        return Err(DidError::InvalidParameter(
            "gap range must be finite".to_string(),
        ));
    }
    match n {
        0 => Err(DidError::InvalidParameter(
            "gap grid needs at least one point".to_string(),
        )),
        1 => Ok(vec![start]),
        _ => {
            let step = (end - start) / (n - 1) as f64;
            let mut grid: Vec<f64> = (0..n).map(|i| start + i as f64 * step).collect();
            grid[n - 1] = end;
            Ok(grid)
        }
    }
}

/// Sweep the trend gap with default options: parallel, estimates not kept.
pub fn sweep_bias_curve(base: &ParameterSet, gaps: &[f64]) -> Result<BiasCurve> {
    sweep_bias_curve_with(
        base,
        gaps,
        &SimulationConfig::default().with_keep_estimates(false),
    )
}

/// Sweep the trend gap.
///
/// For each gap, runs a simulation with `beta_treated = beta_control + gap`
/// and everything else from `base`. A failing point aborts the sweep.
pub fn sweep_bias_curve_with(
    base: &ParameterSet,
    gaps: &[f64],
    config: &SimulationConfig,
) -> Result<BiasCurve> {
    base.validate()?;
    config.validate()?;
    if let Some(bad) = gaps.iter().find(|g| !g.is_finite()) {
        return Err(DidError::InvalidParameter(format!(
            "trend gaps must be finite, got {}",
            bad
        )));
    }

    let start = Instant::now();
    info!("sweeping {} trend gaps, {} repetitions each", gaps.len(), base.n_reps);

    let mut points = Vec::with_capacity(gaps.len());
    let mut complete = true;

    for &gap in gaps {
        if config.is_cancelled() {
            complete = false;
            break;
        }
        let params = base.clone().with_trend_gap(gap);
        let summary = run_simulation_with(&params, config)?;
        if !summary.complete {
            complete = false;
            break;
        }
        debug!("gap {:.4}: mean bias {:.6}", gap, summary.mean_bias());
        points.push(BiasCurvePoint {
            trend_gap: gap,
            mean_bias: summary.diff_in_means.mean_bias,
            mean_bias_regression: summary.regression.mean_bias,
            bias_std: summary.diff_in_means.std,
            n_reps: summary.n_completed,
        });
    }

    if complete {
        info!("sweep done in {:.3}s", start.elapsed().as_secs_f64());
    } else {
        warn!("sweep cancelled after {} of {} points", points.len(), gaps.len());
    }

    Ok(BiasCurve {
        points,
        complete,
        true_tau: base.tau,
        seed: config.seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::runner::CancelToken;
    use approx::assert_relative_eq;

    #[test]
    fn test_gap_grid() {
        assert_eq!(gap_grid(-2.0, 2.0, 5).unwrap(), vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert_eq!(gap_grid(3.0, 9.0, 1).unwrap(), vec![3.0]);
        assert!(gap_grid(0.0, 1.0, 0).is_err());
        assert!(gap_grid(f64::NAN, 1.0, 3).is_err());
    }

    #[test]
    fn test_noiseless_bias_equals_gap() {
        let base = ParameterSet::noiseless().with_units(4).with_reps(10);
        let gaps = [-2.0, -1.0, 0.0, 1.0, 2.0];
        let curve = sweep_bias_curve(&base, &gaps).unwrap();

        assert!(curve.complete);
        assert_eq!(curve.biases(), gaps.to_vec());
        for p in &curve.points {
            assert_relative_eq!(p.mean_bias_regression, p.trend_gap, epsilon = 1e-9);
            assert_eq!(p.bias_std, 0.0);
        }
        assert_relative_eq!(curve.slope().unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_common_random_numbers_make_curve_linear() {
        let base = ParameterSet::default().with_units(20).with_reps(50);
        let curve = sweep_bias_curve(&base, &[0.0, 0.5, 3.0]).unwrap();
        let b0 = curve.points[0].mean_bias;
        for p in &curve.points {
            assert_relative_eq!(p.mean_bias - b0, p.trend_gap, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_default_sweep_matches_sequential() {
        let base = ParameterSet::default().with_units(8).with_reps(600);
        let gaps = [-1.0, 0.0, 2.0];
        let parallel = sweep_bias_curve(&base, &gaps).unwrap();
        let sequential = sweep_bias_curve_with(
            &base,
            &gaps,
            &SimulationConfig::default()
                .with_parallel(false)
                .with_keep_estimates(false),
        )
        .unwrap();
        assert_eq!(parallel.points, sequential.points);
    }

    #[test]
    fn test_non_finite_gap_rejected() {
        let base = ParameterSet::default().with_reps(2);
        assert!(matches!(
            sweep_bias_curve(&base, &[0.0, f64::INFINITY]),
            Err(DidError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_empty_sweep() {
        let curve = sweep_bias_curve(&ParameterSet::default(), &[]).unwrap();
        assert!(curve.is_empty());
        assert!(curve.complete);
        assert!(curve.slope().is_none());
    }

    #[test]
    fn test_cancelled_sweep() {
        let token = CancelToken::new();
        token.cancel();
        let config = SimulationConfig::sequential().with_cancel(token);
        let curve =
            sweep_bias_curve_with(&ParameterSet::default().with_reps(3), &[0.0, 1.0], &config)
                .unwrap();
        assert!(!curve.complete);
        assert!(curve.is_empty());
    }

    #[test]
    fn test_exports() {
        let base = ParameterSet::noiseless().with_units(2).with_reps(3);
        let curve = sweep_bias_curve(&base, &[0.0, 1.0]).unwrap();
        let csv = curve.to_csv().unwrap();
        assert!(csv.starts_with("trend_gap,mean_bias,mean_bias_regression,bias_std,n_reps"));
        assert_eq!(csv.lines().count(), 3);
        assert!(curve.to_json().unwrap().contains("\"points\""));
        assert!(curve.to_string().contains("Slope of bias on gap: 1.0000"));
    }
}
