//! Repeated generate -> estimate simulation.
//!
//! Repetitions are independent: repetition `r` draws from the stream
//! `RandomSource::for_stream(seed, r)`. They are grouped into fixed-size
//! blocks; each block is reduced sequentially into a [`RunningStats`]
//! accumulator and block accumulators are merged in block order. The summary
//! is therefore bit-for-bit identical whether blocks run sequentially or in
//! parallel, on any number of threads.

use crate::data::ParameterSet;
use crate::error::{DidError, Result};
use crate::estimate::{estimate, EstimateResult};
use crate::generate::panel::{build_panel, Window};
use crate::generate::placebo::build_placebo;
use crate::generate::PlaceboMode;
use crate::random::RandomSource;
use crate::simulate::stats::{histogram, HistogramBin, RunningStats};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Cooperative cancellation flag shared between a caller and a running job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// New, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution options for a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Base seed; repetition `r` uses stream `seed + r`.
    pub seed: u64,
    /// Run blocks on the rayon pool.
    pub parallel: bool,
    /// Retain every repetition's estimates (needed for histograms and
    /// per-replicate export).
    pub keep_estimates: bool,
    /// Generate placebo panels instead of treatment panels.
    pub placebo: Option<PlaceboMode>,
    /// Repetitions per block.
    pub block_size: usize,
    /// Cancellation flag, checked before each block.
    pub cancel: Option<CancelToken>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            parallel: true,
            keep_estimates: true,
            placebo: None,
            block_size: 256,
            cancel: None,
        }
    }
}

impl SimulationConfig {
    /// Sequential execution, no retained estimates.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            keep_estimates: false,
            ..Default::default()
        }
    }

    /// Set the base seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Enable or disable parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Enable or disable retention of per-repetition estimates.
    pub fn with_keep_estimates(mut self, keep: bool) -> Self {
        self.keep_estimates = keep;
        self
    }

    /// Run placebo panels in the given mode.
    pub fn with_placebo(mut self, mode: PlaceboMode) -> Self {
        self.placebo = Some(mode);
        self
    }

    /// Set the block size.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Check option invariants.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(DidError::InvalidParameter(
                "block_size must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}

/// One repetition's point estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicateEstimate {
    pub replicate: usize,
    pub att_diff_in_means: f64,
    pub att_regression: f64,
}

/// Distribution summary of one estimator across repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorSummary {
    /// Mean estimate.
    pub mean: f64,
    /// Sample standard deviation of the estimates.
    pub std: f64,
    /// Smallest estimate.
    pub min: f64,
    /// Largest estimate.
    pub max: f64,
    /// `mean - target`.
    pub mean_bias: f64,
    /// Root mean squared error against the target.
    pub rmse: f64,
}

impl EstimatorSummary {
    fn from_stats(stats: &RunningStats, target: f64) -> Self {
        let mean = stats.mean();
        let mean_bias = mean - target;
        Self {
            mean,
            std: stats.std_dev(),
            min: stats.min(),
            max: stats.max(),
            mean_bias,
            rmse: (mean_bias * mean_bias + stats.population_variance()).sqrt(),
        }
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSummary {
    /// Parameters the run used.
    pub params: ParameterSet,
    /// Configured true effect (echo of `params.tau`).
    pub true_tau: f64,
    /// Value the estimates are compared against: `tau`, or 0 for placebo runs.
    pub target: f64,
    /// Placebo mode, if any.
    pub placebo: Option<PlaceboMode>,
    /// Base seed.
    pub seed: u64,
    /// Requested repetitions.
    pub n_reps: usize,
    /// Repetitions actually completed.
    pub n_completed: usize,
    /// False when the run was cancelled before all repetitions finished.
    pub complete: bool,
    /// Difference-in-means estimator.
    pub diff_in_means: EstimatorSummary,
    /// Regression estimator.
    pub regression: EstimatorSummary,
    /// Mean classical SE, over repetitions where it is defined.
    pub mean_regression_se: Option<f64>,
    /// Share of 95% intervals containing the target.
    pub ci_coverage: Option<f64>,
    /// Largest |diff-in-means - regression| over repetitions.
    pub max_estimator_gap: f64,
    /// Per-repetition estimates, when retained.
    pub estimates: Option<Vec<ReplicateEstimate>>,
    /// Wall-clock runtime.
    pub runtime_seconds: f64,
}

/// Equality over every statistical field; `runtime_seconds` is ignored.
impl PartialEq for SimulationSummary {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.true_tau.to_bits() == other.true_tau.to_bits()
            && self.target.to_bits() == other.target.to_bits()
            && self.placebo == other.placebo
            && self.seed == other.seed
            && self.n_reps == other.n_reps
            && self.n_completed == other.n_completed
            && self.complete == other.complete
            && self.diff_in_means == other.diff_in_means
            && self.regression == other.regression
            && self.mean_regression_se == other.mean_regression_se
            && self.ci_coverage == other.ci_coverage
            && self.max_estimator_gap.to_bits() == other.max_estimator_gap.to_bits()
            && self.estimates == other.estimates
    }
}

impl SimulationSummary {
    /// Mean bias of the difference-in-means estimator.
    pub fn mean_bias(&self) -> f64 {
        self.diff_in_means.mean_bias
    }

    /// Histogram of retained difference-in-means estimates.
    pub fn histogram(&self, n_bins: usize) -> Option<Vec<HistogramBin>> {
        let estimates = self.estimates.as_ref()?;
        let values: Vec<f64> = estimates.iter().map(|e| e.att_diff_in_means).collect();
        Some(histogram(&values, n_bins))
    }

    /// Write retained estimates as CSV
    /// (`replicate,att_diff_in_means,att_regression`).
    pub fn write_estimates_csv<W: Write>(&self, writer: W) -> Result<()> {
        let estimates = self.estimates.as_ref().ok_or_else(|| {
            DidError::InvalidParameter(
                "estimates were not retained; enable keep_estimates".to_string(),
            )
        })?;
        let mut wtr = csv::Writer::from_writer(writer);
        for e in estimates {
            wtr.serialize(e)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Retained estimates as a CSV string.
    pub fn estimates_to_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_estimates_csv(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| DidError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-block reduction state.
#[derive(Debug, Default)]
struct BlockAccumulator {
    diff_in_means: RunningStats,
    regression: RunningStats,
    regression_se: RunningStats,
    n_ci: u64,
    n_covered: u64,
    max_gap: f64,
    estimates: Vec<ReplicateEstimate>,
}

impl BlockAccumulator {
    fn push(&mut self, replicate: usize, est: &EstimateResult, target: f64, keep: bool) {
        self.diff_in_means.push(est.att_diff_in_means);
        self.regression.push(est.att_regression);
        if let Some(se) = est.regression_se {
            self.regression_se.push(se);
        }
        if let Some(covered) = est.ci_covers(target) {
            self.n_ci += 1;
            self.n_covered += covered as u64;
        }
        self.max_gap = self.max_gap.max(est.estimator_gap());
        if keep {
            self.estimates.push(ReplicateEstimate {
                replicate,
                att_diff_in_means: est.att_diff_in_means,
                att_regression: est.att_regression,
            });
        }
    }

    fn merge(&mut self, other: BlockAccumulator) {
        self.diff_in_means.merge(&other.diff_in_means);
        self.regression.merge(&other.regression);
        self.regression_se.merge(&other.regression_se);
        self.n_ci += other.n_ci;
        self.n_covered += other.n_covered;
        self.max_gap = self.max_gap.max(other.max_gap);
        self.estimates.extend(other.estimates);
    }
}

/// Run one repetition on its own random stream.
pub fn run_repetition(
    params: &ParameterSet,
    config: &SimulationConfig,
    replicate: usize,
) -> Result<EstimateResult> {
    params.validate()?;
    repetition(params, config, replicate)
}

// Parameters are validated once at run entry, not per repetition.
fn repetition(
    params: &ParameterSet,
    config: &SimulationConfig,
    replicate: usize,
) -> Result<EstimateResult> {
    let mut rng = RandomSource::for_stream(config.seed, replicate as u64);
    let panel = match config.placebo {
        None => build_panel(params, &mut rng, Window::Treatment)?,
        Some(mode) => build_placebo(params, &mut rng, mode)?,
    };
    estimate(&panel)
}

fn run_block(
    params: &ParameterSet,
    config: &SimulationConfig,
    block: usize,
    target: f64,
) -> Result<Option<BlockAccumulator>> {
    if config.is_cancelled() {
        return Ok(None);
    }
    let start = block * config.block_size;
    let end = (start + config.block_size).min(params.n_reps);

    let mut acc = BlockAccumulator::default();
    for replicate in start..end {
        let est = repetition(params, config, replicate)?;
        acc.push(replicate, &est, target, config.keep_estimates);
    }
    debug!("block {} finished repetitions {}..{}", block, start, end);
    Ok(Some(acc))
}

/// Run `params.n_reps` repetitions with default options.
pub fn run_simulation(params: &ParameterSet) -> Result<SimulationSummary> {
    run_simulation_with(params, &SimulationConfig::default())
}

/// Run `params.n_reps` repetitions.
///
/// Parameters are validated before any repetition starts. The first failing
/// repetition aborts the run and its error is returned unchanged.
pub fn run_simulation_with(
    params: &ParameterSet,
    config: &SimulationConfig,
) -> Result<SimulationSummary> {
    params.validate()?;
    config.validate()?;

    let start = Instant::now();
    let target = if config.placebo.is_some() { 0.0 } else { params.tau };
    let n_blocks = params.n_reps.div_ceil(config.block_size);

    info!(
        "simulating {} repetitions (N = {}, tau = {}, gap = {}, epsilon = {}, placebo = {:?})",
        params.n_reps,
        params.n_units,
        params.tau,
        params.trend_gap(),
        params.epsilon,
        config.placebo
    );

    let blocks: Vec<Option<BlockAccumulator>> = if config.parallel {
        (0..n_blocks)
            .into_par_iter()
            .map(|b| run_block(params, config, b, target))
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..n_blocks)
            .map(|b| run_block(params, config, b, target))
            .collect::<Result<Vec<_>>>()?
    };

    let mut total = BlockAccumulator::default();
    for block in blocks.into_iter().flatten() {
        total.merge(block);
    }

    let n_completed = total.diff_in_means.count() as usize;
    let complete = n_completed == params.n_reps;
    if !complete {
        warn!(
            "simulation cancelled after {} of {} repetitions",
            n_completed, params.n_reps
        );
    }

    let mean_regression_se =
        (total.regression_se.count() > 0).then(|| total.regression_se.mean());
    let ci_coverage = (total.n_ci > 0).then(|| total.n_covered as f64 / total.n_ci as f64);

    let summary = SimulationSummary {
        params: params.clone(),
        true_tau: params.tau,
        target,
        placebo: config.placebo,
        seed: config.seed,
        n_reps: params.n_reps,
        n_completed,
        complete,
        diff_in_means: EstimatorSummary::from_stats(&total.diff_in_means, target),
        regression: EstimatorSummary::from_stats(&total.regression, target),
        mean_regression_se,
        ci_coverage,
        max_estimator_gap: total.max_gap,
        estimates: config.keep_estimates.then_some(total.estimates),
        runtime_seconds: start.elapsed().as_secs_f64(),
    };

    info!(
        "simulation done in {:.3}s: mean bias {:.4}",
        summary.runtime_seconds,
        summary.mean_bias()
    );

    Ok(summary)
}

impl std::fmt::Display for SimulationSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "DiD Simulation Results")?;
        writeln!(f, "======================")?;
        writeln!(f)?;
        writeln!(
            f,
            "N per group: {}   Repetitions: {}/{}{}",
            self.params.n_units,
            self.n_completed,
            self.n_reps,
            if self.complete { "" } else { " (incomplete)" }
        )?;
        writeln!(
            f,
            "True tau: {:.3}   Trend gap: {:.3}   Noise sd: {:.3}",
            self.true_tau,
            self.params.trend_gap(),
            self.params.epsilon
        )?;
        if let Some(mode) = self.placebo {
            writeln!(f, "Placebo mode: {} (target 0)", mode)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:<18} {:>10} {:>10} {:>10} {:>10}",
            "Estimator", "Mean", "Std", "Bias", "RMSE"
        )?;
        for (name, s) in [
            ("diff-in-means", &self.diff_in_means),
            ("regression", &self.regression),
        ] {
            writeln!(
                f,
                "{:<18} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                name, s.mean, s.std, s.mean_bias, s.rmse
            )?;
        }
        writeln!(f)?;
        if let Some(se) = self.mean_regression_se {
            writeln!(f, "Mean regression SE: {:.4}", se)?;
        }
        if let Some(coverage) = self.ci_coverage {
            writeln!(f, "95% CI coverage:    {:.1}%", coverage * 100.0)?;
        }
        writeln!(f, "Max estimator gap:  {:.2e}", self.max_estimator_gap)?;
        write!(f, "Runtime:            {:.3}s", self.runtime_seconds)
    }
}
