//! Monte Carlo simulation of the DiD estimators.

pub mod runner;
pub mod stats;
pub mod sweep;

pub use runner::{
    run_repetition, run_simulation, run_simulation_with, CancelToken, EstimatorSummary,
    ReplicateEstimate, SimulationConfig, SimulationSummary,
};
pub use stats::{histogram, HistogramBin, RunningStats};
pub use sweep::{gap_grid, sweep_bias_curve, sweep_bias_curve_with, BiasCurve, BiasCurvePoint};
