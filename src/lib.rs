//! Difference-in-Differences Simulation Library
//!
//! Generates synthetic two-group, two-period panels, estimates the treatment
//! effect on the treated, and studies the estimators by repeated simulation.
//!
//! # Overview
//!
//! - **data**: Parameter sets and panel datasets
//! - **random**: Seeded random streams
//! - **generate**: Panel and placebo panel generation
//! - **estimate**: Difference-in-means and interaction regression
//! - **simulate**: Repeated simulation, summaries and bias-vs-gap sweeps
//!
//! # Example
//!
//! ```no_run
//! use did_lab::prelude::*;
//!
//! let params = ParameterSet::default().with_trend_gap(1.5);
//!
//! // One draw
//! let panel = generate_panel(&params, 42).unwrap();
//! let est = estimate(&panel).unwrap();
//! println!("ATT = {:.3}", est.att_diff_in_means);
//!
//! // Sampling distribution
//! let summary = run_simulation(&params).unwrap();
//! println!("{}", summary);
//!
//! // Bias as a function of the trend gap
//! let curve = sweep_bias_curve(&params, &gap_grid(-2.0, 2.0, 9).unwrap()).unwrap();
//! println!("{}", curve);
//! ```

pub mod data;
pub mod error;
pub mod estimate;
pub mod generate;
pub mod random;
pub mod simulate;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{PanelDataset, PanelRow, ParameterSet};
    pub use crate::error::{DidError, Result};
    pub use crate::estimate::{
        diff_in_means, estimate, fit_regression, CellMeans, EstimateResult, RegressionFit,
    };
    pub use crate::generate::{
        generate_panel, generate_panel_with, generate_placebo, generate_placebo_with,
        PlaceboMode,
    };
    pub use crate::random::RandomSource;
    pub use crate::simulate::{
        gap_grid, histogram, run_repetition, run_simulation, run_simulation_with,
        sweep_bias_curve, sweep_bias_curve_with, BiasCurve, BiasCurvePoint, CancelToken,
        EstimatorSummary, HistogramBin, ReplicateEstimate, RunningStats, SimulationConfig,
        SimulationSummary,
    };
}
