//! Basic DiD simulation study
//!
//! Run with: cargo run --example basic_simulation

use did_lab::prelude::*;
use log::info;
use simple_logger::SimpleLogger;

fn main() -> Result<()> {
    SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .init()
        .map_err(|e| DidError::InvalidParameter(e.to_string()))?;

    let params = ParameterSet::parallel_trends().with_units(50).with_reps(2000);
    info!("Parameters:\n{}", params.to_yaml()?);

    // One panel and its estimates
    let panel = generate_panel(&params, 7)?;
    let est = estimate(&panel)?;
    info!(
        "Single draw: ATT {:.3} (true {:.1}), regression {:.3}",
        est.att_diff_in_means, params.tau, est.att_regression
    );

    // Sampling distribution under parallel trends
    let summary = run_simulation(&params)?;
    println!("{}\n", summary);

    // Placebo checks should centre on zero
    for mode in [PlaceboMode::ReshuffleLabels, PlaceboMode::ShiftPeriod] {
        let config = SimulationConfig::sequential().with_placebo(mode);
        let placebo = run_simulation_with(&params, &config)?;
        info!("Placebo {}: mean estimate {:.4}", mode, placebo.diff_in_means.mean);
    }

    // Bias grows one-for-one with the trend gap
    let gaps = gap_grid(-2.0, 2.0, 5)?;
    let curve = sweep_bias_curve(&params.clone().with_reps(500), &gaps)?;
    println!("{}", curve);

    Ok(())
}
