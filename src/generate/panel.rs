//! Synthetic two-period panel generation.

use crate::data::{PanelDataset, PanelRow, ParameterSet};
use crate::error::Result;
use crate::random::RandomSource;

/// Where the observed two-period window sits on the unit's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Window {
    /// Periods (0, 1): treatment starts at observed period 1.
    Treatment,
    /// Periods (-1, 0): both observed periods precede treatment onset.
    PreTreatment,
}

/// Generate one panel dataset from a seed.
///
/// Units `0..N` are control and `N..2N` are treated. Rows are ordered by
/// unit, then period. With `epsilon == 0` every cell mean equals its
/// theoretical value exactly.
pub fn generate_panel(params: &ParameterSet, seed: u64) -> Result<PanelDataset> {
    params.validate()?;
    let mut rng = RandomSource::new(seed);
    generate_panel_with(params, &mut rng)
}

/// Generate one panel dataset from an existing random source.
pub fn generate_panel_with(params: &ParameterSet, rng: &mut RandomSource) -> Result<PanelDataset> {
    params.validate()?;
    build_panel(params, rng, Window::Treatment)
}

pub(crate) fn build_panel(
    params: &ParameterSet,
    rng: &mut RandomSource,
    window: Window,
) -> Result<PanelDataset> {
    let n = params.n_units;
    let noise = rng.draw_normal(0.0, params.epsilon, params.n_rows())?;

    let mut rows = Vec::with_capacity(params.n_rows());
    for unit in 0..params.total_units() {
        let treated = unit >= n;
        let (mu, beta) = if treated {
            (params.mu_treated, params.beta_treated)
        } else {
            (params.mu_control, params.beta_control)
        };

        for time in 0..2u8 {
            let mean = expected_outcome(mu, beta, params.tau, treated, time, window);
            rows.push(PanelRow {
                unit,
                time,
                treated: treated as u8,
                outcome: mean + noise[2 * unit + time as usize],
            });
        }
    }

    Ok(PanelDataset::from_rows_unchecked(rows))
}

fn expected_outcome(mu: f64, beta: f64, tau: f64, treated: bool, time: u8, window: Window) -> f64 {
    match (window, time) {
        (Window::Treatment, 0) => mu,
        (Window::Treatment, _) => {
            if treated {
                mu + beta + tau
            } else {
                mu + beta
            }
        }
        (Window::PreTreatment, 0) => mu - beta,
        (Window::PreTreatment, _) => mu,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cell_mean(panel: &PanelDataset, treated: u8, time: u8) -> f64 {
        let values: Vec<f64> = panel
            .iter()
            .filter(|r| r.treated == treated && r.time == time)
            .map(|r| r.outcome)
            .collect();
        values.iter().sum::<f64>() / values.len() as f64
    }

    #[test]
    fn test_shape_and_split() {
        let params = ParameterSet::default().with_units(7);
        let panel = generate_panel(&params, 1).unwrap();

        assert_eq!(panel.len(), 28);
        assert_eq!(panel.n_units(), 14);
        assert_eq!(panel.n_treated_units(), 7);
        assert_eq!(panel.iter().filter(|r| r.time == 1).count(), 14);
    }

    #[test]
    fn test_single_unit_per_group() {
        let params = ParameterSet::default().with_units(1);
        let panel = generate_panel(&params, 3).unwrap();
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.n_treated_units(), 1);
    }

    #[test]
    fn test_noiseless_means_are_exact() {
        let params = ParameterSet::noiseless()
            .with_baselines(10.0, 40.0)
            .with_trends(6.0, 4.0)
            .with_tau(8.0)
            .with_units(25);
        let panel = generate_panel(&params, 99).unwrap();

        assert_eq!(cell_mean(&panel, 0, 0), 40.0);
        assert_eq!(cell_mean(&panel, 0, 1), 44.0);
        assert_eq!(cell_mean(&panel, 1, 0), 10.0);
        assert_eq!(cell_mean(&panel, 1, 1), 24.0);
    }

    #[test]
    fn test_means_converge_with_large_n() {
        let params = ParameterSet::default().with_epsilon(1.0).with_units(20_000);
        let panel = generate_panel(&params, 5).unwrap();

        let control_change = cell_mean(&panel, 0, 1) - cell_mean(&panel, 0, 0);
        let treated_change = cell_mean(&panel, 1, 1) - cell_mean(&panel, 1, 0);
        assert_relative_eq!(control_change, params.beta_control, epsilon = 0.05);
        assert_relative_eq!(
            treated_change,
            params.beta_control + params.trend_gap() + params.tau,
            epsilon = 0.05
        );
    }

    #[test]
    fn test_reproducible() {
        let params = ParameterSet::default().with_units(10);
        assert_eq!(generate_panel(&params, 11).unwrap(), generate_panel(&params, 11).unwrap());
        assert_ne!(generate_panel(&params, 11).unwrap(), generate_panel(&params, 12).unwrap());
    }

    #[test]
    fn test_invalid_params_fail_eagerly() {
        let params = ParameterSet::default().with_units(0);
        assert!(generate_panel(&params, 0).is_err());
    }

    #[test]
    fn test_pre_treatment_window() {
        let params = ParameterSet::noiseless().with_units(3);
        let mut rng = RandomSource::new(0);
        let panel = build_panel(&params, &mut rng, Window::PreTreatment).unwrap();

        assert_eq!(cell_mean(&panel, 1, 0), params.mu_treated - params.beta_treated);
        assert_eq!(cell_mean(&panel, 1, 1), params.mu_treated);
    }
}
