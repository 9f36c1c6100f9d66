//! DiD estimators: difference-in-means and interaction regression.

pub mod means;
pub mod regression;

pub use means::{diff_in_means, CellMeans};
pub use regression::{fit_regression, RegressionFit, COEFFICIENT_NAMES};

use crate::data::PanelDataset;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Both ATT estimates for one panel, plus regression inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateResult {
    /// Difference-in-means ATT.
    pub att_diff_in_means: f64,
    /// Interaction coefficient from the regression.
    pub att_regression: f64,
    /// Classical OLS SE of the interaction.
    pub regression_se: Option<f64>,
    /// HC2 robust SE of the interaction.
    pub robust_se: Option<f64>,
    /// Lower bound of the 95% interval.
    pub ci_lower: Option<f64>,
    /// Upper bound of the 95% interval.
    pub ci_upper: Option<f64>,
    /// Two-sided p-value for a zero effect.
    pub p_value: Option<f64>,
    /// Cell means behind the difference-in-means estimate.
    pub cell_means: CellMeans,
}

impl EstimateResult {
    /// Absolute difference between the two estimates.
    pub fn estimator_gap(&self) -> f64 {
        (self.att_diff_in_means - self.att_regression).abs()
    }

    /// Whether the 95% interval contains `value`; `None` without an interval.
    pub fn ci_covers(&self, value: f64) -> Option<bool> {
        match (self.ci_lower, self.ci_upper) {
            (Some(lo), Some(hi)) => Some(lo <= value && value <= hi),
            _ => None,
        }
    }
}

/// Estimate the ATT both ways.
pub fn estimate(panel: &PanelDataset) -> Result<EstimateResult> {
    let cell_means = diff_in_means(panel)?;
    let fit = fit_regression(panel)?;
    let ci = fit.confidence_interval(0.95);

    Ok(EstimateResult {
        att_diff_in_means: cell_means.att(),
        att_regression: fit.att(),
        regression_se: fit.att_se(),
        robust_se: fit.att_robust_se(),
        ci_lower: ci.map(|(lo, _)| lo),
        ci_upper: ci.map(|(_, hi)| hi),
        p_value: fit.p_value(),
        cell_means,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ParameterSet;
    use crate::error::DidError;
    use crate::generate::generate_panel;
    use approx::assert_relative_eq;

    #[test]
    fn test_estimators_agree() {
        for seed in 0..20 {
            let params = ParameterSet::default().with_units(15).with_trend_gap(0.7);
            let panel = generate_panel(&params, seed).unwrap();
            let est = estimate(&panel).unwrap();
            assert_relative_eq!(
                est.att_diff_in_means,
                est.att_regression,
                epsilon = 1e-9,
                max_relative = 1e-9
            );
        }
    }

    #[test]
    fn test_noiseless_recovers_tau() {
        let params = ParameterSet::noiseless().with_tau(-12.0).with_units(10);
        let est = estimate(&generate_panel(&params, 1).unwrap()).unwrap();
        assert_eq!(est.att_diff_in_means, -12.0);
        assert_relative_eq!(est.att_regression, -12.0, epsilon = 1e-9);
    }

    #[test]
    fn test_single_unit_groups() {
        let params = ParameterSet::default().with_units(1);
        let est = estimate(&generate_panel(&params, 8).unwrap()).unwrap();
        assert!(est.att_diff_in_means.is_finite());
        assert!(est.att_regression.is_finite());
        assert!(est.regression_se.is_none());
        assert!(est.ci_covers(params.tau).is_none());
    }

    #[test]
    fn test_inference_fields() {
        let params = ParameterSet::default().with_units(200);
        let est = estimate(&generate_panel(&params, 2).unwrap()).unwrap();
        assert!(est.regression_se.unwrap() > 0.0);
        assert!(est.robust_se.unwrap() > 0.0);
        assert!(est.ci_lower.unwrap() < est.ci_upper.unwrap());
        assert!(est.p_value.unwrap() < 0.05);
        assert!(est.estimator_gap() < 1e-9);
    }

    #[test]
    fn test_degenerate_panel_propagates() {
        let params = ParameterSet::default().with_units(3);
        let panel = generate_panel(&params, 0).unwrap();
        let all_control = panel.relabel_units(&[0; 6]).unwrap();
        assert!(matches!(
            estimate(&all_control),
            Err(DidError::InsufficientVariation(_))
        ));
    }
}
