//! Two-way interaction regression estimator.
//!
//! Fits `outcome = b0 + b1*treated + b2*time + b3*(treated x time) + e` by OLS.
//! `b3` is the DiD estimate and equals the difference-in-means ATT for a
//! two-group, two-period panel.

use crate::data::PanelDataset;
use crate::error::{DidError, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Coefficient names, in column order.
pub const COEFFICIENT_NAMES: [&str; 4] = ["(Intercept)", "treated", "time", "treated:time"];

/// Index of the interaction coefficient.
pub const INTERACTION: usize = 3;

const N_COEF: usize = 4;

/// OLS fit of the interaction model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionFit {
    /// Estimated coefficients, see [`COEFFICIENT_NAMES`].
    pub coefficients: Vec<f64>,
    /// Classical OLS standard errors; `None` when the model is saturated.
    pub std_errors: Option<Vec<f64>>,
    /// HC2 heteroskedasticity-robust standard errors; `None` when some
    /// observation has leverage 1.
    pub robust_std_errors: Option<Vec<f64>>,
    /// Residual standard error.
    pub sigma: Option<f64>,
    /// R-squared.
    pub r_squared: f64,
    /// Residual degrees of freedom.
    pub df_residual: usize,
    /// Number of observations.
    pub n_obs: usize,
}

impl RegressionFit {
    /// The DiD estimate (interaction coefficient).
    pub fn att(&self) -> f64 {
        self.coefficients[INTERACTION]
    }

    /// Classical SE of the interaction.
    pub fn att_se(&self) -> Option<f64> {
        self.std_errors.as_ref().map(|se| se[INTERACTION])
    }

    /// HC2 SE of the interaction.
    pub fn att_robust_se(&self) -> Option<f64> {
        self.robust_std_errors.as_ref().map(|se| se[INTERACTION])
    }

    /// SE used for inference: HC2 when available, classical otherwise.
    pub fn inference_se(&self) -> Option<f64> {
        self.att_robust_se()
            .or_else(|| self.att_se())
            .filter(|se| se.is_finite())
    }

    /// Normal-approximation confidence interval for the interaction.
    pub fn confidence_interval(&self, level: f64) -> Option<(f64, f64)> {
        if !(level > 0.0 && level < 1.0) {
            return None;
        }
        let se = self.inference_se()?;
        let z = Normal::new(0.0, 1.0).ok()?.inverse_cdf(0.5 + level / 2.0);
        Some((self.att() - z * se, self.att() + z * se))
    }

    /// Two-sided p-value for H0: interaction = 0.
    pub fn p_value(&self) -> Option<f64> {
        let se = self.inference_se()?;
        if se <= 0.0 {
            return None;
        }
        let z = (self.att() / se).abs();
        let normal = Normal::new(0.0, 1.0).ok()?;
        Some(2.0 * (1.0 - normal.cdf(z)))
    }
}

/// Fit the interaction regression.
///
/// Fails with [`DidError::InsufficientVariation`] when the design matrix is
/// singular, which for this model means some treated x period cell is empty.
pub fn fit_regression(panel: &PanelDataset) -> Result<RegressionFit> {
    let n = panel.len();

    let mut cells = [0usize; 4];
    for row in panel {
        cells[(row.treated as usize) * 2 + row.time as usize] += 1;
    }
    if cells.iter().any(|&c| c == 0) {
        return Err(DidError::InsufficientVariation(format!(
            "design matrix is singular: cell counts (control-pre, control-post, treated-pre, treated-post) = {:?}",
            cells
        )));
    }

    let mut x_data = Vec::with_capacity(n * N_COEF);
    for row in panel {
        let d = row.treated as f64;
        let t = row.time as f64;
        x_data.extend_from_slice(&[1.0, d, t, d * t]);
    }
    let x = DMatrix::from_row_slice(n, N_COEF, &x_data);
    let y = DVector::from_vec(panel.outcomes());

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| {
        DidError::InsufficientVariation("design matrix is singular (X'X not invertible)".to_string())
    })?;

    // Solve on demeaned outcomes; the mean only shifts the intercept.
    let y_mean = y.mean();
    let y_centered = y.add_scalar(-y_mean);
    let beta = &xtx_inv * (x.transpose() * &y_centered);
    let mut coefficients: Vec<f64> = beta.iter().copied().collect();
    coefficients[0] += y_mean;

    let residuals = &y_centered - &x * &beta;
    let rss: f64 = residuals.iter().map(|e| e * e).sum();

    let df_residual = n.saturating_sub(N_COEF);
    let sigma = (df_residual > 0).then(|| (rss / df_residual as f64).sqrt());
    let std_errors: Option<Vec<f64>> = sigma.map(|s| (0..N_COEF).map(|j| s * xtx_inv[(j, j)].sqrt()).collect());

    let robust_std_errors = hc2_std_errors(&x, &residuals, &xtx_inv);

    let tss: f64 = y_centered.iter().map(|v| v * v).sum();
    let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { 0.0 };

    Ok(RegressionFit {
        coefficients,
        std_errors,
        robust_std_errors,
        sigma,
        r_squared,
        df_residual,
        n_obs: n,
    })
}

/// HC2 sandwich: (X'X)^-1 [sum e_i^2 / (1 - h_ii) x_i x_i'] (X'X)^-1.
fn hc2_std_errors(
    x: &DMatrix<f64>,
    residuals: &DVector<f64>,
    xtx_inv: &DMatrix<f64>,
) -> Option<Vec<f64>> {
    let k = x.ncols();
    let mut meat = DMatrix::<f64>::zeros(k, k);

    for i in 0..x.nrows() {
        let xi = x.row(i).transpose();
        let leverage = (xi.transpose() * xtx_inv * &xi)[(0, 0)];
        let one_minus_h = 1.0 - leverage;
        if one_minus_h <= 1e-12 {
            return None;
        }
        let weight = residuals[i] * residuals[i] / one_minus_h;
        meat += &xi * xi.transpose() * weight;
    }

    let cov = xtx_inv * meat * xtx_inv;
    Some((0..k).map(|j| cov[(j, j)].max(0.0).sqrt()).collect())
}
