//! Generative parameters for a two-period DiD panel.

use crate::error::{DidError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the data-generating process.
///
/// ```text
/// outcome(i, 0) = mu_g + e
/// outcome(i, 1) = mu_g + beta_g + tau * treated_i + e,   e ~ N(0, epsilon)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Period-0 baseline mean of the treated group.
    pub mu_treated: f64,
    /// Period-0 baseline mean of the control group.
    pub mu_control: f64,
    /// Untreated change from period 0 to 1 for the treated group.
    pub beta_treated: f64,
    /// Change from period 0 to 1 for the control group.
    pub beta_control: f64,
    /// True treatment effect on the treated.
    pub tau: f64,
    /// Noise standard deviation.
    pub epsilon: f64,
    /// Units per group.
    #[serde(alias = "N")]
    pub n_units: usize,
    /// Number of simulation repetitions.
    #[serde(alias = "R")]
    pub n_reps: usize,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            mu_treated: 10.0,
            mu_control: 40.0,
            beta_treated: 4.0,
            beta_control: 4.0,
            tau: 8.0,
            epsilon: 3.0,
            n_units: 100,
            n_reps: 100,
        }
    }
}

impl ParameterSet {
    /// Trend gap `beta_treated - beta_control`.
    pub fn trend_gap(&self) -> f64 {
        self.beta_treated - self.beta_control
    }

    /// Total number of units (both groups).
    pub fn total_units(&self) -> usize {
        2 * self.n_units
    }

    /// Number of panel rows (units x 2 periods).
    pub fn n_rows(&self) -> usize {
        4 * self.n_units
    }

    /// Check every invariant.
    pub fn validate(&self) -> Result<()> {
        if self.n_units < 1 {
            return Err(DidError::InvalidParameter(
                "n_units (N) must be >= 1".to_string(),
            ));
        }
        if self.n_reps < 1 {
            return Err(DidError::InvalidParameter(
                "n_reps (R) must be >= 1".to_string(),
            ));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(DidError::InvalidParameter(format!(
                "epsilon must be finite and >= 0, got {}",
                self.epsilon
            )));
        }
        let named = [
            ("mu_treated", self.mu_treated),
            ("mu_control", self.mu_control),
            ("beta_treated", self.beta_treated),
            ("beta_control", self.beta_control),
            ("tau", self.tau),
        ];
        for (name, value) in named {
            if !value.is_finite() {
                return Err(DidError::InvalidParameter(format!(
                    "{} must be finite, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    /// Set the baseline means.
    pub fn with_baselines(mut self, mu_treated: f64, mu_control: f64) -> Self {
        self.mu_treated = mu_treated;
        self.mu_control = mu_control;
        self
    }

    /// Set both group trends.
    pub fn with_trends(mut self, beta_treated: f64, beta_control: f64) -> Self {
        self.beta_treated = beta_treated;
        self.beta_control = beta_control;
        self
    }

    /// Set `beta_treated = beta_control + gap`.
    pub fn with_trend_gap(mut self, gap: f64) -> Self {
        self.beta_treated = self.beta_control + gap;
        self
    }

    /// Set the true effect.
    pub fn with_tau(mut self, tau: f64) -> Self {
        self.tau = tau;
        self
    }

    /// Set the noise standard deviation.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Set units per group.
    pub fn with_units(mut self, n_units: usize) -> Self {
        self.n_units = n_units;
        self
    }

    /// Set number of repetitions.
    pub fn with_reps(mut self, n_reps: usize) -> Self {
        self.n_reps = n_reps;
        self
    }

    // Presets

    /// Parallel trends hold; DiD is unbiased.
    pub fn parallel_trends() -> Self {
        Self::default()
    }

    /// Treated group trends `gap` faster than control.
    pub fn violated_trends(gap: f64) -> Self {
        Self::default().with_trend_gap(gap)
    }

    /// No noise: every estimate is deterministic.
    pub fn noiseless() -> Self {
        Self::default().with_epsilon(0.0)
    }

    /// Load from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DidError::from)
    }

    /// Save to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DidError::from)
    }

    /// Load from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_is_valid() {
        let params = ParameterSet::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.trend_gap(), 0.0);
        assert_eq!(params.n_rows(), 400);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ParameterSet::default().with_units(0).validate().is_err());
        assert!(ParameterSet::default().with_reps(0).validate().is_err());
        assert!(ParameterSet::default().with_epsilon(-0.1).validate().is_err());
        assert!(ParameterSet::default().with_tau(f64::NAN).validate().is_err());

        let err = ParameterSet::default().with_units(0).validate().unwrap_err();
        assert!(matches!(err, DidError::InvalidParameter(_)));
    }

    #[test]
    fn test_with_trend_gap() {
        let params = ParameterSet::default().with_trends(1.0, 2.5).with_trend_gap(-1.5);
        assert_eq!(params.beta_control, 2.5);
        assert_eq!(params.beta_treated, 1.0);
        assert_eq!(params.trend_gap(), -1.5);
    }

    #[test]
    fn test_presets() {
        assert_eq!(ParameterSet::violated_trends(2.0).trend_gap(), 2.0);
        assert_eq!(ParameterSet::noiseless().epsilon, 0.0);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let params = ParameterSet::default().with_tau(-3.0).with_units(7);
        let yaml = params.to_yaml().unwrap();
        let parsed = ParameterSet::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_yaml_aliases_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "mu_treated: 1.0").unwrap();
        writeln!(file, "mu_control: 2.0").unwrap();
        writeln!(file, "beta_treated: 0.5").unwrap();
        writeln!(file, "beta_control: 0.0").unwrap();
        writeln!(file, "tau: 4.0").unwrap();
        writeln!(file, "epsilon: 1.0").unwrap();
        writeln!(file, "N: 12").unwrap();
        writeln!(file, "R: 30").unwrap();
        file.flush().unwrap();

        let params = ParameterSet::from_yaml_file(file.path()).unwrap();
        assert_eq!(params.n_units, 12);
        assert_eq!(params.n_reps, 30);
        assert_eq!(params.trend_gap(), 0.5);
    }
}
