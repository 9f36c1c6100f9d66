//! Placebo datasets: panels whose estimable effect is zero by construction.
//!
//! Two constructions are available:
//!
//! - [`PlaceboMode::ReshuffleLabels`]: outcomes are generated under the true
//!   assignment (the effect is physically present in treated post outcomes),
//!   then the unit-level `treated` column is replaced by a uniformly random
//!   permutation of the N treated / N control labels. The labels the estimator
//!   sees are independent of the data-generating assignment, so the expected
//!   estimate is zero for any `tau` and any trend gap.
//! - [`PlaceboMode::ShiftPeriod`]: the observed window is moved one period
//!   earlier, to the last two pre-treatment periods. Row `time = 0` is true
//!   period -1 (`mu - beta`), row `time = 1` is true period 0 (`mu`); the
//!   effect only starts at true period 1, outside the window. The expected
//!   estimate is the trend gap, i.e. zero under parallel trends regardless of
//!   `tau`. A nonzero centre is the pre-trend signal this test exists for.

use crate::data::{PanelDataset, ParameterSet};
use crate::error::Result;
use crate::generate::panel::{build_panel, Window};
use crate::random::RandomSource;
use serde::{Deserialize, Serialize};

/// How a placebo panel is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceboMode {
    /// Randomly permute unit treatment labels after generation.
    ReshuffleLabels,
    /// Observe two pre-treatment periods instead of the treatment window.
    ShiftPeriod,
}

impl PlaceboMode {
    /// Short machine-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReshuffleLabels => "reshuffle_labels",
            Self::ShiftPeriod => "shift_period",
        }
    }
}

impl std::fmt::Display for PlaceboMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Generate a placebo panel from a seed.
pub fn generate_placebo(params: &ParameterSet, seed: u64, mode: PlaceboMode) -> Result<PanelDataset> {
    params.validate()?;
    let mut rng = RandomSource::new(seed);
    generate_placebo_with(params, &mut rng, mode)
}

/// Generate a placebo panel from an existing random source.
pub fn generate_placebo_with(
    params: &ParameterSet,
    rng: &mut RandomSource,
    mode: PlaceboMode,
) -> Result<PanelDataset> {
    params.validate()?;
    build_placebo(params, rng, mode)
}

/// Placebo construction for parameters the caller has already validated.
pub(crate) fn build_placebo(
    params: &ParameterSet,
    rng: &mut RandomSource,
    mode: PlaceboMode,
) -> Result<PanelDataset> {
    match mode {
        PlaceboMode::ReshuffleLabels => {
            let panel = build_panel(params, rng, Window::Treatment)?;
            let n = params.n_units;
            let mut labels: Vec<u8> = (0..params.total_units())
                .map(|unit| (unit >= n) as u8)
                .collect();
            rng.shuffle(&mut labels);
            panel.relabel_units(&labels)
        }
        PlaceboMode::ShiftPeriod => build_panel(params, rng, Window::PreTreatment),
    }
}
