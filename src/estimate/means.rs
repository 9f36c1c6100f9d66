//! Difference-in-means DiD estimator.

use crate::data::PanelDataset;
use crate::error::{DidError, Result};
use serde::{Deserialize, Serialize};

/// The four treated x period cell means of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellMeans {
    /// Mean outcome: treated, post.
    pub treated_post: f64,
    /// Mean outcome: treated, pre.
    pub treated_pre: f64,
    /// Mean outcome: control, post.
    pub control_post: f64,
    /// Mean outcome: control, pre.
    pub control_pre: f64,
    /// Observations per cell, ordered as the fields above.
    pub counts: [usize; 4],
}

impl CellMeans {
    /// `(treated_post - treated_pre) - (control_post - control_pre)`.
    pub fn att(&self) -> f64 {
        (self.treated_post - self.treated_pre) - (self.control_post - self.control_pre)
    }

    /// Change over time in the treated group.
    pub fn treated_change(&self) -> f64 {
        self.treated_post - self.treated_pre
    }

    /// Change over time in the control group.
    pub fn control_change(&self) -> f64 {
        self.control_post - self.control_pre
    }

    /// Treated post-period mean had the treated group followed the control trend.
    pub fn counterfactual_treated_post(&self) -> f64 {
        self.treated_pre + self.control_change()
    }
}

/// Compute the four cell means.
///
/// Never divides by a variance, so single-unit groups are fine. Fails with
/// [`DidError::InsufficientVariation`] only when a cell has no observations.
pub fn diff_in_means(panel: &PanelDataset) -> Result<CellMeans> {
    // Sums are taken relative to the smallest outcome so large baselines do
    // not swamp the within-cell variation.
    let offset = panel
        .iter()
        .map(|r| r.outcome)
        .fold(f64::INFINITY, f64::min);

    // Index: treated * 2 + post, i.e. [c_pre, c_post, t_pre, t_post].
    let mut sums = [0.0_f64; 4];
    let mut counts = [0usize; 4];

    for row in panel {
        let idx = (row.is_treated() as usize) * 2 + row.is_post() as usize;
        sums[idx] += row.outcome - offset;
        counts[idx] += 1;
    }

    let labels = ["control-pre", "control-post", "treated-pre", "treated-post"];
    for (label, &count) in labels.iter().zip(counts.iter()) {
        if count == 0 {
            return Err(DidError::InsufficientVariation(format!(
                "no observations in the {} cell",
                label
            )));
        }
    }

    let mean = |i: usize| offset + sums[i] / counts[i] as f64;

    Ok(CellMeans {
        treated_post: mean(3),
        treated_pre: mean(2),
        control_post: mean(1),
        control_pre: mean(0),
        counts: [counts[3], counts[2], counts[1], counts[0]],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PanelRow;

    fn panel(rows: &[(usize, u8, u8, f64)]) -> PanelDataset {
        PanelDataset::from_rows(
            rows.iter()
                .map(|&(unit, time, treated, outcome)| PanelRow {
                    unit,
                    time,
                    treated,
                    outcome,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_textbook_example() {
        let p = panel(&[
            (0, 0, 0, 10.0),
            (0, 1, 0, 12.0),
            (1, 0, 0, 14.0),
            (1, 1, 0, 16.0),
            (2, 0, 1, 20.0),
            (2, 1, 1, 27.0),
            (3, 0, 1, 22.0),
            (3, 1, 1, 29.0),
        ]);
        let means = diff_in_means(&p).unwrap();
        assert_eq!(means.control_pre, 12.0);
        assert_eq!(means.control_post, 14.0);
        assert_eq!(means.treated_pre, 21.0);
        assert_eq!(means.treated_post, 28.0);
        assert_eq!(means.att(), 5.0);
        assert_eq!(means.counterfactual_treated_post(), 23.0);
        assert_eq!(means.counts, [2, 2, 2, 2]);
    }

    #[test]
    fn test_single_unit_per_group() {
        let p = panel(&[(0, 0, 0, 1.0), (0, 1, 0, 2.0), (1, 0, 1, 3.0), (1, 1, 1, 7.0)]);
        assert_eq!(diff_in_means(&p).unwrap().att(), 3.0);
    }

    #[test]
    fn test_empty_cell_is_insufficient_variation() {
        let p = panel(&[(0, 0, 0, 1.0), (0, 1, 0, 2.0), (1, 0, 0, 3.0), (1, 1, 0, 7.0)]);
        let err = diff_in_means(&p).unwrap_err();
        assert!(matches!(err, DidError::InsufficientVariation(_)));
        assert!(err.to_string().contains("treated-pre"));
    }

    #[test]
    fn test_order_independent() {
        let rows = [(0, 0, 0, 1.5), (0, 1, 0, 2.0), (1, 0, 1, 3.0), (1, 1, 1, 7.25)];
        let mut reversed = rows;
        reversed.reverse();
        assert_eq!(
            diff_in_means(&panel(&rows)).unwrap().att(),
            diff_in_means(&panel(&reversed)).unwrap().att()
        );
    }
}
