//! Two-period panel dataset and its tabular export.

use crate::error::{DidError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::Path;

/// One observation of one unit in one period.
///
/// Field order is the export column order: `unit,time,treated,outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    /// Unit identifier, shared by the unit's two rows.
    pub unit: usize,
    /// Period: 0 (pre) or 1 (post).
    pub time: u8,
    /// Treatment-group indicator seen by the estimator (0 or 1).
    pub treated: u8,
    /// Observed outcome.
    pub outcome: f64,
}

impl PanelRow {
    /// True for treated rows.
    pub fn is_treated(&self) -> bool {
        self.treated == 1
    }

    /// True for post-period rows.
    pub fn is_post(&self) -> bool {
        self.time == 1
    }
}

/// An ordered collection of panel rows.
///
/// Estimation is order-independent; row order is kept for display and export.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PanelDataset {
    rows: Vec<PanelRow>,
}

impl PanelDataset {
    /// Build a dataset, checking indicator values and that each unit keeps a
    /// single treatment label across periods.
    pub fn from_rows(rows: Vec<PanelRow>) -> Result<Self> {
        let mut labels: HashMap<usize, u8> = HashMap::new();
        for (i, row) in rows.iter().enumerate() {
            if row.time > 1 {
                return Err(DidError::InvalidParameter(format!(
                    "row {}: time must be 0 or 1, got {}",
                    i, row.time
                )));
            }
            if row.treated > 1 {
                return Err(DidError::InvalidParameter(format!(
                    "row {}: treated must be 0 or 1, got {}",
                    i, row.treated
                )));
            }
            if let Some(&prev) = labels.get(&row.unit) {
                if prev != row.treated {
                    return Err(DidError::InvalidParameter(format!(
                        "unit {} changes treatment label across periods",
                        row.unit
                    )));
                }
            } else {
                labels.insert(row.unit, row.treated);
            }
        }
        Ok(Self { rows })
    }

    /// Crate-internal constructor for rows already known to be well formed.
    pub(crate) fn from_rows_unchecked(rows: Vec<PanelRow>) -> Self {
        Self { rows }
    }

    /// All rows in order.
    pub fn rows(&self) -> &[PanelRow] {
        &self.rows
    }

    /// Iterate over rows.
    pub fn iter(&self) -> impl Iterator<Item = &PanelRow> {
        self.rows.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Distinct unit ids in order of first appearance.
    pub fn unit_ids(&self) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for row in &self.rows {
            if seen.insert(row.unit) {
                ids.push(row.unit);
            }
        }
        ids
    }

    /// Number of distinct units.
    pub fn n_units(&self) -> usize {
        self.unit_ids().len()
    }

    /// Number of distinct treated units.
    pub fn n_treated_units(&self) -> usize {
        self.rows
            .iter()
            .filter(|r| r.is_treated())
            .map(|r| r.unit)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Outcome column.
    pub fn outcomes(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.outcome).collect()
    }

    /// Replace each unit's treatment label.
    ///
    /// `labels[k]` applies to the k-th unit in [`unit_ids`](Self::unit_ids)
    /// order. Outcomes are untouched.
    pub fn relabel_units(&self, labels: &[u8]) -> Result<Self> {
        let ids = self.unit_ids();
        if labels.len() != ids.len() {
            return Err(DidError::InvalidParameter(format!(
                "expected {} unit labels, got {}",
                ids.len(),
                labels.len()
            )));
        }
        let map: HashMap<usize, u8> = ids.into_iter().zip(labels.iter().copied()).collect();
        let rows = self
            .rows
            .iter()
            .map(|r| PanelRow {
                treated: map[&r.unit],
                ..*r
            })
            .collect();
        Self::from_rows(rows)
    }

    /// Write as CSV with header `unit,time,treated,outcome`.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// CSV export as a string.
    pub fn to_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| {
            DidError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Write CSV to a file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(std::io::BufWriter::new(file))
    }
}

impl<'a> IntoIterator for &'a PanelDataset {
    type Item = &'a PanelRow;
    type IntoIter = std::slice::Iter<'a, PanelRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn row(unit: usize, time: u8, treated: u8, outcome: f64) -> PanelRow {
        PanelRow {
            unit,
            time,
            treated,
            outcome,
        }
    }

    fn small_panel() -> PanelDataset {
        PanelDataset::from_rows(vec![
            row(0, 0, 0, 1.0),
            row(0, 1, 0, 2.0),
            row(1, 0, 1, 3.0),
            row(1, 1, 1, 5.5),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_bad_indicators() {
        assert!(PanelDataset::from_rows(vec![row(0, 2, 0, 1.0)]).is_err());
        assert!(PanelDataset::from_rows(vec![row(0, 0, 3, 1.0)]).is_err());
    }

    #[test]
    fn test_from_rows_rejects_label_change() {
        let result = PanelDataset::from_rows(vec![row(4, 0, 0, 1.0), row(4, 1, 1, 1.0)]);
        assert!(matches!(result, Err(DidError::InvalidParameter(_))));
    }

    #[test]
    fn test_unit_counts() {
        let panel = small_panel();
        assert_eq!(panel.len(), 4);
        assert_eq!(panel.n_units(), 2);
        assert_eq!(panel.n_treated_units(), 1);
        assert_eq!(panel.unit_ids(), vec![0, 1]);
    }

    #[test]
    fn test_relabel_units() {
        let panel = small_panel();
        let swapped = panel.relabel_units(&[1, 0]).unwrap();
        assert_eq!(swapped.rows()[0].treated, 1);
        assert_eq!(swapped.rows()[3].treated, 0);
        assert_eq!(swapped.outcomes(), panel.outcomes());

        assert!(panel.relabel_units(&[1]).is_err());
    }

    #[test]
    fn test_csv_header_and_rows() {
        let csv = small_panel().to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("unit,time,treated,outcome"));
        assert_eq!(lines.next(), Some("0,0,0,1.0"));
        assert_eq!(lines.last(), Some("1,1,1,5.5"));
    }

    #[test]
    fn test_csv_file_export() {
        let file = NamedTempFile::new().unwrap();
        small_panel().to_csv_file(file.path()).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(content.lines().count(), 5);
    }
}
