//! Data structures: generative parameters and panel datasets.

mod panel;
mod params;

pub use panel::{PanelDataset, PanelRow};
pub use params::ParameterSet;
