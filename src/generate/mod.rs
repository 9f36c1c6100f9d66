//! Synthetic panel generation.

pub mod panel;
pub mod placebo;

pub use panel::{generate_panel, generate_panel_with};
pub use placebo::{generate_placebo, generate_placebo_with, PlaceboMode};
