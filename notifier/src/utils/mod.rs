//! Shared utilities.
//!
//! - [`gate`]: leading-edge gate that spaces out scans

pub mod gate;

pub use gate::{ScanGate, DEFAULT_SCAN_DEBOUNCE};
