//! Rolling-window anomaly and manipulation detection (C11).

pub mod detectors;
pub mod error;
pub mod state;

pub use detectors::{AnomalyAlert, AnomalyDetector, AnomalyKind};
pub use error::AnomalyError;
