//! Data models and structures for the shooting core

pub mod config;
pub mod measurement;

// Re-export main model types
pub use config::Config;
pub use measurement::{Measurement, ShotRecord, PHOUT_COLUMNS};
