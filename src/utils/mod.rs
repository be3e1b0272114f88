//! Configuration

pub mod config;

pub use config::{AdaptiveConfig, EstimatorConfig, FilterKind, GhConfig, KalmanConfig, MmeConfig, SolverConfig};
