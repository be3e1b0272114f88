//! Orchestrator turning batches of gateway observations into smoothed positions

pub mod solver;
pub mod types;

pub use solver::GeolocationSolver;
pub use types::{ObservationRow, Prediction};
