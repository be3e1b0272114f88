//! Gateway Geolocation
//!
//! Locates a radio device from the fine arrival timestamps reported by the
//! gateways that received the same frame, then smooths successive fixes with
//! a recursive estimator.
//!
//! ```no_run
//! use gateway_geoloc::{GeolocationSolver, ObservationRow, SolverConfig};
//!
//! # fn main() -> gateway_geoloc::Result<()> {
//! let mut solver = GeolocationSolver::new(SolverConfig::default())?;
//! let rows: Vec<ObservationRow> = Vec::new();
//! let prediction = solver.predict(&rows)?;
//! println!("{} (raw {})", prediction.smoothed, prediction.raw);
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use crate::core::{Circle, Gateway, Point, Projection, SolverResult, Uplink, SPEED_OF_LIGHT_M_PER_NS};
pub use crate::algorithms::{ComputeMethod, Lsm, PositionSolver, Tdoa, Tdoa3d, Toa, Trilateration};
pub use crate::processing::{Estimate, Estimator, StateEstimator};
pub use crate::validation::{Error, Result};
pub use crate::utils::{EstimatorConfig, FilterKind, SolverConfig};
pub use crate::api::{GeolocationSolver, ObservationRow, Prediction};
