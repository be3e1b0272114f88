//! Error types shared by every layer

pub mod error;

pub use error::{ConfigError, Error, EstimatorError, GeoError, ProjectionError, Result, SolverError};
