//! Error classification for the geolocation pipeline
//!
//! Construction and validation problems are errors. Numeric non-resolution
//! is not: solvers report it through `SolverResult::is_resolved`.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Invalid geographic primitive
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("incorrect latitude: {0}")]
    InvalidLatitude(f64),
    #[error("incorrect longitude: {0}")]
    InvalidLongitude(f64),
    #[error("incorrect altitude: {0}")]
    InvalidAltitude(f64),
    #[error("incorrect circle radius: {0}")]
    InvalidRadius(f64),
    #[error("incorrect timestamp: {0}")]
    InvalidTimestamp(i64),
}

/// Planar projection lookup failure
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("incorrect projection system: '{0}'")]
    UnknownSystem(String),
    #[error("planar coordinates ({x}, {y}) fall outside the projection domain")]
    OutOfDomain { x: f64, y: f64 },
}

/// Solver input rejected before any computation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("{method} expects {expected} uplinks, got {available}")]
    WrongUplinkCount {
        method: &'static str,
        expected: &'static str,
        available: usize,
    },
    #[error("too few uplinks to solve: {available} available, at least {required} required")]
    InsufficientUplinks { available: usize, required: usize },
    #[error("gateway is not unique: uplinks {first} and {second} share ({lat}, {lon})")]
    DuplicateGateway {
        first: usize,
        second: usize,
        lat: f64,
        lon: f64,
    },
    #[error("{method} could not resolve a position from {uplinks} uplinks")]
    Unresolved { method: &'static str, uplinks: usize },
}

/// Recursive estimator failure for a single measurement
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimatorError {
    #[error("innovation covariance is singular, measurement skipped")]
    SingularInnovation,
    #[error("invalid estimator parameter '{parameter}': {reason}")]
    InvalidParameter { parameter: String, reason: String },
    #[error("measurement is not finite: ({0}, {1})")]
    NonFiniteMeasurement(f64, f64),
}

/// Configuration validation and persistence failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("failed to read or write config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to (de)serialize configuration: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Top-level error returned by the orchestrator
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Geo(#[from] GeoError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Solver(#[from] SolverError),
    #[error(transparent)]
    Estimator(#[from] EstimatorError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_offending_value() {
        let err = GeoError::InvalidLatitude(91.5);
        assert_eq!(err.to_string(), "incorrect latitude: 91.5");

        let err = SolverError::WrongUplinkCount {
            method: "TDOA",
            expected: "exactly 4",
            available: 5,
        };
        assert_eq!(err.to_string(), "TDOA expects exactly 4 uplinks, got 5");
    }

    #[test]
    fn test_top_level_conversion() {
        let err: Error = EstimatorError::SingularInnovation.into();
        assert!(matches!(err, Error::Estimator(EstimatorError::SingularInnovation)));

        let err: Error = ProjectionError::UnknownSystem("epsg:0".into()).into();
        assert!(err.to_string().contains("epsg:0"));
    }
}
