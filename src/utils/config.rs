//! Solver and estimator configuration
//!
//! Every struct deserializes from partial JSON: missing fields take the
//! documented defaults.

use crate::algorithms::ComputeMethod;
use crate::core::{Projection, DEFAULT_PROJECTION, DEFAULT_SPREAD_MULTIPLIER};
use crate::processing::kalman::{MotionModel, ProcessNoise, DEFAULT_PROCESS_VARIANCE};
use crate::processing::Estimator;
use crate::validation::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Outlier filters the orchestrator can apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterKind {
    /// Arrival-time dispersion, applied to uplinks before solving
    Timestamp,
    /// Candidate-position dispersion, applied after solving
    Result,
    /// Gateway spread, applied to uplinks before solving
    Gateway,
}

/// Top-level configuration of a [`GeolocationSolver`](crate::api::GeolocationSolver)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub compute: ComputeMethod,
    /// Filters to apply, in order
    pub filters: Vec<FilterKind>,
    /// Spread multiplier per filter, missing entries use the default
    pub filter_params: BTreeMap<FilterKind, f64>,
    /// Planar projection identifier, e.g. `epsg:2192`
    pub projection: String,
    /// Iteration cap of the least-squares solver
    pub lsm_max_iterations: usize,
    pub estimator: EstimatorConfig,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            compute: ComputeMethod::Auto,
            filters: vec![FilterKind::Timestamp, FilterKind::Result],
            filter_params: BTreeMap::new(),
            projection: DEFAULT_PROJECTION.to_string(),
            lsm_max_iterations: 200,
            estimator: EstimatorConfig::default(),
        }
    }
}

/// Estimator selection with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum EstimatorConfig {
    Kalman(KalmanConfig),
    Adaptive(AdaptiveConfig),
    Mme(MmeConfig),
    Gh(GhConfig),
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::Kalman(KalmanConfig::default())
    }
}

/// Linear Kalman filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KalmanConfig {
    pub model: MotionModel,
    /// Time step between measurements
    pub dt: f64,
    /// Initial state covariance scale, `P0 = p0 I`
    pub p0: f64,
    /// Measurement noise variance, `R = r I`
    pub r: f64,
    pub process_noise: ProcessNoise,
    /// Explicit initial state; when absent the first measurement seeds the position
    pub initial_state: Option<Vec<f64>>,
}

impl Default for KalmanConfig {
    fn default() -> Self {
        Self {
            model: MotionModel::ConstantVelocity,
            dt: 0.1,
            p0: 500.0,
            r: 5.0,
            process_noise: ProcessNoise::default(),
            initial_state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    pub kalman: KalmanConfig,
    /// Normalized innovation threshold
    pub eps_max: f64,
    pub q_scale_factor: f64,
    /// Cap on consecutive process noise inflations
    pub max_inflations: u32,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            kalman: KalmanConfig::default(),
            eps_max: 100.0,
            q_scale_factor: 100.0,
            max_inflations: 10,
        }
    }
}

/// Parameters shared by both models of the switching estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmeConfig {
    pub dt: f64,
    pub p0: f64,
    pub r: f64,
    /// White noise variance
    pub q: f64,
    /// Innovation bound, in measurement standard deviations
    pub threshold: f64,
}

impl Default for MmeConfig {
    fn default() -> Self {
        Self {
            dt: 0.1,
            p0: 500.0,
            r: 5.0,
            q: DEFAULT_PROCESS_VARIANCE,
            threshold: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhConfig {
    pub g: f64,
    pub h: f64,
    pub dt: f64,
}

impl Default for GhConfig {
    fn default() -> Self {
        Self { g: 0.1, h: 0.01, dt: 1.0 }
    }
}

fn invalid(parameter: &str, value: impl ToString, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        parameter: parameter.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

impl SolverConfig {
    /// Spread multiplier configured for `kind`
    pub fn multiplier(&self, kind: FilterKind) -> f64 {
        self.filter_params
            .get(&kind)
            .copied()
            .unwrap_or(DEFAULT_SPREAD_MULTIPLIER)
    }

    pub fn is_enabled(&self, kind: FilterKind) -> bool {
        self.filters.contains(&kind)
    }

    /// Check every parameter, including that the projection and the
    /// estimator can actually be built
    pub fn validate(&self) -> Result<(), ConfigError> {
        Projection::new(&self.projection)
            .map_err(|e| invalid("projection", &self.projection, e.to_string()))?;

        if self.lsm_max_iterations == 0 {
            return Err(invalid("lsm_max_iterations", 0, "must be at least 1"));
        }

        for (i, kind) in self.filters.iter().enumerate() {
            if self.filters[..i].contains(kind) {
                return Err(invalid("filters", format!("{:?}", kind), "listed more than once"));
            }
        }

        for (kind, multiplier) in &self.filter_params {
            if multiplier.is_nan() {
                return Err(invalid(
                    &format!("filter_params.{:?}", kind),
                    multiplier,
                    "must be a number",
                ));
            }
        }

        Estimator::from_config(&self.estimator)
            .map_err(|e| invalid("estimator", format!("{:?}", self.estimator), e.to_string()))?;

        Ok(())
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: SolverConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content).map_err(|source| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source,
        })
    }
}
