//! Recursive state estimator capability and configured dispatch

use crate::processing::gh::GhFilter;
use crate::processing::kalman::{AdaptiveKalmanFilter, KalmanFilter, MultiModelFilter};
use crate::utils::config::EstimatorConfig;
use crate::validation::error::EstimatorError;
use nalgebra::Vector2;
use serde::Serialize;

/// Smoothed planar position and its diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Estimate {
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    /// Trace of the state covariance, zero for fixed-gain filters
    pub covariance_trace: f64,
}

/// Capability shared by every temporal filter
pub trait StateEstimator {
    /// Feed one planar position measurement and return the new estimate
    ///
    /// On error the estimator state is unchanged.
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError>;

    /// Current estimate without consuming a measurement
    fn estimate(&self) -> Estimate;
}

/// One of the supported estimators, built from configuration
#[derive(Debug, Clone)]
pub enum Estimator {
    Kalman(KalmanFilter),
    Adaptive(AdaptiveKalmanFilter),
    MultiModel(MultiModelFilter),
    Gh(GhFilter),
}

impl Estimator {
    pub fn from_config(config: &EstimatorConfig) -> Result<Self, EstimatorError> {
        Ok(match config {
            EstimatorConfig::Kalman(c) => Estimator::Kalman(KalmanFilter::from_config(c)?),
            EstimatorConfig::Adaptive(c) => Estimator::Adaptive(AdaptiveKalmanFilter::from_config(c)?),
            EstimatorConfig::Mme(c) => Estimator::MultiModel(MultiModelFilter::from_config(c)?),
            EstimatorConfig::Gh(c) => Estimator::Gh(GhFilter::from_config(c)?),
        })
    }

    fn inner(&self) -> &dyn StateEstimator {
        match self {
            Estimator::Kalman(f) => f,
            Estimator::Adaptive(f) => f,
            Estimator::MultiModel(f) => f,
            Estimator::Gh(f) => f,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn StateEstimator {
        match self {
            Estimator::Kalman(f) => f,
            Estimator::Adaptive(f) => f,
            Estimator::MultiModel(f) => f,
            Estimator::Gh(f) => f,
        }
    }
}

impl StateEstimator for Estimator {
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError> {
        self.inner_mut().new_measure(z)
    }

    fn estimate(&self) -> Estimate {
        self.inner().estimate()
    }
}
