//! Fixed-gain g-h (alpha-beta) filter

use crate::processing::estimator::{Estimate, StateEstimator};
use crate::utils::config::GhConfig;
use crate::validation::error::EstimatorError;
use nalgebra::Vector2;

/// Position/velocity filter with constant gains
///
/// Each update predicts `x + dx dt`, then corrects the position by `g` and
/// the velocity by `h / dt` times the residual.
#[derive(Debug, Clone)]
pub struct GhFilter {
    x: Vector2<f64>,
    dx: Vector2<f64>,
    dt: f64,
    g: f64,
    h: f64,
    seeded: bool,
}

impl GhFilter {
    pub fn from_config(config: &GhConfig) -> Result<Self, EstimatorError> {
        let invalid = |parameter: &str, value: f64, reason: &str| EstimatorError::InvalidParameter {
            parameter: parameter.to_string(),
            reason: format!("{}, got {}", reason, value),
        };

        if !config.dt.is_finite() || config.dt <= 0.0 {
            return Err(invalid("dt", config.dt, "must be positive"));
        }
        if !(config.g > 0.0 && config.g <= 1.0) {
            return Err(invalid("g", config.g, "must lie in (0, 1]"));
        }
        if !(config.h >= 0.0 && config.h <= 2.0) {
            return Err(invalid("h", config.h, "must lie in [0, 2]"));
        }

        Ok(Self {
            x: Vector2::zeros(),
            dx: Vector2::zeros(),
            dt: config.dt,
            g: config.g,
            h: config.h,
            seeded: false,
        })
    }
}

impl StateEstimator for GhFilter {
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError> {
        if !z.x.is_finite() || !z.y.is_finite() {
            return Err(EstimatorError::NonFiniteMeasurement(z.x, z.y));
        }

        if !self.seeded {
            self.x = *z;
            self.seeded = true;
            return Ok(self.estimate());
        }

        let prediction = self.x + self.dx * self.dt;
        let residual = z - prediction;
        self.dx += residual * (self.h / self.dt);
        self.x = prediction + residual * self.g;

        Ok(self.estimate())
    }

    fn estimate(&self) -> Estimate {
        Estimate {
            position: self.x,
            velocity: self.dx,
            covariance_trace: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_update() {
        let mut filter = GhFilter::from_config(&GhConfig {
            g: 0.5,
            h: 0.25,
            dt: 1.0,
        })
        .unwrap();

        filter.new_measure(&Vector2::new(0.0, 0.0)).unwrap();
        let estimate = filter.new_measure(&Vector2::new(4.0, -2.0)).unwrap();

        assert!((estimate.position - Vector2::new(2.0, -1.0)).norm() < 1e-12);
        assert!((estimate.velocity - Vector2::new(1.0, -0.5)).norm() < 1e-12);
    }

    #[test]
    fn test_tracks_constant_velocity() {
        let mut filter = GhFilter::from_config(&GhConfig::default()).unwrap();

        let mut estimate = filter.estimate();
        for k in 0..400 {
            let t = k as f64;
            estimate = filter.new_measure(&Vector2::new(t, 2.0 * t)).unwrap();
        }

        assert!((estimate.velocity - Vector2::new(1.0, 2.0)).norm() < 0.05);
        assert!((estimate.position - Vector2::new(399.0, 798.0)).norm() < 1.0);
    }
}
