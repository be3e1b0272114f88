//! Linear Kalman filters for temporal position smoothing
//!
//! State layout is derivative-major: `[x, y, vx, vy]` for constant velocity
//! and `[x, y, vx, vy, ax, ay]` for constant acceleration. Only the position
//! is observed.

use crate::processing::estimator::{Estimate, StateEstimator};
use crate::utils::config::{AdaptiveConfig, KalmanConfig, MmeConfig};
use crate::validation::error::EstimatorError;
use nalgebra::{DMatrix, DVector, Vector2};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub const DEFAULT_PROCESS_VARIANCE: f64 = 0.1;

/// Kinematic model driving the prediction step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MotionModel {
    #[default]
    ConstantVelocity,
    ConstantAcceleration,
}

impl MotionModel {
    /// Highest position derivative carried in the state
    pub fn order(&self) -> usize {
        match self {
            MotionModel::ConstantVelocity => 1,
            MotionModel::ConstantAcceleration => 2,
        }
    }

    pub fn state_dim(&self) -> usize {
        2 * (self.order() + 1)
    }

    /// Taylor expansion of the motion over `dt`, per axis
    pub fn transition_matrix(&self, dt: f64) -> DMatrix<f64> {
        let n = self.state_dim();
        let order = self.order();
        let mut f = DMatrix::zeros(n, n);
        let mut factorial = 1.0;

        for lag in 0..=order {
            if lag > 0 {
                factorial *= lag as f64;
            }
            let coefficient = dt.powi(lag as i32) / factorial;
            for k in 0..=(order - lag) {
                for axis in 0..2 {
                    f[(k * 2 + axis, (k + lag) * 2 + axis)] = coefficient;
                }
            }
        }
        f
    }

    /// Discrete white noise process covariance for a scalar variance
    pub fn white_noise(&self, dt: f64, variance: f64) -> DMatrix<f64> {
        let block: Vec<Vec<f64>> = match self {
            MotionModel::ConstantVelocity => vec![
                vec![dt.powi(4) / 4.0, dt.powi(3) / 2.0],
                vec![dt.powi(3) / 2.0, dt.powi(2)],
            ],
            MotionModel::ConstantAcceleration => vec![
                vec![dt.powi(4) / 4.0, dt.powi(3) / 2.0, dt.powi(2) / 2.0],
                vec![dt.powi(3) / 2.0, dt.powi(2), dt],
                vec![dt.powi(2) / 2.0, dt, 1.0],
            ],
        };

        let n = self.state_dim();
        let mut q = DMatrix::zeros(n, n);
        for (k, row) in block.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                for axis in 0..2 {
                    q[(k * 2 + axis, j * 2 + axis)] = value * variance;
                }
            }
        }
        q
    }
}

/// Process noise: a white-noise variance or an explicit diagonal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessNoise {
    WhiteNoise(f64),
    Diagonal(Vec<f64>),
}

impl Default for ProcessNoise {
    fn default() -> Self {
        ProcessNoise::WhiteNoise(DEFAULT_PROCESS_VARIANCE)
    }
}

/// State mean and covariance owned by a single filter
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorState {
    pub x: DVector<f64>,
    pub p: DMatrix<f64>,
}

/// Innovation of an accepted update
#[derive(Debug, Clone)]
pub(crate) struct Innovation {
    pub y: DVector<f64>,
    pub s_inv: DMatrix<f64>,
}

impl Innovation {
    /// Normalized innovation squared, `yᵀ S⁻¹ y`
    pub fn normalized_squared(&self) -> f64 {
        self.y.dot(&(&self.s_inv * &self.y))
    }
}

fn invalid(parameter: &str, reason: impl Into<String>) -> EstimatorError {
    EstimatorError::InvalidParameter {
        parameter: parameter.to_string(),
        reason: reason.into(),
    }
}

fn check_non_negative(parameter: &str, value: f64) -> Result<(), EstimatorError> {
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(parameter, format!("must be finite and non-negative, got {}", value)));
    }
    Ok(())
}

/// Linear Kalman filter observing planar position
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    model: MotionModel,
    state: EstimatorState,
    f: DMatrix<f64>,
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    h: DMatrix<f64>,
    /// False until an initial state exists; the first measurement then seeds it
    seeded: bool,
}

impl KalmanFilter {
    /// Filter with default noise settings, seeded by its first measurement
    pub fn new(model: MotionModel) -> Self {
        let config = KalmanConfig {
            model,
            ..KalmanConfig::default()
        };
        let q = model.white_noise(config.dt, DEFAULT_PROCESS_VARIANCE);
        Self::build(model, config.dt, config.p0, config.r, q, None)
    }

    pub fn from_config(config: &KalmanConfig) -> Result<Self, EstimatorError> {
        let model = config.model;
        let n = model.state_dim();

        if !config.dt.is_finite() || config.dt <= 0.0 {
            return Err(invalid("dt", format!("must be positive, got {}", config.dt)));
        }
        check_non_negative("p0", config.p0)?;
        check_non_negative("r", config.r)?;

        let q = match &config.process_noise {
            ProcessNoise::WhiteNoise(variance) => {
                check_non_negative("process_noise", *variance)?;
                model.white_noise(config.dt, *variance)
            }
            ProcessNoise::Diagonal(diagonal) => {
                if diagonal.len() != n {
                    return Err(invalid(
                        "process_noise",
                        format!("diagonal needs {} entries, got {}", n, diagonal.len()),
                    ));
                }
                for value in diagonal {
                    check_non_negative("process_noise", *value)?;
                }
                DMatrix::from_diagonal(&DVector::from_column_slice(diagonal))
            }
        };

        let initial = match &config.initial_state {
            Some(x0) if x0.len() != n => {
                return Err(invalid(
                    "initial_state",
                    format!("state needs {} entries, got {}", n, x0.len()),
                ))
            }
            Some(x0) => Some(DVector::from_column_slice(x0)),
            None => None,
        };

        Ok(Self::build(model, config.dt, config.p0, config.r, q, initial))
    }

    fn build(
        model: MotionModel,
        dt: f64,
        p0: f64,
        r: f64,
        q: DMatrix<f64>,
        initial: Option<DVector<f64>>,
    ) -> Self {
        let n = model.state_dim();
        let mut h = DMatrix::zeros(2, n);
        h[(0, 0)] = 1.0;
        h[(1, 1)] = 1.0;

        let seeded = initial.is_some();
        Self {
            model,
            state: EstimatorState {
                x: initial.unwrap_or_else(|| DVector::zeros(n)),
                p: DMatrix::identity(n, n) * p0,
            },
            f: model.transition_matrix(dt),
            q,
            r: DMatrix::identity(2, 2) * r,
            h,
            seeded,
        }
    }

    /// Predict then update with one position measurement
    ///
    /// Returns `None` when the measurement only seeded the state. The state
    /// is committed only when the update succeeds.
    pub(crate) fn step(&mut self, z: &Vector2<f64>) -> Result<Option<Innovation>, EstimatorError> {
        if !z.x.is_finite() || !z.y.is_finite() {
            return Err(EstimatorError::NonFiniteMeasurement(z.x, z.y));
        }

        if !self.seeded {
            self.state.x[0] = z.x;
            self.state.x[1] = z.y;
            self.seeded = true;
            debug!(model = ?self.model, "filter seeded from first measurement");
            return Ok(None);
        }

        // Predict: x = F x, P = F P F^T + Q
        let x_prior = &self.f * &self.state.x;
        let p_prior = &self.f * &self.state.p * self.f.transpose() + &self.q;

        // Update
        let y = DVector::from_column_slice(&[z.x, z.y]) - &self.h * &x_prior;
        let s = &self.h * &p_prior * self.h.transpose() + &self.r;
        let s_inv = s.try_inverse().ok_or(EstimatorError::SingularInnovation)?;
        let k = &p_prior * self.h.transpose() * &s_inv;

        // Joseph form keeps P symmetric positive semi-definite
        let n = self.model.state_dim();
        let i_kh = DMatrix::identity(n, n) - &k * &self.h;
        self.state.p = &i_kh * &p_prior * i_kh.transpose() + &k * &self.r * k.transpose();
        self.state.x = x_prior + &k * &y;

        trace!(covariance_trace = self.state.p.trace(), "kalman update");
        Ok(Some(Innovation { y, s_inv }))
    }

    pub fn model(&self) -> MotionModel {
        self.model
    }

    pub fn state(&self) -> &EstimatorState {
        &self.state
    }

    pub fn process_noise(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub fn measurement_noise(&self) -> &DMatrix<f64> {
        &self.r
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub(crate) fn scale_process_noise(&mut self, factor: f64) {
        self.q *= factor;
    }

    pub fn estimate(&self) -> Estimate {
        Estimate {
            position: Vector2::new(self.state.x[0], self.state.x[1]),
            velocity: Vector2::new(self.state.x[2], self.state.x[3]),
            covariance_trace: self.state.p.trace(),
        }
    }
}

impl StateEstimator for KalmanFilter {
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError> {
        self.step(z)?;
        Ok(self.estimate())
    }

    fn estimate(&self) -> Estimate {
        KalmanFilter::estimate(self)
    }
}

/// Kalman filter whose process noise follows the innovation magnitude
///
/// A normalized innovation above `eps_max` multiplies Q by the scale factor,
/// up to `max_inflations` times; each quiet update undoes one inflation.
#[derive(Debug, Clone)]
pub struct AdaptiveKalmanFilter {
    filter: KalmanFilter,
    eps_max: f64,
    q_scale_factor: f64,
    max_inflations: u32,
    inflations: u32,
}

impl AdaptiveKalmanFilter {
    pub fn from_config(config: &AdaptiveConfig) -> Result<Self, EstimatorError> {
        if !config.eps_max.is_finite() || config.eps_max <= 0.0 {
            return Err(invalid("eps_max", format!("must be positive, got {}", config.eps_max)));
        }
        if !config.q_scale_factor.is_finite() || config.q_scale_factor <= 1.0 {
            return Err(invalid(
                "q_scale_factor",
                format!("must be greater than 1, got {}", config.q_scale_factor),
            ));
        }

        Ok(Self {
            filter: KalmanFilter::from_config(&config.kalman)?,
            eps_max: config.eps_max,
            q_scale_factor: config.q_scale_factor,
            max_inflations: config.max_inflations,
            inflations: 0,
        })
    }

    /// How many times Q is currently inflated
    pub fn inflations(&self) -> u32 {
        self.inflations
    }

    pub fn filter(&self) -> &KalmanFilter {
        &self.filter
    }
}

impl StateEstimator for AdaptiveKalmanFilter {
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError> {
        if let Some(innovation) = self.filter.step(z)? {
            let eps = innovation.normalized_squared();
            if eps > self.eps_max && self.inflations < self.max_inflations {
                self.filter.scale_process_noise(self.q_scale_factor);
                self.inflations += 1;
                debug!(eps, inflations = self.inflations, "process noise inflated");
            } else if eps <= self.eps_max && self.inflations > 0 {
                self.filter.scale_process_noise(1.0 / self.q_scale_factor);
                self.inflations -= 1;
                debug!(eps, inflations = self.inflations, "process noise deflated");
            }
        }
        Ok(self.filter.estimate())
    }

    fn estimate(&self) -> Estimate {
        self.filter.estimate()
    }
}

/// Constant-velocity and constant-acceleration filters run side by side
///
/// The constant-velocity estimate is reported while its innovation stays
/// within `threshold` measurement standard deviations on both axes.
#[derive(Debug, Clone)]
pub struct MultiModelFilter {
    cv: KalmanFilter,
    ca: KalmanFilter,
    threshold: f64,
    active: MotionModel,
}

impl MultiModelFilter {
    pub fn from_config(config: &MmeConfig) -> Result<Self, EstimatorError> {
        if !config.threshold.is_finite() || config.threshold <= 0.0 {
            return Err(invalid("threshold", format!("must be positive, got {}", config.threshold)));
        }

        let kalman = |model: MotionModel| KalmanConfig {
            model,
            dt: config.dt,
            p0: config.p0,
            r: config.r,
            process_noise: ProcessNoise::WhiteNoise(config.q),
            initial_state: None,
        };

        Ok(Self {
            cv: KalmanFilter::from_config(&kalman(MotionModel::ConstantVelocity))?,
            ca: KalmanFilter::from_config(&kalman(MotionModel::ConstantAcceleration))?,
            threshold: config.threshold,
            active: MotionModel::ConstantVelocity,
        })
    }

    /// Model whose estimate was reported last
    pub fn active_model(&self) -> MotionModel {
        self.active
    }

    fn active_filter(&self) -> &KalmanFilter {
        match self.active {
            MotionModel::ConstantVelocity => &self.cv,
            MotionModel::ConstantAcceleration => &self.ca,
        }
    }
}

impl StateEstimator for MultiModelFilter {
    fn new_measure(&mut self, z: &Vector2<f64>) -> Result<Estimate, EstimatorError> {
        // Neither filter keeps the measurement unless both accept it
        let mut cv = self.cv.clone();
        let cv_innovation = cv.step(z)?;
        self.ca.step(z)?;
        self.cv = cv;

        let next = match cv_innovation {
            None => MotionModel::ConstantVelocity,
            Some(innovation) => {
                let r = self.cv.measurement_noise();
                let steady = (0..2).all(|k| innovation.y[k].abs() < self.threshold * r[(k, k)].sqrt());
                if steady {
                    MotionModel::ConstantVelocity
                } else {
                    MotionModel::ConstantAcceleration
                }
            }
        };

        if next != self.active {
            debug!(from = ?self.active, to = ?next, "motion model switched");
            self.active = next;
        }
        Ok(self.active_filter().estimate())
    }

    fn estimate(&self) -> Estimate {
        self.active_filter().estimate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_start(model: MotionModel) -> KalmanConfig {
        KalmanConfig {
            model,
            initial_state: Some(vec![0.0; model.state_dim()]),
            ..KalmanConfig::default()
        }
    }

    #[test]
    fn test_transition_matrix() {
        let f = MotionModel::ConstantAcceleration.transition_matrix(0.5);
        assert_eq!(f.nrows(), 6);
        // x <- x + vx dt + ax dt²/2
        assert!((f[(0, 0)] - 1.0).abs() < 1e-12);
        assert!((f[(0, 2)] - 0.5).abs() < 1e-12);
        assert!((f[(0, 4)] - 0.125).abs() < 1e-12);
        assert!((f[(3, 5)] - 0.5).abs() < 1e-12);
        assert_eq!(f[(0, 1)], 0.0);
        assert_eq!(f[(4, 0)], 0.0);

        let f = MotionModel::ConstantVelocity.transition_matrix(0.1);
        assert!((f[(1, 3)] - 0.1).abs() < 1e-12);
        assert_eq!(f.trace(), 4.0);
    }

    #[test]
    fn test_white_noise_blocks() {
        let q = MotionModel::ConstantVelocity.white_noise(0.1, 2.0);
        assert!((q[(0, 0)] - 0.0001 / 4.0 * 2.0).abs() < 1e-15);
        assert!((q[(0, 2)] - 0.001 / 2.0 * 2.0).abs() < 1e-15);
        assert!((q[(3, 3)] - 0.01 * 2.0).abs() < 1e-15);
        assert_eq!(q[(0, 1)], 0.0);
    }

    #[test]
    fn test_first_measurement_seeds_position() {
        let mut filter = KalmanFilter::new(MotionModel::ConstantVelocity);
        assert!(!filter.is_seeded());

        let estimate = filter.new_measure(&Vector2::new(12.0, -4.0)).unwrap();
        assert!(filter.is_seeded());
        assert_eq!(estimate.position, Vector2::new(12.0, -4.0));
        assert_eq!(estimate.velocity, Vector2::zeros());
    }

    #[test]
    fn test_convergence_with_non_increasing_trace() {
        for (model, tolerance) in [
            (MotionModel::ConstantVelocity, 0.05),
            (MotionModel::ConstantAcceleration, 0.05),
        ] {
            let mut filter = KalmanFilter::from_config(&zero_start(model)).unwrap();
            let z = Vector2::new(10.0, 20.0);

            let mut previous_trace = filter.state().p.trace();
            let mut estimate = filter.estimate();
            for _ in 0..60 {
                estimate = filter.new_measure(&z).unwrap();
                assert!(estimate.covariance_trace <= previous_trace + 1e-9);
                previous_trace = estimate.covariance_trace;
            }

            assert!((estimate.position - z).norm() < tolerance, "{:?}: {}", model, estimate.position);
        }
    }

    #[test]
    fn test_singular_innovation_leaves_state_untouched() {
        let config = KalmanConfig {
            p0: 0.0,
            r: 0.0,
            process_noise: ProcessNoise::WhiteNoise(0.0),
            ..zero_start(MotionModel::ConstantVelocity)
        };
        let mut filter = KalmanFilter::from_config(&config).unwrap();
        let before = filter.state().clone();

        let err = filter.new_measure(&Vector2::new(1.0, 1.0)).unwrap_err();
        assert_eq!(err, EstimatorError::SingularInnovation);
        assert_eq!(filter.state(), &before);
    }

    #[test]
    fn test_rejects_non_finite_measurement() {
        let mut filter = KalmanFilter::new(MotionModel::ConstantVelocity);
        assert!(matches!(
            filter.new_measure(&Vector2::new(f64::NAN, 0.0)),
            Err(EstimatorError::NonFiniteMeasurement(..))
        ));
        assert!(!filter.is_seeded());
    }

    #[test]
    fn test_config_dimension_checks() {
        let config = KalmanConfig {
            process_noise: ProcessNoise::Diagonal(vec![0.1; 3]),
            ..KalmanConfig::default()
        };
        assert!(KalmanFilter::from_config(&config).is_err());

        let config = KalmanConfig {
            initial_state: Some(vec![0.0; 4]),
            ..zero_start(MotionModel::ConstantAcceleration)
        };
        assert!(KalmanFilter::from_config(&config).is_err());

        let config = KalmanConfig {
            dt: 0.0,
            ..KalmanConfig::default()
        };
        assert!(KalmanFilter::from_config(&config).is_err());

        let config = KalmanConfig {
            process_noise: ProcessNoise::Diagonal(vec![0.1, 0.1, 0.01, 0.01]),
            ..KalmanConfig::default()
        };
        let filter = KalmanFilter::from_config(&config).unwrap();
        assert_eq!(filter.process_noise()[(2, 2)], 0.01);
    }

    #[test]
    fn test_adaptive_inflates_and_recovers() {
        let config = AdaptiveConfig {
            kalman: KalmanConfig {
                p0: 5.0,
                ..zero_start(MotionModel::ConstantVelocity)
            },
            eps_max: 20.0,
            q_scale_factor: 100.0,
            max_inflations: 10,
        };
        let mut filter = AdaptiveKalmanFilter::from_config(&config).unwrap();
        let base_q = filter.filter().process_noise().clone();

        for _ in 0..30 {
            filter.new_measure(&Vector2::new(0.0, 0.0)).unwrap();
        }
        assert_eq!(filter.inflations(), 0);

        let jump = Vector2::new(500.0, 500.0);
        for _ in 0..3 {
            filter.new_measure(&jump).unwrap();
        }
        assert_eq!(filter.inflations(), 3);
        let inflated = filter.filter().process_noise()[(0, 0)] / base_q[(0, 0)];
        assert!((inflated - 1e6).abs() < 1e-3);

        let mut estimate = filter.estimate();
        for _ in 0..40 {
            estimate = filter.new_measure(&jump).unwrap();
        }
        assert_eq!(filter.inflations(), 0);
        assert!((estimate.position - jump).norm() < 1.0);
        assert!((filter.filter().process_noise()[(0, 0)] - base_q[(0, 0)]).abs() < 1e-15);
    }

    #[test]
    fn test_adaptive_counter_is_capped() {
        let config = AdaptiveConfig {
            kalman: zero_start(MotionModel::ConstantVelocity),
            eps_max: 1e-9,
            q_scale_factor: 2.0,
            max_inflations: 2,
        };
        let mut filter = AdaptiveKalmanFilter::from_config(&config).unwrap();
        for i in 0..10 {
            filter.new_measure(&Vector2::new(100.0 * i as f64, 0.0)).unwrap();
        }
        assert_eq!(filter.inflations(), 2);
    }

    #[test]
    fn test_multi_model_switches_on_manoeuvre() {
        let mut filter = MultiModelFilter::from_config(&MmeConfig::default()).unwrap();

        for _ in 0..20 {
            filter.new_measure(&Vector2::new(0.0, 0.0)).unwrap();
            assert_eq!(filter.active_model(), MotionModel::ConstantVelocity);
        }

        filter.new_measure(&Vector2::new(500.0, 500.0)).unwrap();
        assert_eq!(filter.active_model(), MotionModel::ConstantAcceleration);
    }
}
