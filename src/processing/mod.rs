//! Observation filtering and temporal state estimation

pub mod estimator;
pub mod gh;
pub mod kalman;
pub mod statistic_filter;

pub use estimator::{Estimate, Estimator, StateEstimator};
pub use gh::GhFilter;
pub use kalman::{AdaptiveKalmanFilter, EstimatorState, KalmanFilter, MotionModel, MultiModelFilter, ProcessNoise};
pub use statistic_filter::{filter_by_gateway_distance, filter_by_result_distance, filter_by_timestamp_dispersion};
