//! Batch-by-batch geolocation of a single device
//!
//! Each call to [`GeolocationSolver::predict`] runs one batch of gateway
//! observations through the configured upstream filters, the selected
//! position solver, the candidate filter and finally the estimator tracking
//! the device.

use crate::algorithms::Lsm;
use crate::api::types::{ObservationRow, Prediction};
use crate::core::{Point, Projection, Uplink};
use crate::processing::statistic_filter::{
    filter_by_gateway_distance, filter_by_result_distance, filter_by_timestamp_dispersion,
};
use crate::processing::{Estimate, Estimator, StateEstimator};
use crate::utils::config::{FilterKind, SolverConfig};
use crate::validation::error::{Result, SolverError};
use nalgebra::Vector2;
use tracing::{debug, warn};

/// Stateful geolocation pipeline for one device track
#[derive(Debug, Clone)]
pub struct GeolocationSolver {
    config: SolverConfig,
    projection: Projection,
    estimator: Estimator,
    lsm: Lsm,
    /// Set once a measurement reached the estimator
    resolved: bool,
}

impl GeolocationSolver {
    /// Validate the configuration and build the pipeline
    pub fn new(config: SolverConfig) -> Result<Self> {
        config.validate()?;
        let projection = Projection::new(&config.projection)?;
        let estimator = Estimator::from_config(&config.estimator)?;
        let lsm = Lsm {
            max_iterations: config.lsm_max_iterations,
            ..Lsm::default()
        };

        Ok(Self {
            config,
            projection,
            estimator,
            lsm,
            resolved: false,
        })
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// True once at least one batch produced a smoothed position
    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Current smoothed position, if any batch was resolved
    pub fn position(&self) -> Option<Point> {
        if !self.resolved {
            return None;
        }
        let estimate = self.estimator.estimate();
        self.projection
            .to_point(estimate.position.x, estimate.position.y)
            .ok()
    }

    /// Locate the device from one batch of observations
    ///
    /// On error the estimator is left untouched.
    pub fn predict(&mut self, rows: &[ObservationRow]) -> Result<Prediction> {
        let uplinks = rows
            .iter()
            .map(ObservationRow::to_uplink)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let uplinks = self.filter_uplinks(uplinks);

        let (method, result) =
            self.config
                .compute
                .solve_with(&uplinks, &self.projection, self.lsm)?;

        if !result.is_resolved {
            warn!(%method, uplinks = uplinks.len(), "batch left unresolved");
            return Err(SolverError::Unresolved {
                method: method.name(),
                uplinks: uplinks.len(),
            }
            .into());
        }

        let (raw, candidates) = self.select_candidate(&result.intersections, result.geolocalized_device);

        // Committed only once the smoothed position maps back to a valid point
        let mut estimator = self.estimator.clone();
        let (x, y) = self.projection.project(&raw);
        let estimate: Estimate = estimator.new_measure(&Vector2::new(x, y))?;
        let smoothed = self
            .projection
            .to_point(estimate.position.x, estimate.position.y)?;
        self.estimator = estimator;
        self.resolved = true;

        debug!(%method, %raw, %smoothed, candidates, "batch located");

        Ok(Prediction {
            smoothed,
            raw,
            method,
            candidates,
            altitude: result.altitude,
            is_approximation: result.is_approximation,
            estimate,
        })
    }

    /// Apply the configured upstream filters in order
    fn filter_uplinks(&self, mut uplinks: Vec<Uplink>) -> Vec<Uplink> {
        for &kind in &self.config.filters {
            let multiplier = self.config.multiplier(kind);
            uplinks = match kind {
                FilterKind::Timestamp => filter_by_timestamp_dispersion(&uplinks, multiplier),
                FilterKind::Gateway => filter_by_gateway_distance(&uplinks, multiplier),
                FilterKind::Result => uplinks,
            };
        }
        uplinks
    }

    /// Reduce several candidates to one position
    ///
    /// With the result filter enabled, outlying candidates are dropped before
    /// averaging. A filter that rejects everything falls back to all candidates.
    fn select_candidate(&self, intersections: &[Point], solved: Point) -> (Point, usize) {
        if intersections.len() <= 1 {
            return (solved, intersections.len().max(1));
        }

        let kept = if self.config.is_enabled(FilterKind::Result) {
            filter_by_result_distance(intersections, self.config.multiplier(FilterKind::Result))
        } else {
            intersections.to_vec()
        };

        match Point::mean(&kept) {
            Some(mean) => (mean, kept.len()),
            None => (solved, intersections.len()),
        }
    }
}
