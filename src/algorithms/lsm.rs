//! Nonlinear least-squares multilateration
//!
//! Minimises the sum of squared range-difference residuals
//! `|P - Gi| - |P - G0| - c (ti - t0)` over every non-pivot uplink with a
//! Levenberg-Marquardt iteration in the planar frame.

use crate::algorithms::{planar_gateways, validate_batch, PositionSolver};
use crate::core::{Projection, SolverResult, Uplink, SPEED_OF_LIGHT_M_PER_NS};
use crate::validation::error::SolverError;
use nalgebra::{DMatrix, DVector, Vector2};
use tracing::{debug, trace, warn};

const MIN_DISTANCE: f64 = 1e-10;
const INITIAL_DAMPING: f64 = 1e-3;
const MIN_DAMPING: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e12;
/// Farthest accepted solution from the pivot, in gateway network extents
const MAX_EXTENT_RATIO: f64 = 10.0;

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Termination {
    Gradient,
    StepSize,
    DampingExhausted,
    IterationCap,
}

impl Termination {
    fn converged(self) -> bool {
        matches!(self, Termination::Gradient | Termination::StepSize)
    }
}

#[derive(Debug, Clone, Copy)]
struct Fit {
    estimate: Vector2<f64>,
    cost: f64,
    termination: Termination,
}

/// Levenberg-Marquardt solver for three or more uplinks
#[derive(Debug, Clone, Copy)]
pub struct Lsm {
    pub max_iterations: usize,
    /// Gradient threshold; steps are compared relative to the estimate magnitude
    pub tolerance: f64,
}

impl Default for Lsm {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-9,
        }
    }
}

impl Lsm {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }

    /// Residuals and Jacobian of the range-difference model at `estimate`
    fn compute_residuals_and_jacobian(
        gateways: &[Vector2<f64>],
        range_differences: &[f64],
        estimate: &Vector2<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let n = gateways.len() - 1;
        let mut residuals = DVector::zeros(n);
        let mut jacobian = DMatrix::zeros(n, 2);

        let unit = |diff: Vector2<f64>| {
            let norm = diff.norm();
            if norm > MIN_DISTANCE {
                (norm, diff / norm)
            } else {
                (norm, Vector2::zeros())
            }
        };

        let (d0, u0) = unit(estimate - gateways[0]);
        for i in 1..gateways.len() {
            let (di, ui) = unit(estimate - gateways[i]);
            residuals[i - 1] = di - d0 - range_differences[i];

            let gradient = ui - u0;
            jacobian[(i - 1, 0)] = gradient.x;
            jacobian[(i - 1, 1)] = gradient.y;
        }

        (residuals, jacobian)
    }

    /// Run the iteration from the pivot gateway
    ///
    /// The step criterion is relative to the estimate magnitude, planar
    /// coordinates being in the millions of metres.
    fn levenberg_marquardt(&self, gateways: &[Vector2<f64>], range_differences: &[f64]) -> Option<Fit> {
        let mut estimate = gateways[0];
        let mut lambda = INITIAL_DAMPING;
        let mut termination = Termination::IterationCap;

        let (mut residuals, mut jacobian) =
            Self::compute_residuals_and_jacobian(gateways, range_differences, &estimate);
        let mut cost = residuals.dot(&residuals);

        for iteration in 0..self.max_iterations {
            let gradient = jacobian.transpose() * &residuals;
            if gradient.norm() < self.tolerance {
                debug!(iteration, cost, "LSM converged on gradient");
                termination = Termination::Gradient;
                break;
            }

            let mut augmented = jacobian.transpose() * &jacobian;
            for k in 0..2 {
                augmented[(k, k)] += lambda;
            }
            let step = augmented.lu().solve(&(-gradient))?;
            let candidate = estimate + Vector2::new(step[0], step[1]);

            let (new_residuals, new_jacobian) =
                Self::compute_residuals_and_jacobian(gateways, range_differences, &candidate);
            let new_cost = new_residuals.dot(&new_residuals);
            trace!(iteration, cost, new_cost, lambda, "LSM step");

            if new_cost < cost {
                estimate = candidate;
                residuals = new_residuals;
                jacobian = new_jacobian;
                cost = new_cost;
                lambda = (lambda / 10.0).max(MIN_DAMPING);

                if step.norm() < self.tolerance * (1.0 + estimate.norm()) {
                    debug!(iteration, cost, "LSM converged on step size");
                    termination = Termination::StepSize;
                    break;
                }
            } else {
                lambda *= 10.0;
                if lambda > MAX_DAMPING {
                    debug!(iteration, cost, "LSM damping exhausted");
                    termination = Termination::DampingExhausted;
                    break;
                }
            }
        }

        Some(Fit {
            estimate,
            cost,
            termination,
        })
    }
}

impl PositionSolver for Lsm {
    fn name(&self) -> &'static str {
        "LSM"
    }

    fn solve(&self, uplinks: &[Uplink], projection: &Projection) -> Result<SolverResult, SolverError> {
        validate_batch(self.name(), uplinks, "at least 3", |n| n >= 3)?;

        let gateways = planar_gateways(uplinks, projection);
        let pivot = &uplinks[0];
        let range_differences: Vec<f64> = uplinks
            .iter()
            .map(|u| u.time_delta_ns(pivot) * SPEED_OF_LIGHT_M_PER_NS)
            .collect();

        let Some(fit) = self.levenberg_marquardt(&gateways, &range_differences) else {
            debug!("LSM normal equations are singular");
            return Ok(SolverResult::unresolved());
        };

        if !fit.termination.converged() || !fit.cost.is_finite() {
            warn!(termination = ?fit.termination, cost = fit.cost, "LSM did not converge");
            return Ok(SolverResult::unresolved());
        }

        // Range-difference fits drift along hyperbola asymptotes when the
        // arrival times are inconsistent
        let extent = gateways
            .iter()
            .map(|g| (g - gateways[0]).norm())
            .fold(0.0, f64::max);
        let offset = (fit.estimate - gateways[0]).norm();
        if offset > MAX_EXTENT_RATIO * extent {
            warn!(offset, extent, "LSM solution lies outside the gateway network");
            return Ok(SolverResult::unresolved());
        }

        match projection.to_point(fit.estimate.x, fit.estimate.y) {
            Ok(point) => Ok(SolverResult::from_candidates(vec![point])),
            Err(e) => {
                debug!("LSM solution rejected: {}", e);
                Ok(SolverResult::unresolved())
            }
        }
    }
}
