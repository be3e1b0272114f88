//! Time-of-arrival solver from hyperbola pairs
//!
//! Each pair of uplinks defines a hyperbola `|P - Gi| - |P - Gj| = c (ti - tj)`.
//! Two hyperbolas sharing a gateway are solved in closed form by expressing
//! the position as a function of the range to that shared pivot gateway,
//! which reduces the pair to a quadratic in the pivot range.

use crate::algorithms::{planar_gateways, validate_batch, PositionSolver};
use crate::core::{Point, Projection, SolverResult, Uplink, SPEED_OF_LIGHT_M_PER_NS};
use crate::validation::error::SolverError;
use nalgebra::{Matrix2, Vector2};
use thiserror::Error;
use tracing::{debug, warn};

/// Range differences below this (metres) are treated as zero
const ZERO_RANGE_DIFFERENCE: f64 = 1e-9;
/// Roots may undershoot the branch constraint by this much (metres)
const BRANCH_TOLERANCE: f64 = 1e-6;
const QUADRATIC_EPSILON: f64 = 1e-12;

/// One branch of `|P - G[first]| - |P - G[second]| = range_difference`
#[derive(Debug, Clone, Copy, PartialEq)]
struct Hyperbola {
    first: usize,
    second: usize,
    range_difference: f64,
}

impl Hyperbola {
    fn shared_gateway(&self, other: &Hyperbola) -> Option<usize> {
        [self.first, self.second]
            .into_iter()
            .find(|g| *g == other.first || *g == other.second)
    }

    fn other_gateway(&self, gateway: usize) -> usize {
        if self.first == gateway {
            self.second
        } else {
            self.first
        }
    }
}

#[derive(Debug, Error)]
enum PairFailure {
    #[error("hyperbola between uplinks {0} and {1} has zero range difference")]
    ZeroRangeDifference(usize, usize),
    #[error("hyperbolas share no gateway")]
    NoSharedGateway,
    #[error("gateways are collinear with pivot {0}")]
    Collinear(usize),
}

/// Closed-form solver for exactly three uplinks
#[derive(Debug, Clone, Copy, Default)]
pub struct Toa;

impl Toa {
    /// Solve two hyperbolas that share a gateway, in planar metres
    fn solve_pair(
        h1: &Hyperbola,
        h2: &Hyperbola,
        gateways: &[Vector2<f64>],
        timestamps: &[u64],
    ) -> Result<Vec<Vector2<f64>>, PairFailure> {
        for h in [h1, h2] {
            if h.range_difference.abs() < ZERO_RANGE_DIFFERENCE {
                return Err(PairFailure::ZeroRangeDifference(h.first, h.second));
            }
        }

        let pivot = h1.shared_gateway(h2).ok_or(PairFailure::NoSharedGateway)?;
        let others = [h1.other_gateway(pivot), h2.other_gateway(pivot)];
        let origin = gateways[pivot];

        // With r the pivot range: |P - Gk| = r + dk, dk = c (tk - t_pivot)
        let offsets = others.map(|k| gateways[k] - origin);
        let d = Vector2::from_iterator(others.iter().map(|&k| {
            (timestamps[k] as i128 - timestamps[pivot] as i128) as f64 * SPEED_OF_LIGHT_M_PER_NS
        }));

        let m = Matrix2::new(offsets[0].x, offsets[0].y, offsets[1].x, offsets[1].y);
        let m_inv = m.try_inverse().ok_or(PairFailure::Collinear(pivot))?;

        let b = Vector2::new(
            (offsets[0].norm_squared() - d[0] * d[0]) / 2.0,
            (offsets[1].norm_squared() - d[1] * d[1]) / 2.0,
        );
        // P - origin = u + r v
        let u = m_inv * b;
        let v = -(m_inv * d);

        let qa = v.dot(&v) - 1.0;
        let qb = 2.0 * u.dot(&v);
        let qc = u.dot(&u);

        let roots: Vec<f64> = if qa.abs() < QUADRATIC_EPSILON {
            if qb.abs() < QUADRATIC_EPSILON {
                Vec::new()
            } else {
                vec![-qc / qb]
            }
        } else {
            let discriminant = qb * qb - 4.0 * qa * qc;
            if discriminant < 0.0 {
                Vec::new()
            } else {
                let sq = discriminant.sqrt();
                vec![(-qb - sq) / (2.0 * qa), (-qb + sq) / (2.0 * qa)]
            }
        };

        Ok(roots
            .into_iter()
            .filter(|&r| r >= 0.0 && d.iter().all(|dk| r + dk >= -BRANCH_TOLERANCE))
            .map(|r| origin + u + v * r)
            .collect())
    }
}

impl PositionSolver for Toa {
    fn name(&self) -> &'static str {
        "TOA"
    }

    fn solve(&self, uplinks: &[Uplink], projection: &Projection) -> Result<SolverResult, SolverError> {
        validate_batch(self.name(), uplinks, "exactly 3", |n| n == 3)?;

        let gateways = planar_gateways(uplinks, projection);
        let timestamps: Vec<u64> = uplinks.iter().map(Uplink::timestamp).collect();

        let mut hyperbolas = Vec::with_capacity(3);
        for i in 0..uplinks.len() {
            for j in (i + 1)..uplinks.len() {
                hyperbolas.push(Hyperbola {
                    first: i,
                    second: j,
                    range_difference: uplinks[i].time_delta_ns(&uplinks[j]) * SPEED_OF_LIGHT_M_PER_NS,
                });
            }
        }

        let mut candidates: Vec<Point> = Vec::new();
        for a in 0..hyperbolas.len() {
            for b in (a + 1)..hyperbolas.len() {
                match Self::solve_pair(&hyperbolas[a], &hyperbolas[b], &gateways, &timestamps) {
                    Ok(points) => {
                        for p in points {
                            match projection.to_point(p.x, p.y) {
                                Ok(point) => candidates.push(point),
                                Err(e) => debug!("dropping TOA candidate: {}", e),
                            }
                        }
                    }
                    Err(e) => {
                        warn!("TOA hyperbola pair failed: {}", e);
                        return Ok(SolverResult::unresolved());
                    }
                }
            }
        }

        debug!(candidates = candidates.len(), "TOA solved");
        Ok(SolverResult::from_candidates(candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::test_support::uplinks;

    const GATEWAYS: [(f64, f64); 3] = [(48.84, 2.26), (48.88, 2.30), (48.80, 2.31)];

    #[test]
    fn test_recovers_position_from_consistent_times() {
        // Arrival times for a transmitter at (48.85, 2.31)
        let batch = uplinks(&GATEWAYS, &[1_000_012_799, 1_000_011_401, 1_000_018_557]);

        let result = Toa.solve(&batch, &Projection::default()).unwrap();
        assert!(result.is_resolved);
        assert!(!result.intersections.is_empty());
        assert!((result.geolocalized_device.lat() - 48.85).abs() < 1e-4);
        assert!((result.geolocalized_device.lon() - 2.31).abs() < 1e-4);
    }

    #[test]
    fn test_identical_timestamps_unresolved() {
        let batch = uplinks(&GATEWAYS, &[1_000_000_000, 1_000_000_000, 1_000_005_000]);

        let result = Toa.solve(&batch, &Projection::default()).unwrap();
        assert!(!result.is_resolved);
        assert_eq!(result.geolocalized_device, Point::origin());
        assert!(result.intersections.is_empty());
    }

    #[test]
    fn test_candidates_come_from_every_pivot() {
        let batch = uplinks(&GATEWAYS, &[1_000_012_799, 1_000_011_401, 1_000_018_557]);

        let result = Toa.solve(&batch, &Projection::default()).unwrap();
        // Three hyperbola pairs, each meeting at the same point
        assert_eq!(result.intersections.len(), 3);
        let first = result.intersections[0];
        for p in &result.intersections {
            assert!(p.distance_to(&first) < 1e-3);
        }
    }
}
