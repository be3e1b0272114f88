//! Position from three range circles

use crate::algorithms::circle::intersect;
use crate::core::{Circle, Point, Projection, SolverResult};
use tracing::debug;

/// Mean of the pairwise intersections of three circles
#[derive(Debug, Clone, Copy, Default)]
pub struct Trilateration;

impl Trilateration {
    /// Intersect every pair of circles and average all points found
    ///
    /// `is_approximation` is set when any pair only had a
    /// pseudo-intersection. No points at all leaves the result unresolved.
    pub fn solve(circles: &[Circle; 3], projection: &Projection) -> SolverResult {
        let mut points: Vec<Point> = Vec::with_capacity(6);
        let mut is_approximation = false;

        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let intersection = intersect(&circles[i], &circles[j], projection);
            if intersection.is_approximated {
                debug!(first = i, second = j, "circles do not properly intersect");
            }
            is_approximation |= intersection.is_approximated;
            points.extend(intersection.points());
        }

        let mut result = SolverResult::from_candidates(points);
        if result.is_resolved {
            result.is_approximation = is_approximation;
        }
        result
    }
}
