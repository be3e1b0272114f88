//! Intersection of two geographic circles
//!
//! The geometry is solved in the planar frame of a [`Projection`]. Circles
//! that do not properly cross still get a pseudo-intersection: the nearest
//! points of the two boundaries along the line joining the centers.

use crate::core::{Circle, Point, Projection};
use nalgebra::Vector2;
use serde::Serialize;
use tracing::debug;

/// Centers closer than this (in metres) are treated as concentric
const CONCENTRIC_TOLERANCE: f64 = 1e-9;

/// Up to two points where two circles meet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircleIntersection {
    pub first: Option<Point>,
    pub second: Option<Point>,
    /// Set when the points are nearest-point approximations
    pub is_approximated: bool,
}

impl CircleIntersection {
    fn none() -> Self {
        Self {
            first: None,
            second: None,
            is_approximated: true,
        }
    }

    /// The points that exist, in slot order
    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.first.iter().chain(self.second.iter()).copied()
    }
}

/// Intersect two circles
///
/// A tangent contact is reported twice. Concentric circles and points that
/// fail to map back to geographic coordinates yield no points.
pub fn intersect(c1: &Circle, c2: &Circle, projection: &Projection) -> CircleIntersection {
    let is_approximated = !c1.properly_intersects(c2);

    let (x1, y1) = projection.project(c1.center());
    let (x2, y2) = projection.project(c2.center());
    let p1 = Vector2::new(x1, y1);
    let p2 = Vector2::new(x2, y2);
    let (r1, r2) = (c1.radius(), c2.radius());

    let offset = p2 - p1;
    let d = offset.norm();
    if d < CONCENTRIC_TOLERANCE {
        debug!("concentric circles, no intersection");
        return CircleIntersection::none();
    }
    let u = offset / d;

    let (a, b) = if !is_approximated {
        // Distance from p1 to the chord, then half the chord length
        let along = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
        let half_chord = (r1 * r1 - along * along).max(0.0).sqrt();
        let base = p1 + u * along;
        let normal = Vector2::new(-u.y, u.x);
        (base + normal * half_chord, base - normal * half_chord)
    } else if !c1.does_intersect(c2) {
        (p1 + u * r1, p2 - u * r2)
    } else {
        // Containment: both boundary points sit on the ray from the larger
        // center through the smaller one
        let w = if r1 >= r2 { u } else { -u };
        (p1 + w * r1, p2 + w * r2)
    };

    match (projection.to_point(a.x, a.y), projection.to_point(b.x, b.y)) {
        (Ok(first), Ok(second)) => CircleIntersection {
            first: Some(first),
            second: Some(second),
            is_approximated,
        },
        _ => {
            debug!("intersection points fall outside the projection domain");
            CircleIntersection::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn circle(lat: f64, lon: f64, radius: f64) -> Circle {
        Circle::new(Point::new(lat, lon).unwrap(), radius).unwrap()
    }

    #[test]
    fn test_proper_intersection_points_lie_on_both_circles() {
        let projection = Projection::default();
        let c1 = circle(48.84, 2.26, 3000.0);
        let c2 = circle(48.84, 2.30, 2500.0);

        let result = intersect(&c1, &c2, &projection);
        assert!(!result.is_approximated);

        let points: Vec<Point> = result.points().collect();
        assert_eq!(points.len(), 2);
        for p in &points {
            // Planar and great-circle distances agree to well under 0.1%
            assert!((p.distance_to(c1.center()) - 3000.0).abs() < 5.0);
            assert!((p.distance_to(c2.center()) - 2500.0).abs() < 5.0);
        }
        assert_ne!(points[0], points[1]);
    }

    #[test]
    fn test_disjoint_circles_are_approximated() {
        let projection = Projection::default();
        let c1 = circle(48.84, 2.26, 1000.0);
        let c2 = circle(48.84, 2.40, 1000.0);

        let result = intersect(&c1, &c2, &projection);
        assert!(result.is_approximated);

        let first = result.first.unwrap();
        let second = result.second.unwrap();
        assert!((first.distance_to(c1.center()) - 1000.0).abs() < 5.0);
        assert!((second.distance_to(c2.center()) - 1000.0).abs() < 5.0);
        // Both points lie between the centers
        assert!(first.lon() > 2.26 && first.lon() < second.lon() && second.lon() < 2.40);
    }

    #[test]
    fn test_contained_circle_is_approximated() {
        let projection = Projection::default();
        let outer = circle(48.84, 2.26, 5000.0);
        let inner = circle(48.84, 2.27, 500.0);

        let result = intersect(&outer, &inner, &projection);
        assert!(result.is_approximated);

        let on_outer = result.first.unwrap();
        let on_inner = result.second.unwrap();
        assert!((on_outer.distance_to(outer.center()) - 5000.0).abs() < 25.0);
        assert!((on_inner.distance_to(inner.center()) - 500.0).abs() < 5.0);
        // Nearest pair lies east of the inner center
        assert!(on_inner.lon() > 2.27 && on_outer.lon() > on_inner.lon());
    }

    #[test]
    fn test_concentric_circles_have_no_points() {
        let projection = Projection::default();
        let c1 = circle(48.84, 2.26, 1000.0);
        let c2 = circle(48.84, 2.26, 500.0);

        let result = intersect(&c1, &c2, &projection);
        assert!(result.is_approximated);
        assert_eq!(result.points().count(), 0);
    }

    #[test]
    fn test_approximation_flag_matches_predicate() {
        let projection = Projection::default();
        let base = circle(48.84, 2.26, 2000.0);
        for (lon, radius) in [(2.28, 1500.0), (2.35, 500.0), (2.261, 100.0), (2.30, 1000.0)] {
            let other = circle(48.84, lon, radius);
            let result = intersect(&base, &other, &projection);
            assert_eq!(result.is_approximated, !base.properly_intersects(&other));
        }
    }
}
