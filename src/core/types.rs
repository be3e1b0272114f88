//! Core data types for the geolocation pipeline

use crate::core::constants::EARTH_RADIUS_M;
use crate::validation::error::GeoError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Latitude / longitude point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    lat: f64,
    lon: f64,
}

impl Point {
    /// Create a point, rejecting coordinates outside the geographic domain
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::InvalidLongitude(lon));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidLatitude(lat));
        }
        Ok(Self { lat, lon })
    }

    /// Null Island, the placeholder carried by unresolved results
    pub const fn origin() -> Self {
        Self { lat: 0.0, lon: 0.0 }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Great-circle distance to another point in metres (haversine)
    pub fn distance_to(&self, other: &Point) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());

        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        // Rounding can push `a` a hair above 1 for antipodal points
        let c = 2.0 * a.sqrt().min(1.0).asin();

        EARTH_RADIUS_M * c
    }

    /// Arithmetic mean of a set of points, `None` when empty
    pub fn mean(points: &[Point]) -> Option<Point> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (lat, lon) = points
            .iter()
            .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
        Point::new(lat / n, lon / n).ok()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "latitude: {:.6}, longitude: {:.6}", self.lat, self.lon)
    }
}

/// Fixed receiver reporting arrival times
///
/// Two gateways are the same receiver when latitude, longitude and altitude
/// match; the identifier is informational only.
#[derive(Debug, Clone, Serialize)]
pub struct Gateway {
    pub id: String,
    point: Point,
    altitude: f64,
}

impl Gateway {
    pub fn new(lat: f64, lon: f64) -> Result<Self, GeoError> {
        Ok(Self {
            id: String::new(),
            point: Point::new(lat, lon)?,
            altitude: 0.0,
        })
    }

    pub fn with_altitude(mut self, altitude: f64) -> Result<Self, GeoError> {
        if !altitude.is_finite() {
            return Err(GeoError::InvalidAltitude(altitude));
        }
        self.altitude = altitude;
        Ok(self)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn point(&self) -> &Point {
        &self.point
    }

    pub fn lat(&self) -> f64 {
        self.point.lat
    }

    pub fn lon(&self) -> f64 {
        self.point.lon
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn distance_to(&self, other: &Gateway) -> f64 {
        self.point.distance_to(&other.point)
    }
}

impl PartialEq for Gateway {
    fn eq(&self, other: &Self) -> bool {
        self.point.lat == other.point.lat
            && self.point.lon == other.point.lon
            && self.altitude == other.altitude
    }
}

/// Geographic circle: a center and a radius in metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Circle {
    center: Point,
    radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Result<Self, GeoError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(GeoError::InvalidRadius(radius));
        }
        Ok(Self { center, radius })
    }

    pub fn center(&self) -> &Point {
        &self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Distance between the two centers in metres
    pub fn center_distance(&self, other: &Circle) -> f64 {
        self.center.distance_to(&other.center)
    }

    /// True when the discs touch or overlap (sum of radii reaches the center distance)
    pub fn does_intersect(&self, other: &Circle) -> bool {
        self.radius + other.radius >= self.center_distance(other)
    }

    /// True when one circle lies strictly inside the other
    pub fn does_contain(&self, other: &Circle) -> bool {
        (self.radius - other.radius).abs() > self.center_distance(other)
    }

    /// True when the two boundaries actually cross or touch
    pub fn properly_intersects(&self, other: &Circle) -> bool {
        self.does_intersect(other) && !self.does_contain(other)
    }
}

/// A message received by one gateway
#[derive(Debug, Clone, Serialize)]
pub struct Uplink {
    pub gateway: Gateway,
    /// Wall-clock reception date, informational only
    pub arrival_date: DateTime<Utc>,
    timestamp: u64,
}

impl Uplink {
    /// Create an uplink; `timestamp` is the precise arrival time in nanoseconds
    pub fn new(gateway: Gateway, arrival_date: DateTime<Utc>, timestamp: i64) -> Result<Self, GeoError> {
        if timestamp < 0 {
            return Err(GeoError::InvalidTimestamp(timestamp));
        }
        Ok(Self {
            gateway,
            arrival_date,
            timestamp: timestamp as u64,
        })
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Signed arrival-time difference `self - other` in nanoseconds
    pub fn time_delta_ns(&self, other: &Uplink) -> f64 {
        (self.timestamp as i128 - other.timestamp as i128) as f64
    }
}

/// Outcome of one solver run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolverResult {
    pub geolocalized_device: Point,
    /// Estimated altitude, only produced by altitude-aware solvers
    pub altitude: Option<f64>,
    pub is_resolved: bool,
    /// Raw candidates the device position was averaged from
    pub intersections: Vec<Point>,
    /// Set when at least one candidate is a pseudo-intersection
    pub is_approximation: bool,
}

impl SolverResult {
    pub fn unresolved() -> Self {
        Self {
            geolocalized_device: Point::origin(),
            altitude: None,
            is_resolved: false,
            intersections: Vec::new(),
            is_approximation: false,
        }
    }

    /// Average the candidates into a resolved result, unresolved when there are none
    pub fn from_candidates(intersections: Vec<Point>) -> Self {
        match Point::mean(&intersections) {
            Some(mean) => Self {
                geolocalized_device: mean,
                altitude: None,
                is_resolved: true,
                intersections,
                is_approximation: false,
            },
            None => Self::unresolved(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_point_bounds() {
        assert!(Point::new(48.84, 2.26).is_ok());
        assert!(Point::new(90.0, -180.0).is_ok());
        assert_eq!(Point::new(90.5, 2.0), Err(GeoError::InvalidLatitude(90.5)));
        assert_eq!(Point::new(45.0, -180.1), Err(GeoError::InvalidLongitude(-180.1)));
        assert!(Point::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_known_distance() {
        // One degree of latitude on a 6,378,100 m sphere
        let a = Point::new(48.0, 2.0).unwrap();
        let b = Point::new(49.0, 2.0).unwrap();
        let expected = EARTH_RADIUS_M * 1f64.to_radians();
        assert!((a.distance_to(&b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_mean_point() {
        let points = [
            Point::new(48.0, 2.0).unwrap(),
            Point::new(49.0, 3.0).unwrap(),
        ];
        let mean = Point::mean(&points).unwrap();
        assert!((mean.lat() - 48.5).abs() < 1e-12);
        assert!((mean.lon() - 2.5).abs() < 1e-12);
        assert!(Point::mean(&[]).is_none());
    }

    #[test]
    fn test_gateway_equality_ignores_id() {
        let a = Gateway::new(48.84, 2.26).unwrap().with_id("gw-1");
        let b = Gateway::new(48.84, 2.26).unwrap().with_id("gw-2");
        assert_eq!(a, b);

        let c = Gateway::new(48.84, 2.26).unwrap().with_altitude(35.0).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_circle_predicates() {
        let a = Circle::new(Point::new(48.84, 2.26).unwrap(), 3000.0).unwrap();
        let b = Circle::new(Point::new(48.84, 2.30).unwrap(), 2000.0).unwrap();
        let far = Circle::new(Point::new(48.84, 2.50).unwrap(), 1000.0).unwrap();
        let inner = Circle::new(Point::new(48.841, 2.261).unwrap(), 100.0).unwrap();

        assert!(a.properly_intersects(&b));
        assert!(!a.does_intersect(&far));
        assert!(a.does_contain(&inner));
        assert!(!a.properly_intersects(&inner));
        assert!(Circle::new(*a.center(), -1.0).is_err());
    }

    #[test]
    fn test_uplink_rejects_negative_timestamp() {
        let gw = Gateway::new(48.84, 2.26).unwrap();
        assert_eq!(
            Uplink::new(gw.clone(), Utc::now(), -1).unwrap_err(),
            GeoError::InvalidTimestamp(-1)
        );

        let a = Uplink::new(gw.clone(), Utc::now(), 1_000).unwrap();
        let b = Uplink::new(gw, Utc::now(), 1_250).unwrap();
        assert_eq!(a.time_delta_ns(&b), -250.0);
    }

    fn point_strategy() -> impl Strategy<Value = Point> {
        (-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lon)| Point::new(lat, lon).unwrap())
    }

    proptest! {
        #[test]
        fn prop_distance_to_self_is_zero(p in point_strategy()) {
            prop_assert_eq!(p.distance_to(&p), 0.0);
        }

        #[test]
        fn prop_distance_is_symmetric(p in point_strategy(), q in point_strategy()) {
            let d1 = p.distance_to(&q);
            let d2 = q.distance_to(&p);
            prop_assert!((d1 - d2).abs() <= 1e-9 * d1.max(1.0));
        }
    }
}
