//! Planar projection between geographic and metric coordinates
//!
//! Solvers work in a conformal planar frame so that Euclidean distances
//! approximate ground distances over a regional network. Only a small
//! registry of systems is supported: the French Lambert conformal conic
//! grids and spherical web mercator.

use crate::core::types::Point;
use crate::validation::error::ProjectionError;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

const LATITUDE_TOLERANCE: f64 = 1e-14;
const MAX_LATITUDE_ITERATIONS: usize = 15;

/// Paris meridian expressed from Greenwich, 2°20'14.025" E
const PARIS_MERIDIAN_DEG: f64 = 2.0 + 20.0 / 60.0 + 14.025 / 3600.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Ellipsoid {
    semi_major: f64,
    eccentricity: f64,
}

impl Ellipsoid {
    fn from_inverse_flattening(semi_major: f64, inverse_flattening: f64) -> Self {
        let f = 1.0 / inverse_flattening;
        Self {
            semi_major,
            eccentricity: (2.0 * f - f * f).sqrt(),
        }
    }

    fn m(&self, phi: f64) -> f64 {
        let es = self.eccentricity * phi.sin();
        phi.cos() / (1.0 - es * es).sqrt()
    }

    fn t(&self, phi: f64) -> f64 {
        let es = self.eccentricity * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(self.eccentricity / 2.0)
    }
}

/// Lambert conformal conic parameters, reduced to the constants the
/// forward and inverse formulas need
#[derive(Debug, Clone, Copy, PartialEq)]
struct LambertConic {
    ellipsoid: Ellipsoid,
    n: f64,
    a_f: f64,
    r0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
}

impl LambertConic {
    /// Single standard parallel at the latitude of origin, scaled by `k0`
    fn one_parallel(
        ellipsoid: Ellipsoid,
        lat0_deg: f64,
        lon0_deg: f64,
        k0: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let phi0 = lat0_deg.to_radians();
        let n = phi0.sin();
        let f = ellipsoid.m(phi0) / (n * ellipsoid.t(phi0).powf(n));
        let a_f = ellipsoid.semi_major * f * k0;

        Self {
            ellipsoid,
            n,
            a_f,
            r0: a_f * ellipsoid.t(phi0).powf(n),
            lon0: lon0_deg.to_radians(),
            false_easting,
            false_northing,
        }
    }

    /// Two standard parallels, unit scale
    fn two_parallels(
        ellipsoid: Ellipsoid,
        lat1_deg: f64,
        lat2_deg: f64,
        lat0_deg: f64,
        lon0_deg: f64,
        false_easting: f64,
        false_northing: f64,
    ) -> Self {
        let (phi1, phi2) = (lat1_deg.to_radians(), lat2_deg.to_radians());
        let (m1, m2) = (ellipsoid.m(phi1), ellipsoid.m(phi2));
        let (t1, t2) = (ellipsoid.t(phi1), ellipsoid.t(phi2));

        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let f = m1 / (n * t1.powf(n));
        let a_f = ellipsoid.semi_major * f;

        Self {
            ellipsoid,
            n,
            a_f,
            r0: a_f * ellipsoid.t(lat0_deg.to_radians()).powf(n),
            lon0: lon0_deg.to_radians(),
            false_easting,
            false_northing,
        }
    }

    fn forward(&self, lat: f64, lon: f64) -> (f64, f64) {
        let r = self.a_f * self.ellipsoid.t(lat.to_radians()).powf(self.n);
        let theta = self.n * (lon.to_radians() - self.lon0);

        (
            self.false_easting + r * theta.sin(),
            self.false_northing + self.r0 - r * theta.cos(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.false_easting;
        let dy = self.r0 - (y - self.false_northing);
        let r = dx.hypot(dy).copysign(self.n);
        let t = (r / self.a_f).powf(1.0 / self.n);
        let theta = if self.n > 0.0 {
            dx.atan2(dy)
        } else {
            (-dx).atan2(-dy)
        };
        let lon = theta / self.n + self.lon0;

        let e = self.ellipsoid.eccentricity;
        let mut phi = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..MAX_LATITUDE_ITERATIONS {
            let es = e * phi.sin();
            let next = FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(e / 2.0)).atan();
            let delta = (next - phi).abs();
            phi = next;
            if delta < LATITUDE_TOLERANCE {
                break;
            }
        }

        (lon.to_degrees(), phi.to_degrees())
    }
}

/// ED50 / France EuroLambert
fn euro_lambert() -> Method {
    Method::Lambert(LambertConic::one_parallel(
        Ellipsoid::from_inverse_flattening(6_378_388.0, 297.0),
        46.8,
        PARIS_MERIDIAN_DEG,
        0.999_877_42,
        600_000.0,
        2_200_000.0,
    ))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Method {
    Lambert(LambertConic),
    /// Spherical mercator on the given radius
    WebMercator(f64),
}

/// A planar coordinate system from the supported registry
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    id: String,
    method: Method,
}

impl Projection {
    /// Look up a projection by its `epsg:<code>` identifier (case-insensitive)
    pub fn new(id: &str) -> Result<Self, ProjectionError> {
        let normalized = id.trim().to_ascii_lowercase();
        let method = match normalized.as_str() {
            "epsg:2192" => euro_lambert(),
            // NTF (Paris) / Lambert zone II étendu
            "epsg:27572" => Method::Lambert(LambertConic::one_parallel(
                Ellipsoid::from_inverse_flattening(6_378_249.2, 293.466_021_293_627),
                46.8,
                PARIS_MERIDIAN_DEG,
                0.999_877_42,
                600_000.0,
                2_200_000.0,
            )),
            // RGF93 / Lambert-93
            "epsg:2154" => Method::Lambert(LambertConic::two_parallels(
                Ellipsoid::from_inverse_flattening(6_378_137.0, 298.257_222_101),
                49.0,
                44.0,
                46.5,
                3.0,
                700_000.0,
                6_600_000.0,
            )),
            "epsg:3857" => Method::WebMercator(6_378_137.0),
            _ => return Err(ProjectionError::UnknownSystem(id.to_string())),
        };

        Ok(Self {
            id: normalized,
            method,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Geographic degrees to planar metres, returned as `(x, y)`
    pub fn lat_lon_to_xy(&self, lat: f64, lon: f64) -> (f64, f64) {
        match &self.method {
            Method::Lambert(lcc) => lcc.forward(lat, lon),
            Method::WebMercator(radius) => {
                let phi = lat.to_radians();
                (
                    radius * lon.to_radians(),
                    radius * (FRAC_PI_4 + phi / 2.0).tan().ln(),
                )
            }
        }
    }

    /// Planar metres to geographic degrees, returned as `(lon, lat)`
    pub fn xy_to_lon_lat(&self, x: f64, y: f64) -> (f64, f64) {
        match &self.method {
            Method::Lambert(lcc) => lcc.inverse(x, y),
            Method::WebMercator(radius) => (
                (x / radius).to_degrees(),
                (2.0 * (y / radius).exp().atan() - FRAC_PI_2).to_degrees(),
            ),
        }
    }

    pub fn project(&self, point: &Point) -> (f64, f64) {
        self.lat_lon_to_xy(point.lat(), point.lon())
    }

    /// Inverse-project planar metres into a validated [`Point`]
    pub fn to_point(&self, x: f64, y: f64) -> Result<Point, ProjectionError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::OutOfDomain { x, y });
        }
        let (lon, lat) = self.xy_to_lon_lat(x, y);
        Point::new(lat, lon).map_err(|_| ProjectionError::OutOfDomain { x, y })
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            id: crate::core::constants::DEFAULT_PROJECTION.to_string(),
            method: euro_lambert(),
        }
    }
}
