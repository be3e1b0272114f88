//! Position solvers turning arrival observations into candidate positions

pub mod circle;
pub mod lsm;
pub mod tdoa;
pub mod toa;
pub mod trilateration;

pub use circle::{intersect, CircleIntersection};
pub use lsm::Lsm;
pub use tdoa::{Tdoa, Tdoa3d};
pub use toa::Toa;
pub use trilateration::Trilateration;

use crate::core::{Projection, SolverResult, Uplink};
use crate::validation::error::SolverError;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Capability shared by every uplink-based solver
pub trait PositionSolver {
    /// Short method name used in errors and logs
    fn name(&self) -> &'static str;

    /// Solve one batch of uplinks
    ///
    /// Count and gateway uniqueness are checked before any computation.
    /// Numeric failures do not error; they yield an unresolved result.
    fn solve(&self, uplinks: &[Uplink], projection: &Projection) -> Result<SolverResult, SolverError>;
}

/// Solver selection, `Auto` picks by uplink count
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComputeMethod {
    #[default]
    Auto,
    Toa,
    Tdoa,
    Tdoa3d,
    Lsm,
}

impl fmt::Display for ComputeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ComputeMethod {
    /// Upper-case name, as used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            ComputeMethod::Auto => "AUTO",
            ComputeMethod::Toa => "TOA",
            ComputeMethod::Tdoa => "TDOA",
            ComputeMethod::Tdoa3d => "TDOA3D",
            ComputeMethod::Lsm => "LSM",
        }
    }

    /// Concrete method for a batch of `count` uplinks
    ///
    /// `Auto` maps 3 to TOA, 4 to TDOA and anything larger to LSM. Explicit
    /// methods are returned unchanged; their solver checks the count.
    pub fn resolve(self, count: usize) -> Result<ComputeMethod, SolverError> {
        match self {
            ComputeMethod::Auto => match count {
                0..=2 => Err(SolverError::InsufficientUplinks {
                    available: count,
                    required: 3,
                }),
                3 => Ok(ComputeMethod::Toa),
                4 => Ok(ComputeMethod::Tdoa),
                _ => Ok(ComputeMethod::Lsm),
            },
            method => Ok(method),
        }
    }

    /// Resolve the method and run the matching solver with default settings
    pub fn solve(
        self,
        uplinks: &[Uplink],
        projection: &Projection,
    ) -> Result<(ComputeMethod, SolverResult), SolverError> {
        self.solve_with(uplinks, projection, Lsm::default())
    }

    /// Resolve the method and run the matching solver, using `lsm` for
    /// least-squares batches
    pub fn solve_with(
        self,
        uplinks: &[Uplink],
        projection: &Projection,
        lsm: Lsm,
    ) -> Result<(ComputeMethod, SolverResult), SolverError> {
        let method = self.resolve(uplinks.len())?;
        let solver: Box<dyn PositionSolver> = match method {
            ComputeMethod::Toa => Box::new(Toa),
            ComputeMethod::Tdoa => Box::new(Tdoa),
            ComputeMethod::Tdoa3d => Box::new(Tdoa3d),
            ComputeMethod::Lsm | ComputeMethod::Auto => Box::new(lsm),
        };
        debug!(method = solver.name(), uplinks = uplinks.len(), "solving batch");
        Ok((method, solver.solve(uplinks, projection)?))
    }
}

/// Check the uplink count and that no two uplinks share a gateway
pub(crate) fn validate_batch(
    method: &'static str,
    uplinks: &[Uplink],
    expected: &'static str,
    count_ok: impl Fn(usize) -> bool,
) -> Result<(), SolverError> {
    if !count_ok(uplinks.len()) {
        return Err(SolverError::WrongUplinkCount {
            method,
            expected,
            available: uplinks.len(),
        });
    }

    for (i, a) in uplinks.iter().enumerate() {
        for (j, b) in uplinks.iter().enumerate().skip(i + 1) {
            if a.gateway == b.gateway {
                return Err(SolverError::DuplicateGateway {
                    first: i,
                    second: j,
                    lat: a.gateway.lat(),
                    lon: a.gateway.lon(),
                });
            }
        }
    }

    Ok(())
}

/// Planar coordinates of every uplink's gateway
pub(crate) fn planar_gateways(uplinks: &[Uplink], projection: &Projection) -> Vec<Vector2<f64>> {
    uplinks
        .iter()
        .map(|uplink| {
            let (x, y) = projection.project(uplink.gateway.point());
            Vector2::new(x, y)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::{Gateway, Uplink};
    use chrono::Utc;

    pub fn uplink(lat: f64, lon: f64, timestamp: i64) -> Uplink {
        Uplink::new(Gateway::new(lat, lon).unwrap(), Utc::now(), timestamp).unwrap()
    }

    pub fn uplinks(gateways: &[(f64, f64)], timestamps: &[i64]) -> Vec<Uplink> {
        gateways
            .iter()
            .zip(timestamps)
            .map(|(&(lat, lon), &t)| uplink(lat, lon, t))
            .collect()
    }
}
