//! Closed-form linear multilateration from time differences
//!
//! Arrival times are taken relative to a pivot uplink (index 0). With `τm`
//! the delay of uplink `m` behind the pivot and `v` the propagation speed,
//! subtracting the range equations of uplink `m` and of a reference uplink
//! eliminates the unknown pivot range and leaves one linear equation per
//! remaining uplink:
//!
//! ```text
//! Am x + Bm y (+ Cm z) + Dm = 0
//! Am = 2 xm τ1 - 2 x1 τm        (Bm, Cm likewise on y, z)
//! Dm = v² τm τ1 (τm - τ1) - |Gm|² τ1 + |G1|² τm
//! ```
//!
//! where coordinates are relative to the pivot and index 1 denotes the
//! reference: the first uplink whose delay is non-zero. This is the usual
//! `2 xm / (v τm) - 2 x1 / (v τ1)` form multiplied through by `v τm τ1`, so an
//! uplink sharing the pivot's arrival time still yields a usable row.

use crate::algorithms::{planar_gateways, validate_batch, PositionSolver};
use crate::core::{Projection, SolverResult, Uplink, SPEED_OF_LIGHT_M_PER_NS};
use crate::validation::error::SolverError;
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

/// Planar TDOA solver for exactly four uplinks
#[derive(Debug, Clone, Copy, Default)]
pub struct Tdoa;

/// Altitude-aware TDOA solver for exactly five uplinks
#[derive(Debug, Clone, Copy, Default)]
pub struct Tdoa3d;

/// Solve the square linear system built from `uplinks`
///
/// Returns the solution relative to the pivot, `None` when every uplink
/// arrived with the pivot or the system is singular.
fn solve_linear(coordinates: &[Vec<f64>], uplinks: &[Uplink]) -> Option<DVector<f64>> {
    let dims = coordinates[0].len();
    let pivot = &uplinks[0];
    let tau: Vec<f64> = uplinks.iter().map(|u| u.time_delta_ns(pivot)).collect();

    let reference = match (1..uplinks.len()).find(|&i| tau[i] != 0.0) {
        Some(i) => i,
        None => {
            warn!("every uplink arrived with the pivot, no reference available");
            return None;
        }
    };

    let relative: Vec<Vec<f64>> = coordinates
        .iter()
        .map(|c| c.iter().zip(&coordinates[0]).map(|(a, o)| a - o).collect())
        .collect();
    let g1 = &relative[reference];
    let t1 = tau[reference];
    let g1_sq: f64 = g1.iter().map(|v| v * v).sum();
    let v2 = SPEED_OF_LIGHT_M_PER_NS * SPEED_OF_LIGHT_M_PER_NS;

    let rows: Vec<usize> = (1..uplinks.len()).filter(|&m| m != reference).collect();
    let mut a = DMatrix::zeros(rows.len(), dims);
    let mut rhs = DVector::zeros(rows.len());

    for (row, &m) in rows.iter().enumerate() {
        let gm = &relative[m];
        let tm = tau[m];
        for k in 0..dims {
            a[(row, k)] = 2.0 * gm[k] * t1 - 2.0 * g1[k] * tm;
        }
        let gm_sq: f64 = gm.iter().map(|v| v * v).sum();
        let d = v2 * tm * t1 * (tm - t1) - gm_sq * t1 + g1_sq * tm;
        rhs[row] = -d;
    }

    debug!(reference, equations = rows.len(), "TDOA system assembled");
    let solution = a.lu().solve(&rhs);
    if solution.is_none() {
        warn!("TDOA system is singular");
    }
    solution
}

impl PositionSolver for Tdoa {
    fn name(&self) -> &'static str {
        "TDOA"
    }

    fn solve(&self, uplinks: &[Uplink], projection: &Projection) -> Result<SolverResult, SolverError> {
        validate_batch(self.name(), uplinks, "exactly 4", |n| n == 4)?;

        let coordinates: Vec<Vec<f64>> = planar_gateways(uplinks, projection)
            .iter()
            .map(|g| vec![g.x, g.y])
            .collect();

        let Some(solution) = solve_linear(&coordinates, uplinks) else {
            return Ok(SolverResult::unresolved());
        };

        let x = coordinates[0][0] + solution[0];
        let y = coordinates[0][1] + solution[1];
        match projection.to_point(x, y) {
            Ok(point) => Ok(SolverResult::from_candidates(vec![point])),
            Err(e) => {
                debug!("TDOA solution rejected: {}", e);
                Ok(SolverResult::unresolved())
            }
        }
    }
}

impl PositionSolver for Tdoa3d {
    fn name(&self) -> &'static str {
        "TDOA3D"
    }

    fn solve(&self, uplinks: &[Uplink], projection: &Projection) -> Result<SolverResult, SolverError> {
        validate_batch(self.name(), uplinks, "exactly 5", |n| n == 5)?;

        let coordinates: Vec<Vec<f64>> = planar_gateways(uplinks, projection)
            .iter()
            .zip(uplinks)
            .map(|(g, u)| vec![g.x, g.y, u.gateway.altitude()])
            .collect();

        let Some(solution) = solve_linear(&coordinates, uplinks) else {
            return Ok(SolverResult::unresolved());
        };

        let x = coordinates[0][0] + solution[0];
        let y = coordinates[0][1] + solution[1];
        let altitude = coordinates[0][2] + solution[2];
        match projection.to_point(x, y) {
            Ok(point) if altitude.is_finite() => {
                let mut result = SolverResult::from_candidates(vec![point]);
                result.altitude = Some(altitude);
                Ok(result)
            }
            Ok(_) => Ok(SolverResult::unresolved()),
            Err(e) => {
                debug!("TDOA3D solution rejected: {}", e);
                Ok(SolverResult::unresolved())
            }
        }
    }
}
