//! Input and output records of the orchestrator

use crate::algorithms::ComputeMethod;
use crate::core::{Gateway, Point, Uplink};
use crate::processing::Estimate;
use crate::validation::error::GeoError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One gateway reception of a device frame, as delivered by a network server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRow {
    /// Gateway latitude in degrees
    pub lat: f64,
    /// Gateway longitude in degrees
    pub lon: f64,
    /// Wall-clock reception date, informational only
    pub arrival_date: DateTime<Utc>,
    /// Fine arrival time in nanoseconds
    pub timestamp_ns: i64,
    /// Gateway altitude in metres
    #[serde(default)]
    pub altitude: f64,
    /// Gateway identifier
    #[serde(default)]
    pub id: Option<String>,
}

impl ObservationRow {
    pub fn new(lat: f64, lon: f64, arrival_date: DateTime<Utc>, timestamp_ns: i64) -> Self {
        Self {
            lat,
            lon,
            arrival_date,
            timestamp_ns,
            altitude: 0.0,
            id: None,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = altitude;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Validate the row and build the matching uplink
    pub fn to_uplink(&self) -> Result<Uplink, GeoError> {
        let mut gateway = Gateway::new(self.lat, self.lon)?.with_altitude(self.altitude)?;
        if let Some(id) = &self.id {
            gateway = gateway.with_id(id.clone());
        }
        Uplink::new(gateway, self.arrival_date, self.timestamp_ns)
    }
}

/// Outcome of one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Estimator output mapped back to geographic coordinates
    pub smoothed: Point,
    /// Solver output before smoothing
    pub raw: Point,
    /// Method actually used, never `Auto`
    pub method: ComputeMethod,
    /// Candidate positions kept after result filtering
    pub candidates: usize,
    /// Solved altitude, TDOA3D only
    pub altitude: Option<f64>,
    /// Whether the raw position comes from a nearest-point approximation
    pub is_approximation: bool,
    /// Planar estimator state after this batch
    pub estimate: Estimate,
}
