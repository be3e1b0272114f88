//! Dispersion-based outlier rejection
//!
//! Every filter scores its items, then keeps those whose score lies within
//! `multiplier` population standard deviations of the mean score. Input
//! order is preserved and degenerate input never errors.

use crate::core::{Point, Uplink};
use tracing::debug;

/// Multiplier substituted for non-positive or non-finite values
const FALLBACK_MULTIPLIER: f64 = 1.0;

fn effective_multiplier(multiplier: f64) -> f64 {
    if multiplier.is_finite() && multiplier > 0.0 {
        multiplier
    } else {
        FALLBACK_MULTIPLIER
    }
}

/// Indices of the scores within `multiplier` standard deviations of the mean
fn within_spread(scores: &[f64], multiplier: f64) -> Vec<usize> {
    if scores.is_empty() {
        return Vec::new();
    }

    let m = effective_multiplier(multiplier);
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let std = (scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n).sqrt();

    scores
        .iter()
        .enumerate()
        .filter(|(_, s)| (*s - mean).abs() <= m * std)
        .map(|(i, _)| i)
        .collect()
}

fn keep<T: Clone>(items: &[T], kept: &[usize], filter: &str) -> Vec<T> {
    if kept.len() < items.len() {
        debug!(filter, removed = items.len() - kept.len(), "outliers rejected");
    }
    kept.iter().map(|&i| items[i].clone()).collect()
}

/// Drop uplinks whose arrival time stands out from the batch
///
/// Score of uplink i: `Σj (ti - tj)`.
pub fn filter_by_timestamp_dispersion(uplinks: &[Uplink], multiplier: f64) -> Vec<Uplink> {
    let scores: Vec<f64> = uplinks
        .iter()
        .map(|a| uplinks.iter().map(|b| a.time_delta_ns(b)).sum())
        .collect();
    keep(uplinks, &within_spread(&scores, multiplier), "timestamp")
}

/// Drop candidate positions far from the others
///
/// Score of point i: `Σj distance(pi, pj)`.
pub fn filter_by_result_distance(points: &[Point], multiplier: f64) -> Vec<Point> {
    let scores: Vec<f64> = points
        .iter()
        .map(|a| points.iter().map(|b| a.distance_to(b)).sum())
        .collect();
    keep(points, &within_spread(&scores, multiplier), "result")
}

/// Drop uplinks received by gateways far from the rest of the network
///
/// Score of uplink i: `Σj distance(gi, gj)`.
pub fn filter_by_gateway_distance(uplinks: &[Uplink], multiplier: f64) -> Vec<Uplink> {
    let scores: Vec<f64> = uplinks
        .iter()
        .map(|a| uplinks.iter().map(|b| a.gateway.distance_to(&b.gateway)).sum())
        .collect();
    keep(uplinks, &within_spread(&scores, multiplier), "gateway")
}
