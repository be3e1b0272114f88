use chrono::{TimeZone, Utc};
use gateway_geoloc::validation::SolverError;
use gateway_geoloc::{ComputeMethod, Error, GeolocationSolver, ObservationRow, SolverConfig};

const GATEWAYS: [(f64, f64); 6] = [
    (48.84, 2.26),
    (48.88, 2.30),
    (48.80, 2.31),
    (48.86, 2.40),
    (48.82, 2.36),
    (48.90, 2.34),
];

const TIMESTAMPS: [i64; 6] = [
    1_495_456_868_630_601_609,
    1_495_456_868_630_597_404,
    1_495_456_868_630_603_258,
    1_495_456_868_630_601_606,
    1_495_456_868_630_597_406,
    1_495_456_868_630_642_783,
];

fn rows(gateways: &[(f64, f64)], timestamps: &[i64]) -> Vec<ObservationRow> {
    let arrival = Utc.with_ymd_and_hms(2017, 5, 22, 12, 41, 8).unwrap();
    gateways
        .iter()
        .zip(timestamps)
        .enumerate()
        .map(|(i, (&(lat, lon), &t))| ObservationRow::new(lat, lon, arrival, t).with_id(format!("gw-{}", i)))
        .collect()
}

#[test]
fn test_six_gateway_batch() {
    let mut solver = GeolocationSolver::new(SolverConfig::default()).unwrap();

    // The late sixth arrival is rejected by the timestamp filter, leaving LSM
    let prediction = solver.predict(&rows(&GATEWAYS, &TIMESTAMPS)).unwrap();

    assert_eq!(prediction.method, ComputeMethod::Lsm);
    assert_eq!(prediction.candidates, 1);
    assert!((prediction.raw.lat() - 48.84999998130743).abs() < 1e-6);
    assert!((prediction.raw.lon() - 2.3299994628745777).abs() < 1e-6);

    // The estimator seeds on its first measurement
    assert!((prediction.smoothed.lat() - prediction.raw.lat()).abs() < 1e-6);
    assert!((prediction.smoothed.lon() - prediction.raw.lon()).abs() < 1e-6);
    assert!(solver.is_resolved());
}

#[test]
fn test_inconsistent_batch_is_unresolved() {
    let gateways = [
        (48.84, 2.16),
        (48.94, 2.26),
        (48.95, 2.27),
        (48.96, 2.28),
        (48.97, 2.29),
        (48.75, 2.16),
    ];
    let t = 1_495_456_868_000_000_000;
    let config = SolverConfig::from_json_str(r#"{"compute": "LSM", "filters": ["TIMESTAMP"]}"#).unwrap();
    let mut solver = GeolocationSolver::new(config).unwrap();

    // The last arrival is filtered out; the remaining times admit no nearby fit
    let err = solver
        .predict(&rows(&gateways, &[t, t + 300, t + 300, t + 300, t + 300, t + 20_000]))
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Solver(SolverError::Unresolved {
            method: "LSM",
            uplinks: 5
        })
    ));
    assert!(!solver.is_resolved());
    assert_eq!(solver.position(), None);
}

#[test]
fn test_repeated_batch_stays_put() {
    let mut solver = GeolocationSolver::new(SolverConfig::default()).unwrap();
    let batch = rows(&GATEWAYS, &TIMESTAMPS);

    let first = solver.predict(&batch).unwrap();
    let second = solver.predict(&batch).unwrap();

    assert!(second.smoothed.distance_to(&first.smoothed) < 1e-3);
    assert!(second.estimate.covariance_trace < first.estimate.covariance_trace);
}

#[test]
fn test_explicit_tdoa_from_json_config() {
    let config = SolverConfig::from_json_str(
        r#"{"compute": "TDOA", "filters": ["TIMESTAMP"], "estimator": {"type": "GH"}}"#,
    )
    .unwrap();
    let mut solver = GeolocationSolver::new(config).unwrap();

    let batch = rows(
        &GATEWAYS[..4],
        &[1_000_012_799, 1_000_011_401, 1_000_018_557, 1_000_022_353],
    );
    let prediction = solver.predict(&batch).unwrap();

    assert_eq!(prediction.method, ComputeMethod::Tdoa);
    assert!((prediction.raw.lat() - 48.85).abs() < 1e-4);
    assert!((prediction.raw.lon() - 2.31).abs() < 1e-4);
    assert!(prediction.smoothed.distance_to(&prediction.raw) < 1e-3);
}

#[test]
fn test_explicit_method_checks_count() {
    let config = SolverConfig {
        compute: ComputeMethod::Tdoa,
        ..SolverConfig::default()
    };
    let mut solver = GeolocationSolver::new(config).unwrap();

    let err = solver
        .predict(&rows(&GATEWAYS[..3], &TIMESTAMPS[..3]))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Solver(SolverError::WrongUplinkCount { available: 3, .. })
    ));
}

#[test]
fn test_empty_batch() {
    let mut solver = GeolocationSolver::new(SolverConfig::default()).unwrap();

    let err = solver.predict(&[]).unwrap_err();
    assert!(matches!(
        err,
        Error::Solver(SolverError::InsufficientUplinks {
            available: 0,
            required: 3
        })
    ));
    assert!(!solver.is_resolved());
}
