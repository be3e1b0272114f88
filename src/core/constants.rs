//! Physical constants and system parameters

/// Radio propagation speed used for range differences (metres per nanosecond)
pub const SPEED_OF_LIGHT_M_PER_NS: f64 = 0.2997924580;

/// Mean Earth radius for great-circle distances (metres)
pub const EARTH_RADIUS_M: f64 = 6_378_100.0;

/// Planar system used when none is configured (ED50 / France EuroLambert)
pub const DEFAULT_PROJECTION: &str = "epsg:2192";

/// Spread multiplier applied by the outlier filters when none is configured
pub const DEFAULT_SPREAD_MULTIPLIER: f64 = 2.0;
