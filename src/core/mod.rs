//! Core types and constants for the geolocation pipeline

pub mod constants;
pub mod projection;
pub mod types;

pub use constants::*;
pub use projection::Projection;
pub use types::*;
