//! Error types for route construction, editing and snapshot parsing

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur when building, editing or decoding routes
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouteError {
    /// Waypoint index is outside the route
    #[error("Invalid waypoint index {index}, route has {count} waypoints")]
    InvalidWaypointIndex { index: usize, count: usize },

    /// Leg index is outside the route
    #[error("Invalid leg index {index}, route has {count} legs")]
    InvalidLegIndex { index: usize, count: usize },

    /// A route needs at least two waypoints
    #[error("Route too short: expected at least 2 waypoints, got {0}")]
    TooFewWaypoints(usize),

    /// Leg table doesn't line up with the waypoint sequence
    #[error("Leg count mismatch: {waypoints} waypoints need {expected} legs, got {actual}")]
    LegCountMismatch {
        waypoints: usize,
        expected: usize,
        actual: usize,
    },

    /// ETA needed for the operation is not defined (leg speed below 0.1 kn)
    #[error("ETA is undefined at waypoint {0}")]
    EtaUndefined(usize),

    /// Requested ETA doesn't lie strictly between the bounding ETAs
    #[error("Requested ETA {requested} outside allowed window ({lower:?}, {upper:?})")]
    EtaOutOfRange {
        requested: DateTime<Utc>,
        lower: Option<DateTime<Utc>>,
        upper: Option<DateTime<Utc>>,
    },

    /// Latitude or longitude out of range, or not finite
    #[error("Invalid position: lat {lat}, lon {lon}")]
    InvalidPosition { lat: f64, lon: f64 },

    /// Snapshot decoded fine but doesn't describe a usable route
    #[error("Malformed route snapshot: {0}")]
    MalformedSnapshot(String),

    /// Failed to deserialize snapshot bytes
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

impl From<bincode::Error> for RouteError {
    fn from(e: bincode::Error) -> Self {
        RouteError::DeserializationFailed(e.to_string())
    }
}

impl From<serde_json::Error> for RouteError {
    fn from(e: serde_json::Error) -> Self {
        RouteError::DeserializationFailed(e.to_string())
    }
}
