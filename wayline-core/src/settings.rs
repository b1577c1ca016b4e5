//! Navigation settings
//!
//! Tunables for the waypoint-advance state machine, ETA calculation and
//! intended-route sharing. Persisted as JSON by the host application.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::filter::PartialRouteFilter;

/// Default waypoint circle radius in nautical miles
pub const DEFAULT_MIN_WAYPOINT_RADIUS_NM: f64 = 0.2;

/// Default factor for the relaxed waypoint change
pub const DEFAULT_RELAXED_RANGE_FACTOR: f64 = 2.0;

/// Default number of consecutive in-circle evaluations before finishing
pub const DEFAULT_FINISH_CONFIRMATIONS: u32 = 2;

/// Speed source for time-to-go on an active route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EtaCalculationMode {
    /// Planned leg speeds everywhere
    Planned,
    /// Live speed over ground everywhere
    Dynamic,
    /// Live speed on the current leg, planned speeds beyond
    #[default]
    Hybrid,
}

impl std::fmt::Display for EtaCalculationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EtaCalculationMode::Planned => write!(f, "planned"),
            EtaCalculationMode::Dynamic => write!(f, "dynamic"),
            EtaCalculationMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for EtaCalculationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "planned" => Ok(EtaCalculationMode::Planned),
            "dynamic" => Ok(EtaCalculationMode::Dynamic),
            "hybrid" => Ok(EtaCalculationMode::Hybrid),
            other => Err(format!("unknown ETA calculation mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationSettings {
    /// Smallest waypoint circle radius in nautical miles
    pub min_waypoint_radius: f64,
    /// Advance when the vessel is much closer to the next waypoint than the
    /// leg is long, even outside the waypoint circle
    pub relaxed_waypoint_change: bool,
    /// Advance when next-range × factor < leg range
    pub relaxed_range_factor: f64,
    /// Consecutive in-circle evaluations needed to finish the route
    pub finish_confirmations: u32,
    pub eta_calculation_mode: EtaCalculationMode,
    /// Window used when broadcasting the intended route
    pub partial_route_filter: PartialRouteFilter,
    /// Allowed drift of start time / final ETA before a forecast is stale
    pub metoc_tolerance_minutes: u32,
    /// Received intended routes older than this are dropped
    pub intended_route_max_age_minutes: u32,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        NavigationSettings {
            min_waypoint_radius: DEFAULT_MIN_WAYPOINT_RADIUS_NM,
            relaxed_waypoint_change: true,
            relaxed_range_factor: DEFAULT_RELAXED_RANGE_FACTOR,
            finish_confirmations: DEFAULT_FINISH_CONFIRMATIONS,
            eta_calculation_mode: EtaCalculationMode::default(),
            partial_route_filter: PartialRouteFilter::default(),
            metoc_tolerance_minutes: 15,
            intended_route_max_age_minutes: 30,
        }
    }
}

impl NavigationSettings {
    pub fn metoc_tolerance(&self) -> TimeDelta {
        TimeDelta::minutes(self.metoc_tolerance_minutes as i64)
    }

    pub fn intended_route_max_age(&self) -> TimeDelta {
        TimeDelta::minutes(self.intended_route_max_age_minutes as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::PartialRouteFilterKind;

    #[test]
    fn test_defaults() {
        let settings = NavigationSettings::default();
        assert_eq!(settings.min_waypoint_radius, 0.2);
        assert_eq!(settings.finish_confirmations, 2);
        assert_eq!(settings.eta_calculation_mode, EtaCalculationMode::Hybrid);
        assert_eq!(settings.partial_route_filter.kind, PartialRouteFilterKind::ByWaypointCount);
        assert_eq!(settings.metoc_tolerance(), TimeDelta::minutes(15));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: NavigationSettings =
            serde_json::from_str(r#"{"minWaypointRadius":0.5,"etaCalculationMode":"planned"}"#).unwrap();
        assert_eq!(settings.min_waypoint_radius, 0.5);
        assert_eq!(settings.eta_calculation_mode, EtaCalculationMode::Planned);
        assert!(settings.relaxed_waypoint_change);
        assert_eq!(settings.intended_route_max_age_minutes, 30);
    }

    #[test]
    fn test_eta_mode_from_str() {
        assert_eq!("Dynamic".parse::<EtaCalculationMode>(), Ok(EtaCalculationMode::Dynamic));
        assert!("fast".parse::<EtaCalculationMode>().is_err());
        assert_eq!(EtaCalculationMode::Hybrid.to_string(), "hybrid");
    }
}
