//! Route wire snapshots
//!
//! A snapshot is the flat, self-contained form of a route used for
//! persistence and for intended-route broadcasts. It comes in two
//! encodings: JSON for configuration files and logs, and a compact bincode
//! form for transmission.
//!
//! Each waypoint carries its own outgoing leg. The last waypoint of a
//! snapshot never has one, which is also how a partial route marks the end
//! of the broadcast window.

use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::RouteError;
use crate::geo::{Position, SailingMode};
use crate::leg::RouteLeg;
use crate::route::Route;
use crate::waypoint::RouteWaypoint;

/// Outgoing leg of a snapshot waypoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegSnapshot {
    pub speed: f64,
    #[serde(default)]
    pub xtd_port: Option<f64>,
    #[serde(default)]
    pub xtd_starboard: Option<f64>,
    pub stand_fast_length: f64,
    #[serde(default)]
    pub sailing_mode: SailingMode,
}

impl From<&RouteLeg> for LegSnapshot {
    fn from(leg: &RouteLeg) -> Self {
        LegSnapshot {
            speed: leg.speed,
            xtd_port: leg.xtd_port,
            xtd_starboard: leg.xtd_starboard,
            stand_fast_length: leg.stand_fast_length,
            sailing_mode: leg.sailing_mode,
        }
    }
}

impl From<&LegSnapshot> for RouteLeg {
    fn from(leg: &LegSnapshot) -> Self {
        RouteLeg::new(leg.speed)
            .with_sailing_mode(leg.sailing_mode)
            .with_xtd(leg.xtd_port, leg.xtd_starboard)
            .with_stand_fast_length(leg.stand_fast_length)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaypointSnapshot {
    #[serde(default)]
    pub name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub turn_radius: Option<f64>,
    #[serde(default)]
    pub rate_of_turn: Option<f64>,
    #[serde(default)]
    pub eta: Option<DateTime<Utc>>,
    #[serde(default)]
    pub outgoing_leg: Option<LegSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub departure: Option<String>,
    #[serde(default)]
    pub destination: Option<String>,
    pub waypoints: Vec<WaypointSnapshot>,
    /// Active waypoint within `waypoints`, set on broadcasts from an
    /// active route
    #[serde(default)]
    pub active_waypoint_index: Option<usize>,
    /// Originally planned ETAs, parallel to `waypoints`
    #[serde(default)]
    pub original_etas: Vec<Option<DateTime<Utc>>>,
}

impl RouteSnapshot {
    /// Snapshot of a whole route
    pub fn from_route(route: &Route) -> Self {
        let count = route.waypoint_count();
        if count == 0 {
            return RouteSnapshot {
                name: route.name().to_string(),
                departure: route.departure().map(str::to_string),
                destination: route.destination().map(str::to_string),
                waypoints: Vec::new(),
                active_waypoint_index: None,
                original_etas: Vec::new(),
            };
        }
        let mut snapshot = RouteSnapshot::from_window(route, 0..=count - 1, None, route.etas());
        snapshot.active_waypoint_index = None;
        snapshot
    }

    /// Snapshot of the waypoints in `window`. `original_etas` is indexed
    /// like the full route.
    pub(crate) fn from_window(
        route: &Route,
        window: RangeInclusive<usize>,
        active: Option<usize>,
        original_etas: &[Option<DateTime<Utc>>],
    ) -> Self {
        let first = *window.start();
        let end = *window.end();

        let waypoints = window
            .clone()
            .filter_map(|i| {
                let waypoint = route.waypoint(i)?;
                let outgoing_leg = if i < end {
                    route.legs().get(i).map(LegSnapshot::from)
                } else {
                    None
                };
                Some(WaypointSnapshot {
                    name: waypoint.name.clone(),
                    latitude: waypoint.position.latitude(),
                    longitude: waypoint.position.longitude(),
                    turn_radius: waypoint.turn_radius(),
                    rate_of_turn: waypoint.rate_of_turn(),
                    eta: route.eta(i),
                    outgoing_leg,
                })
            })
            .collect();

        RouteSnapshot {
            name: route.name().to_string(),
            departure: route.departure().map(str::to_string),
            destination: route.destination().map(str::to_string),
            waypoints,
            active_waypoint_index: active.map(|a| a.saturating_sub(first)),
            original_etas: window
                .map(|i| original_etas.get(i).copied().flatten())
                .collect(),
        }
    }

    /// Check that the snapshot describes a usable route
    pub fn validate(&self) -> Result<(), RouteError> {
        let count = self.waypoints.len();
        if count < 2 {
            return Err(RouteError::TooFewWaypoints(count));
        }
        for (i, waypoint) in self.waypoints.iter().enumerate() {
            Position::new(waypoint.latitude, waypoint.longitude)?;
            match (&waypoint.outgoing_leg, i + 1 < count) {
                (None, true) => {
                    return Err(RouteError::MalformedSnapshot(format!(
                        "waypoint {} has no outgoing leg",
                        i
                    )));
                }
                (Some(leg), _) if !(leg.speed.is_finite() && leg.speed >= 0.0) => {
                    return Err(RouteError::MalformedSnapshot(format!(
                        "leg {} has invalid speed {}",
                        i, leg.speed
                    )));
                }
                _ => {}
            }
        }
        if let Some(active) = self.active_waypoint_index {
            if active >= count {
                return Err(RouteError::MalformedSnapshot(format!(
                    "active waypoint {} outside {} waypoints",
                    active, count
                )));
            }
        }
        if !self.original_etas.is_empty() && self.original_etas.len() != count {
            return Err(RouteError::MalformedSnapshot(format!(
                "{} original ETAs for {} waypoints",
                self.original_etas.len(),
                count
            )));
        }
        Ok(())
    }

    /// Build a route. Its start time is the ETA of the first waypoint.
    pub fn to_route(&self, clock: SharedClock) -> Result<Route, RouteError> {
        self.validate()?;

        let waypoints = self
            .waypoints
            .iter()
            .map(|w| {
                let position = Position::new(w.latitude, w.longitude)?;
                let mut waypoint = RouteWaypoint::new(position);
                waypoint.name = w.name.clone();
                if let Some(radius) = w.turn_radius {
                    waypoint = waypoint.with_turn_radius(radius);
                } else if let Some(rot) = w.rate_of_turn {
                    waypoint = waypoint.with_rate_of_turn(rot);
                }
                Ok(waypoint)
            })
            .collect::<Result<Vec<_>, RouteError>>()?;

        let legs = self.waypoints[..self.waypoints.len() - 1]
            .iter()
            .filter_map(|w| w.outgoing_leg.as_ref().map(RouteLeg::from))
            .collect();

        let start_time = self.waypoints.first().and_then(|w| w.eta);
        let mut route = Route::from_parts(self.name.clone(), waypoints, legs, start_time, clock)?;
        route.set_departure(self.departure.clone());
        route.set_destination(self.destination.clone());
        Ok(route)
    }

    pub fn encode(&self) -> Result<Vec<u8>, RouteError> {
        bincode::serialize(self).map_err(|e| RouteError::MalformedSnapshot(e.to_string()))
    }

    /// Decode and validate a binary snapshot
    pub fn decode(data: &[u8]) -> Result<Self, RouteError> {
        let snapshot: RouteSnapshot = bincode::deserialize(data)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String, RouteError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RouteError::MalformedSnapshot(e.to_string()))
    }

    /// Parse and validate a JSON snapshot
    pub fn from_json(json: &str) -> Result<Self, RouteError> {
        let snapshot: RouteSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}
