//! Route waypoints and turn kinematics

use serde::{Deserialize, Serialize};

use crate::geo::Position;
use crate::leg::MIN_SPEED_KN;

const AUTO_NAME_PREFIX: &str = "WP_";

/// A node of a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteWaypoint {
    pub name: Option<String>,
    pub position: Position,
    /// Turn radius in nautical miles
    turn_radius: Option<f64>,
    /// Rate of turn in degrees per minute
    rate_of_turn: Option<f64>,
}

impl RouteWaypoint {
    pub fn new(position: Position) -> Self {
        RouteWaypoint {
            name: None,
            position,
            turn_radius: None,
            rate_of_turn: None,
        }
    }

    pub fn named(name: impl Into<String>, position: Position) -> Self {
        RouteWaypoint {
            name: Some(name.into()),
            ..RouteWaypoint::new(position)
        }
    }

    /// Turn radius to apply once the waypoint is part of a route
    pub fn with_turn_radius(mut self, radius: f64) -> Self {
        self.turn_radius = Some(radius);
        self.rate_of_turn = None;
        self
    }

    /// Rate of turn to apply once the waypoint is part of a route
    pub fn with_rate_of_turn(mut self, rot: f64) -> Self {
        self.rate_of_turn = Some(rot);
        self.turn_radius = None;
        self
    }

    pub fn turn_radius(&self) -> Option<f64> {
        self.turn_radius
    }

    pub fn rate_of_turn(&self) -> Option<f64> {
        self.rate_of_turn
    }

    pub(crate) fn set_turn_radius(&mut self, radius: Option<f64>, in_speed: Option<f64>) {
        self.turn_radius = radius;
        self.rate_of_turn = None;
        self.derive_turn(in_speed);
    }

    pub(crate) fn set_rate_of_turn(&mut self, rot: Option<f64>, in_speed: Option<f64>) {
        self.rate_of_turn = rot;
        self.turn_radius = None;
        self.derive_turn(in_speed);
    }

    /// Re-derive the dependent turn field from the incoming leg speed.
    /// Turn radius is primary when set; without an incoming leg or a usable
    /// speed the derived field is cleared.
    pub(crate) fn derive_turn(&mut self, in_speed: Option<f64>) {
        let speed = in_speed.filter(|s| *s >= MIN_SPEED_KN);
        match (self.turn_radius, self.rate_of_turn) {
            (Some(radius), _) => {
                self.rate_of_turn = speed
                    .filter(|_| radius > 0.0)
                    .map(|s| rate_of_turn_for(s, radius));
            }
            (None, Some(rot)) => {
                self.turn_radius = speed
                    .filter(|_| rot > 0.0)
                    .map(|s| turn_radius_for(s, rot));
            }
            (None, None) => {}
        }
    }

    /// Whether the name was generated by the route
    pub fn is_auto_named(&self) -> bool {
        self.name.as_deref().map_or(false, is_auto_name)
    }
}

/// Generated name for the waypoint at `index`
pub fn auto_name(index: usize) -> String {
    format!("{}{:03}", AUTO_NAME_PREFIX, index + 1)
}

fn is_auto_name(name: &str) -> bool {
    name.strip_prefix(AUTO_NAME_PREFIX)
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Rate of turn in degrees/minute for a speed (kn) and radius (nm)
pub fn rate_of_turn_for(speed: f64, radius: f64) -> f64 {
    (speed / 60.0 / radius).to_degrees()
}

/// Turn radius in nautical miles for a speed (kn) and rate of turn (deg/min)
pub fn turn_radius_for(speed: f64, rot: f64) -> f64 {
    speed / 60.0 / rot.to_radians()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp() -> RouteWaypoint {
        RouteWaypoint::new(Position::new(55.0, 12.0).unwrap())
    }

    #[test]
    fn test_rate_of_turn_from_radius() {
        let mut w = wp().with_turn_radius(0.5);
        w.derive_turn(Some(12.0));
        // 0.2 nm/min over 0.5 nm = 0.4 rad/min
        assert!((w.rate_of_turn().unwrap() - 0.4_f64.to_degrees()).abs() < 1e-9);
        assert_eq!(w.turn_radius(), Some(0.5));
    }

    #[test]
    fn test_radius_from_rate_of_turn() {
        let mut w = wp();
        w.set_rate_of_turn(Some(0.4_f64.to_degrees()), Some(12.0));
        assert!((w.turn_radius().unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_derived_field_cleared_without_speed_context() {
        let mut w = wp();
        w.set_turn_radius(Some(0.5), None);
        assert_eq!(w.turn_radius(), Some(0.5));
        assert_eq!(w.rate_of_turn(), None);

        w.set_turn_radius(Some(0.5), Some(0.05));
        assert_eq!(w.rate_of_turn(), None);

        w.set_rate_of_turn(Some(20.0), None);
        assert_eq!(w.rate_of_turn(), Some(20.0));
        assert_eq!(w.turn_radius(), None);
    }

    #[test]
    fn test_auto_names() {
        assert_eq!(auto_name(0), "WP_001");
        assert_eq!(auto_name(41), "WP_042");

        let mut w = wp();
        assert!(!w.is_auto_named());
        w.name = Some("WP_007".into());
        assert!(w.is_auto_named());
        w.name = Some("WP_harbour".into());
        assert!(!w.is_auto_named());
    }
}
