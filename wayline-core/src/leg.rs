//! Route legs
//!
//! A leg is the directed edge between two consecutive waypoints. The leg
//! table itself only holds planning data; [`LegRef`] binds a leg to its
//! endpoints so range, bearing and time-to-go can be derived.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::geo::{Position, SailingMode, NAUTICAL_MILE};
use crate::waypoint::RouteWaypoint;

/// Speeds below this (knots) give no meaningful time-to-go
pub const MIN_SPEED_KN: f64 = 0.1;

/// Planned speed for legs created without an explicit speed
pub const DEFAULT_SPEED_KN: f64 = 10.0;

/// Default stand-fast length in meters
pub const DEFAULT_STAND_FAST_LENGTH_M: f64 = 1000.0;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Planning data for one leg
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteLeg {
    /// Planned speed in knots
    pub speed: f64,
    pub sailing_mode: SailingMode,
    /// Cross-track tolerance to port in nautical miles
    pub xtd_port: Option<f64>,
    /// Cross-track tolerance to starboard in nautical miles
    pub xtd_starboard: Option<f64>,
    /// Stand-fast length in meters, used to size the safe haven box
    pub stand_fast_length: f64,
}

impl Default for RouteLeg {
    fn default() -> Self {
        RouteLeg::new(DEFAULT_SPEED_KN)
    }
}

impl RouteLeg {
    pub fn new(speed: f64) -> Self {
        RouteLeg {
            speed: speed.max(0.0),
            sailing_mode: SailingMode::RhumbLine,
            xtd_port: None,
            xtd_starboard: None,
            stand_fast_length: DEFAULT_STAND_FAST_LENGTH_M,
        }
    }

    pub fn with_sailing_mode(mut self, mode: SailingMode) -> Self {
        self.sailing_mode = mode;
        self
    }

    pub fn with_xtd(mut self, port: Option<f64>, starboard: Option<f64>) -> Self {
        self.xtd_port = port;
        self.xtd_starboard = starboard;
        self
    }

    pub fn with_stand_fast_length(mut self, meters: f64) -> Self {
        self.stand_fast_length = meters;
        self
    }

    /// Larger of the two cross-track tolerances, if any is set
    pub fn max_xtd(&self) -> Option<f64> {
        match (self.xtd_port, self.xtd_starboard) {
            (Some(p), Some(s)) => Some(p.max(s)),
            (p, s) => p.or(s),
        }
    }

    /// Corridor width in nautical miles (port + starboard tolerance)
    pub fn width(&self) -> f64 {
        self.xtd_port.unwrap_or(0.0) + self.xtd_starboard.unwrap_or(0.0)
    }
}

/// Time to sail `range_nm` at `speed` knots, `None` below [`MIN_SPEED_KN`]
pub fn time_to_go(range_nm: f64, speed: f64) -> Option<TimeDelta> {
    if speed.is_nan() || speed < MIN_SPEED_KN {
        return None;
    }
    Some(duration_for(range_nm, speed))
}

/// Time to sail `range_nm` at `speed` knots, with the speed floored at
/// [`MIN_SPEED_KN`] so the result is always defined
pub fn time_to_go_clamped(range_nm: f64, speed: f64) -> TimeDelta {
    let speed = if speed.is_finite() { speed.max(MIN_SPEED_KN) } else { MIN_SPEED_KN };
    duration_for(range_nm, speed)
}

fn duration_for(range_nm: f64, speed: f64) -> TimeDelta {
    TimeDelta::milliseconds((range_nm / speed * MS_PER_HOUR).round() as i64)
}

/// Speed in knots needed to cover `range_nm` in `elapsed`
pub(crate) fn speed_for(range_nm: f64, elapsed: TimeDelta) -> f64 {
    range_nm / (elapsed.num_milliseconds() as f64 / MS_PER_HOUR)
}

/// A leg together with the waypoints it joins
#[derive(Debug, Clone, Copy)]
pub struct LegRef<'a> {
    index: usize,
    leg: &'a RouteLeg,
    start: &'a RouteWaypoint,
    end: &'a RouteWaypoint,
}

impl<'a> LegRef<'a> {
    pub(crate) fn new(
        index: usize,
        leg: &'a RouteLeg,
        start: &'a RouteWaypoint,
        end: &'a RouteWaypoint,
    ) -> Self {
        LegRef {
            index,
            leg,
            start,
            end,
        }
    }

    /// Index of the leg, equal to the index of its start waypoint
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn leg(&self) -> &'a RouteLeg {
        self.leg
    }

    pub fn start(&self) -> &'a RouteWaypoint {
        self.start
    }

    pub fn end(&self) -> &'a RouteWaypoint {
        self.end
    }

    pub fn sailing_mode(&self) -> SailingMode {
        self.leg.sailing_mode
    }

    pub fn speed(&self) -> f64 {
        self.leg.speed
    }

    /// Leg length in nautical miles
    pub fn range(&self) -> f64 {
        self.start
            .position
            .distance_to(&self.end.position, self.leg.sailing_mode)
            / NAUTICAL_MILE
    }

    /// Initial bearing, `None` for a zero-length leg
    pub fn bearing(&self) -> Option<f64> {
        self.start
            .position
            .bearing_to(&self.end.position, self.leg.sailing_mode)
    }

    /// Time-to-go at planned speed, `None` when the speed is below 0.1 kn
    pub fn time_to_go(&self) -> Option<TimeDelta> {
        time_to_go(self.range(), self.leg.speed)
    }

    /// Time-to-go at an overriding speed, floored at 0.1 kn
    pub fn time_to_go_at(&self, speed: f64) -> TimeDelta {
        time_to_go_clamped(self.range(), speed)
    }

    /// Signed great-circle cross-track distance in nautical miles,
    /// positive to starboard
    pub fn cross_track_distance(&self, position: &Position) -> f64 {
        position.cross_track_distance(&self.start.position, &self.end.position) / NAUTICAL_MILE
    }

    /// Whether `position` lies inside the leg corridor. A side without a
    /// tolerance is unbounded.
    pub fn contains(&self, position: &Position) -> bool {
        let along = position.along_track_distance(&self.start.position, &self.end.position)
            / NAUTICAL_MILE;
        if along < 0.0 || along > self.range() {
            return false;
        }
        let xtd = self.cross_track_distance(position);
        if xtd >= 0.0 {
            self.leg.xtd_starboard.map_or(true, |limit| xtd <= limit)
        } else {
            self.leg.xtd_port.map_or(true, |limit| -xtd <= limit)
        }
    }

    /// Dead-reckon along the leg at planned speed for `elapsed`, never past
    /// the end waypoint. Returns the projected position and the track
    /// bearing there.
    pub fn project(&self, elapsed: TimeDelta) -> (Position, Option<f64>) {
        let hours = elapsed.num_milliseconds().max(0) as f64 / MS_PER_HOUR;
        let sailed = (self.leg.speed * hours).min(self.range());
        let Some(initial) = self.bearing() else {
            return (self.start.position, None);
        };
        let mode = self.leg.sailing_mode;
        let position = self
            .start
            .position
            .destination(initial, sailed * NAUTICAL_MILE, mode);
        let bearing = match mode {
            SailingMode::RhumbLine => Some(initial),
            SailingMode::GreatCircle => position
                .bearing_to(&self.end.position, mode)
                .or(Some(initial)),
        };
        (position, bearing)
    }
}
