//! Intended routes received from other vessels
//!
//! An intended route is a read-only view of another vessel's broadcast
//! plan. It never runs the waypoint-advance state machine; the sender's
//! active waypoint and planned ETAs are only used to estimate where the
//! sender should be now.

use chrono::{DateTime, TimeDelta, Utc};

use crate::clock::SharedClock;
use crate::error::RouteError;
use crate::geo::{Position, NAUTICAL_MILE};
use crate::route::Route;
use crate::snapshot::RouteSnapshot;

#[derive(Debug, Clone)]
pub struct IntendedRoute {
    route: Route,
    received: DateTime<Utc>,
    active_index: Option<usize>,
    sender_etas: Vec<Option<DateTime<Utc>>>,
    planned_etas: Vec<Option<DateTime<Utc>>>,
    /// Along-route distance from the first waypoint, nm, per waypoint
    cumulative_ranges: Vec<f64>,
}

impl IntendedRoute {
    /// Parse a received snapshot. Malformed snapshots are rejected whole.
    pub fn from_snapshot(
        snapshot: &RouteSnapshot,
        received: DateTime<Utc>,
        clock: SharedClock,
    ) -> Result<Self, RouteError> {
        let route = snapshot.to_route(clock)?;

        let sender_etas: Vec<_> = snapshot.waypoints.iter().map(|w| w.eta).collect();
        let planned_etas = if snapshot.original_etas.is_empty() {
            sender_etas.clone()
        } else {
            snapshot.original_etas.clone()
        };

        let cumulative_ranges = std::iter::once(0.0)
            .chain(route.dtgs().iter().scan(0.0, |sum, dtg| {
                *sum += dtg;
                Some(*sum)
            }))
            .collect();

        Ok(IntendedRoute {
            route,
            received,
            active_index: snapshot.active_waypoint_index,
            sender_etas,
            planned_etas,
            cumulative_ranges,
        })
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn received(&self) -> DateTime<Utc> {
        self.received
    }

    /// Sender's active waypoint within the received waypoints
    pub fn active_waypoint_index(&self) -> Option<usize> {
        self.active_index
    }

    /// ETAs as estimated by the sender at broadcast time
    pub fn sender_etas(&self) -> &[Option<DateTime<Utc>>] {
        &self.sender_etas
    }

    /// ETAs of the sender's original plan
    pub fn planned_etas(&self) -> &[Option<DateTime<Utc>>] {
        &self.planned_etas
    }

    pub fn cumulative_ranges(&self) -> &[f64] {
        &self.cumulative_ranges
    }

    /// Remaining along-route distance from the sender's active waypoint, nm
    pub fn range_to_end(&self) -> f64 {
        let from = self.active_index.unwrap_or(0);
        match (self.cumulative_ranges.last(), self.cumulative_ranges.get(from)) {
            (Some(total), Some(done)) => total - done,
            _ => 0.0,
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: TimeDelta) -> bool {
        now - self.received > max_age
    }

    /// Where the sender should be at `now` according to its planned ETAs.
    /// `None` when `now` isn't inside the planned schedule, which includes a
    /// sender that already finished its route.
    pub fn projected_position(&self, now: DateTime<Utc>) -> Option<Position> {
        let index = self.planned_etas.windows(2).position(|pair| match pair {
            [Some(begin), Some(end)] => *begin <= now && now < *end,
            _ => false,
        })?;

        let leg = self.route.leg(index)?;
        let begin = self.planned_etas[index]?;
        let end = self.planned_etas[index + 1]?;
        let fraction =
            (now - begin).num_milliseconds() as f64 / (end - begin).num_milliseconds() as f64;

        let Some(bearing) = leg.bearing() else {
            return Some(leg.start().position);
        };
        Some(leg.start().position.destination(
            bearing,
            leg.range() * fraction * NAUTICAL_MILE,
            leg.sailing_mode(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::SailingMode;
    use crate::route::tests::{clock, northbound, t0};

    fn received(route: &Route, active: Option<usize>) -> IntendedRoute {
        let mut snapshot = RouteSnapshot::from_route(route);
        snapshot.active_waypoint_index = active;
        IntendedRoute::from_snapshot(&snapshot, t0(), clock()).unwrap()
    }

    #[test]
    fn test_cumulative_ranges() {
        let intended = received(&northbound(&[5.0, 3.0, 2.0], 10.0), Some(1));
        let ranges = intended.cumulative_ranges();
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges[0], 0.0);
        assert!((ranges[3] - 10.0).abs() < 1e-6);
        assert!((intended.range_to_end() - 5.0).abs() < 1e-6);
        assert_eq!(intended.active_waypoint_index(), Some(1));
    }

    #[test]
    fn test_projected_position() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let intended = received(&route, Some(0));
        let start = route.waypoints()[0].position;

        let p = intended.projected_position(t0() + TimeDelta::minutes(45)).unwrap();
        let sailed = start.distance_to(&p, SailingMode::RhumbLine) / NAUTICAL_MILE;
        assert!((sailed - 7.5).abs() < 0.01);

        assert!(intended.projected_position(t0() - TimeDelta::minutes(1)).is_none());
        // Sender has finished
        assert!(intended.projected_position(t0() + TimeDelta::hours(2)).is_none());
    }

    #[test]
    fn test_projection_uses_original_plan() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let mut snapshot = RouteSnapshot::from_route(&route);
        // Sender now runs 30 min late
        for waypoint in &mut snapshot.waypoints {
            waypoint.eta = waypoint.eta.map(|eta| eta + TimeDelta::minutes(30));
        }
        let intended = IntendedRoute::from_snapshot(&snapshot, t0(), clock()).unwrap();
        assert_eq!(intended.planned_etas(), route.etas());
        assert_ne!(intended.sender_etas(), route.etas());

        let p = intended.projected_position(t0() + TimeDelta::minutes(15)).unwrap();
        let sailed = route.waypoints()[0]
            .position
            .distance_to(&p, SailingMode::RhumbLine);
        assert!((sailed / NAUTICAL_MILE - 2.5).abs() < 0.01);
    }

    #[test]
    fn test_staleness_and_rejection() {
        let intended = received(&northbound(&[5.0], 10.0), None);
        assert!(!intended.is_stale(t0() + TimeDelta::minutes(30), TimeDelta::minutes(30)));
        assert!(intended.is_stale(t0() + TimeDelta::minutes(31), TimeDelta::minutes(30)));

        let mut snapshot = RouteSnapshot::from_route(&northbound(&[5.0], 10.0));
        snapshot.waypoints[0].outgoing_leg = None;
        assert!(IntendedRoute::from_snapshot(&snapshot, t0(), clock()).is_err());
    }
}
