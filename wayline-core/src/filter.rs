//! Partial route filter
//!
//! Windows a route around its active waypoint before it is broadcast as an
//! intended route. The active waypoint is always part of the window.

use std::ops::RangeInclusive;

use chrono::TimeDelta;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::geo::NAUTICAL_MILE;
use crate::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartialRouteFilterKind {
    /// `forward`/`backward` are minutes from the active waypoint's ETA
    ByDuration,
    /// `forward`/`backward` are meters of along-route distance
    ByDistance,
    /// `forward`/`backward` are waypoint counts
    ByWaypointCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialRouteFilter {
    pub kind: PartialRouteFilterKind,
    pub forward: u32,
    pub backward: u32,
}

impl Default for PartialRouteFilter {
    fn default() -> Self {
        PartialRouteFilter::by_waypoint_count(5, 1)
    }
}

impl PartialRouteFilter {
    pub fn by_duration(forward_minutes: u32, backward_minutes: u32) -> Self {
        PartialRouteFilter {
            kind: PartialRouteFilterKind::ByDuration,
            forward: forward_minutes,
            backward: backward_minutes,
        }
    }

    pub fn by_distance(forward_m: u32, backward_m: u32) -> Self {
        PartialRouteFilter {
            kind: PartialRouteFilterKind::ByDistance,
            forward: forward_m,
            backward: backward_m,
        }
    }

    pub fn by_waypoint_count(forward: u32, backward: u32) -> Self {
        PartialRouteFilter {
            kind: PartialRouteFilterKind::ByWaypointCount,
            forward,
            backward,
        }
    }

    /// Indices of the waypoints kept around `active`
    pub fn window(&self, route: &Route, active: usize) -> RangeInclusive<usize> {
        let count = route.waypoint_count();
        if count == 0 {
            return 0..=0;
        }
        let last = count - 1;
        let active = active.min(last);

        let range = match self.kind {
            PartialRouteFilterKind::ByWaypointCount => {
                let first = active.saturating_sub(self.backward as usize);
                let end = active.saturating_add(self.forward as usize).min(last);
                first..=end
            }
            PartialRouteFilterKind::ByDuration => {
                let Some(anchor) = route.eta(active) else {
                    return active..=active;
                };
                let forward = TimeDelta::minutes(self.forward as i64);
                let backward = TimeDelta::minutes(self.backward as i64);
                let within = |i: usize, limit: TimeDelta| {
                    route.eta(i).is_some_and(|eta| (eta - anchor).abs() <= limit)
                };

                let mut first = active;
                while first > 0 && within(first - 1, backward) {
                    first -= 1;
                }
                let mut end = active;
                while end < last && within(end + 1, forward) {
                    end += 1;
                }
                first..=end
            }
            PartialRouteFilterKind::ByDistance => {
                let dtgs = route.dtgs();
                let forward = self.forward as f64 / NAUTICAL_MILE;
                let backward = self.backward as f64 / NAUTICAL_MILE;

                let mut first = active;
                let mut sum = 0.0;
                while first > 0 && sum + dtgs[first - 1] <= backward {
                    sum += dtgs[first - 1];
                    first -= 1;
                }
                let mut end = active;
                sum = 0.0;
                while end < last && sum + dtgs[end] <= forward {
                    sum += dtgs[end];
                    end += 1;
                }
                first..=end
            }
        };

        debug!(
            "Partial route window {:?} around waypoint {} ({:?} {}/{})",
            range, active, self.kind, self.forward, self.backward
        );
        range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::tests::northbound;

    #[test]
    fn test_count_window_size() {
        let route = northbound(&[5.0; 9], 10.0);
        let n = route.waypoint_count();
        for (f, b) in [(0, 0), (2, 1), (5, 1), (20, 20)] {
            let filter = PartialRouteFilter::by_waypoint_count(f, b);
            for active in 0..n {
                let window = filter.window(&route, active);
                let expected = (f as usize).min(n - 1 - active) + (b as usize).min(active) + 1;
                assert_eq!(window.clone().count(), expected);
                assert!(window.contains(&active));
            }
        }
    }

    #[test]
    fn test_duration_window() {
        // Legs of 30 minutes each
        let route = northbound(&[5.0; 6], 10.0);
        let filter = PartialRouteFilter::by_duration(61, 31);
        assert_eq!(filter.window(&route, 3), 2..=5);
        assert_eq!(filter.window(&route, 0), 0..=2);

        let filter = PartialRouteFilter::by_duration(0, 0);
        assert_eq!(filter.window(&route, 3), 3..=3);
    }

    #[test]
    fn test_duration_window_stops_at_undefined_eta() {
        let mut route = northbound(&[5.0; 4], 10.0);
        route.set_leg_speed(2, 0.0).unwrap();
        let filter = PartialRouteFilter::by_duration(600, 600);
        assert_eq!(filter.window(&route, 1), 0..=2);
        assert_eq!(filter.window(&route, 4), 4..=4);
    }

    #[test]
    fn test_distance_window() {
        let route = northbound(&[5.0; 6], 10.0);
        // 11 nm forward covers two legs, 6 nm back covers one
        let filter = PartialRouteFilter::by_distance(11 * 1852, 6 * 1852);
        assert_eq!(filter.window(&route, 2), 1..=4);
        assert_eq!(filter.window(&route, 6), 5..=6);
    }

    #[test]
    fn test_default_filter() {
        let filter = PartialRouteFilter::default();
        assert_eq!(filter.kind, PartialRouteFilterKind::ByWaypointCount);
        assert_eq!((filter.forward, filter.backward), (5, 1));
        let json = serde_json::to_string(&filter).unwrap();
        assert_eq!(json, r#"{"kind":"byWaypointCount","forward":5,"backward":1}"#);
    }
}
