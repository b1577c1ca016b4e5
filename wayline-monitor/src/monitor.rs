//! Route monitor loop
//!
//! Consumes fixes from the feed, keeps the active route updated and runs
//! the waypoint-advance state machine at a fixed cadence.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;

use wayline_core::{
    ActiveRoute, ActiveWaypointSelection, NavigationSettings, PartialRouteFilter, PntFix, Route,
    RouteError, RouteSnapshot,
};

use crate::feed::ReplayClock;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MonitorEvent {
    #[serde(rename_all = "camelCase")]
    WaypointChanged {
        time: DateTime<Utc>,
        from: usize,
        to: usize,
        eta: Option<DateTime<Utc>>,
    },
    #[serde(rename_all = "camelCase")]
    RouteFinished { time: DateTime<Utc> },
}

pub struct RouteMonitor {
    route: Arc<ActiveRoute>,
    clock: Arc<ReplayClock>,
    evaluate_every: u32,
    fixes_seen: u64,
}

impl RouteMonitor {
    /// Activate `route` with the first fix of the feed
    pub fn activate(
        route: Route,
        first: Option<&PntFix>,
        settings: NavigationSettings,
        clock: Arc<ReplayClock>,
        evaluate_every: u32,
    ) -> Result<Self, RouteError> {
        if let Some(fix) = first {
            clock.observe(fix);
        }
        let active = ActiveRoute::activate(route, first, settings)?;
        Ok(RouteMonitor {
            route: Arc::new(active),
            clock,
            evaluate_every: evaluate_every.max(1),
            fixes_seen: 0,
        })
    }

    /// Shared handle for readers on other threads
    pub fn active_route(&self) -> Arc<ActiveRoute> {
        self.route.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.route.is_finished()
    }

    /// Apply one fix; returns the event raised by the state machine, if it
    /// was evaluated and changed state
    pub fn handle_fix(&mut self, fix: &PntFix) -> Option<MonitorEvent> {
        self.clock.observe(fix);
        self.route.update(fix);
        self.fixes_seen += 1;
        if self.fixes_seen % self.evaluate_every as u64 != 0 {
            return None;
        }

        let from = self.route.active_waypoint_index();
        match self.route.choose_active_waypoint() {
            ActiveWaypointSelection::NoChange => None,
            ActiveWaypointSelection::Changed => {
                let to = self.route.active_waypoint_index();
                Some(MonitorEvent::WaypointChanged {
                    time: fix.time,
                    from,
                    to,
                    eta: self.route.eta(to),
                })
            }
            ActiveWaypointSelection::Finished => {
                Some(MonitorEvent::RouteFinished { time: fix.time })
            }
        }
    }

    /// Process fixes until the route finishes or the feed ends. Returns the
    /// number of fixes handled.
    pub fn run<I, F>(&mut self, fixes: I, mut on_event: F) -> usize
    where
        I: IntoIterator<Item = PntFix>,
        F: FnMut(&MonitorEvent),
    {
        let mut handled = 0;
        for fix in fixes {
            handled += 1;
            let Some(event) = self.handle_fix(&fix) else {
                continue;
            };
            debug!("{:?}", event);
            on_event(&event);
            if let MonitorEvent::RouteFinished { time } = event {
                info!("Route finished at {}", time);
                break;
            }
        }
        handled
    }

    /// Outbound intended route
    pub fn intended_route(&self, filter: &PartialRouteFilter) -> RouteSnapshot {
        self.route.partial_route_data(filter)
    }
}
