//! Active route: live navigation along a route
//!
//! An [`ActiveRoute`] is created by promoting a [`Route`] with a position
//! fix. It tracks the active waypoint, keeps range, bearing and time-to-go
//! to it current from every fix, and re-estimates ETAs from the active
//! waypoint onward. A frozen copy of the route as activated is kept as the
//! reference plan for safe-haven projection.
//!
//! # Waypoint advance
//!
//! ```text
//!            relaxed: next_range * factor < leg_range
//!        ┌──────────────────────────────────────────┐
//!        │                                          ▼
//!   ┌─────────┐  in circle && next_range <    ┌───────────┐
//!   │ WP[i]   │ ─────── leg_range ──────────▶ │ WP[i + 1] │ ...
//!   └─────────┘                               └───────────┘
//!
//!   last WP: in circle on `finish_confirmations` consecutive
//!            evaluations ──▶ Finished
//! ```
//!
//! The waypoint circle radius is the larger of the current leg's widest
//! cross-track tolerance and the configured minimum radius.
//!
//! # Thread safety
//!
//! All state lives behind a single mutex, held for the whole of every
//! public method. Readers never see an active index that disagrees with
//! the ETA table.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::RouteError;
use crate::filter::PartialRouteFilter;
use crate::geo::{angle_difference, Position, SailingMode, NAUTICAL_MILE};
use crate::leg::{time_to_go, time_to_go_clamped, RouteLeg};
use crate::pnt::PntFix;
use crate::route::Route;
use crate::settings::{EtaCalculationMode, NavigationSettings};
use crate::snapshot::RouteSnapshot;

/// Outcome of one evaluation of the waypoint-advance state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActiveWaypointSelection {
    NoChange,
    Changed,
    Finished,
}

/// Where the vessel should be if it were on plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeHaven {
    pub position: Position,
    /// Planned track bearing, `None` on a zero-length leg
    pub bearing: Option<f64>,
    /// Planned speed in knots, zero before departure and after arrival
    pub speed: f64,
    /// Length of the safe haven box in meters (leg stand-fast length)
    pub box_length_m: f64,
    /// Width of the safe haven box in nautical miles (leg corridor width)
    pub width_nm: f64,
    pub leg_index: usize,
}

impl SafeHaven {
    fn at_rest(position: Position, leg: &RouteLeg, leg_index: usize, bearing: Option<f64>) -> Self {
        SafeHaven {
            position,
            bearing,
            speed: 0.0,
            box_length_m: leg.stand_fast_length,
            width_nm: leg.width(),
            leg_index,
        }
    }
}

/// Best waypoint to start navigating to from `fix`.
///
/// Waypoints at 90° or more off the course over ground are behind the
/// vessel and skipped. Remaining candidates are weighted by
/// `distance / cos(angle off course)`; the lowest weight wins. Without a
/// course, or when every waypoint is behind, the nearest waypoint is used.
/// An invalid fix gives the first waypoint.
pub fn best_initial_waypoint(route: &Route, fix: Option<&PntFix>) -> usize {
    let Some(position) = fix.filter(|f| f.is_valid()).and_then(|f| f.position) else {
        return 0;
    };
    let cog = fix.and_then(|f| f.cog).filter(|c| c.is_finite());

    let candidates = route.waypoints().iter().enumerate().map(|(i, waypoint)| {
        let distance = position.distance_to(&waypoint.position, SailingMode::RhumbLine);
        let bearing = position.bearing_to(&waypoint.position, SailingMode::RhumbLine);
        (i, distance, bearing)
    });

    let ahead = cog.and_then(|cog| {
        candidates
            .clone()
            .filter_map(|(i, distance, bearing)| {
                let off = bearing.map_or(0.0, |b| angle_difference(cog, b).abs());
                (off < 90.0).then(|| (i, distance / off.to_radians().cos()))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i)
    });

    ahead
        .or_else(|| {
            candidates
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|(i, _, _)| i)
        })
        .unwrap_or(0)
}

#[derive(Debug)]
struct ActiveState {
    route: Route,
    original: Route,
    settings: NavigationSettings,
    eta_mode: EtaCalculationMode,
    active: usize,
    finished: bool,
    in_circle_count: u32,
    pnt: Option<PntFix>,
    /// Range to the active waypoint in nautical miles
    range: Option<f64>,
    bearing: Option<f64>,
    planned_ttg: Option<TimeDelta>,
    dynamic_ttg: Option<TimeDelta>,
}

impl ActiveState {
    fn last_index(&self) -> usize {
        self.route.waypoint_count().saturating_sub(1)
    }

    /// Leg into the active waypoint, or the first leg while heading for the
    /// first waypoint
    fn current_leg_index(&self) -> usize {
        self.active.saturating_sub(1)
    }

    fn current_sailing_mode(&self) -> SailingMode {
        self.route
            .leg(self.current_leg_index())
            .map_or(SailingMode::RhumbLine, |leg| leg.sailing_mode())
    }

    fn waypoint_radius(&self) -> f64 {
        let min = self.settings.min_waypoint_radius;
        self.route
            .leg(self.current_leg_index())
            .and_then(|leg| leg.leg().max_xtd())
            .unwrap_or(min)
            .max(min)
    }

    fn active_ttg(&self) -> Option<TimeDelta> {
        match self.eta_mode {
            EtaCalculationMode::Planned => self.planned_ttg,
            EtaCalculationMode::Dynamic | EtaCalculationMode::Hybrid => self.dynamic_ttg,
        }
    }

    /// Range, bearing and TTG to the active waypoint from the last fix,
    /// then ETAs from the active waypoint onward
    fn refresh(&mut self) {
        let Some(fix) = self.pnt else {
            return;
        };
        let (Some(position), Some(sog)) = (fix.position, fix.sog) else {
            return;
        };
        let Some(target) = self.route.waypoint(self.active).map(|w| w.position) else {
            return;
        };

        let mode = self.current_sailing_mode();
        let range = position.distance_to(&target, mode) / NAUTICAL_MILE;
        let planned_speed = self
            .route
            .leg(self.current_leg_index())
            .map_or(0.0, |leg| leg.speed());

        self.range = Some(range);
        self.bearing = position.bearing_to(&target, mode);
        self.planned_ttg = time_to_go(range, planned_speed);
        self.dynamic_ttg = Some(time_to_go_clamped(range, sog));

        let ttgs: Vec<Option<TimeDelta>> = (self.active..self.route.leg_count())
            .filter_map(|i| self.route.leg(i))
            .map(|leg| match self.eta_mode {
                EtaCalculationMode::Dynamic => Some(leg.time_to_go_at(sog)),
                EtaCalculationMode::Planned | EtaCalculationMode::Hybrid => leg.time_to_go(),
            })
            .collect();

        let active = self.active;
        let mut eta = self.active_ttg().map(|ttg| fix.time + ttg);
        let estimates = self.route.estimates_mut();
        if let Some(slot) = estimates.etas.get_mut(active) {
            *slot = eta;
        }
        for (offset, ttg) in ttgs.into_iter().enumerate() {
            let leg = active + offset;
            if let Some(slot) = estimates.ttgs.get_mut(leg) {
                *slot = ttg;
            }
            eta = eta.zip(ttg).map(|(e, t)| e + t);
            if let Some(slot) = estimates.etas.get_mut(leg + 1) {
                *slot = eta;
            }
        }
    }

    fn set_active(&mut self, index: usize) {
        self.active = index;
        self.in_circle_count = 0;
        self.refresh();
    }

    fn choose(&mut self) -> ActiveWaypointSelection {
        if self.finished {
            return ActiveWaypointSelection::Finished;
        }
        let Some(position) = self.pnt.filter(|f| f.is_valid()).and_then(|f| f.position) else {
            return ActiveWaypointSelection::NoChange;
        };
        let Some(target) = self.route.waypoint(self.active).map(|w| w.position) else {
            return ActiveWaypointSelection::NoChange;
        };

        let radius = self.waypoint_radius();
        let range = position.distance_to(&target, self.current_sailing_mode()) / NAUTICAL_MILE;
        let in_circle = range <= radius;

        if self.active >= self.last_index() {
            if !in_circle {
                self.in_circle_count = 0;
                return ActiveWaypointSelection::NoChange;
            }
            self.in_circle_count += 1;
            if self.in_circle_count < self.settings.finish_confirmations.max(1) {
                debug!(
                    "Inside final waypoint circle ({}/{})",
                    self.in_circle_count, self.settings.finish_confirmations
                );
                return ActiveWaypointSelection::NoChange;
            }
            self.finished = true;
            info!("Route '{}' finished", self.route.name());
            return ActiveWaypointSelection::Finished;
        }

        let Some(next_leg) = self.route.leg(self.active) else {
            return ActiveWaypointSelection::NoChange;
        };
        let next_range =
            position.distance_to(&next_leg.end().position, next_leg.sailing_mode()) / NAUTICAL_MILE;
        let leg_range = next_leg.range();

        let advance = if in_circle && next_range < leg_range {
            true
        } else {
            let relaxed = self.settings.relaxed_waypoint_change && !self.route.is_search_pattern();
            relaxed && next_range * self.settings.relaxed_range_factor < leg_range
        };
        if !advance {
            return ActiveWaypointSelection::NoChange;
        }

        let next = self.active + 1;
        info!(
            "Route '{}': active waypoint {} -> {} ({:.2} nm to go on next leg)",
            self.route.name(),
            self.active,
            next,
            next_range
        );
        self.set_active(next);
        ActiveWaypointSelection::Changed
    }

    fn safe_haven(&self, now: DateTime<Utc>) -> Option<SafeHaven> {
        let route = &self.original;
        let first_leg = route.leg(0)?;
        let start = route.eta(0)?;
        if now <= start {
            return Some(SafeHaven::at_rest(
                first_leg.start().position,
                first_leg.leg(),
                0,
                first_leg.bearing(),
            ));
        }

        for index in 0..route.leg_count() {
            let leg = route.leg(index)?;
            let begin = route.eta(index)?;
            let end = route.eta(index + 1)?;
            if now >= begin && now < end {
                let (position, bearing) = leg.project(now - begin);
                return Some(SafeHaven {
                    position,
                    bearing,
                    speed: leg.speed(),
                    box_length_m: leg.leg().stand_fast_length,
                    width_nm: leg.leg().width(),
                    leg_index: index,
                });
            }
        }

        let last_leg = route.leg(route.leg_count() - 1)?;
        Some(SafeHaven::at_rest(
            last_leg.end().position,
            last_leg.leg(),
            last_leg.index(),
            last_leg.bearing(),
        ))
    }
}

/// A route being navigated
#[derive(Debug)]
pub struct ActiveRoute {
    inner: Mutex<ActiveState>,
}

impl ActiveRoute {
    /// Promote `route` to an active route, choosing the initial active
    /// waypoint from `fix`. A route without a start time is frozen to start
    /// now.
    pub fn activate(
        mut route: Route,
        fix: Option<&PntFix>,
        settings: NavigationSettings,
    ) -> Result<Self, RouteError> {
        if route.waypoint_count() < 2 {
            return Err(RouteError::TooFewWaypoints(route.waypoint_count()));
        }
        if route.start_time().is_none() {
            let now = route.now();
            route.set_start_time(Some(now));
        }
        route.recalculate(false);

        let active = best_initial_waypoint(&route, fix);
        info!(
            "Activating route '{}' ({} waypoints) at waypoint {}",
            route.name(),
            route.waypoint_count(),
            active
        );

        let mut state = ActiveState {
            original: route.copy(),
            route,
            eta_mode: settings.eta_calculation_mode,
            settings,
            active,
            finished: false,
            in_circle_count: 0,
            pnt: None,
            range: None,
            bearing: None,
            planned_ttg: None,
            dynamic_ttg: None,
        };
        if let Some(fix) = fix.filter(|f| f.has_motion()) {
            state.pnt = Some(*fix);
            state.refresh();
        }

        Ok(ActiveRoute {
            inner: Mutex::new(state),
        })
    }

    fn state(&self) -> MutexGuard<'_, ActiveState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feed a position fix. Fixes without a usable position or speed are
    /// ignored.
    pub fn update(&self, fix: &PntFix) {
        if !fix.has_motion() {
            debug!("Ignoring fix at {}: {:?} without position or speed", fix.time, fix.quality);
            return;
        }
        let mut state = self.state();
        state.pnt = Some(*fix);
        state.refresh();
    }

    /// Evaluate the waypoint-advance state machine once
    pub fn choose_active_waypoint(&self) -> ActiveWaypointSelection {
        self.state().choose()
    }

    /// Set the active waypoint explicitly. Unlike automatic advance this may
    /// move backwards, and it clears a finished state.
    pub fn change_active_waypoint(&self, index: usize) -> Result<(), RouteError> {
        let mut state = self.state();
        let count = state.route.waypoint_count();
        if index >= count {
            return Err(RouteError::InvalidWaypointIndex { index, count });
        }
        info!(
            "Route '{}': active waypoint set {} -> {}",
            state.route.name(),
            state.active,
            index
        );
        state.finished = false;
        state.set_active(index);
        Ok(())
    }

    pub fn active_waypoint_index(&self) -> usize {
        self.state().active
    }

    pub fn is_finished(&self) -> bool {
        self.state().finished
    }

    /// Index and planning data of the leg into the active waypoint (the
    /// first leg while heading for the first waypoint)
    pub fn current_leg(&self) -> Option<(usize, RouteLeg)> {
        let state = self.state();
        let index = state.current_leg_index();
        state.route.legs().get(index).map(|leg| (index, leg.clone()))
    }

    /// Most recent accepted fix
    pub fn pnt(&self) -> Option<PntFix> {
        self.state().pnt
    }

    /// Range to the active waypoint in nautical miles
    pub fn active_waypoint_range(&self) -> Option<f64> {
        self.state().range
    }

    pub fn active_waypoint_bearing(&self) -> Option<f64> {
        self.state().bearing
    }

    /// Time-to-go to the active waypoint for the current ETA mode
    pub fn active_waypoint_ttg(&self) -> Option<TimeDelta> {
        self.state().active_ttg()
    }

    /// Time-to-go to the active waypoint at planned leg speed
    pub fn planned_ttg(&self) -> Option<TimeDelta> {
        self.state().planned_ttg
    }

    /// Time-to-go to the active waypoint at live speed, floored at 0.1 kn
    pub fn dynamic_ttg(&self) -> Option<TimeDelta> {
        self.state().dynamic_ttg
    }

    pub fn eta_calculation_mode(&self) -> EtaCalculationMode {
        self.state().eta_mode
    }

    pub fn set_eta_calculation_mode(&self, mode: EtaCalculationMode) {
        let mut state = self.state();
        state.eta_mode = mode;
        state.refresh();
    }

    pub fn eta(&self, index: usize) -> Option<DateTime<Utc>> {
        self.state().route.eta(index)
    }

    pub fn etas(&self) -> Vec<Option<DateTime<Utc>>> {
        self.state().route.etas().to_vec()
    }

    pub fn ttgs(&self) -> Vec<Option<TimeDelta>> {
        self.state().route.ttgs().to_vec()
    }

    pub fn final_eta(&self) -> Option<DateTime<Utc>> {
        self.state().route.final_eta()
    }

    /// Along-route distance to the end in nautical miles: range to the
    /// active waypoint plus the legs beyond it
    pub fn range_to_end(&self) -> Option<f64> {
        let state = self.state();
        state
            .range
            .map(|range| range + state.route.range_to_end(state.active))
    }

    /// Whether the route's METOC forecast still matches the live ETAs
    pub fn is_metoc_valid(&self) -> bool {
        let state = self.state();
        state.route.is_metoc_valid(state.settings.metoc_tolerance())
    }

    /// Copy of the live route
    pub fn route_snapshot(&self) -> Route {
        self.state().route.copy()
    }

    /// Copy of the route as it was activated
    pub fn original_route(&self) -> Route {
        self.state().original.copy()
    }

    /// Planned position at `now` along the route as activated
    pub fn safe_haven_location(&self, now: DateTime<Utc>) -> Option<SafeHaven> {
        self.state().safe_haven(now)
    }

    /// Snapshot of the route windowed around the active waypoint
    pub fn partial_route_data(&self, filter: &PartialRouteFilter) -> RouteSnapshot {
        let state = self.state();
        let window = filter.window(&state.route, state.active);
        RouteSnapshot::from_window(&state.route, window, Some(state.active), state.original.etas())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::SailingMode;
    use crate::pnt::FixQuality;
    use crate::route::tests::{northbound, t0};
    use std::sync::Arc;
    use std::thread;

    fn fix_at(route: &Route, waypoint: usize, north_nm: f64, sog: f64, cog: f64) -> PntFix {
        let base = route.waypoints()[waypoint].position;
        let bearing = if north_nm < 0.0 { 180.0 } else { 0.0 };
        let distance = north_nm.abs() * NAUTICAL_MILE;
        let position = base.destination(bearing, distance, SailingMode::RhumbLine);
        PntFix::new(t0(), position, sog, cog)
    }

    fn activate(route: Route, fix: &PntFix) -> ActiveRoute {
        ActiveRoute::activate(route, Some(fix), NavigationSettings::default()).unwrap()
    }

    #[test]
    fn test_example_activation_and_advance() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let fix = fix_at(&route, 0, 0.0, 10.0, 0.0);
        let active = activate(route.copy(), &fix);
        assert_eq!(active.active_waypoint_index(), 0);

        // 0.1 nm past the first waypoint, 4.9 nm from the next one
        active.update(&fix_at(&route, 0, 0.1, 10.0, 0.0));
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::Changed);
        assert_eq!(active.active_waypoint_index(), 1);
        assert_eq!(active.current_leg().map(|(i, _)| i), Some(0));
        assert!((active.active_waypoint_range().unwrap() - 4.9).abs() < 1e-6);
    }

    #[test]
    fn test_best_initial_waypoint_skips_passed() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        // Just past waypoint 1 heading north: waypoint 1 is behind
        let fix = fix_at(&route, 1, 0.5, 10.0, 0.0);
        assert_eq!(best_initial_waypoint(&route, Some(&fix)), 2);

        // Same spot heading south
        let fix = fix_at(&route, 1, 0.5, 10.0, 180.0);
        assert_eq!(best_initial_waypoint(&route, Some(&fix)), 1);

        let mut invalid = fix;
        invalid.quality = FixQuality::NoFix;
        assert_eq!(best_initial_waypoint(&route, Some(&invalid)), 0);
        assert_eq!(best_initial_waypoint(&route, None), 0);
    }

    #[test]
    fn test_best_initial_waypoint_never_behind() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        for cog in [0.0, 30.0, 60.0, 89.0, 120.0, 200.0, 300.0] {
            let fix = fix_at(&route, 1, 2.0, 10.0, cog);
            let index = best_initial_waypoint(&route, Some(&fix));
            let position = fix.position.unwrap();
            let compliant = route.waypoints().iter().any(|w| {
                position
                    .bearing_to(&w.position, SailingMode::RhumbLine)
                    .map_or(true, |b| angle_difference(cog, b).abs() < 90.0)
            });
            if compliant {
                let b = position
                    .bearing_to(&route.waypoints()[index].position, SailingMode::RhumbLine)
                    .unwrap();
                assert!(angle_difference(cog, b).abs() < 90.0, "cog {} chose {}", cog, index);
            }
        }
    }

    #[test]
    fn test_no_course_falls_back_to_nearest() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        let mut fix = fix_at(&route, 2, -1.0, 10.0, 0.0);
        fix.cog = None;
        assert_eq!(best_initial_waypoint(&route, Some(&fix)), 2);
    }

    #[test]
    fn test_finish_requires_consecutive_confirmations() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 2, -1.0, 10.0, 0.0));
        assert_eq!(active.active_waypoint_index(), 2);

        let inside = fix_at(&route, 2, -0.1, 10.0, 0.0);
        let outside = fix_at(&route, 2, -0.5, 10.0, 0.0);

        active.update(&inside);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::NoChange);
        active.update(&outside);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::NoChange);
        assert!(!active.is_finished());

        active.update(&inside);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::NoChange);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::Finished);
        assert!(active.is_finished());
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::Finished);
    }

    #[test]
    fn test_relaxed_change() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        let start = fix_at(&route, 0, -1.0, 10.0, 0.0);
        let active = activate(route.copy(), &start);
        assert_eq!(active.active_waypoint_index(), 0);

        // Passed well clear of waypoint 0, 2 nm short of waypoint 1
        let mut far = fix_at(&route, 1, -2.0, 10.0, 0.0);
        let p = far.position.unwrap();
        far.position = Some(p.destination(90.0, 0.5 * NAUTICAL_MILE, SailingMode::RhumbLine));
        active.update(&far);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::Changed);
        assert_eq!(active.active_waypoint_index(), 1);

        // Disabled for search patterns
        let mut pattern = route.copy();
        pattern.set_search_pattern(true);
        let active = activate(pattern, &start);
        active.update(&far);
        assert_eq!(active.choose_active_waypoint(), ActiveWaypointSelection::NoChange);
        assert_eq!(active.active_waypoint_index(), 0);
    }

    #[test]
    fn test_index_never_decreases() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 0, -0.5, 10.0, 0.0));
        let mut last = active.active_waypoint_index();
        for step in 0..40 {
            let north = -0.5 + step as f64 * 0.4;
            let fix = fix_at(&route, 0, north, 10.0, if step % 7 == 0 { 180.0 } else { 0.0 });
            active.update(&fix);
            active.choose_active_waypoint();
            let index = active.active_waypoint_index();
            assert!(index >= last);
            last = index;
        }
        assert_eq!(last, 3);
    }

    #[test]
    fn test_invalid_fix_ignored() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 0, -0.5, 10.0, 0.0));
        let before = active.etas();

        let mut bad = fix_at(&route, 1, 0.0, 10.0, 0.0);
        bad.quality = FixQuality::Bad;
        active.update(&bad);
        let mut no_speed = fix_at(&route, 1, 0.0, 10.0, 0.0);
        no_speed.sog = None;
        active.update(&no_speed);

        assert_eq!(active.etas(), before);
        assert!((active.active_waypoint_range().unwrap() - 0.5).abs() < 1e-6);
    }

    fn assert_etas_consistent_from(active: &ActiveRoute) {
        let index = active.active_waypoint_index();
        let etas = active.etas();
        let ttgs = active.ttgs();
        for i in index..ttgs.len() {
            assert_eq!(etas[i + 1].unwrap() - etas[i].unwrap(), ttgs[i].unwrap());
        }
    }

    #[test]
    fn test_eta_modes() {
        let route = northbound(&[5.0, 5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 1, -2.0, 5.0, 0.0));
        assert_eq!(active.active_waypoint_index(), 1);

        // Hybrid: 2 nm at 5 kn, then planned legs at 10 kn
        assert_eq!(active.eta_calculation_mode(), EtaCalculationMode::Hybrid);
        let eta1 = active.eta(1).unwrap();
        assert!(((eta1 - t0()).num_seconds() - 24 * 60).abs() <= 1);
        assert!(((active.eta(2).unwrap() - eta1).num_seconds() - 30 * 60).abs() <= 1);
        assert_etas_consistent_from(&active);

        active.set_eta_calculation_mode(EtaCalculationMode::Planned);
        let eta1 = active.eta(1).unwrap();
        assert!(((eta1 - t0()).num_seconds() - 12 * 60).abs() <= 1);
        assert_etas_consistent_from(&active);

        active.set_eta_calculation_mode(EtaCalculationMode::Dynamic);
        let eta1 = active.eta(1).unwrap();
        assert!(((active.eta(2).unwrap() - eta1).num_seconds() - 60 * 60).abs() <= 1);
        assert_etas_consistent_from(&active);

        // Passed waypoint keeps its planned ETA
        assert_eq!(active.eta(0), Some(t0()));
        assert!((active.range_to_end().unwrap() - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_dynamic_ttg_floor() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 1, -1.0, 0.0, 0.0));
        assert_eq!(active.dynamic_ttg(), Some(TimeDelta::hours(10)));
        assert!(active.planned_ttg().is_some());
    }

    #[test]
    fn test_change_active_waypoint() {
        let route = northbound(&[5.0, 5.0], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 1, -1.0, 10.0, 0.0));
        assert_eq!(active.active_waypoint_index(), 1);
        active.change_active_waypoint(0).unwrap();
        assert_eq!(active.active_waypoint_index(), 0);
        assert!(active.change_active_waypoint(3).is_err());
    }

    #[test]
    fn test_activation_freezes_start_time() {
        let mut route = northbound(&[5.0, 5.0], 10.0);
        route.set_start_time(None);
        let active = ActiveRoute::activate(route, None, NavigationSettings::default()).unwrap();
        assert_eq!(active.original_route().start_time(), Some(t0()));
        assert_eq!(active.active_waypoint_index(), 0);
        assert!(active.pnt().is_none());
    }

    #[test]
    fn test_safe_haven() {
        let mut route = northbound(&[5.0, 5.0], 10.0);
        let leg = RouteLeg::new(10.0)
            .with_xtd(Some(0.1), Some(0.2))
            .with_stand_fast_length(400.0);
        route.set_leg(1, leg).unwrap();
        let active = activate(route.copy(), &fix_at(&route, 0, 0.0, 10.0, 0.0));

        let before = active.safe_haven_location(t0() - TimeDelta::minutes(5)).unwrap();
        assert_eq!(before.position, route.waypoints()[0].position);
        assert_eq!(before.speed, 0.0);
        assert_eq!(before.leg_index, 0);

        let mid = active.safe_haven_location(t0() + TimeDelta::minutes(45)).unwrap();
        assert_eq!(mid.leg_index, 1);
        assert_eq!(mid.speed, 10.0);
        assert_eq!(mid.box_length_m, 400.0);
        assert!((mid.width_nm - 0.3).abs() < 1e-12);
        let sailed = route.waypoints()[0]
            .position
            .distance_to(&mid.position, SailingMode::RhumbLine);
        assert!((sailed / NAUTICAL_MILE - 7.5).abs() < 0.01);

        let after = active.safe_haven_location(t0() + TimeDelta::hours(3)).unwrap();
        assert_eq!(after.position, route.waypoints()[2].position);
        assert_eq!(after.speed, 0.0);
        assert_eq!(after.leg_index, 1);
    }

    #[test]
    fn test_partial_route_data() {
        let route = northbound(&[5.0; 8], 10.0);
        let active = activate(route.copy(), &fix_at(&route, 4, -1.0, 10.0, 0.0));
        assert_eq!(active.active_waypoint_index(), 4);

        let snapshot = active.partial_route_data(&PartialRouteFilter::by_waypoint_count(2, 1));
        assert_eq!(snapshot.waypoints.len(), 4);
        assert_eq!(snapshot.active_waypoint_index, Some(1));
        assert!(snapshot.waypoints.last().unwrap().outgoing_leg.is_none());
        assert_eq!(snapshot.original_etas, route.etas()[3..=6].to_vec());
        // Live ETA of the active waypoint is ahead of plan
        assert!(snapshot.waypoints[1].eta < snapshot.original_etas[1]);

        let snapshot = active.partial_route_data(&PartialRouteFilter::by_waypoint_count(10, 10));
        assert_eq!(snapshot.waypoints.len(), 9);
        assert!(snapshot.waypoints[8].outgoing_leg.is_none());
    }

    #[test]
    fn test_concurrent_readers_see_consistent_state() {
        let route = northbound(&[5.0; 6], 10.0);
        let active = Arc::new(activate(route.copy(), &fix_at(&route, 0, -0.5, 10.0, 0.0)));

        let writer = {
            let active = active.clone();
            let route = route.copy();
            thread::spawn(move || {
                for step in 0..300 {
                    let north = -0.5 + step as f64 * 0.1;
                    active.update(&fix_at(&route, 0, north, 8.0 + (step % 5) as f64, 0.0));
                    active.choose_active_waypoint();
                }
            })
        };

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let active = active.clone();
                thread::spawn(move || {
                    for _ in 0..300 {
                        let filter = PartialRouteFilter::by_waypoint_count(3, 1);
                        let snapshot = active.partial_route_data(&filter);
                        assert!(snapshot.waypoints.last().unwrap().outgoing_leg.is_none());
                        let etas = active.etas();
                        assert_eq!(etas.len(), 7);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        assert_etas_consistent_from(&active);
    }
}
