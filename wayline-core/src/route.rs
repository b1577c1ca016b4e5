//! Route: an ordered voyage of waypoints and legs
//!
//! Waypoints live in an ordered arena and legs in a parallel table keyed by
//! the index of their start waypoint, so leg `i` always joins waypoint `i`
//! to waypoint `i + 1` and `legs.len() == waypoints.len() - 1`.
//!
//! Per-leg time-to-go (TTG), distance-to-go (DTG) and per-waypoint ETAs are
//! derived data. They are rebuilt from scratch by [`Route::recalculate`]
//! after every structural or speed change, never patched in place:
//!
//! ```text
//! ETA[0]     = start time (or "now" from the route clock when unset)
//! ETA[i + 1] = ETA[i] + TTG[i]
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::RouteError;
use crate::geo::Position;
use crate::leg::{speed_for, LegRef, RouteLeg, MIN_SPEED_KN};
use crate::metoc::{MetocAttachment, MetocForecast};
use crate::waypoint::{auto_name, RouteWaypoint};

/// Re-planning strategy for [`Route::adjust_eta`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EtaAdjustment {
    /// Change the speeds of the legs just before and after the waypoint
    AdjustAdjacentLegSpeeds,
    /// Shift the start time, moving every ETA by the same amount
    AdjustAllEtas,
    /// Keep start time and final ETA, use one uniform speed before the
    /// waypoint and another after it
    AdjustFixedStartAndEnd,
}

/// Derived per-leg and per-waypoint values
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct Estimates {
    pub ttgs: Vec<Option<TimeDelta>>,
    /// Distance to go per leg in nautical miles
    pub dtgs: Vec<f64>,
    pub etas: Vec<Option<DateTime<Utc>>>,
}

/// ETAs accumulated from a start time over a TTG sequence. An undefined
/// TTG leaves every later ETA undefined.
pub(crate) fn accumulate_etas(
    start: Option<DateTime<Utc>>,
    ttgs: &[Option<TimeDelta>],
) -> Vec<Option<DateTime<Utc>>> {
    let mut etas = Vec::with_capacity(ttgs.len() + 1);
    let mut eta = start;
    etas.push(eta);
    for ttg in ttgs {
        eta = eta.zip(*ttg).map(|(e, t)| e + t);
        etas.push(eta);
    }
    etas
}

/// Whether a solved leg speed still gives a defined time-to-go
fn sailable(speed: f64) -> bool {
    speed.is_finite() && speed >= MIN_SPEED_KN
}

/// A planned voyage
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    departure: Option<String>,
    destination: Option<String>,
    start_time: Option<DateTime<Utc>>,
    waypoints: Vec<RouteWaypoint>,
    legs: Vec<RouteLeg>,
    search_pattern: bool,
    estimates: Option<Estimates>,
    metoc: Option<MetocAttachment>,
    clock: SharedClock,
}

impl Route {
    /// Create an empty route
    pub fn new(name: impl Into<String>, clock: SharedClock) -> Self {
        Route {
            name: name.into(),
            departure: None,
            destination: None,
            start_time: None,
            waypoints: Vec::new(),
            legs: Vec::new(),
            search_pattern: false,
            estimates: None,
            metoc: None,
            clock,
        }
    }

    /// Build a route from a waypoint sequence and its leg table
    pub fn from_parts(
        name: impl Into<String>,
        waypoints: Vec<RouteWaypoint>,
        legs: Vec<RouteLeg>,
        start_time: Option<DateTime<Utc>>,
        clock: SharedClock,
    ) -> Result<Self, RouteError> {
        if waypoints.len() < 2 {
            return Err(RouteError::TooFewWaypoints(waypoints.len()));
        }
        if legs.len() != waypoints.len() - 1 {
            return Err(RouteError::LegCountMismatch {
                waypoints: waypoints.len(),
                expected: waypoints.len() - 1,
                actual: legs.len(),
            });
        }

        let mut route = Route::new(name, clock);
        route.waypoints = waypoints;
        route.legs = legs;
        route.start_time = start_time;
        for index in 0..route.waypoints.len() {
            route.derive_turn(index);
        }
        route.recalculate(true);
        Ok(route)
    }

    /// Append a waypoint; the new leg copies the settings of the previous
    /// last leg, or uses defaults for the second waypoint
    pub fn append_waypoint(&mut self, waypoint: RouteWaypoint) {
        let leg = self.legs.last().cloned().unwrap_or_default();
        self.append_waypoint_with_leg(waypoint, leg);
    }

    /// Append a waypoint reached over `leg`. The leg is dropped when the
    /// route is empty.
    pub fn append_waypoint_with_leg(&mut self, waypoint: RouteWaypoint, leg: RouteLeg) {
        if !self.waypoints.is_empty() {
            self.legs.push(leg);
        }
        self.waypoints.push(waypoint);
        self.derive_turn(self.waypoints.len() - 1);
        self.recalculate(true);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn departure(&self) -> Option<&str> {
        self.departure.as_deref()
    }

    pub fn set_departure(&mut self, departure: Option<String>) {
        self.departure = departure;
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn set_destination(&mut self, destination: Option<String>) {
        self.destination = destination;
    }

    /// Search-pattern routes never use the relaxed waypoint change
    pub fn is_search_pattern(&self) -> bool {
        self.search_pattern
    }

    pub fn set_search_pattern(&mut self, search_pattern: bool) {
        self.search_pattern = search_pattern;
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn set_start_time(&mut self, start_time: Option<DateTime<Utc>>) {
        self.start_time = start_time;
        self.recalculate(true);
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current time according to the route clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn waypoints(&self) -> &[RouteWaypoint] {
        &self.waypoints
    }

    pub fn waypoint(&self, index: usize) -> Option<&RouteWaypoint> {
        self.waypoints.get(index)
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn legs(&self) -> &[RouteLeg] {
        &self.legs
    }

    pub fn leg_count(&self) -> usize {
        self.legs.len()
    }

    /// Leg `index` bound to its start and end waypoints
    pub fn leg(&self, index: usize) -> Option<LegRef<'_>> {
        let leg = self.legs.get(index)?;
        let start = self.waypoints.get(index)?;
        let end = self.waypoints.get(index + 1)?;
        Some(LegRef::new(index, leg, start, end))
    }

    /// Incoming leg of a waypoint, `None` for the first
    pub fn in_leg(&self, waypoint: usize) -> Option<LegRef<'_>> {
        waypoint.checked_sub(1).and_then(|i| self.leg(i))
    }

    /// Outgoing leg of a waypoint, `None` for the last
    pub fn out_leg(&self, waypoint: usize) -> Option<LegRef<'_>> {
        self.leg(waypoint)
    }

    fn check_waypoint(&self, index: usize) -> Result<(), RouteError> {
        if index >= self.waypoints.len() {
            return Err(RouteError::InvalidWaypointIndex {
                index,
                count: self.waypoints.len(),
            });
        }
        Ok(())
    }

    fn check_leg(&self, index: usize) -> Result<(), RouteError> {
        if index >= self.legs.len() {
            return Err(RouteError::InvalidLegIndex {
                index,
                count: self.legs.len(),
            });
        }
        Ok(())
    }

    /// Re-derive the dependent turn field of a waypoint from its incoming leg
    fn derive_turn(&mut self, index: usize) {
        let in_speed = index
            .checked_sub(1)
            .and_then(|i| self.legs.get(i))
            .map(|leg| leg.speed);
        if let Some(waypoint) = self.waypoints.get_mut(index) {
            waypoint.derive_turn(in_speed);
        }
    }

    fn derive_all_turns(&mut self) {
        for index in 0..self.waypoints.len() {
            self.derive_turn(index);
        }
    }

    /// Set or clear the turn radius (nm) of a waypoint
    pub fn set_turn_radius(&mut self, index: usize, radius: Option<f64>) -> Result<(), RouteError> {
        self.check_waypoint(index)?;
        let in_speed = self.in_leg(index).map(|leg| leg.speed());
        self.waypoints[index].set_turn_radius(radius, in_speed);
        Ok(())
    }

    /// Set or clear the rate of turn (deg/min) of a waypoint
    pub fn set_rate_of_turn(&mut self, index: usize, rot: Option<f64>) -> Result<(), RouteError> {
        self.check_waypoint(index)?;
        let in_speed = self.in_leg(index).map(|leg| leg.speed());
        self.waypoints[index].set_rate_of_turn(rot, in_speed);
        Ok(())
    }

    pub fn rename_waypoint(
        &mut self,
        index: usize,
        name: Option<String>,
    ) -> Result<(), RouteError> {
        self.check_waypoint(index)?;
        self.waypoints[index].name = name;
        Ok(())
    }

    pub fn move_waypoint(&mut self, index: usize, position: Position) -> Result<(), RouteError> {
        self.check_waypoint(index)?;
        self.waypoints[index].position = position;
        self.recalculate(true);
        Ok(())
    }

    /// Replace the planning data of a leg
    pub fn set_leg(&mut self, index: usize, leg: RouteLeg) -> Result<(), RouteError> {
        self.check_leg(index)?;
        self.legs[index] = leg;
        self.derive_turn(index + 1);
        self.recalculate(true);
        Ok(())
    }

    pub fn set_leg_speed(&mut self, index: usize, speed: f64) -> Result<(), RouteError> {
        self.check_leg(index)?;
        self.legs[index].speed = speed.max(0.0);
        self.derive_turn(index + 1);
        self.recalculate(true);
        Ok(())
    }

    pub fn set_all_speeds(&mut self, speed: f64) {
        for leg in &mut self.legs {
            leg.speed = speed.max(0.0);
        }
        self.derive_all_turns();
        self.recalculate(true);
    }

    /// Rebuild TTG/DTG/ETA. Without `force` this is a no-op once the
    /// derived arrays exist.
    pub fn recalculate(&mut self, force: bool) {
        if !force && self.estimates.is_some() {
            return;
        }
        if self.waypoints.is_empty() {
            self.estimates = Some(Estimates::default());
            return;
        }

        let (ttgs, dtgs): (Vec<_>, Vec<_>) = (0..self.legs.len())
            .filter_map(|i| self.leg(i))
            .map(|leg| (leg.time_to_go(), leg.range()))
            .unzip();
        let start = self.start_time.unwrap_or_else(|| self.clock.now());
        let etas = accumulate_etas(Some(start), &ttgs);

        self.estimates = Some(Estimates { ttgs, dtgs, etas });
    }

    pub(crate) fn estimates_mut(&mut self) -> &mut Estimates {
        self.recalculate(false);
        self.estimates.get_or_insert_with(Estimates::default)
    }

    /// Time-to-go per leg; `None` where the planned speed is below 0.1 kn
    pub fn ttgs(&self) -> &[Option<TimeDelta>] {
        self.estimates.as_ref().map_or(&[], |e| &e.ttgs)
    }

    /// Distance-to-go per leg in nautical miles
    pub fn dtgs(&self) -> &[f64] {
        self.estimates.as_ref().map_or(&[], |e| &e.dtgs)
    }

    /// ETA per waypoint
    pub fn etas(&self) -> &[Option<DateTime<Utc>>] {
        self.estimates.as_ref().map_or(&[], |e| &e.etas)
    }

    pub fn eta(&self, index: usize) -> Option<DateTime<Utc>> {
        self.etas().get(index).copied().flatten()
    }

    pub fn final_eta(&self) -> Option<DateTime<Utc>> {
        self.etas().last().copied().flatten()
    }

    /// Total route length in nautical miles
    pub fn total_dtg(&self) -> f64 {
        self.dtgs().iter().sum()
    }

    /// Total time-to-go, `None` if any leg is undefined
    pub fn total_ttg(&self) -> Option<TimeDelta> {
        self.ttgs()
            .iter()
            .try_fold(TimeDelta::zero(), |acc, ttg| ttg.map(|t| acc + t))
    }

    /// Along-route distance from waypoint `index` to the end, nautical miles
    pub fn range_to_end(&self, index: usize) -> f64 {
        self.dtgs().iter().skip(index).sum()
    }

    /// South-west and north-east corners of the waypoint extent
    pub fn bounding_box(&self) -> Option<(Position, Position)> {
        let first = self.waypoints.first()?.position;
        let (mut min_lat, mut min_lon) = (first.latitude(), first.longitude());
        let (mut max_lat, mut max_lon) = (min_lat, min_lon);
        for waypoint in &self.waypoints[1..] {
            let p = waypoint.position;
            min_lat = min_lat.min(p.latitude());
            max_lat = max_lat.max(p.latitude());
            min_lon = min_lon.min(p.longitude());
            max_lon = max_lon.max(p.longitude());
        }
        Some((
            Position::new(min_lat, min_lon).ok()?,
            Position::new(max_lat, max_lon).ok()?,
        ))
    }

    /// Renumber generated waypoint names after the sequence changed
    pub fn rename_auto_waypoints(&mut self) {
        for (index, waypoint) in self.waypoints.iter_mut().enumerate() {
            if waypoint.is_auto_named() {
                waypoint.name = Some(auto_name(index));
            }
        }
    }

    /// Split leg `after_leg` in two with a new waypoint at `position`.
    /// Returns the index of the new waypoint.
    pub fn insert_waypoint(
        &mut self,
        after_leg: usize,
        position: Position,
    ) -> Result<usize, RouteError> {
        self.check_leg(after_leg)?;
        let index = after_leg + 1;

        let mut waypoint = RouteWaypoint::named(auto_name(index), position);
        if let Some(radius) = self.waypoints[after_leg].turn_radius() {
            waypoint = waypoint.with_turn_radius(radius);
        }
        let leg = self.legs[after_leg].clone();

        self.waypoints.insert(index, waypoint);
        self.legs.insert(index, leg);
        self.derive_turn(index);
        self.derive_turn(index + 1);
        self.rename_auto_waypoints();
        self.recalculate(true);
        Ok(index)
    }

    /// Remove a waypoint and bypass it. Only done while at least three
    /// waypoints remain; returns whether anything was removed.
    pub fn delete_waypoint(&mut self, index: usize) -> bool {
        let count = self.waypoints.len();
        if count < 3 || index >= count {
            debug!("Not deleting waypoint {} from route of {}", index, count);
            return false;
        }

        self.waypoints.remove(index);
        if index == count - 1 {
            // Last waypoint: its incoming leg dangles
            self.legs.remove(index - 1);
        } else {
            // Incoming leg (if any) now reaches the following waypoint
            self.legs.remove(index);
        }

        self.derive_turn(0);
        if index < self.waypoints.len() {
            self.derive_turn(index);
        }
        self.rename_auto_waypoints();
        self.recalculate(true);
        true
    }

    /// Independent deep copy
    pub fn copy(&self) -> Route {
        self.clone()
    }

    /// Independent copy sailed in the opposite direction
    pub fn reverse(&self) -> Route {
        let mut route = Route {
            name: self.name.clone(),
            departure: self.destination.clone(),
            destination: self.departure.clone(),
            start_time: self.start_time,
            waypoints: self.waypoints.iter().rev().cloned().collect(),
            legs: self.legs.iter().rev().cloned().collect(),
            search_pattern: self.search_pattern,
            estimates: None,
            metoc: None,
            clock: self.clock.clone(),
        };
        route.derive_all_turns();
        route.rename_auto_waypoints();
        route.recalculate(true);
        route
    }

    /// Re-plan so that waypoint `index` is reached at `new_eta`.
    ///
    /// Nothing is changed when the request violates the ordering
    /// constraints of the chosen strategy.
    pub fn adjust_eta(
        &mut self,
        index: usize,
        new_eta: DateTime<Utc>,
        mode: EtaAdjustment,
    ) -> Result<(), RouteError> {
        self.check_waypoint(index)?;
        self.recalculate(false);

        let last = self.waypoints.len() - 1;
        let eta_at = |i: usize| self.eta(i).ok_or(RouteError::EtaUndefined(i));
        let current = eta_at(index)?;

        match mode {
            EtaAdjustment::AdjustAllEtas => {
                let start = eta_at(0)?;
                self.start_time = Some(start + (new_eta - current));
            }
            EtaAdjustment::AdjustAdjacentLegSpeeds => {
                let start = eta_at(0)?;
                let lower = index.checked_sub(1).map(eta_at).transpose()?;
                let upper = (index < last).then(|| eta_at(index + 1)).transpose()?;
                let out_of_range = || RouteError::EtaOutOfRange {
                    requested: new_eta,
                    lower,
                    upper,
                };
                if lower.is_some_and(|l| new_eta <= l) || upper.is_some_and(|u| new_eta >= u) {
                    debug!("Rejecting ETA {} for waypoint {}", new_eta, index);
                    return Err(out_of_range());
                }

                let dtgs = self.dtgs();
                let before = lower.map(|l| speed_for(dtgs[index - 1], new_eta - l));
                let after = upper.map(|u| speed_for(dtgs[index], u - new_eta));
                // A zero-length neighbour can't absorb the change
                if before.into_iter().chain(after).any(|s| !sailable(s)) {
                    debug!("No sailable speed for ETA {} at waypoint {}", new_eta, index);
                    return Err(out_of_range());
                }

                if let Some(speed) = before {
                    self.legs[index - 1].speed = speed;
                    // Pin ETA[0] the speeds were solved against
                    self.start_time = Some(start);
                } else {
                    // First waypoint: its ETA is the start time
                    self.start_time = Some(new_eta);
                }
                if let Some(speed) = after {
                    self.legs[index].speed = speed;
                }
                self.derive_turn(index);
                self.derive_turn(index + 1);
            }
            EtaAdjustment::AdjustFixedStartAndEnd => {
                let start = eta_at(0)?;
                let end = eta_at(last)?;
                let out_of_range = || RouteError::EtaOutOfRange {
                    requested: new_eta,
                    lower: Some(start),
                    upper: Some(end),
                };
                if index == 0 || index == last || new_eta <= start || new_eta >= end {
                    debug!("Rejecting ETA {} for waypoint {}", new_eta, index);
                    return Err(out_of_range());
                }

                let dtgs = self.dtgs();
                let before = speed_for(dtgs[..index].iter().sum(), new_eta - start);
                let after = speed_for(dtgs[index..].iter().sum(), end - new_eta);
                if !sailable(before) || !sailable(after) {
                    debug!("No sailable speed for ETA {} at waypoint {}", new_eta, index);
                    return Err(out_of_range());
                }

                self.start_time = Some(start);
                for (i, leg) in self.legs.iter_mut().enumerate() {
                    leg.speed = if i < index { before } else { after };
                }
                self.derive_all_turns();
            }
        }

        self.recalculate(true);
        Ok(())
    }

    /// Attach a forecast made for the current start time and final ETA
    pub fn set_metoc_forecast(&mut self, forecast: MetocForecast) -> Result<(), RouteError> {
        self.recalculate(false);
        let start_time = self.eta(0).ok_or(RouteError::EtaUndefined(0))?;
        let last = self.waypoints.len().saturating_sub(1);
        let final_eta = self.final_eta().ok_or(RouteError::EtaUndefined(last))?;
        self.metoc = Some(MetocAttachment {
            forecast,
            start_time,
            final_eta,
        });
        Ok(())
    }

    pub fn metoc_forecast(&self) -> Option<&MetocForecast> {
        self.metoc.as_ref().map(|m| &m.forecast)
    }

    pub fn remove_metoc_forecast(&mut self) -> Option<MetocForecast> {
        self.metoc.take().map(|m| m.forecast)
    }

    /// Whether the attached forecast still matches the voyage plan
    pub fn is_metoc_valid(&self, tolerance: TimeDelta) -> bool {
        let Some(metoc) = &self.metoc else {
            return false;
        };
        match (self.eta(0), self.final_eta()) {
            (Some(start), Some(end)) => metoc.is_valid_for(start, end, tolerance),
            _ => false,
        }
    }
}
