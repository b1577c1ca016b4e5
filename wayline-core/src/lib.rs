//! # Wayline Core
//!
//! Platform-independent route navigation model for shipboard navigation.
//!
//! This crate contains the route model and its algorithms with **no I/O and
//! no threads of its own**. Time is read through an injected [`Clock`] and
//! position fixes are handed in by the host, so everything here runs the
//! same in a live system, in a replay and in tests.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  wayline-core (no I/O)                                      │
//! │  ├── geo/        (rhumb line & great circle geodesy)        │
//! │  ├── leg/        (planned speed, XTD, time-to-go)           │
//! │  ├── waypoint/   (position, turn radius / rate of turn)     │
//! │  ├── route/      (waypoint arena, TTG/DTG/ETA, re-planning) │
//! │  ├── active/     (waypoint-advance state machine)           │
//! │  ├── filter/     (partial route windows)                    │
//! │  ├── snapshot/   (JSON / bincode wire form)                 │
//! │  └── intended/   (routes received from other vessels)       │
//! └─────────────────────────────────────────────────────────────┘
//!                 ▲                           ▲
//!    ┌────────────┴────────────┐   ┌─────────┴─────────┐
//!    │  PntSource (fixes)      │   │  Clock ("now")    │
//!    └─────────────────────────┘   └───────────────────┘
//! ```
//!
//! ## Key Modules
//!
//! - [`route`] - Ordered waypoints and legs with derived ETAs
//! - [`active`] - Live navigation: active waypoint, TTG, safe haven
//! - [`filter`] - Windowing a route around its active waypoint
//! - [`snapshot`] - Wire format for persistence and broadcasts
//! - [`intended`] - Read-only view of another vessel's plan
//! - [`geo`] - Geodesy on a spherical earth
//!
//! ## Example: Planning a Route
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::{TimeDelta, TimeZone, Utc};
//! use wayline_core::{ManualClock, Position, Route, RouteLeg, RouteWaypoint};
//!
//! let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
//! let clock = Arc::new(ManualClock::new(t0));
//! let waypoints = vec![
//!     RouteWaypoint::named("Start", Position::new(55.0, 12.0)?),
//!     RouteWaypoint::named("End", Position::new(55.5, 12.0)?),
//! ];
//! let route = Route::from_parts("Sound", waypoints, vec![RouteLeg::new(10.0)], Some(t0), clock)?;
//!
//! // 30 nm at 10 kn
//! let ttg = route.total_ttg().unwrap();
//! assert!((ttg - TimeDelta::hours(3)).num_seconds().abs() < 30);
//! # Ok::<(), wayline_core::RouteError>(())
//! ```

pub mod active;
pub mod clock;
pub mod error;
pub mod filter;
pub mod geo;
pub mod intended;
pub mod leg;
pub mod metoc;
pub mod pnt;
pub mod route;
pub mod settings;
pub mod snapshot;
pub mod waypoint;

// Re-export commonly used types
pub use active::{best_initial_waypoint, ActiveRoute, ActiveWaypointSelection, SafeHaven};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use error::RouteError;
pub use filter::{PartialRouteFilter, PartialRouteFilterKind};
pub use geo::{Position, SailingMode, NAUTICAL_MILE};
pub use intended::IntendedRoute;
pub use leg::{LegRef, RouteLeg};
pub use metoc::{MetocForecast, MetocPoint};
pub use pnt::{FixQuality, PntFix, PntSource};
pub use route::{EtaAdjustment, Route};
pub use settings::{EtaCalculationMode, NavigationSettings};
pub use snapshot::{LegSnapshot, RouteSnapshot, WaypointSnapshot};
pub use waypoint::RouteWaypoint;
