//! # Wayline Monitor
//!
//! Host process around `wayline-core`: loads a route and navigation
//! settings, replays recorded PNT fixes on a feed thread, drives an
//! [`ActiveRoute`](wayline_core::ActiveRoute) with them and reports
//! waypoint events and the outbound intended route.

use clap::Parser;
use log::{debug, info};
use miette::Diagnostic;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use wayline_core::{EtaCalculationMode, RouteError, RouteSnapshot};

pub mod config;
pub mod feed;
pub mod monitor;

use feed::{spawn_feed, FixReader, ReplayClock};
use monitor::{MonitorEvent, RouteMonitor};

/// Fixes buffered between the feed thread and the monitor loop
const FEED_CAPACITY: usize = 64;

#[derive(Error, Debug, Diagnostic)]
pub enum MonitorError {
    #[error("Failed to access {path}")]
    #[diagnostic(code(wayline::io))]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON")]
    #[diagnostic(code(wayline::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(wayline::route))]
    Route(#[from] RouteError),

    #[error("Failed to start feed thread")]
    #[diagnostic(code(wayline::feed))]
    Feed(#[source] io::Error),
}

#[derive(Parser, Clone, Debug)]
#[command(name = "wayline-monitor", version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Route to navigate, as route snapshot JSON
    #[arg(short, long)]
    pub route: PathBuf,

    /// Recorded fixes, one JSON object per line. Reads stdin when omitted
    #[arg(short, long)]
    pub fixes: Option<PathBuf>,

    /// Navigation settings file, defaults to settings.json in the
    /// project config directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ETA calculation mode: planned, dynamic or hybrid
    #[arg(long)]
    pub eta_mode: Option<EtaCalculationMode>,

    /// Evaluate the waypoint-advance state machine every N fixes
    #[arg(long, default_value_t = 1)]
    pub evaluate_every: u32,

    /// Write events and the final intended route as JSON to stdout
    #[arg(long, default_value_t = false)]
    pub output: bool,

    /// Write the effective settings to the settings file and exit
    #[arg(long, default_value_t = false)]
    pub save_config: bool,
}

fn open(path: &PathBuf) -> Result<File, MonitorError> {
    File::open(path).map_err(|source| MonitorError::Io {
        path: path.clone(),
        source,
    })
}

pub fn run(args: Cli) -> Result<(), MonitorError> {
    let settings_path = config::settings_path(args.config.as_deref());
    let mut settings = settings_path
        .as_deref()
        .map(config::load_settings)
        .unwrap_or_default();
    if let Some(mode) = args.eta_mode {
        settings.eta_calculation_mode = mode;
    }

    if args.save_config {
        if let Some(path) = &settings_path {
            config::save_settings(path, &settings)?;
        }
        return Ok(());
    }

    let json = io::read_to_string(open(&args.route)?).map_err(|source| MonitorError::Io {
        path: args.route.clone(),
        source,
    })?;
    let snapshot = RouteSnapshot::from_json(&json)?;

    let reader: Box<dyn BufRead + Send> = match &args.fixes {
        Some(path) => Box::new(BufReader::new(open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let (fixes, feed) =
        spawn_feed(FixReader::new(reader), FEED_CAPACITY).map_err(MonitorError::Feed)?;

    // The replay timeline starts at the first fix
    let first = fixes.recv().ok();
    let clock = Arc::new(match &first {
        Some(fix) => ReplayClock::new(fix.time),
        None => ReplayClock::new(chrono::Utc::now()),
    });
    let route = snapshot.to_route(clock.clone())?;
    info!(
        "Loaded route '{}' with {} waypoints, {:.1} nm",
        route.name(),
        route.waypoint_count(),
        route.total_dtg()
    );

    let filter = settings.partial_route_filter;
    let mut monitor =
        RouteMonitor::activate(route, first.as_ref(), settings, clock, args.evaluate_every)?;
    let output = args.output;
    // The activating fix counts towards the evaluation cadence too
    let replay = first.into_iter().chain(fixes.iter());
    let processed = monitor.run(replay, |event: &MonitorEvent| {
        if output {
            if let Ok(line) = serde_json::to_string(event) {
                println!("{}", line);
            }
        }
    });
    drop(fixes);
    // A finished route leaves the feed thread to exit on its next send
    if !monitor.is_finished() {
        match feed.join() {
            Ok(count) => debug!("Feed thread read {} fixes", count),
            Err(_) => debug!("Feed thread panicked"),
        }
    }
    info!("Processed {} fixes", processed);

    if output {
        println!("{}", monitor.intended_route(&filter).to_json()?);
    }
    Ok(())
}
