//! Geodesy primitives
//!
//! Range, bearing and position projection for rhumb-line and great-circle
//! sailing on a spherical earth. All angles are in degrees, all distances
//! in meters unless a function name says otherwise.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::error::RouteError;

/// Conversion constants
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;
pub const NAUTICAL_MILE: f64 = 1852.0;
pub const KN_TO_MS: f64 = NAUTICAL_MILE / 3600.0;
pub const MS_TO_KN: f64 = 3600.0 / NAUTICAL_MILE;

/// Below this separation two positions are treated as the same point
const COINCIDENT_M: f64 = 1e-6;

/// Which track a leg is sailed along
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SailingMode {
    /// Constant bearing track (loxodrome)
    #[default]
    RhumbLine,
    /// Shortest path on the sphere (orthodrome)
    GreatCircle,
}

impl std::fmt::Display for SailingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SailingMode::RhumbLine => write!(f, "RL"),
            SailingMode::GreatCircle => write!(f, "GC"),
        }
    }
}

/// Geographic position, latitude and longitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPosition")]
pub struct Position {
    latitude: f64,
    longitude: f64,
}

/// Unchecked wire form of [`Position`]
#[derive(Deserialize)]
struct RawPosition {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawPosition> for Position {
    type Error = RouteError;

    fn try_from(raw: RawPosition) -> Result<Self, Self::Error> {
        Position::new(raw.latitude, raw.longitude)
    }
}

impl Position {
    /// Create a position, rejecting non-finite or out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, RouteError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || latitude.abs() > 90.0
            || longitude.abs() > 180.0
        {
            return Err(RouteError::InvalidPosition {
                lat: latitude,
                lon: longitude,
            });
        }
        Ok(Position {
            latitude,
            longitude,
        })
    }

    /// Projection results are always in range after normalisation
    fn from_radians(phi: f64, lambda: f64) -> Self {
        Position {
            latitude: phi.to_degrees().clamp(-90.0, 90.0),
            longitude: normalize_longitude(lambda.to_degrees()),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    fn radians(&self) -> (f64, f64) {
        (self.latitude.to_radians(), self.longitude.to_radians())
    }

    /// Unit normal vector of this position (n-vector)
    fn n_vector(&self) -> Vector3<f64> {
        let (phi, lambda) = self.radians();
        Vector3::new(phi.cos() * lambda.cos(), phi.cos() * lambda.sin(), phi.sin())
    }

    /// Rhumb-line distance in meters
    pub fn rhumb_line_distance_to(&self, other: &Position) -> f64 {
        let (phi1, _) = self.radians();
        let (phi2, _) = other.radians();
        let dphi = phi2 - phi1;
        let dlambda = delta_longitude(self, other);
        let q = stretch_ratio(phi1, phi2);
        (dphi * dphi + q * q * dlambda * dlambda).sqrt() * EARTH_RADIUS_M
    }

    /// Constant rhumb-line bearing, `None` when the positions coincide
    pub fn rhumb_line_bearing_to(&self, other: &Position) -> Option<f64> {
        if self.rhumb_line_distance_to(other) < COINCIDENT_M {
            return None;
        }
        let (phi1, _) = self.radians();
        let (phi2, _) = other.radians();
        let dpsi = projected_latitude_difference(phi1, phi2);
        let dlambda = delta_longitude(self, other);
        Some(normalize_bearing(dlambda.atan2(dpsi).to_degrees()))
    }

    /// Great-circle (haversine) distance in meters
    pub fn great_circle_distance_to(&self, other: &Position) -> f64 {
        let (phi1, lambda1) = self.radians();
        let (phi2, lambda2) = other.radians();
        let dphi = phi2 - phi1;
        let dlambda = lambda2 - lambda1;

        let a = (dphi / 2.0).sin().powi(2)
            + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).max(0.0).sqrt())
    }

    /// Initial great-circle bearing, `None` when the positions coincide
    pub fn great_circle_bearing_to(&self, other: &Position) -> Option<f64> {
        if self.great_circle_distance_to(other) < COINCIDENT_M {
            return None;
        }
        let (phi1, lambda1) = self.radians();
        let (phi2, lambda2) = other.radians();
        let dlambda = lambda2 - lambda1;

        let y = dlambda.sin() * phi2.cos();
        let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();
        Some(normalize_bearing(y.atan2(x).to_degrees()))
    }

    /// Distance in meters for the given sailing mode
    pub fn distance_to(&self, other: &Position, mode: SailingMode) -> f64 {
        match mode {
            SailingMode::RhumbLine => self.rhumb_line_distance_to(other),
            SailingMode::GreatCircle => self.great_circle_distance_to(other),
        }
    }

    /// Initial bearing for the given sailing mode
    pub fn bearing_to(&self, other: &Position, mode: SailingMode) -> Option<f64> {
        match mode {
            SailingMode::RhumbLine => self.rhumb_line_bearing_to(other),
            SailingMode::GreatCircle => self.great_circle_bearing_to(other),
        }
    }

    /// Direct problem: the position reached after sailing `distance_m`
    /// from here on initial `bearing`
    pub fn destination(&self, bearing: f64, distance_m: f64, mode: SailingMode) -> Position {
        let (phi1, lambda1) = self.radians();
        let theta = bearing.to_radians();
        let delta = distance_m / EARTH_RADIUS_M;

        match mode {
            SailingMode::RhumbLine => {
                let dphi = delta * theta.cos();
                let mut phi2 = phi1 + dphi;
                // Crossing a pole: continue down the other side
                if phi2.abs() > FRAC_PI_2 {
                    phi2 = if phi2 > 0.0 { PI - phi2 } else { -PI - phi2 };
                }
                let q = stretch_ratio(phi1, phi2);
                let dlambda = delta * theta.sin() / q;
                Position::from_radians(phi2, lambda1 + dlambda)
            }
            SailingMode::GreatCircle => {
                let sin_phi2 = phi1.sin() * delta.cos() + phi1.cos() * delta.sin() * theta.cos();
                let phi2 = sin_phi2.clamp(-1.0, 1.0).asin();
                let y = theta.sin() * delta.sin() * phi1.cos();
                let x = delta.cos() - phi1.sin() * sin_phi2;
                Position::from_radians(phi2, lambda1 + y.atan2(x))
            }
        }
    }

    /// Signed great-circle cross-track distance in meters from the track
    /// `from` -> `to`. Positive is to starboard (right) of the track.
    pub fn cross_track_distance(&self, from: &Position, to: &Position) -> f64 {
        let Some(normal) = track_normal(from, to) else {
            return from.great_circle_distance_to(self);
        };
        -normal.dot(&self.n_vector()).clamp(-1.0, 1.0).asin() * EARTH_RADIUS_M
    }

    /// Signed distance in meters from `from` to the foot of the perpendicular
    /// dropped onto the great circle through `from` and `to`. Negative when
    /// the foot lies behind `from`.
    pub fn along_track_distance(&self, from: &Position, to: &Position) -> f64 {
        let Some(normal) = track_normal(from, to) else {
            return 0.0;
        };
        let p = self.n_vector();
        let foot = p - normal * normal.dot(&p);
        if foot.norm() < 1e-12 {
            return 0.0;
        }
        let start = from.n_vector();
        let angle = start.cross(&foot).dot(&normal).atan2(start.dot(&foot));
        angle * EARTH_RADIUS_M
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.latitude, self.longitude)
    }
}

/// Unit normal of the great circle through two points, `None` when the
/// points coincide or are antipodal
fn track_normal(from: &Position, to: &Position) -> Option<Vector3<f64>> {
    let normal = from.n_vector().cross(&to.n_vector());
    let norm = normal.norm();
    if norm < 1e-12 {
        None
    } else {
        Some(normal / norm)
    }
}

/// Longitude difference in radians, taking the short way round
fn delta_longitude(from: &Position, to: &Position) -> f64 {
    let mut dlambda = (to.longitude - from.longitude).to_radians();
    if dlambda > PI {
        dlambda -= 2.0 * PI;
    } else if dlambda < -PI {
        dlambda += 2.0 * PI;
    }
    dlambda
}

/// Difference in Mercator projected latitude
fn projected_latitude_difference(phi1: f64, phi2: f64) -> f64 {
    ((phi2 / 2.0 + FRAC_PI_4).tan() / (phi1 / 2.0 + FRAC_PI_4).tan()).ln()
}

/// Ratio between true and projected latitude difference; falls back to
/// cos(lat) on east-west courses where the ratio is 0/0
fn stretch_ratio(phi1: f64, phi2: f64) -> f64 {
    let dpsi = projected_latitude_difference(phi1, phi2);
    if dpsi.abs() > 1e-12 {
        (phi2 - phi1) / dpsi
    } else {
        phi1.cos()
    }
}

/// Normalize bearing to 0-360 range
pub fn normalize_bearing(bearing: f64) -> f64 {
    let mut b = bearing % 360.0;
    if b < 0.0 {
        b += 360.0;
    }
    b
}

/// Normalize longitude to -180..180
fn normalize_longitude(lon: f64) -> f64 {
    let mut l = (lon + 180.0) % 360.0;
    if l < 0.0 {
        l += 360.0;
    }
    l - 180.0
}

/// Signed smallest angle from `from` to `to` in degrees, in (-180, 180]
pub fn angle_difference(from: f64, to: f64) -> f64 {
    let d = normalize_bearing(to - from);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}
