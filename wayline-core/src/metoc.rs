//! METOC (meteorological and oceanographic) forecasts attached to a route
//!
//! A forecast is requested for one particular voyage plan. Once the start
//! time or the final ETA of the route drifts away from the plan it was
//! requested for, the forecast no longer describes the voyage.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// Forecast at one point along the route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetocPoint {
    pub time: DateTime<Utc>,
    pub position: Position,
    /// Wind speed in m/s
    #[serde(default)]
    pub wind_speed: Option<f64>,
    /// Direction the wind blows from, degrees true
    #[serde(default)]
    pub wind_direction: Option<f64>,
    /// Current speed in knots
    #[serde(default)]
    pub current_speed: Option<f64>,
    /// Direction the current sets towards, degrees true
    #[serde(default)]
    pub current_direction: Option<f64>,
    /// Significant wave height in meters
    #[serde(default)]
    pub wave_height: Option<f64>,
    #[serde(default)]
    pub wave_direction: Option<f64>,
}

/// Forecast for a whole route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetocForecast {
    pub created: DateTime<Utc>,
    pub points: Vec<MetocPoint>,
}

impl MetocForecast {
    pub fn new(created: DateTime<Utc>, points: Vec<MetocPoint>) -> Self {
        MetocForecast { created, points }
    }

    /// Forecast point closest in time to `time`
    pub fn nearest(&self, time: DateTime<Utc>) -> Option<&MetocPoint> {
        self.points
            .iter()
            .min_by_key(|p| (p.time - time).num_milliseconds().unsigned_abs())
    }
}

/// A forecast plus the voyage plan it was made for
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MetocAttachment {
    pub forecast: MetocForecast,
    pub start_time: DateTime<Utc>,
    pub final_eta: DateTime<Utc>,
}

impl MetocAttachment {
    /// Still valid for a plan starting at `start_time` and ending at `final_eta`
    pub fn is_valid_for(
        &self,
        start_time: DateTime<Utc>,
        final_eta: DateTime<Utc>,
        tolerance: TimeDelta,
    ) -> bool {
        (start_time - self.start_time).abs() <= tolerance
            && (final_eta - self.final_eta).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn point(time: DateTime<Utc>) -> MetocPoint {
        MetocPoint {
            time,
            position: Position::new(55.0, 12.0).unwrap(),
            wind_speed: Some(8.0),
            wind_direction: Some(270.0),
            current_speed: None,
            current_direction: None,
            wave_height: Some(1.2),
            wave_direction: Some(260.0),
        }
    }

    #[test]
    fn test_nearest_point() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let forecast = MetocForecast::new(
            t0,
            vec![point(t0), point(t0 + TimeDelta::hours(1)), point(t0 + TimeDelta::hours(2))],
        );
        let nearest = forecast.nearest(t0 + TimeDelta::minutes(70)).unwrap();
        assert_eq!(nearest.time, t0 + TimeDelta::hours(1));
        assert!(MetocForecast::new(t0, vec![]).nearest(t0).is_none());
    }

    #[test]
    fn test_attachment_validity() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let attachment = MetocAttachment {
            forecast: MetocForecast::new(t0, vec![]),
            start_time: t0,
            final_eta: t0 + TimeDelta::hours(6),
        };
        let tolerance = TimeDelta::minutes(15);

        assert!(attachment.is_valid_for(t0, t0 + TimeDelta::hours(6), tolerance));
        assert!(attachment.is_valid_for(
            t0 + TimeDelta::minutes(10),
            t0 + TimeDelta::hours(6) - TimeDelta::minutes(15),
            tolerance
        ));
        assert!(!attachment.is_valid_for(
            t0 + TimeDelta::minutes(16),
            t0 + TimeDelta::hours(6),
            tolerance
        ));
        assert!(!attachment.is_valid_for(t0, t0 + TimeDelta::hours(7), tolerance));
    }
}
