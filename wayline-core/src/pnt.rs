//! Position, navigation and time (PNT) fixes from a positioning sensor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Position;

/// Fix quality reported by the sensor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FixQuality {
    /// No position available
    #[default]
    NoFix,
    /// Position available but flagged unreliable
    Bad,
    Good,
}

/// A single PNT fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PntFix {
    /// Time of the fix
    pub time: DateTime<Utc>,
    pub position: Option<Position>,
    /// Speed over ground in knots
    pub sog: Option<f64>,
    /// Course over ground in degrees (0-360, true north)
    pub cog: Option<f64>,
    #[serde(default)]
    pub quality: FixQuality,
}

impl PntFix {
    /// Good-quality fix with position, speed and course
    pub fn new(time: DateTime<Utc>, position: Position, sog: f64, cog: f64) -> Self {
        PntFix {
            time,
            position: Some(position),
            sog: Some(sog),
            cog: Some(cog),
            quality: FixQuality::Good,
        }
    }

    /// Position fix usable for navigation
    pub fn is_valid(&self) -> bool {
        self.quality == FixQuality::Good && self.position.is_some()
    }

    /// Valid position together with a speed over ground
    pub fn has_motion(&self) -> bool {
        self.is_valid() && self.sog.is_some_and(|s| s.is_finite() && s >= 0.0)
    }
}

/// Producer of PNT fixes (sensor driver, recorded log, simulator)
pub trait PntSource {
    /// Next fix, or `None` once the source is exhausted
    fn next_fix(&mut self) -> Option<PntFix>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fix_validity() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let p = Position::new(55.0, 12.0).unwrap();

        let mut fix = PntFix::new(t, p, 10.0, 90.0);
        assert!(fix.is_valid());
        assert!(fix.has_motion());

        fix.sog = None;
        assert!(fix.is_valid());
        assert!(!fix.has_motion());

        fix.quality = FixQuality::Bad;
        assert!(!fix.is_valid());

        fix.quality = FixQuality::Good;
        fix.position = None;
        assert!(!fix.is_valid());
    }
}
