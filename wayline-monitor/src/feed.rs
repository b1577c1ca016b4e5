//! Sensor feed: recorded PNT fixes replayed on their own thread
//!
//! Fixes are read line by line (one JSON object per line) and handed to the
//! monitor loop over a bounded channel. The [`ReplayClock`] follows the fix
//! timestamps so a replay runs on the recorded timeline, not the wall clock.

use chrono::{DateTime, Utc};
use crossbeam::channel::{bounded, Receiver};
use log::{debug, info, warn};
use std::io::{self, BufRead};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use wayline_core::{Clock, PntFix, PntSource};

/// Reads fixes from JSON lines, skipping blank and malformed lines
pub struct FixReader<R> {
    reader: R,
    line_number: usize,
}

impl<R: BufRead> FixReader<R> {
    pub fn new(reader: R) -> Self {
        FixReader {
            reader,
            line_number: 0,
        }
    }
}

impl<R: BufRead> PntSource for FixReader<R> {
    fn next_fix(&mut self) -> Option<PntFix> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!("Failed to read fix line {}: {}", self.line_number + 1, e);
                    return None;
                }
            }
            self.line_number += 1;

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_str(text) {
                Ok(fix) => return Some(fix),
                Err(e) => warn!("Skipping malformed fix on line {}: {}", self.line_number, e),
            }
        }
    }
}

/// Start a thread draining `source` into a bounded channel of `capacity`
/// fixes. The thread stops when the source is exhausted or the receiver is
/// dropped, and returns the number of fixes sent.
pub fn spawn_feed<S>(
    mut source: S,
    capacity: usize,
) -> io::Result<(Receiver<PntFix>, JoinHandle<usize>)>
where
    S: PntSource + Send + 'static,
{
    let (tx, rx) = bounded(capacity);
    let handle = thread::Builder::new()
        .name("pnt-feed".to_string())
        .spawn(move || {
            info!("PNT feed started");
            let mut sent = 0;
            while let Some(fix) = source.next_fix() {
                if tx.send(fix).is_err() {
                    debug!("PNT feed receiver gone");
                    break;
                }
                sent += 1;
            }
            info!("PNT feed stopped after {} fixes", sent);
            sent
        })?;
    Ok((rx, handle))
}

/// Clock driven by the timestamps of replayed fixes. It never runs
/// backwards: an out-of-order fix leaves the time unchanged.
#[derive(Debug)]
pub struct ReplayClock {
    now: Mutex<DateTime<Utc>>,
}

impl ReplayClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        ReplayClock {
            now: Mutex::new(start),
        }
    }

    pub fn observe(&self, fix: &PntFix) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if fix.time > *now {
            *now = fix.time;
        }
    }
}

impl Clock for ReplayClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use std::io::Cursor;
    use wayline_core::{FixQuality, Position};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn line(fix: &PntFix) -> String {
        serde_json::to_string(fix).unwrap()
    }

    #[test]
    fn test_reader_skips_bad_lines() {
        let p = Position::new(55.0, 12.0).unwrap();
        let a = PntFix::new(t0(), p, 10.0, 0.0);
        let b = PntFix::new(t0() + TimeDelta::seconds(1), p, 10.5, 1.0);
        let off_chart = line(&a).replace("55.0", "95.0");
        let text = format!("{}\n\nnot json\n{}\n{}\n", line(&a), off_chart, line(&b));

        let mut reader = FixReader::new(Cursor::new(text));
        assert_eq!(reader.next_fix(), Some(a));
        assert_eq!(reader.next_fix(), Some(b));
        assert_eq!(reader.next_fix(), None);
    }

    #[test]
    fn test_quality_defaults_to_no_fix() {
        let text = r#"{"time":"2024-05-01T12:00:00Z","position":{"latitude":55.0,"longitude":12.0},"sog":5.0,"cog":90.0}"#;
        let fix = FixReader::new(Cursor::new(text)).next_fix().unwrap();
        assert_eq!(fix.quality, FixQuality::NoFix);
        assert!(!fix.is_valid());
    }

    #[test]
    fn test_feed_thread_delivers_in_order() {
        let p = Position::new(55.0, 12.0).unwrap();
        let text: String = (0..10)
            .map(|i| line(&PntFix::new(t0() + TimeDelta::seconds(i), p, 8.0, 0.0)) + "\n")
            .collect();

        let (rx, handle) = spawn_feed(FixReader::new(Cursor::new(text)), 2).unwrap();
        let times: Vec<_> = rx.iter().map(|fix| fix.time).collect();
        assert_eq!(times.len(), 10);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(handle.join().unwrap(), 10);
    }

    #[test]
    fn test_replay_clock_is_monotonic() {
        let p = Position::new(55.0, 12.0).unwrap();
        let clock = ReplayClock::new(t0());
        clock.observe(&PntFix::new(t0() + TimeDelta::minutes(5), p, 8.0, 0.0));
        assert_eq!(clock.now(), t0() + TimeDelta::minutes(5));
        clock.observe(&PntFix::new(t0() + TimeDelta::minutes(1), p, 8.0, 0.0));
        assert_eq!(clock.now(), t0() + TimeDelta::minutes(5));
    }
}
