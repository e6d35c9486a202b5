//! Polling schedule and clock abstraction for the surveillance loop.
//!
//! The loop never sleeps directly: it asks a [`Clock`] for the current time
//! and to wait, so tests can drive it with simulated time, and a stop message
//! interrupts the wait.

use crate::error::ConfigError;
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

/// When the daemon checks the trigger area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed times of day, sorted ascending
    TimesOfDay(Vec<NaiveTime>),
    /// Constant delay between checks
    Interval(Duration),
}

impl Schedule {
    /// Parse `HH:MM` entries into a times-of-day schedule.
    pub fn times_of_day<S: AsRef<str>>(times: &[S]) -> Result<Self, ConfigError> {
        let mut parsed = times
            .iter()
            .map(|t| {
                NaiveTime::parse_from_str(t.as_ref().trim(), "%H:%M").map_err(|e| {
                    ConfigError::Invalid(format!("invalid time of day '{}': {e}", t.as_ref()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if parsed.is_empty() {
            return Err(ConfigError::Invalid("no times of day given".to_string()));
        }
        parsed.sort();
        parsed.dedup();
        Ok(Schedule::TimesOfDay(parsed))
    }

    /// The next moment a check is due, strictly after `now`.
    pub fn next_due(&self, now: NaiveDateTime) -> NaiveDateTime {
        match self {
            Schedule::Interval(interval) => ChronoDuration::from_std(*interval)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(NaiveDateTime::MAX),
            Schedule::TimesOfDay(times) => {
                let today = now.date();
                match times.iter().find(|t| **t > now.time()) {
                    Some(t) => today.and_time(*t),
                    // Not empty by construction
                    None => (today + ChronoDuration::days(1)).and_time(times[0]),
                }
            }
        }
    }

    /// How long to wait from `now` until the next check.
    pub fn delay_until_next(&self, now: NaiveDateTime) -> Duration {
        (self.next_due(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Source of time for the surveillance loop.
pub trait Clock {
    /// Current local wall-clock time
    fn now(&self) -> NaiveDateTime;

    /// Wait for `duration` unless `stop` fires first.
    ///
    /// Returns `true` when the loop should stop.
    fn sleep(&self, duration: Duration, stop: &Receiver<()>) -> bool;
}

/// Real time; the wait is a timed receive on the stop channel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration, stop: &Receiver<()>) -> bool {
        match stop.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => false,
            // A message or all senders dropped
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Simulated clock: sleeping advances time instantly.
    pub(crate) struct ManualClock {
        now: Mutex<NaiveDateTime>,
        pub(crate) sleeps: Mutex<Vec<Duration>>,
        max_sleeps: usize,
    }

    impl ManualClock {
        pub(crate) fn new(now: NaiveDateTime, max_sleeps: usize) -> Self {
            ManualClock {
                now: Mutex::new(now),
                sleeps: Mutex::new(Vec::new()),
                max_sleeps,
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> NaiveDateTime {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration, stop: &Receiver<()>) -> bool {
            if stop.try_recv().is_ok() {
                return true;
            }
            let mut sleeps = self.sleeps.lock().unwrap();
            if sleeps.len() >= self.max_sleeps {
                return true;
            }
            sleeps.push(duration);
            let mut now = self.now.lock().unwrap();
            *now += ChronoDuration::from_std(duration).unwrap();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, 20)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_times_of_day_later_today() {
        let schedule = Schedule::times_of_day(&["18:30", "06:00"]).unwrap();
        assert_eq!(schedule.next_due(at(7, 15)), at(18, 30));
        assert_eq!(
            schedule.delay_until_next(at(7, 15)),
            Duration::from_secs((11 * 60 + 15) * 60)
        );
    }

    #[test]
    fn test_times_of_day_wraps_to_tomorrow() {
        let schedule = Schedule::times_of_day(&["06:00", "18:30"]).unwrap();
        let due = schedule.next_due(at(18, 30));
        assert_eq!(due, at(6, 0) + ChronoDuration::days(1));
    }

    #[test]
    fn test_interval() {
        let schedule = Schedule::Interval(Duration::from_secs(90));
        assert_eq!(schedule.next_due(at(10, 0)), at(10, 1) + ChronoDuration::seconds(30));
    }

    #[test]
    fn test_rejects_empty_and_invalid_times() {
        assert!(Schedule::times_of_day::<&str>(&[]).is_err());
        assert!(Schedule::times_of_day(&["noon"]).is_err());
    }

    #[test]
    fn test_system_clock_stops_on_message() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(()).unwrap();
        assert!(SystemClock.sleep(Duration::from_secs(3600), &rx));
    }

    #[test]
    fn test_system_clock_stops_when_senders_dropped() {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        drop(tx);
        assert!(SystemClock.sleep(Duration::from_secs(3600), &rx));
    }

    #[test]
    fn test_system_clock_times_out() {
        let (_tx, rx) = crossbeam_channel::bounded::<()>(1);
        assert!(!SystemClock.sleep(Duration::from_millis(5), &rx));
    }
}
