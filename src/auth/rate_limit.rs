//! Sliding-window request counters
//!
//! Three fixed windows (minute, hour, day) per API key, each tracked as
//! a count tagged with its window index. Rolling into a new window
//! resets the count, so no timer task or timestamp queue is needed.
//! Checking and committing are separate steps: a request that fails a
//! later stage of authentication must not consume quota.

use crate::types::RateLimitConfig;
use chrono::{DateTime, Utc};

/// Which window refused a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Minute,
    Hour,
    Day,
}

impl std::fmt::Display for LimitWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitWindow::Minute => write!(f, "minute"),
            LimitWindow::Hour => write!(f, "hour"),
            LimitWindow::Day => write!(f, "day"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowCounter {
    count: u32,
    window_index: i64,
}

impl WindowCounter {
    fn roll(&mut self, index: i64) {
        if index != self.window_index {
            self.window_index = index;
            self.count = 0;
        }
    }
}

/// Usage counters for one API key
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyUsage {
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
}

impl KeyUsage {
    /// Roll windows forward to `at` and test every ceiling
    ///
    /// Does not consume quota; follow with [`KeyUsage::commit`] once the
    /// whole request is known good.
    pub fn check(&mut self, at: DateTime<Utc>, limits: &RateLimitConfig) -> Result<(), LimitWindow> {
        let ts = at.timestamp();
        self.minute.roll(ts.div_euclid(60));
        self.hour.roll(ts.div_euclid(3_600));
        self.day.roll(ts.div_euclid(86_400));

        if self.minute.count >= limits.per_minute {
            return Err(LimitWindow::Minute);
        }
        if self.hour.count >= limits.per_hour {
            return Err(LimitWindow::Hour);
        }
        if self.day.count >= limits.per_day {
            return Err(LimitWindow::Day);
        }
        Ok(())
    }

    /// Consume one slot in every window
    pub fn commit(&mut self) {
        self.minute.count += 1;
        self.hour.count += 1;
        self.day.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn limits(per_minute: u32, per_hour: u32, per_day: u32) -> RateLimitConfig {
        RateLimitConfig {
            per_minute,
            per_hour,
            per_day,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap()
    }

    #[test]
    fn test_minute_window_refills() {
        let mut usage = KeyUsage::default();
        let limits = limits(2, 100, 1_000);

        for _ in 0..2 {
            usage.check(t0(), &limits).unwrap();
            usage.commit();
        }
        assert_eq!(usage.check(t0(), &limits), Err(LimitWindow::Minute));

        // The next minute opens a fresh window
        let later = t0() + Duration::seconds(30);
        assert_eq!(usage.check(later, &limits), Ok(()));
    }

    #[test]
    fn test_hour_ceiling_outlasts_minute_refills() {
        let mut usage = KeyUsage::default();
        let limits = limits(10, 3, 1_000);

        let mut at = t0();
        for _ in 0..3 {
            usage.check(at, &limits).unwrap();
            usage.commit();
            at += Duration::minutes(1);
        }
        assert_eq!(usage.check(at, &limits), Err(LimitWindow::Hour));

        assert_eq!(usage.check(at + Duration::hours(1), &limits), Ok(()));
    }

    #[test]
    fn test_day_ceiling_reported_by_name() {
        let mut usage = KeyUsage::default();
        let limits = limits(100, 100, 2);

        let mut at = t0();
        for _ in 0..2 {
            usage.check(at, &limits).unwrap();
            usage.commit();
            at += Duration::hours(2);
        }
        let refused = usage.check(at, &limits).unwrap_err();
        assert_eq!(refused, LimitWindow::Day);
        assert_eq!(refused.to_string(), "day");
    }

    #[test]
    fn test_check_without_commit_consumes_nothing() {
        let mut usage = KeyUsage::default();
        let limits = limits(1, 1, 1);

        for _ in 0..5 {
            usage.check(t0(), &limits).unwrap();
        }
        usage.commit();
        assert!(usage.check(t0(), &limits).is_err());
    }
}
