use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime};

/// Source of wall-clock time and the single place the pipeline suspends.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the local timezone and `tokio` timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Deterministic clock: sleeping advances time instantly and is recorded.
///
/// Used for offline runs, where records must be reproducible, and for tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Start at a fixed epoch second.
    pub fn at_timestamp(secs: i64) -> Self {
        let start = DateTime::from_timestamp(secs, 0).unwrap_or_default();
        Self::new(start.with_timezone(&Local))
    }

    /// Every duration passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps
            .lock()
            .map(|sleeps| sleeps.clone())
            .unwrap_or_default()
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut now) = self.now.lock() {
            if let Ok(step) = chrono::Duration::from_std(duration) {
                *now += step;
            }
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
    }
}

/// Time remaining until the next occurrence of `target_hour:00` local time.
///
/// At or after today's boundary the wait runs to tomorrow's boundary.
pub fn duration_until(now: NaiveDateTime, target_hour: u32) -> Duration {
    let Some(today) = now.date().and_hms_opt(target_hour % 24, 0, 0) else {
        return Duration::ZERO;
    };
    let target = if now >= today {
        today + chrono::Duration::days(1)
    } else {
        today
    };
    (target - now).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    #[test]
    fn waits_until_later_today_before_boundary() {
        assert_eq!(
            duration_until(at(1, 30, 0), 4),
            Duration::from_secs(2 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn waits_until_tomorrow_after_boundary() {
        assert_eq!(
            duration_until(at(22, 0, 0), 4),
            Duration::from_secs(6 * 3600)
        );
    }

    #[test]
    fn exact_boundary_waits_a_full_day() {
        assert_eq!(
            duration_until(at(4, 0, 0), 4),
            Duration::from_secs(24 * 3600)
        );
    }

    #[test]
    fn manual_clock_records_and_advances() {
        let clock = ManualClock::at_timestamp(1_700_000_000);
        let before = clock.now();
        futures::executor::block_on(clock.sleep(Duration::from_secs(90)));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(90)]);
        assert_eq!((clock.now() - before).num_seconds(), 90);
    }
}
