//! Clock abstraction for deterministic timestamps.
//!
//! Purchase records are stamped with the processing time and webhook
//! signatures are checked against a tolerance window; both read the time
//! through `Clock` so tests can pin it.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current system time.
    fn now_system(&self) -> SystemTime;

    /// Returns the current time as a UTC datetime.
    fn now_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.now_system())
    }

    /// Returns whole seconds since the Unix epoch.
    fn unix_seconds(&self) -> i64 {
        let secs = self.now_system().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        i64::try_from(secs).unwrap_or(i64::MAX)
    }
}

/// Real clock backed by `SystemTime::now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test clock for deterministic time control.
///
/// Clones share the same underlying time, so a clock handed to a router can
/// still be advanced from the test body.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// System time as nanoseconds since UNIX_EPOCH
    system_ns: Arc<AtomicU64>,
}

impl TestClock {
    /// Creates a new test clock starting at the current time.
    pub fn new() -> Self {
        Self::with_start_time(SystemTime::now())
    }

    /// Creates a test clock starting at a specific time.
    pub fn with_start_time(start: SystemTime) -> Self {
        Self { system_ns: Arc::new(AtomicU64::new(to_nanos(start))) }
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.system_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }

    /// Jumps the clock to a specific system time, forwards or backwards.
    pub fn jump_to(&self, time: SystemTime) {
        self.system_ns.store(to_nanos(time), Ordering::Release);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.system_ns.load(Ordering::Acquire))
    }
}

fn to_nanos(time: SystemTime) -> u64 {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = TestClock::with_start_time(start);

        clock.advance(Duration::from_secs(60));

        assert_eq!(clock.now_system(), start + Duration::from_secs(60));
        assert_eq!(clock.unix_seconds(), 1_060);
    }

    #[test]
    fn test_clock_jump_backwards() {
        let clock = TestClock::with_start_time(UNIX_EPOCH + Duration::from_secs(5_000));
        let target = UNIX_EPOCH + Duration::from_secs(2_000);

        clock.jump_to(target);
        assert_eq!(clock.now_system(), target);
    }

    #[test]
    fn clones_share_time() {
        let clock = TestClock::with_start_time(UNIX_EPOCH);
        let shared = clock.clone();

        clock.advance(Duration::from_secs(30));
        assert_eq!(shared.unix_seconds(), 30);
    }

    #[test]
    fn now_utc_matches_system_time() {
        let clock = TestClock::with_start_time(UNIX_EPOCH + Duration::from_secs(86_400));
        assert_eq!(clock.now_utc().to_rfc3339(), "1970-01-02T00:00:00+00:00");
    }
}
