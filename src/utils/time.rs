// src/utils/time.rs
//! Clocks used by the phase controller
//!
//! Elapsed phase time comes from a [`TimeProvider`] so tests can drive it
//! deterministically. Wall-clock markers on phases and sessions use
//! `chrono::Utc` directly.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic millisecond clock
pub trait TimeProvider: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock backed by `tokio::time::Instant`.
///
/// Follows the runtime clock, so a paused test runtime advances it too.
pub struct MonotonicTimeProvider {
    origin: tokio::time::Instant,
}

impl MonotonicTimeProvider {
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeProvider for MonotonicTimeProvider {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Mock time provider for deterministic testing
pub struct MockTimeProvider {
    current_time: AtomicU64,
}

impl MockTimeProvider {
    pub fn new(initial_time_millis: u64) -> Self {
        Self {
            current_time: AtomicU64::new(initial_time_millis),
        }
    }

    pub fn advance_by(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::Relaxed);
    }

    pub fn set_time(&self, millis: u64) {
        self.current_time.store(millis, Ordering::Relaxed);
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_millis(&self) -> u64 {
        self.current_time.load(Ordering::Relaxed)
    }
}

/// Duration of one sample period in milliseconds
pub fn sample_period_millis(sampling_rate_hz: u32) -> f64 {
    if sampling_rate_hz == 0 {
        return 0.0;
    }
    1000.0 / sampling_rate_hz as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_time_provider() {
        let clock = MockTimeProvider::new(1000);
        assert_eq!(clock.now_millis(), 1000);

        clock.advance_by(250);
        assert_eq!(clock.now_millis(), 1250);

        clock.set_time(10);
        assert_eq!(clock.now_millis(), 10);
    }

    #[test]
    fn test_monotonic_provider_never_goes_back() {
        let clock = MonotonicTimeProvider::new();
        let first = clock.now_millis();
        let second = clock.now_millis();
        assert!(second >= first);
    }

    #[test]
    fn test_sample_period() {
        assert_eq!(sample_period_millis(1000), 1.0);
        assert_eq!(sample_period_millis(2000), 0.5);
        assert_eq!(sample_period_millis(0), 0.0);
    }
}
