//! Common utilities for the EMG session core
//!
//! - Millisecond clocks for phase timing
//! - `tracing` subscriber setup

pub mod logging;
pub mod time;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use time::{sample_period_millis, MockTimeProvider, MonotonicTimeProvider, TimeProvider};
