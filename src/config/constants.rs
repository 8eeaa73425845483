// src/config/constants.rs
//! System-wide configuration constants

/// Signal acquisition constants
pub mod signal {
    pub const DEFAULT_SAMPLING_RATE_HZ: u32 = 1000;
    pub const MIN_SAMPLING_RATE_HZ: u32 = 100;
    pub const MAX_SAMPLING_RATE_HZ: u32 = 10000;

    /// BLE payloads carry millivolts * 1000 as signed 16-bit integers
    pub const BLE_SAMPLE_SCALE: f64 = 1000.0;
    pub const BLE_BYTES_PER_SAMPLE: usize = 2;
}

/// Phase controller constants
pub mod protocol {
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
    pub const MIN_POLL_INTERVAL_MS: u64 = 1;
    pub const MAX_POLL_INTERVAL_MS: u64 = 1000;

    pub const MIN_PHASE_DURATION_MS: u64 = 1;
    /// One hour
    pub const MAX_PHASE_DURATION_MS: u64 = 3_600_000;

    pub const MAX_PROGRESS_PERCENT: f64 = 100.0;
}

/// Feature extraction constants
pub mod features {
    /// Willison threshold as a fraction of the phase's own peak amplitude
    pub const DEFAULT_WILLISON_THRESHOLD_RATIO: f64 = 0.05;
}

/// Offline conditioning constants
pub mod conditioning {
    pub const DEFAULT_BANDPASS_LOW_HZ: f64 = 20.0;
    pub const DEFAULT_BANDPASS_HIGH_HZ: f64 = 450.0;
    pub const DEFAULT_NOTCH_HZ: f64 = 50.0;
    pub const DEFAULT_NOTCH_Q: f64 = 30.0;
    pub const DEFAULT_WINDOW_SIZE: usize = 100;
    pub const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;
}

/// Session record constants
pub mod session {
    pub const ID_PREFIX: &str = "emg-";
    pub const ID_MIN_DIGITS: usize = 3;
}

/// Simulator constants
pub mod simulator {
    pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 10;
    pub const DEFAULT_SIGNAL_AMPLITUDE: f64 = 0.8;
    pub const DEFAULT_NOISE_LEVEL: f64 = 0.1;
    pub const DEFAULT_BURST_FREQUENCY_HZ: f64 = 50.0;
    pub const MIN_NOISE_LEVEL: f64 = 0.0;
    pub const MAX_NOISE_LEVEL: f64 = 1.0;
    pub const DEFAULT_SEED: u64 = 0x5EED_E3C0;
}

/// Storage constants
pub mod storage {
    pub const DEFAULT_SESSIONS_FILE: &str = "emg_sessions.json";
}

/// File system paths
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/emg-session/config.toml";
    pub const USER_CONFIG_DIR: &str = ".emg-session";
    pub const DEFAULT_CONFIG_FILE: &str = "emg-session.toml";
    pub const LOCAL_CONFIG_FILE: &str = "config/local.toml";
}

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "EMG_";
