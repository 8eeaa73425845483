// src/config/mod.rs
//! Configuration management

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::ConfigLoader;

use crate::acquisition::IngestBuffer;
use crate::processing::FeatureConfig;
use crate::protocol::PhaseController;
use crate::storage::JsonFileStore;
use crate::utils::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "simulation")]
use crate::hal::simulator::SimulatorConfig;

/// Complete system configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct SystemConfig {
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub storage: StorageSettings,
    #[cfg(feature = "simulation")]
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub logging: LogConfig,
}

/// Stream and polling settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionSettings {
    #[serde(default = "defaults::sampling_rate_hz")]
    pub sampling_rate_hz: u32,

    /// How often the controller drains the ingest buffer
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Where finalized sessions are written
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "defaults::sessions_path")]
    pub sessions_path: PathBuf,

    #[serde(default = "defaults::pretty")]
    pub pretty: bool,
}

/// Default value providers using constants
mod defaults {
    use crate::config::constants::*;
    use std::path::PathBuf;

    pub fn sampling_rate_hz() -> u32 { signal::DEFAULT_SAMPLING_RATE_HZ }
    pub fn poll_interval_ms() -> u64 { protocol::DEFAULT_POLL_INTERVAL_MS }

    pub fn sessions_path() -> PathBuf { PathBuf::from(storage::DEFAULT_SESSIONS_FILE) }
    pub fn pretty() -> bool { true }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            sampling_rate_hz: defaults::sampling_rate_hz(),
            poll_interval_ms: defaults::poll_interval_ms(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            sessions_path: defaults::sessions_path(),
            pretty: defaults::pretty(),
        }
    }
}

impl SystemConfig {
    /// Validate configuration consistency
    pub fn validate_consistency(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let rate = self.acquisition.sampling_rate_hz;

        if !(signal::MIN_SAMPLING_RATE_HZ..=signal::MAX_SAMPLING_RATE_HZ).contains(&rate) {
            errors.push(format!(
                "Sampling rate ({} Hz) must be within [{}, {}] Hz",
                rate,
                signal::MIN_SAMPLING_RATE_HZ,
                signal::MAX_SAMPLING_RATE_HZ
            ));
        }

        let poll = self.acquisition.poll_interval_ms;
        if !(protocol::MIN_POLL_INTERVAL_MS..=protocol::MAX_POLL_INTERVAL_MS).contains(&poll) {
            errors.push(format!(
                "Poll interval ({} ms) must be within [{}, {}] ms",
                poll,
                protocol::MIN_POLL_INTERVAL_MS,
                protocol::MAX_POLL_INTERVAL_MS
            ));
        } else if rate > 0 && (poll as f64) < crate::utils::time::sample_period_millis(rate) {
            errors.push(format!(
                "Poll interval ({} ms) is shorter than one sample period at {} Hz",
                poll, rate
            ));
        }

        let ratio = self.features.willison_threshold_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            errors.push(format!(
                "Willison threshold ratio ({}) must be within (0, 1)",
                ratio
            ));
        }

        if self.storage.sessions_path.as_os_str().is_empty() {
            errors.push("Sessions path must not be empty".to_string());
        }

        #[cfg(feature = "simulation")]
        if let Err(e) = self.simulator.validate() {
            errors.push(format!("Simulator: {}", e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.acquisition.poll_interval_ms)
    }

    /// Controller wired with the configured poll interval and feature tunables
    pub fn phase_controller(&self, buffer: Arc<IngestBuffer>) -> PhaseController {
        PhaseController::new(buffer)
            .with_poll_interval(self.poll_interval())
            .with_feature_config(self.features)
    }

    pub fn session_store(&self) -> JsonFileStore {
        JsonFileStore::new(&self.storage.sessions_path).with_pretty(self.storage.pretty)
    }

    /// Get configuration summary
    pub fn get_summary(&self) -> ConfigSummary {
        ConfigSummary {
            sampling_rate_hz: self.acquisition.sampling_rate_hz,
            poll_interval_ms: self.acquisition.poll_interval_ms,
            sessions_path: self.storage.sessions_path.display().to_string(),
            simulated: cfg!(feature = "simulation"),
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub sampling_rate_hz: u32,
    pub poll_interval_ms: u64,
    pub sessions_path: String,
    pub simulated: bool,
}
