//! EMG-Session: phase-segmented EMG test sessions
//!
//! This library turns a continuous single-channel EMG stream into
//! structured test sessions. It features:
//!
//! - Device transports for a BLE sensor board and a deterministic simulator
//! - A phase controller that cuts the stream into timed protocol phases
//! - Time-domain metrics (RMS, MAV, SNR, zero crossings, ...) per phase
//! - Immutable session records with JSON persistence, import and export
//! - Offline conditioning (band-pass, notch, envelope) for stored recordings
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use emg_session::acquisition::IngestBuffer;
//! use emg_session::hal::{SimulatedTransport, SimulatorConfig};
//! use emg_session::protocol::{PhaseController, ProtocolDefinition, ProtocolRunner, RunOutcome};
//! use emg_session::session::{SessionAssembler, SessionMetadata};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let buffer = Arc::new(IngestBuffer::new());
//!     let controller = PhaseController::new(buffer);
//!     let transport = SimulatedTransport::new(SimulatorConfig::default())?;
//!     let mut runner = ProtocolRunner::new(controller, transport, SessionAssembler::new());
//!
//!     let protocol = ProtocolDefinition::basic_acquisition();
//!     let metadata = SessionMetadata::new("SUB001", "Biceps", "Ag/AgCl");
//!
//!     if let RunOutcome::Completed(session) = runner.run(&protocol, metadata).await? {
//!         for phase in session.phases() {
//!             println!("{}: {:?}", phase.id(), phase.metrics());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod acquisition;
pub mod config;
pub mod error;
pub mod hal;
pub mod processing;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod utils;

/// One EMG amplitude reading, in millivolts
pub type Sample = f64;

// Re-export commonly used types for convenience
pub use error::{EmgError, EmgResult};

pub use processing::{compute_metrics, EmgMetrics, MetricKind};

pub use protocol::{
    PhaseController, PhaseDefinition, PhaseState, ProtocolDefinition, ProtocolRunner, RunOutcome,
};

pub use session::{Session, SessionAssembler, SessionLibrary, SessionMetadata};

pub use storage::{JsonFileStore, SessionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn version_info() -> VersionInfo {
    let mut transports = vec!["ble".to_string()];
    if cfg!(feature = "simulation") {
        transports.push("simulator".to_string());
    }

    VersionInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: "EMG test-session core".to_string(),
        transports,
    }
}

/// Library version information
#[derive(Debug, Clone)]
pub struct VersionInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Device transports compiled in
    pub transports: Vec<String>,
}
