// src/hal/mod.rs
//! Device transports feeding the ingest buffer
//!
//! A transport owns the link to an acquisition device (or a simulation of
//! one). While streaming it pushes decoded samples into the shared
//! [`IngestBuffer`]; the phase controller drains that buffer on its own
//! schedule.

pub mod ble;
#[cfg(feature = "simulation")]
pub mod simulator;

use crate::acquisition::IngestBuffer;
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use ble::{BleTransport, NotificationLink};
#[cfg(feature = "simulation")]
pub use simulator::{ActivationPattern, SimulatedTransport, SimulatorConfig};

/// Static description of a transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportInfo {
    pub name: String,
    pub kind: TransportKind,
    pub sampling_rate_hz: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Simulated,
    Ble,
}

/// Slot where background tasks park the first fault they hit.
///
/// Cloned into each streaming task; the transport hands it out through
/// [`DeviceTransport::take_fault`].
#[derive(Debug, Clone, Default)]
pub struct FaultSlot {
    inner: Arc<Mutex<Option<TransportError>>>,
}

impl FaultSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fault. An earlier, untaken fault wins.
    pub fn raise(&self, fault: TransportError) {
        let mut slot = self.inner.lock();
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    pub fn take(&self) -> Option<TransportError> {
        self.inner.lock().take()
    }

    pub fn is_raised(&self) -> bool {
        self.inner.lock().is_some()
    }
}

/// Source of samples for the phase controller
#[async_trait]
pub trait DeviceTransport: Send {
    /// Begin pushing samples into `sink` until [`stop_streaming`](Self::stop_streaming)
    async fn start_streaming(&mut self, sink: Arc<IngestBuffer>) -> Result<(), TransportError>;

    /// Stop pushing samples. Stopping an idle transport is not an error.
    async fn stop_streaming(&mut self) -> Result<(), TransportError>;

    /// Fault raised by a background task since the last call, if any
    fn take_fault(&mut self) -> Option<TransportError> {
        None
    }

    fn info(&self) -> TransportInfo;
}

#[async_trait]
impl<T: DeviceTransport + ?Sized> DeviceTransport for Box<T> {
    async fn start_streaming(&mut self, sink: Arc<IngestBuffer>) -> Result<(), TransportError> {
        (**self).start_streaming(sink).await
    }

    async fn stop_streaming(&mut self) -> Result<(), TransportError> {
        (**self).stop_streaming().await
    }

    fn take_fault(&mut self) -> Option<TransportError> {
        (**self).take_fault()
    }

    fn info(&self) -> TransportInfo {
        (**self).info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_slot_keeps_first() {
        let slot = FaultSlot::new();
        let clone = slot.clone();
        clone.raise(TransportError::StreamClosed);
        clone.raise(TransportError::NotConnected);

        assert!(slot.is_raised());
        assert_eq!(slot.take(), Some(TransportError::StreamClosed));
        assert_eq!(slot.take(), None);
    }
}
