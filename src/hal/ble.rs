// src/hal/ble.rs
//! BLE notification transport
//!
//! Pairing and GATT plumbing live behind [`NotificationLink`]; this module
//! only knows the command/notification protocol of the sensor board:
//! write ASCII `start` to the command characteristic, then decode every
//! notification as little-endian `i16` samples in thousandths of a
//! millivolt.

use super::{DeviceTransport, FaultSlot, TransportInfo, TransportKind};
use crate::acquisition::IngestBuffer;
use crate::config::constants::signal::{
    BLE_BYTES_PER_SAMPLE, BLE_SAMPLE_SCALE, DEFAULT_SAMPLING_RATE_HZ,
};
use crate::error::TransportError;
use crate::Sample;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const EMG_SERVICE_UUID: &str = "df1a0863-f02f-49ba-bf55-3b56c6bcb398";
pub const EMG_CHARACTERISTIC_UUID: &str = "8c24159c-66a0-4340-8b55-465047ce37ce";
/// Commands go to the data characteristic on the reference board
pub const EMG_COMMAND_CHARACTERISTIC_UUID: &str = EMG_CHARACTERISTIC_UUID;

pub const START_COMMAND: &[u8] = b"start";

/// Decode one notification payload. A trailing odd byte is ignored.
pub fn decode_notification(payload: &[u8]) -> Vec<Sample> {
    payload
        .chunks_exact(BLE_BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f64 / BLE_SAMPLE_SCALE)
        .collect()
}

/// GATT-level operations the transport needs from a BLE stack
#[async_trait]
pub trait NotificationLink: Send {
    fn is_connected(&self) -> bool;

    /// Write raw bytes to the command characteristic
    async fn write_command(&mut self, command: &[u8]) -> Result<(), TransportError>;

    /// Enable notifications. The receiver closes when the link drops.
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, TransportError>;

    async fn unsubscribe(&mut self) -> Result<(), TransportError>;
}

/// [`DeviceTransport`] over a [`NotificationLink`]
pub struct BleTransport<L: NotificationLink> {
    link: L,
    sampling_rate_hz: u32,
    task: Option<JoinHandle<()>>,
    streaming: Arc<AtomicBool>,
    faults: FaultSlot,
}

impl<L: NotificationLink> BleTransport<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            task: None,
            streaming: Arc::new(AtomicBool::new(false)),
            faults: FaultSlot::new(),
        }
    }

    /// Nominal rate the board streams at
    pub fn with_sampling_rate(mut self, sampling_rate_hz: u32) -> Self {
        self.sampling_rate_hz = sampling_rate_hz;
        self
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn is_streaming(&self) -> bool {
        self.task.is_some()
    }
}

#[async_trait]
impl<L: NotificationLink> DeviceTransport for BleTransport<L> {
    async fn start_streaming(&mut self, sink: Arc<IngestBuffer>) -> Result<(), TransportError> {
        if !self.link.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.task.is_some() {
            return Err(TransportError::CommandRejected(
                "notifications already active".to_string(),
            ));
        }

        self.link.write_command(START_COMMAND).await?;
        let mut notifications = self.link.subscribe().await?;

        let streaming = Arc::new(AtomicBool::new(true));
        self.streaming = Arc::clone(&streaming);
        let faults = self.faults.clone();

        self.task = Some(tokio::spawn(async move {
            while let Some(payload) = notifications.recv().await {
                sink.push(&decode_notification(&payload));
            }
            if streaming.load(Ordering::SeqCst) {
                warn!("BLE notification stream closed while streaming");
                faults.raise(TransportError::StreamClosed);
            }
        }));

        info!("BLE streaming started");
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<(), TransportError> {
        self.streaming.store(false, Ordering::SeqCst);
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.abort();
        debug!("BLE notifications stopping");
        // The board has no stop command; unsubscribing is enough
        self.link.unsubscribe().await
    }

    fn take_fault(&mut self) -> Option<TransportError> {
        self.faults.take()
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: format!("BLE {}", EMG_SERVICE_UUID),
            kind: TransportKind::Ble,
            sampling_rate_hz: self.sampling_rate_hz,
        }
    }
}

impl<L: NotificationLink> Drop for BleTransport<L> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct ChannelLink {
        connected: bool,
        commands: Vec<Vec<u8>>,
        feed: Option<mpsc::Sender<Vec<u8>>>,
        unsubscribed: usize,
    }

    #[async_trait]
    impl NotificationLink for ChannelLink {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn write_command(&mut self, command: &[u8]) -> Result<(), TransportError> {
            self.commands.push(command.to_vec());
            Ok(())
        }

        async fn subscribe(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, TransportError> {
            let (tx, rx) = mpsc::channel(16);
            self.feed = Some(tx);
            Ok(rx)
        }

        async fn unsubscribe(&mut self) -> Result<(), TransportError> {
            self.feed = None;
            self.unsubscribed += 1;
            Ok(())
        }
    }

    fn connected() -> ChannelLink {
        ChannelLink {
            connected: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_decode_little_endian_millivolts() {
        let payload = [0xE8, 0x03, 0x18, 0xFC, 0x00, 0x00, 0x7F];
        assert_eq!(decode_notification(&payload), vec![1.0, -1.0, 0.0]);
        assert!(decode_notification(&[]).is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_link_is_rejected() {
        let mut transport = BleTransport::new(ChannelLink::default());
        let err = transport
            .start_streaming(Arc::new(IngestBuffer::new()))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::NotConnected);
    }

    #[tokio::test]
    async fn test_notifications_reach_buffer() {
        let mut transport = BleTransport::new(connected());
        let buffer = Arc::new(IngestBuffer::new());

        transport.start_streaming(buffer.clone()).await.unwrap();
        assert_eq!(transport.link().commands, vec![b"start".to_vec()]);

        let feed = transport.link().feed.clone().unwrap();
        feed.send(vec![0xE8, 0x03, 0xD0, 0x07]).await.unwrap();

        for _ in 0..100 {
            if buffer.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(buffer.drain_all(), vec![1.0, 2.0]);

        drop(feed);
        transport.stop_streaming().await.unwrap();
        assert_eq!(transport.link().unsubscribed, 1);
        assert!(transport.take_fault().is_none());
    }

    #[tokio::test]
    async fn test_closed_stream_raises_fault() {
        let mut transport = BleTransport::new(connected());
        transport
            .start_streaming(Arc::new(IngestBuffer::new()))
            .await
            .unwrap();

        // Dropping the sender ends the notification stream
        transport.link.feed = None;

        let mut fault = None;
        for _ in 0..100 {
            fault = transport.take_fault();
            if fault.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(fault, Some(TransportError::StreamClosed));
    }
}
