// src/hal/simulator.rs
//! Simulated EMG transport
//!
//! Generates a deterministic waveform per stream in a background tokio task
//! and pushes it into the ingest buffer in fixed-size batches. The waveform
//! is driven by a sample clock, not wall time, so a given seed always
//! produces the same samples.

use super::{DeviceTransport, FaultSlot, TransportInfo, TransportKind};
use crate::acquisition::IngestBuffer;
use crate::config::constants::{signal, simulator};
use crate::error::TransportError;
use crate::Sample;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Muscle activation envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivationPattern {
    Constant,
    Sinusoidal { frequency_hz: f64 },
    Burst { burst_duration_ms: u32, rest_duration_ms: u32 },
    Ramp { ramp_duration_ms: u32 },
    Random,
}

/// Simulator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub sampling_rate_hz: u32,
    pub batch_interval_ms: u64,
    pub signal_amplitude: f64,
    /// Uniform noise, as a fraction of the stream amplitude
    pub noise_level: f64,
    pub activation_pattern: ActivationPattern,
    /// Multiply the envelope by a 3-harmonic carrier around this frequency
    pub emg_carrier_hz: Option<f64>,
    pub seed: u64,
    /// Amplitude for the n-th stream. Streams past the end use
    /// `signal_amplitude`.
    pub stream_levels: Vec<f64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sampling_rate_hz: signal::DEFAULT_SAMPLING_RATE_HZ,
            batch_interval_ms: simulator::DEFAULT_BATCH_INTERVAL_MS,
            signal_amplitude: simulator::DEFAULT_SIGNAL_AMPLITUDE,
            noise_level: simulator::DEFAULT_NOISE_LEVEL,
            activation_pattern: ActivationPattern::Burst {
                burst_duration_ms: 500,
                rest_duration_ms: 500,
            },
            emg_carrier_hz: Some(simulator::DEFAULT_BURST_FREQUENCY_HZ),
            seed: simulator::DEFAULT_SEED,
            stream_levels: Vec::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<(), TransportError> {
        if !(signal::MIN_SAMPLING_RATE_HZ..=signal::MAX_SAMPLING_RATE_HZ)
            .contains(&self.sampling_rate_hz)
        {
            return Err(TransportError::Configuration(format!(
                "sampling_rate_hz {} outside [{}, {}]",
                self.sampling_rate_hz,
                signal::MIN_SAMPLING_RATE_HZ,
                signal::MAX_SAMPLING_RATE_HZ
            )));
        }
        if self.batch_interval_ms == 0 {
            return Err(TransportError::Configuration(
                "batch_interval_ms must be positive".to_string(),
            ));
        }
        if !(simulator::MIN_NOISE_LEVEL..=simulator::MAX_NOISE_LEVEL).contains(&self.noise_level) {
            return Err(TransportError::Configuration(format!(
                "noise_level {} outside [{}, {}]",
                self.noise_level,
                simulator::MIN_NOISE_LEVEL,
                simulator::MAX_NOISE_LEVEL
            )));
        }
        if !self.signal_amplitude.is_finite() || self.stream_levels.iter().any(|l| !l.is_finite())
        {
            return Err(TransportError::Configuration(
                "amplitudes must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Samples emitted per batch, at least one
    pub fn samples_per_batch(&self) -> usize {
        ((self.sampling_rate_hz as u64 * self.batch_interval_ms) / 1000).max(1) as usize
    }

    fn amplitude_for_stream(&self, stream: usize) -> f64 {
        self.stream_levels
            .get(stream)
            .copied()
            .unwrap_or(self.signal_amplitude)
    }
}

/// Deterministic sample source for one stream
#[derive(Debug)]
pub struct SignalGenerator {
    pattern: ActivationPattern,
    carrier_hz: Option<f64>,
    sampling_rate_hz: f64,
    amplitude: f64,
    noise_level: f64,
    rng: StdRng,
    sample_index: u64,
}

impl SignalGenerator {
    pub fn new(config: &SimulatorConfig, amplitude: f64, seed: u64) -> Self {
        Self {
            pattern: config.activation_pattern.clone(),
            carrier_hz: config.emg_carrier_hz,
            sampling_rate_hz: config.sampling_rate_hz as f64,
            amplitude,
            noise_level: config.noise_level,
            rng: StdRng::seed_from_u64(seed),
            sample_index: 0,
        }
    }

    pub fn next_sample(&mut self) -> Sample {
        let t = self.sample_index as f64 / self.sampling_rate_hz;
        let t_ms = self.sample_index as f64 * 1000.0 / self.sampling_rate_hz;
        self.sample_index += 1;

        let envelope = match self.pattern {
            ActivationPattern::Constant => self.amplitude,
            ActivationPattern::Sinusoidal { frequency_hz } => {
                self.amplitude * (2.0 * PI * frequency_hz * t).sin()
            }
            ActivationPattern::Burst {
                burst_duration_ms,
                rest_duration_ms,
            } => {
                let period_ms = (burst_duration_ms + rest_duration_ms).max(1) as f64;
                if t_ms % period_ms < burst_duration_ms as f64 {
                    self.amplitude
                } else {
                    0.0
                }
            }
            ActivationPattern::Ramp { ramp_duration_ms } => {
                let period = ramp_duration_ms.max(1) as f64 / 1000.0;
                self.amplitude * (t % period) / period
            }
            ActivationPattern::Random => self.amplitude * self.rng.gen_range(-1.0..1.0),
        };

        let mut value = match self.carrier_hz {
            Some(f) => {
                envelope
                    * ((2.0 * PI * f * t).sin()
                        + 0.3 * (2.0 * PI * 2.0 * f * t).sin()
                        + 0.1 * (2.0 * PI * 3.0 * f * t).sin())
            }
            None => envelope,
        };

        if self.noise_level > 0.0 {
            value += self.rng.gen_range(-0.5..0.5) * self.noise_level * self.amplitude;
        }
        value
    }

    pub fn next_batch(&mut self, len: usize) -> Vec<Sample> {
        (0..len).map(|_| self.next_sample()).collect()
    }
}

/// Transport backed by [`SignalGenerator`]
#[derive(Debug)]
pub struct SimulatedTransport {
    config: SimulatorConfig,
    task: Option<JoinHandle<()>>,
    streams_started: usize,
    faults: FaultSlot,
}

impl SimulatedTransport {
    pub fn new(config: SimulatorConfig) -> Result<Self, TransportError> {
        config.validate()?;
        Ok(Self {
            config,
            task: None,
            streams_started: 0,
            faults: FaultSlot::new(),
        })
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    pub fn is_streaming(&self) -> bool {
        self.task.is_some()
    }

    pub fn streams_started(&self) -> usize {
        self.streams_started
    }

    /// Handle for raising faults from outside, e.g. to emulate a dropped link
    pub fn fault_injector(&self) -> FaultSlot {
        self.faults.clone()
    }
}

#[async_trait]
impl DeviceTransport for SimulatedTransport {
    async fn start_streaming(&mut self, sink: Arc<IngestBuffer>) -> Result<(), TransportError> {
        if self.task.is_some() {
            return Err(TransportError::CommandRejected(
                "simulator is already streaming".to_string(),
            ));
        }

        let stream = self.streams_started;
        let amplitude = self.config.amplitude_for_stream(stream);
        let seed = self.config.seed.wrapping_add(stream as u64);
        let mut generator = SignalGenerator::new(&self.config, amplitude, seed);
        let batch_len = self.config.samples_per_batch();
        let period = Duration::from_millis(self.config.batch_interval_ms);

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
            loop {
                interval.tick().await;
                sink.push(&generator.next_batch(batch_len));
            }
        }));
        self.streams_started += 1;

        info!(stream, amplitude, batch_len, "simulator streaming");
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<(), TransportError> {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("simulator stopped");
        }
        Ok(())
    }

    fn take_fault(&mut self) -> Option<TransportError> {
        self.faults.take()
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: "EMG Simulator".to_string(),
            kind: TransportKind::Simulated,
            sampling_rate_hz: self.config.sampling_rate_hz,
        }
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(pattern: ActivationPattern) -> SimulatorConfig {
        SimulatorConfig {
            noise_level: 0.0,
            activation_pattern: pattern,
            emg_carrier_hz: None,
            signal_amplitude: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(SimulatorConfig::default().validate().is_ok());

        let slow = SimulatorConfig {
            sampling_rate_hz: 10,
            ..Default::default()
        };
        assert!(matches!(slow.validate(), Err(TransportError::Configuration(_))));

        let noisy = SimulatorConfig {
            noise_level: 2.0,
            ..Default::default()
        };
        assert!(noisy.validate().is_err());

        let zero_batch = SimulatorConfig {
            batch_interval_ms: 0,
            ..Default::default()
        };
        assert!(SimulatedTransport::new(zero_batch).is_err());
    }

    #[test]
    fn test_samples_per_batch() {
        assert_eq!(SimulatorConfig::default().samples_per_batch(), 10);
        let sparse = SimulatorConfig {
            sampling_rate_hz: 100,
            batch_interval_ms: 5,
            ..Default::default()
        };
        assert_eq!(sparse.samples_per_batch(), 1);
    }

    #[test]
    fn test_constant_pattern() {
        let config = quiet(ActivationPattern::Constant);
        let mut generator = SignalGenerator::new(&config, 2.0, 1);
        assert!(generator.next_batch(50).iter().all(|&x| x == 2.0));
    }

    #[test]
    fn test_burst_pattern() {
        let config = quiet(ActivationPattern::Burst {
            burst_duration_ms: 10,
            rest_duration_ms: 10,
        });
        let mut generator = SignalGenerator::new(&config, 1.0, 1);
        let batch = generator.next_batch(40);
        assert!(batch[..10].iter().all(|&x| x == 1.0));
        assert!(batch[10..20].iter().all(|&x| x == 0.0));
        assert!(batch[20..30].iter().all(|&x| x == 1.0));
    }

    #[test]
    fn test_noise_is_seeded() {
        let config = SimulatorConfig::default();
        let a = SignalGenerator::new(&config, 1.0, 42).next_batch(100);
        let b = SignalGenerator::new(&config, 1.0, 42).next_batch(100);
        let c = SignalGenerator::new(&config, 1.0, 43).next_batch(100);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_fills_buffer_until_stopped() {
        let mut transport = SimulatedTransport::new(SimulatorConfig {
            stream_levels: vec![3.0],
            ..quiet(ActivationPattern::Constant)
        })
        .unwrap();
        let buffer = Arc::new(IngestBuffer::new());

        transport.start_streaming(buffer.clone()).await.unwrap();
        assert!(transport
            .start_streaming(buffer.clone())
            .await
            .is_err());

        tokio::time::sleep(Duration::from_millis(55)).await;
        transport.stop_streaming().await.unwrap();
        assert!(!transport.is_streaming());

        let samples = buffer.drain_all();
        assert!(samples.len() >= 50);
        assert!(samples.iter().all(|&x| x == 3.0));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(buffer.is_empty());
        assert_eq!(transport.streams_started(), 1);
    }

    #[tokio::test]
    async fn test_injected_fault_is_taken_once() {
        let mut transport = SimulatedTransport::new(SimulatorConfig::default()).unwrap();
        transport.fault_injector().raise(TransportError::StreamClosed);
        assert_eq!(transport.take_fault(), Some(TransportError::StreamClosed));
        assert_eq!(transport.take_fault(), None);
        assert_eq!(transport.info().kind, TransportKind::Simulated);
    }
}
