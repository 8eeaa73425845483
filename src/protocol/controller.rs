// src/protocol/controller.rs
//! Phase segmentation controller
//!
//! Drives one phase at a time through `Idle -> Collecting -> Finalizing ->
//! Done`, or into `Cancelled`. Each tick drains the shared ingest buffer into
//! the active phase and checks elapsed time against the phase target.
//! [`PhaseController::run_phase`] wraps the synchronous core in a tokio poll
//! loop against a [`DeviceTransport`].

use super::definition::PhaseDefinition;
use super::phase::{Phase, PhaseState};
use crate::acquisition::IngestBuffer;
use crate::config::constants::protocol::{
    DEFAULT_POLL_INTERVAL_MS, MAX_PROGRESS_PERCENT, MIN_POLL_INTERVAL_MS,
};
use crate::error::{EmgError, EmgResult};
use crate::hal::DeviceTransport;
use crate::processing::features::{EmgMetrics, FeatureConfig};
use crate::utils::time::{MonotonicTimeProvider, TimeProvider};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Structured notification for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ProtocolEvent {
    #[serde(rename_all = "camelCase")]
    PhaseStarted {
        phase_id: String,
        name: String,
        instruction: Option<String>,
        target_duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    Progress { phase_id: String, percent: f64 },
    #[serde(rename_all = "camelCase")]
    PhaseComplete {
        phase_id: String,
        metrics: EmgMetrics,
    },
    #[serde(rename_all = "camelCase")]
    PhaseCancelled { phase_id: String },
}

/// Receives controller notifications. Every method defaults to a no-op.
pub trait ProtocolObserver: Send {
    fn phase_started(&mut self, _definition: &PhaseDefinition) {}
    fn progress(&mut self, _phase_id: &str, _percent: f64) {}
    fn phase_complete(&mut self, _phase_id: &str, _metrics: &EmgMetrics) {}
    fn phase_cancelled(&mut self, _phase_id: &str) {}
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProtocolObserver for NoopObserver {}

/// Forwards events to a channel. A dropped receiver is ignored.
impl ProtocolObserver for mpsc::UnboundedSender<ProtocolEvent> {
    fn phase_started(&mut self, definition: &PhaseDefinition) {
        let _ = self.send(ProtocolEvent::PhaseStarted {
            phase_id: definition.id.clone(),
            name: definition.name.clone(),
            instruction: definition.instruction.clone(),
            target_duration_ms: definition.target_duration_ms,
        });
    }

    fn progress(&mut self, phase_id: &str, percent: f64) {
        let _ = self.send(ProtocolEvent::Progress {
            phase_id: phase_id.to_string(),
            percent,
        });
    }

    fn phase_complete(&mut self, phase_id: &str, metrics: &EmgMetrics) {
        let _ = self.send(ProtocolEvent::PhaseComplete {
            phase_id: phase_id.to_string(),
            metrics: *metrics,
        });
    }

    fn phase_cancelled(&mut self, phase_id: &str) {
        let _ = self.send(ProtocolEvent::PhaseCancelled {
            phase_id: phase_id.to_string(),
        });
    }
}

/// Cloneable cancellation trigger, usable from any task
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Repeated calls are harmless.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            // notify_one keeps a permit if nobody is waiting yet
            self.inner.notify.notify_one();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous request so the handle can be reused for a new run
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::SeqCst);
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}

/// Result of one synchronous tick
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Collecting { percent: f64 },
    Completed(Phase),
}

/// Result of [`PhaseController::run_phase`]
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Completed(Phase),
    Cancelled { phase_id: String },
}

struct ActivePhase {
    phase: Phase,
    started_ms: u64,
}

/// Segments the incoming sample stream into phases
pub struct PhaseController {
    buffer: Arc<IngestBuffer>,
    clock: Arc<dyn TimeProvider>,
    observer: Box<dyn ProtocolObserver>,
    features: FeatureConfig,
    poll_interval: Duration,
    cancel_handle: CancelHandle,
    active: Option<ActivePhase>,
    state: PhaseState,
    progress: f64,
}

impl PhaseController {
    pub fn new(buffer: Arc<IngestBuffer>) -> Self {
        Self {
            buffer,
            clock: Arc::new(MonotonicTimeProvider::new()),
            observer: Box::new(NoopObserver),
            features: FeatureConfig::default(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            cancel_handle: CancelHandle::new(),
            active: None,
            state: PhaseState::Idle,
            progress: 0.0,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_observer(mut self, observer: impl ProtocolObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn with_feature_config(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    /// Poll period of [`run_phase`](Self::run_phase), floored at 1 ms
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS));
        self
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn active_phase_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.phase.id())
    }

    /// Last reported progress of the current or most recent phase, 0..=100
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn buffer(&self) -> &Arc<IngestBuffer> {
        &self.buffer
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel_handle.clone()
    }

    /// Clear a pending cancellation request before a new run
    pub fn reset_cancel(&self) {
        self.cancel_handle.reset();
    }

    /// Open a new phase. Anything left in the buffer is dropped.
    pub fn start_phase(&mut self, definition: &PhaseDefinition) -> EmgResult<()> {
        if self.state.is_active() {
            return Err(EmgError::invalid_state("start phase", self.state.to_string()));
        }

        self.buffer.clear();
        self.active = Some(ActivePhase {
            phase: Phase::start(definition),
            started_ms: self.clock.now_millis(),
        });
        self.state = PhaseState::Collecting;
        self.progress = 0.0;

        info!(
            phase = %definition.id,
            target_ms = definition.target_duration_ms,
            "phase started"
        );
        self.observer.phase_started(definition);
        Ok(())
    }

    /// Drain the buffer into the active phase and finalize it once its
    /// target duration has elapsed.
    pub fn tick(&mut self) -> EmgResult<TickOutcome> {
        if self.state != PhaseState::Collecting {
            return Err(EmgError::invalid_state("tick", self.state.to_string()));
        }
        let Some(active) = self.active.as_mut() else {
            return Err(EmgError::invalid_state("tick", "no active phase"));
        };

        let drained = self.buffer.drain_all();
        active.phase.extend_samples(&drained)?;

        let target = active.phase.target_duration_ms();
        let elapsed = self.clock.now_millis().saturating_sub(active.started_ms);
        let percent = (100.0 * elapsed as f64 / target as f64).min(MAX_PROGRESS_PERCENT);
        self.progress = percent;

        trace!(
            phase = active.phase.id(),
            drained = drained.len(),
            elapsed_ms = elapsed,
            percent,
            "tick"
        );
        self.observer.progress(active.phase.id(), percent);

        if elapsed < target {
            return Ok(TickOutcome::Collecting { percent });
        }

        self.state = PhaseState::Finalizing;
        let Some(ActivePhase { mut phase, .. }) = self.active.take() else {
            return Err(EmgError::invalid_state("finalize phase", "no active phase"));
        };
        let metrics = *phase.finalize(&self.features)?;
        self.state = PhaseState::Done;

        info!(
            phase = phase.id(),
            samples = metrics.sample_count,
            rms = metrics.rms,
            "phase complete"
        );
        self.observer.phase_complete(phase.id(), &metrics);
        Ok(TickOutcome::Completed(phase))
    }

    /// Abandon the active phase and its samples.
    ///
    /// Returns `false` when there was nothing to cancel.
    pub fn cancel(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }

        let phase_id = self.active.take().map(|mut active| {
            active.phase.discard();
            active.phase.id().to_string()
        });
        self.buffer.clear();
        self.state = PhaseState::Cancelled;

        let phase_id = phase_id.unwrap_or_default();
        warn!(phase = %phase_id, "phase cancelled");
        self.observer.phase_cancelled(&phase_id);
        true
    }

    /// Run one phase against a transport until it completes or is cancelled.
    ///
    /// Transport failures cancel the phase and are returned as errors; the
    /// controller never retries.
    pub async fn run_phase<T>(
        &mut self,
        definition: &PhaseDefinition,
        transport: &mut T,
    ) -> EmgResult<PhaseOutcome>
    where
        T: DeviceTransport + ?Sized,
    {
        let cancel = self.cancel_handle.clone();
        if cancel.is_cancelled() {
            debug!(phase = %definition.id, "cancel pending, phase not started");
            return Ok(PhaseOutcome::Cancelled {
                phase_id: definition.id.clone(),
            });
        }

        self.start_phase(definition)?;

        if let Err(err) = transport.start_streaming(Arc::clone(&self.buffer)).await {
            warn!(phase = %definition.id, error = %err, "failed to start streaming");
            self.cancel();
            return Err(err.into());
        }

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.cancel();
                    self.stop_after_abort(transport).await;
                    return Ok(PhaseOutcome::Cancelled { phase_id: definition.id.clone() });
                }
                _ = interval.tick() => {}
            }

            if let Some(fault) = transport.take_fault() {
                warn!(phase = %definition.id, error = %fault, "transport fault");
                self.cancel();
                self.stop_after_abort(transport).await;
                return Err(fault.into());
            }

            // The device is stopped before the phase is finalized
            if self.target_reached() {
                if let Err(err) = transport.stop_streaming().await {
                    warn!(phase = %definition.id, error = %err, "failed to stop streaming");
                    self.cancel();
                    return Err(err.into());
                }
                return match self.tick()? {
                    TickOutcome::Completed(phase) => Ok(PhaseOutcome::Completed(phase)),
                    TickOutcome::Collecting { .. } => {
                        self.cancel();
                        Err(EmgError::invalid_state("complete phase", "target not reached"))
                    }
                };
            }

            self.tick()?;
        }
    }

    /// Whether the active phase has reached its target duration
    fn target_reached(&self) -> bool {
        self.active.as_ref().is_some_and(|active| {
            self.clock.now_millis().saturating_sub(active.started_ms)
                >= active.phase.target_duration_ms()
        })
    }

    async fn stop_after_abort<T>(&self, transport: &mut T)
    where
        T: DeviceTransport + ?Sized,
    {
        if let Err(err) = transport.stop_streaming().await {
            debug!(error = %err, "stop after abort failed");
        }
    }
}

impl std::fmt::Debug for PhaseController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseController")
            .field("state", &self.state)
            .field("active_phase", &self.active_phase_id())
            .field("progress", &self.progress)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
