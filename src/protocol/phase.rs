// src/protocol/phase.rs
//! Phase records and their lifecycle

use super::definition::PhaseDefinition;
use crate::error::{EmgError, EmgResult};
use crate::processing::features::{
    compute_metrics, compute_metrics_with, EmgMetrics, FeatureConfig,
};
use crate::Sample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Lifecycle of a single phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhaseState {
    #[default]
    Idle,
    Collecting,
    Finalizing,
    Done,
    Cancelled,
}

impl PhaseState {
    /// Samples may still be appended
    pub fn is_active(self) -> bool {
        matches!(self, PhaseState::Collecting | PhaseState::Finalizing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseState::Done | PhaseState::Cancelled)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseState::Idle => "idle",
            PhaseState::Collecting => "collecting",
            PhaseState::Finalizing => "finalizing",
            PhaseState::Done => "done",
            PhaseState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// One segment of a session: its raw samples and, once done, its metrics.
///
/// `raw_samples` is frozen as soon as `metrics` is set. A cancelled phase
/// holds no samples and is never finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phase {
    id: String,
    name: String,
    target_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instruction: Option<String>,
    #[serde(rename = "rawData", default)]
    raw_samples: Vec<Sample>,
    #[serde(default)]
    metrics: Option<EmgMetrics>,
    started_at: DateTime<Utc>,
    #[serde(default)]
    ended_at: Option<DateTime<Utc>>,
    state: PhaseState,
    /// Absent on records read back from JSON
    #[serde(skip)]
    span: Option<MonotonicSpan>,
}

/// Process-local monotonic start/end markers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MonotonicSpan {
    started: Instant,
    ended: Option<Instant>,
}

impl Phase {
    /// Open a phase in `Collecting`, stamped with the current wall-clock time
    pub fn start(definition: &PhaseDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            name: definition.name.clone(),
            target_duration_ms: definition.target_duration_ms,
            instruction: definition.instruction.clone(),
            raw_samples: Vec::new(),
            metrics: None,
            started_at: Utc::now(),
            ended_at: None,
            state: PhaseState::Collecting,
            span: Some(MonotonicSpan {
                started: Instant::now(),
                ended: None,
            }),
        }
    }

    /// Append samples. Fails once the phase has left `Collecting`.
    pub fn extend_samples(&mut self, samples: &[Sample]) -> EmgResult<()> {
        if self.state != PhaseState::Collecting {
            return Err(EmgError::invalid_state("append samples", self.state.to_string()));
        }
        self.raw_samples.extend_from_slice(samples);
        Ok(())
    }

    /// Compute metrics and move to `Done`. Allowed exactly once.
    pub fn finalize(&mut self, config: &FeatureConfig) -> EmgResult<&EmgMetrics> {
        if self.state != PhaseState::Collecting {
            return Err(EmgError::invalid_state("finalize phase", self.state.to_string()));
        }

        self.state = PhaseState::Finalizing;
        let metrics = compute_metrics_with(&self.raw_samples, config);
        self.mark_ended();
        self.state = PhaseState::Done;

        Ok(&*self.metrics.insert(metrics))
    }

    /// Drop collected samples and move to `Cancelled`.
    ///
    /// No-op unless the phase is still collecting or finalizing.
    pub fn discard(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }
        self.raw_samples = Vec::new();
        self.metrics = None;
        self.mark_ended();
        self.state = PhaseState::Cancelled;
        true
    }

    fn mark_ended(&mut self) {
        self.ended_at = Some(Utc::now().max(self.started_at));
        if let Some(span) = self.span.as_mut() {
            span.ended = Some(Instant::now());
        }
    }

    /// Whether this phase began no earlier than `previous` ended.
    ///
    /// Phases recorded in this process compare monotonic markers, so a
    /// wall-clock step between them does not matter. Records read from JSON
    /// fall back to the wall-clock markers.
    pub(crate) fn starts_after(&self, previous: &Phase) -> bool {
        let previous_end = previous.span.and_then(|span| span.ended);
        match (self.span, previous_end) {
            (Some(span), Some(previous_end)) => span.started >= previous_end,
            _ => previous.ended_at.map_or(true, |end| self.started_at >= end),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target_duration_ms(&self) -> u64 {
        self.target_duration_ms
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    pub fn raw_samples(&self) -> &[Sample] {
        &self.raw_samples
    }

    pub fn sample_count(&self) -> usize {
        self.raw_samples.len()
    }

    pub fn metrics(&self) -> Option<&EmgMetrics> {
        self.metrics.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    /// Wall-clock time between start and end markers
    pub fn observed_duration(&self) -> Option<chrono::Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    /// Checks a record loaded from outside the process: done, metrics
    /// recomputable from `raw_samples`, end not before start.
    pub(crate) fn check_complete(&self) -> EmgResult<()> {
        if self.state != PhaseState::Done {
            return Err(EmgError::validation(
                "phase.state",
                format!("phase '{}' is {}", self.id, self.state),
            ));
        }
        let Some(metrics) = self.metrics.as_ref() else {
            return Err(EmgError::validation(
                "phase.metrics",
                format!("phase '{}' has no metrics", self.id),
            ));
        };
        if !metrics_match_samples(metrics, &self.raw_samples) {
            return Err(EmgError::validation(
                "phase.metrics",
                format!("phase '{}' metrics do not match its samples", self.id),
            ));
        }
        match self.ended_at {
            Some(end) if end >= self.started_at => Ok(()),
            _ => Err(EmgError::validation(
                "phase.endedAt",
                format!("phase '{}' ends before it starts", self.id),
            )),
        }
    }
}

/// Willison amplitude is left out since it depends on the recording's
/// threshold config.
fn metrics_match_samples(stored: &EmgMetrics, samples: &[Sample]) -> bool {
    const RELATIVE_TOLERANCE: f64 = 1e-9;
    let close = |a: f64, b: f64| (a - b).abs() <= RELATIVE_TOLERANCE * a.abs().max(b.abs()).max(1.0);

    let fresh = compute_metrics(samples);
    stored.sample_count == samples.len() as u64
        && stored.zero_crossings == fresh.zero_crossings
        && stored.slope_sign_changes == fresh.slope_sign_changes
        && close(stored.rms, fresh.rms)
        && close(stored.mav, fresh.mav)
        && close(stored.max_amplitude, fresh.max_amplitude)
        && close(stored.integrated_emg, fresh.integrated_emg)
}
