// src/processing/features.rs
//! Time domain feature extraction for a phase's raw samples
//!
//! [`compute_metrics`] is a total function: every finite input, including
//! an empty one, yields a metrics record whose floating-point fields are all
//! finite. Values that would come out as NaN or infinity are reported as 0.

use crate::config::constants::features::DEFAULT_WILLISON_THRESHOLD_RATIO;
use crate::Sample;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-phase descriptor set
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmgMetrics {
    pub rms: f64,
    pub mav: f64,
    pub snr: f64,
    pub max_amplitude: f64,
    pub mean: f64,
    pub std: f64,
    pub zero_crossings: u64,
    pub slope_sign_changes: u64,
    pub willison_amplitude: u64,
    #[serde(rename = "integratedEMG")]
    pub integrated_emg: f64,
    pub sample_count: u64,
}

/// Names of the scalar metrics, for comparison views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKind {
    Rms,
    Mav,
    Snr,
    MaxAmplitude,
    ZeroCrossings,
    SlopeSignChanges,
    WillisonAmplitude,
    IntegratedEmg,
    SampleCount,
}

impl MetricKind {
    pub const ALL: [MetricKind; 9] = [
        MetricKind::Rms,
        MetricKind::Mav,
        MetricKind::Snr,
        MetricKind::MaxAmplitude,
        MetricKind::ZeroCrossings,
        MetricKind::SlopeSignChanges,
        MetricKind::WillisonAmplitude,
        MetricKind::IntegratedEmg,
        MetricKind::SampleCount,
    ];
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Rms => "RMS",
            MetricKind::Mav => "MAV",
            MetricKind::Snr => "SNR",
            MetricKind::MaxAmplitude => "Max Amplitude",
            MetricKind::ZeroCrossings => "Zero Crossings",
            MetricKind::SlopeSignChanges => "Slope Sign Changes",
            MetricKind::WillisonAmplitude => "Willison Amplitude",
            MetricKind::IntegratedEmg => "Integrated EMG",
            MetricKind::SampleCount => "Samples",
        };
        write!(f, "{}", name)
    }
}

impl EmgMetrics {
    /// Read one metric as `f64`
    pub fn value(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Rms => self.rms,
            MetricKind::Mav => self.mav,
            MetricKind::Snr => self.snr,
            MetricKind::MaxAmplitude => self.max_amplitude,
            MetricKind::ZeroCrossings => self.zero_crossings as f64,
            MetricKind::SlopeSignChanges => self.slope_sign_changes as f64,
            MetricKind::WillisonAmplitude => self.willison_amplitude as f64,
            MetricKind::IntegratedEmg => self.integrated_emg,
            MetricKind::SampleCount => self.sample_count as f64,
        }
    }

    /// True when every floating-point field is finite
    pub fn is_finite(&self) -> bool {
        [
            self.rms,
            self.mav,
            self.snr,
            self.max_amplitude,
            self.mean,
            self.std,
            self.integrated_emg,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Tunables for feature extraction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Willison threshold as a fraction of the phase's peak amplitude
    #[serde(default = "default_willison_ratio")]
    pub willison_threshold_ratio: f64,
}

fn default_willison_ratio() -> f64 {
    DEFAULT_WILLISON_THRESHOLD_RATIO
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            willison_threshold_ratio: DEFAULT_WILLISON_THRESHOLD_RATIO,
        }
    }
}

/// Compute the canonical metric set with the default Willison ratio
pub fn compute_metrics(data: &[Sample]) -> EmgMetrics {
    compute_metrics_with(data, &FeatureConfig::default())
}

/// Compute the canonical metric set
pub fn compute_metrics_with(data: &[Sample], config: &FeatureConfig) -> EmgMetrics {
    if data.is_empty() {
        return EmgMetrics::default();
    }

    let n = data.len() as f64;

    // First pass: sums and peak
    let mut sum = 0.0;
    let mut sum_abs = 0.0;
    let mut sum_squares = 0.0;
    let mut max_amplitude: f64 = 0.0;
    for &x in data {
        let magnitude = x.abs();
        sum += x;
        sum_abs += magnitude;
        sum_squares += x * x;
        max_amplitude = max_amplitude.max(magnitude);
    }

    let mean = sum / n;
    let rms = (sum_squares / n).sqrt();
    let mav = sum_abs / n;

    // Second pass: spread around the mean
    let variance = data.iter().map(|&x| (x - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();

    let snr = if std > 0.0 {
        20.0 * (mean / std).abs().log10()
    } else {
        0.0
    };

    let willison_threshold = config.willison_threshold_ratio * max_amplitude;

    EmgMetrics {
        rms: finite_or_zero(rms),
        mav: finite_or_zero(mav),
        snr: finite_or_zero(snr),
        max_amplitude: finite_or_zero(max_amplitude),
        mean: finite_or_zero(mean),
        std: finite_or_zero(std),
        zero_crossings: count_zero_crossings(data),
        slope_sign_changes: count_slope_sign_changes(data),
        willison_amplitude: count_willison_amplitude(data, willison_threshold),
        integrated_emg: finite_or_zero(sum_abs),
        sample_count: data.len() as u64,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Sign flips between negative and non-negative samples
fn count_zero_crossings(data: &[Sample]) -> u64 {
    data.windows(2)
        .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
        .count() as u64
}

/// Points where the slope changes strictly from rising to falling or back
fn count_slope_sign_changes(data: &[Sample]) -> u64 {
    if data.len() < 3 {
        return 0;
    }

    data.windows(3)
        .filter(|w| {
            let prev_slope = w[1] - w[0];
            let next_slope = w[2] - w[1];
            (prev_slope > 0.0 && next_slope < 0.0) || (prev_slope < 0.0 && next_slope > 0.0)
        })
        .count() as u64
}

fn count_willison_amplitude(data: &[Sample], threshold: f64) -> u64 {
    data.windows(2)
        .filter(|pair| (pair[1] - pair[0]).abs() > threshold)
        .count() as u64
}
