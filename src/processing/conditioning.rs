// src/processing/conditioning.rs
//! Offline signal conditioning for recorded phases
//!
//! None of this feeds the per-phase metrics, which are always computed on the
//! raw samples. It exists for the analysis views: band-pass and notch
//! filtering, baseline removal and windowed envelopes.

use crate::config::constants::conditioning::{
    DEFAULT_BANDPASS_HIGH_HZ, DEFAULT_BANDPASS_LOW_HZ, DEFAULT_NOTCH_HZ, DEFAULT_NOTCH_Q,
    DEFAULT_WINDOW_SIZE,
};
use crate::config::constants::signal::DEFAULT_SAMPLING_RATE_HZ;
use crate::error::{EmgError, EmgResult};
use crate::Sample;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Full-wave rectification
pub fn rectify(data: &[Sample]) -> Vec<Sample> {
    data.iter().map(|x| x.abs()).collect()
}

/// Box-kernel moving average with the output centred like numpy's
/// `convolve(..., mode="same")`. Output length equals input length.
/// A zero window is treated as 1.
pub fn moving_average(data: &[Sample], window_size: usize) -> Vec<Sample> {
    let n = data.len();
    let m = window_size.max(1);
    if n == 0 {
        return Vec::new();
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for &x in data {
        acc += x;
        prefix.push(acc);
    }

    let offset = (m - 1) / 2;
    (0..n)
        .map(|i| {
            let hi = (i + offset + 1).min(n);
            let lo = (i + offset + 1).saturating_sub(m).min(hi);
            (prefix[hi] - prefix[lo]) / m as f64
        })
        .collect()
}

/// Moving average of the rectified signal
pub fn envelope(data: &[Sample], window_size: usize) -> Vec<Sample> {
    moving_average(&rectify(data), window_size)
}

pub fn sliding_rms(data: &[Sample], window_size: usize) -> Vec<Sample> {
    let squares: Vec<Sample> = data.iter().map(|x| x * x).collect();
    moving_average(&squares, window_size)
        .into_iter()
        .map(|v| v.max(0.0).sqrt())
        .collect()
}

pub fn sliding_mav(data: &[Sample], window_size: usize) -> Vec<Sample> {
    envelope(data, window_size)
}

/// Subtract the local moving average to remove slow drift
pub fn remove_baseline(data: &[Sample], window_size: usize) -> Vec<Sample> {
    moving_average(data, window_size)
        .into_iter()
        .zip(data)
        .map(|(baseline, x)| x - baseline)
        .collect()
}

/// Power ratio `10 * log10(mean(x^2) / var(x))` in dB.
///
/// `None` for empty input or zero variance.
pub fn power_snr_db(data: &[Sample]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let signal_power = data.iter().map(|x| x * x).sum::<f64>() / n;
    let noise_power = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;

    if noise_power <= 0.0 {
        return None;
    }
    let snr = 10.0 * (signal_power / noise_power).log10();
    snr.is_finite().then_some(snr)
}

/// Second-order IIR section (RBJ audio EQ cookbook), Direct Form I
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn lowpass(cutoff_hz: f64, sample_rate_hz: f64, q: f64) -> EmgResult<Self> {
        let (cos_w0, alpha) = Self::prewarp("lowpass", cutoff_hz, sample_rate_hz, q)?;
        let b1 = 1.0 - cos_w0;
        Ok(Self::normalized(
            [b1 / 2.0, b1, b1 / 2.0],
            [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        ))
    }

    pub fn highpass(cutoff_hz: f64, sample_rate_hz: f64, q: f64) -> EmgResult<Self> {
        let (cos_w0, alpha) = Self::prewarp("highpass", cutoff_hz, sample_rate_hz, q)?;
        let b1 = 1.0 + cos_w0;
        Ok(Self::normalized(
            [b1 / 2.0, -b1, b1 / 2.0],
            [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        ))
    }

    pub fn notch(center_hz: f64, sample_rate_hz: f64, q: f64) -> EmgResult<Self> {
        let (cos_w0, alpha) = Self::prewarp("notch", center_hz, sample_rate_hz, q)?;
        Ok(Self::normalized(
            [1.0, -2.0 * cos_w0, 1.0],
            [1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha],
        ))
    }

    fn prewarp(kind: &str, freq_hz: f64, sample_rate_hz: f64, q: f64) -> EmgResult<(f64, f64)> {
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(EmgError::validation(
                "sample_rate_hz",
                format!("{} filter needs a positive sample rate", kind),
            ));
        }
        let nyquist = sample_rate_hz / 2.0;
        if !(freq_hz > 0.0 && freq_hz < nyquist) {
            return Err(EmgError::validation(
                "cutoff_hz",
                format!("{} frequency {} Hz outside (0, {})", kind, freq_hz, nyquist),
            ));
        }
        if !(q.is_finite() && q > 0.0) {
            return Err(EmgError::validation("q", "quality factor must be positive"));
        }

        let w0 = 2.0 * PI * freq_hz / sample_rate_hz;
        Ok((w0.cos(), w0.sin() / (2.0 * q)))
    }

    fn normalized(b: [f64; 3], a: [f64; 3]) -> Self {
        let a0 = a[0];
        Self {
            b: [b[0] / a0, b[1] / a0, b[2] / a0],
            a: [a[1] / a0, a[2] / a0],
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    pub fn process_sample(&mut self, input: f64) -> f64 {
        let output = self.b[0] * input + self.b[1] * self.x1 + self.b[2] * self.x2
            - self.a[0] * self.y1
            - self.a[1] * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Butterworth Q values for the second-order sections of an even `order`
fn butterworth_qs(order: usize) -> Vec<f64> {
    let n = order as f64;
    (1..=order / 2)
        .map(|k| 1.0 / (2.0 * (PI * (2 * k - 1) as f64 / (2.0 * n)).cos()))
        .collect()
}

/// Zero-phase filtering through a cascade of sections: forward pass, then a
/// backward pass over the reversed output. No edge padding is applied.
pub fn filtfilt(sections: &[Biquad], data: &[Sample]) -> Vec<Sample> {
    let mut stages: Vec<Biquad> = sections.to_vec();
    let run = |stages: &mut Vec<Biquad>, input: Vec<Sample>| -> Vec<Sample> {
        stages.iter_mut().for_each(Biquad::reset);
        input
            .into_iter()
            .map(|x| stages.iter_mut().fold(x, |acc, stage| stage.process_sample(acc)))
            .collect()
    };

    let mut forward = run(&mut stages, data.to_vec());
    forward.reverse();
    let mut backward = run(&mut stages, forward);
    backward.reverse();
    backward
}

/// Conditioning chain parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditioningConfig {
    pub sample_rate_hz: f64,
    pub bandpass_low_hz: f64,
    pub bandpass_high_hz: f64,
    /// Even Butterworth order of each band edge
    pub bandpass_order: usize,
    /// `None` disables the notch stage
    pub notch_hz: Option<f64>,
    pub notch_q: f64,
    pub window_size: usize,
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: DEFAULT_SAMPLING_RATE_HZ as f64,
            bandpass_low_hz: DEFAULT_BANDPASS_LOW_HZ,
            bandpass_high_hz: DEFAULT_BANDPASS_HIGH_HZ,
            bandpass_order: 4,
            notch_hz: Some(DEFAULT_NOTCH_HZ),
            notch_q: DEFAULT_NOTCH_Q,
            window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

/// Output of [`SignalConditioner::process`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionedSignal {
    pub filtered: Vec<Sample>,
    pub rms: Vec<Sample>,
    pub mav: Vec<Sample>,
    pub envelope: Vec<Sample>,
    pub snr_db: Option<f64>,
    pub max_amplitude: f64,
}

/// Band-pass, notch and baseline-removal chain
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    config: ConditioningConfig,
    bandpass: Vec<Biquad>,
    notch: Option<Biquad>,
}

impl SignalConditioner {
    pub fn new(config: ConditioningConfig) -> EmgResult<Self> {
        if config.bandpass_order == 0 || config.bandpass_order % 2 != 0 {
            return Err(EmgError::validation(
                "bandpass_order",
                "must be a positive even number",
            ));
        }
        if config.bandpass_low_hz >= config.bandpass_high_hz {
            return Err(EmgError::validation(
                "bandpass_low_hz",
                "low cutoff must be below high cutoff",
            ));
        }
        if config.window_size == 0 {
            return Err(EmgError::validation("window_size", "must be at least 1"));
        }

        let mut bandpass = Vec::with_capacity(config.bandpass_order);
        for q in butterworth_qs(config.bandpass_order) {
            bandpass.push(Biquad::highpass(config.bandpass_low_hz, config.sample_rate_hz, q)?);
            bandpass.push(Biquad::lowpass(config.bandpass_high_hz, config.sample_rate_hz, q)?);
        }

        let notch = config
            .notch_hz
            .map(|freq| Biquad::notch(freq, config.sample_rate_hz, config.notch_q))
            .transpose()?;

        Ok(Self {
            config,
            bandpass,
            notch,
        })
    }

    pub fn config(&self) -> &ConditioningConfig {
        &self.config
    }

    pub fn process(&self, data: &[Sample]) -> ConditionedSignal {
        let mut filtered = filtfilt(&self.bandpass, data);
        if let Some(ref notch) = self.notch {
            filtered = filtfilt(std::slice::from_ref(notch), &filtered);
        }
        let filtered = remove_baseline(&filtered, self.config.window_size);

        let window = self.config.window_size;
        let max_amplitude = filtered.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));

        ConditionedSignal {
            rms: sliding_rms(&filtered, window),
            mav: sliding_mav(&filtered, window),
            envelope: envelope(&filtered, window),
            snr_db: power_snr_db(&filtered),
            max_amplitude,
            filtered,
        }
    }
}
