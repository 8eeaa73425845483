// tests/feature_extraction_tests.rs
//! Integration tests for per-phase metric extraction

use emg_session::processing::{compute_metrics, compute_metrics_with, EmgMetrics, FeatureConfig, MetricKind};
use proptest::prelude::*;
use std::f64::consts::PI;

#[test]
fn test_empty_phase_is_all_zero() {
    let metrics = compute_metrics(&[]);
    assert_eq!(metrics, EmgMetrics::default());
    for kind in MetricKind::ALL {
        assert_eq!(metrics.value(kind), 0.0);
    }
}

#[test]
fn test_single_sample() {
    let metrics = compute_metrics(&[5.0]);
    assert_eq!(metrics.rms, 5.0);
    assert_eq!(metrics.mav, 5.0);
    assert_eq!(metrics.max_amplitude, 5.0);
    assert_eq!(metrics.snr, 0.0);
    assert_eq!(metrics.zero_crossings, 0);
    assert_eq!(metrics.slope_sign_changes, 0);
    assert_eq!(metrics.sample_count, 1);
}

#[test]
fn test_alternating_unit_signal() {
    let metrics = compute_metrics(&[1.0, -1.0, 1.0, -1.0]);
    assert_eq!(metrics.zero_crossings, 3);
    assert_eq!(metrics.slope_sign_changes, 2);
    assert_eq!(metrics.mav, 1.0);
    assert_eq!(metrics.rms, 1.0);
    assert_eq!(metrics.integrated_emg, 4.0);
    // Zero mean, so the ratio is degenerate
    assert_eq!(metrics.snr, 0.0);
}

#[test]
fn test_constant_signal_has_zero_spread() {
    let metrics = compute_metrics(&[2.0; 500]);
    assert_eq!(metrics.rms, 2.0);
    assert_eq!(metrics.std, 0.0);
    assert_eq!(metrics.snr, 0.0);
    assert_eq!(metrics.zero_crossings, 0);
    assert_eq!(metrics.willison_amplitude, 0);
}

#[test]
fn test_sine_wave_metrics() {
    // 10 full cycles of a 50 Hz sine at 1 kHz
    let data: Vec<f64> = (0..200)
        .map(|i| (2.0 * PI * 50.0 * i as f64 / 1000.0 + 0.1).sin())
        .collect();
    let metrics = compute_metrics(&data);

    assert!((metrics.rms - std::f64::consts::FRAC_1_SQRT_2).abs() < 0.01);
    assert!((metrics.mav - 2.0 / PI).abs() < 0.01);
    assert!(metrics.max_amplitude <= 1.0);
    assert!(metrics.zero_crossings >= 19 && metrics.zero_crossings <= 20);
    assert!(metrics.slope_sign_changes >= 19);
}

#[test]
fn test_willison_ratio_is_configurable() {
    let data = [0.0, 0.2, 0.0, 1.0, 0.0];
    let loose = compute_metrics_with(&data, &FeatureConfig { willison_threshold_ratio: 0.1 });
    let strict = compute_metrics_with(&data, &FeatureConfig { willison_threshold_ratio: 0.5 });
    assert_eq!(loose.willison_amplitude, 4);
    assert_eq!(strict.willison_amplitude, 2);
}

#[test]
fn test_repeat_computation_is_bit_identical() {
    let data: Vec<f64> = (0..1000).map(|i| ((i * 37 % 101) as f64 - 50.0) / 17.0).collect();
    let first = compute_metrics(&data);
    let second = compute_metrics(&data);
    assert_eq!(first.rms.to_bits(), second.rms.to_bits());
    assert_eq!(first.snr.to_bits(), second.snr.to_bits());
    assert_eq!(first, second);
}

#[test]
fn test_metrics_json_field_names() {
    let json = serde_json::to_value(compute_metrics(&[1.0, -1.0])).unwrap();
    for key in [
        "rms",
        "mav",
        "snr",
        "maxAmplitude",
        "zeroCrossings",
        "slopeSignChanges",
        "willisonAmplitude",
        "integratedEMG",
        "sampleCount",
    ] {
        assert!(json.get(key).is_some(), "missing {}", key);
    }
}

proptest! {
    #[test]
    fn prop_metrics_are_total(data in prop::collection::vec(-1.0e6f64..1.0e6, 0..2000)) {
        let metrics = compute_metrics(&data);
        prop_assert!(metrics.is_finite());
        prop_assert_eq!(metrics.sample_count, data.len() as u64);
        prop_assert!(metrics.rms >= 0.0);
        prop_assert!(metrics.mav <= metrics.max_amplitude + 1e-9 * metrics.max_amplitude.max(1.0));
        prop_assert!(metrics.zero_crossings <= data.len().saturating_sub(1) as u64);
    }

    #[test]
    fn prop_rms_bounds_mav(data in prop::collection::vec(-100.0f64..100.0, 1..500)) {
        let metrics = compute_metrics(&data);
        prop_assert!(metrics.rms + 1e-9 >= metrics.mav);
    }
}
