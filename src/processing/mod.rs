// src/processing/mod.rs
//! Signal processing for recorded phases

pub mod conditioning;
pub mod features;

pub use conditioning::{ConditionedSignal, ConditioningConfig, SignalConditioner};
pub use features::{compute_metrics, compute_metrics_with, EmgMetrics, FeatureConfig, MetricKind};
