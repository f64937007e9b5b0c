/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Broker configuration surface. Every heuristic the pipeline leans on
//! (dwell allowance, traffic bands, retry shape, crowd thresholds) is a
//! configurable default rather than a constant.

use crate::model::CrowdLevel;
use serde::{Deserialize, Serialize};

/// Top-level configuration for one broadcast coordinator instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    /// Interval between synthesizer ticks, in milliseconds.
    pub synthesizer_tick_ms: u64,
    /// Interval between delivery-queue retry passes, in milliseconds.
    pub retry_tick_ms: u64,
    /// Cruise speed assumed when a vehicle reports no usable speed, km/h.
    pub default_speed_kmh: f64,
    /// Retry ceiling per queued envelope. Exceeding it drops the envelope.
    pub max_retry_count: u8,
    /// Backoff base for the first retry window, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on any single backoff window, in milliseconds.
    pub backoff_cap_ms: u64,
    /// Dwell allowance added per intervening stop in ETA computation, minutes.
    pub dwell_minutes_per_stop: f64,
    /// Bound on a single transport delivery attempt, in milliseconds.
    pub delivery_timeout_ms: u64,
    /// Smoothing factor for the per-client latency moving average, in (0,1].
    pub latency_smoothing: f64,
    pub crowd_thresholds: CrowdThresholds,
    pub traffic: TrafficModel,
    pub synthesizer: SynthesizerConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            synthesizer_tick_ms: 3_000,
            retry_tick_ms: 1_000,
            default_speed_kmh: 30.0,
            max_retry_count: 5,
            backoff_base_ms: 2_000,
            backoff_cap_ms: 60_000,
            dwell_minutes_per_stop: 2.0,
            delivery_timeout_ms: 2_000,
            latency_smoothing: 0.2,
            crowd_thresholds: CrowdThresholds::default(),
            traffic: TrafficModel::default(),
            synthesizer: SynthesizerConfig::default(),
        }
    }
}

/// Occupancy cut-offs for the discretized crowd classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrowdThresholds {
    /// Mean occupancy at or below this is `Low`.
    pub low_max: f64,
    /// Mean occupancy at or below this (and above `low_max`) is `Medium`.
    pub medium_max: f64,
}

impl Default for CrowdThresholds {
    fn default() -> Self {
        Self {
            low_max: 15.0,
            medium_max: 30.0,
        }
    }
}

impl CrowdThresholds {
    /// Classifies a mean occupancy into a crowd level.
    pub fn classify(&self, mean_occupancy: f64) -> CrowdLevel {
        if mean_occupancy <= self.low_max {
            CrowdLevel::Low
        } else if mean_occupancy <= self.medium_max {
            CrowdLevel::Medium
        } else {
            CrowdLevel::High
        }
    }
}

/// Time-of-day congestion multipliers applied to nominal speed. All values
/// must lie in (0,1].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrafficModel {
    pub rush_hour_factor: f64,
    pub midday_factor: f64,
    pub weekend_factor: f64,
    pub offpeak_factor: f64,
}

impl Default for TrafficModel {
    fn default() -> Self {
        Self {
            rush_hour_factor: 0.6,
            midday_factor: 0.85,
            weekend_factor: 0.9,
            offpeak_factor: 1.0,
        }
    }
}

/// Bounds for the demo-mode fleet synthesizer perturbations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesizerConfig {
    /// Maximum positional jitter per tick, in degrees. The default is roughly
    /// a 100 m displacement at mid latitudes.
    pub position_jitter_deg: f64,
    /// Lower bound of the resampled speed band, km/h.
    pub speed_min_kmh: f64,
    /// Upper bound of the resampled speed band, km/h.
    pub speed_max_kmh: f64,
    /// Maximum heading change per tick, degrees.
    pub heading_jitter_deg: f64,
    /// Maximum occupancy change per tick, passengers.
    pub occupancy_jitter: u32,
    /// Capacity assumed for vehicles that never declared one.
    pub default_capacity: u32,
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            position_jitter_deg: 0.0009,
            speed_min_kmh: 10.0,
            speed_max_kmh: 60.0,
            heading_jitter_deg: 15.0,
            occupancy_jitter: 3,
            default_capacity: 40,
        }
    }
}
