/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Shared fixtures for the integration tests.

// Each test binary compiles its own copy and uses a subset.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use transit_broadcast::{
    BroadcastCoordinator, BrokerConfig, Envelope, InMemoryStore, ManualClock, Position,
    RecordingMetricsSink, RouteTopology, Stop, Transport, TransportError, VehicleUpdateRequest,
};

/// A Monday at 08:00 UTC, inside the weekday rush-hour traffic band.
pub fn monday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

/// Transport that records every send and can be switched into failure mode.
pub struct RecordingTransport {
    sent: Mutex<Vec<(String, Envelope)>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(String, Envelope)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, client_id: &str) -> Vec<Envelope> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(target, _)| target == client_id)
            .map(|(_, envelope)| envelope.clone())
            .collect()
    }

    pub fn attempt_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, client_id: &str, envelope: &Envelope) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::Failed("injected failure".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((client_id.to_string(), envelope.clone()));
        Ok(())
    }
}

/// Transport that records the attempt and fails it, for retry-exhaustion runs.
pub struct FailingTransport {
    attempts: Mutex<Vec<String>>,
}

impl FailingTransport {
    pub fn new() -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(&self, client_id: &str, _envelope: &Envelope) -> Result<(), TransportError> {
        self.attempts.lock().unwrap().push(client_id.to_string());
        Err(TransportError::Failed("injected failure".into()))
    }
}

/// North-running route with `stop_count` stops roughly 1 km apart.
pub fn route(route_id: &str, stop_count: u32) -> RouteTopology {
    let stops = (0..stop_count)
        .map(|i| Stop {
            stop_id: format!("{route_id}-s{}", i + 1),
            name: format!("Stop {}", i + 1),
            position: Position::new(52.50 + f64::from(i) * 0.008993, 13.40, monday_morning()),
            sequence: i + 1,
            is_terminal: i == 0 || i == stop_count - 1,
        })
        .collect();
    RouteTopology {
        route_id: route_id.to_string(),
        name: format!("Line {route_id}"),
        stops,
        path: Vec::new(),
    }
}

pub fn update(vehicle_id: &str) -> VehicleUpdateRequest {
    VehicleUpdateRequest {
        vehicle_id: vehicle_id.to_string(),
        originator_id: format!("driver-{vehicle_id}"),
        position: Position::new(52.503, 13.40, monday_morning()).with_motion(30.0, 0.0),
        occupancy: Some(12),
        metadata: HashMap::new(),
    }
}

pub struct Harness<T: Transport + 'static> {
    pub coordinator: Arc<BroadcastCoordinator>,
    pub transport: Arc<T>,
    pub metrics: Arc<RecordingMetricsSink>,
    pub clock: Arc<ManualClock>,
}

/// Coordinator over a manual clock pinned to [`monday_morning`], a recording
/// metrics sink and an in-memory store.
pub fn harness<T: Transport + 'static>(transport: T) -> Harness<T> {
    let transport = Arc::new(transport);
    let metrics = Arc::new(RecordingMetricsSink::new());
    let clock = Arc::new(ManualClock::new(monday_morning()));
    let coordinator = Arc::new(BroadcastCoordinator::new(
        BrokerConfig::default(),
        transport.clone(),
        Arc::new(InMemoryStore::new()),
        metrics.clone(),
        clock.clone(),
    ));
    Harness {
        coordinator,
        transport,
        metrics,
        clock,
    }
}
