/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Narrow read/write boundary toward the external durable store. Failures here
//! are recoverable; the engine surfaces them without masking.

use crate::envelope::ClientReport;
use crate::model::{Position, RouteTopology, VehicleState, VehicleStatus};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

/// Durable-store failure, carried verbatim from the collaborator.
#[derive(Debug, Error)]
#[error("store operation failed: {0}")]
pub struct StoreError(pub String);

/// Opaque durable store the broker reads topology from and appends state to.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn load_routes(&self) -> Result<Vec<RouteTopology>, StoreError>;
    async fn load_vehicles(&self) -> Result<Vec<VehicleState>, StoreError>;
    async fn persist_vehicle_position(
        &self,
        vehicle_id: &str,
        position: &Position,
        route_id: Option<&str>,
        status: Option<VehicleStatus>,
    ) -> Result<(), StoreError>;
    async fn append_report(&self, report: &ClientReport) -> Result<(), StoreError>;
}

/// In-memory reference store for the demo binary and tests. Not durable by
/// design; production deployments plug a real store into the trait.
#[derive(Default)]
pub struct InMemoryStore {
    routes: Mutex<Vec<RouteTopology>>,
    vehicles: Mutex<Vec<VehicleState>>,
    reports: Mutex<Vec<ClientReport>>,
    positions: Mutex<Vec<(String, Position)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: Vec<RouteTopology>) -> Self {
        Self {
            routes: Mutex::new(routes),
            ..Self::default()
        }
    }

    pub async fn seed_vehicles(&self, vehicles: Vec<VehicleState>) {
        *self.vehicles.lock().await = vehicles;
    }

    pub async fn report_count(&self) -> usize {
        self.reports.lock().await.len()
    }

    pub async fn persisted_position_count(&self) -> usize {
        self.positions.lock().await.len()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn load_routes(&self) -> Result<Vec<RouteTopology>, StoreError> {
        Ok(self.routes.lock().await.clone())
    }

    async fn load_vehicles(&self) -> Result<Vec<VehicleState>, StoreError> {
        Ok(self.vehicles.lock().await.clone())
    }

    async fn persist_vehicle_position(
        &self,
        vehicle_id: &str,
        position: &Position,
        _route_id: Option<&str>,
        _status: Option<VehicleStatus>,
    ) -> Result<(), StoreError> {
        self.positions
            .lock()
            .await
            .push((vehicle_id.to_string(), *position));
        Ok(())
    }

    async fn append_report(&self, report: &ClientReport) -> Result<(), StoreError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }
}
