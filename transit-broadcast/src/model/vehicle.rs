/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::model::Position;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational state of a vehicle. There is no automatic transition out of
/// `Maintenance`; it is entered and left through explicit flag toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Inactive,
    Maintenance,
}

/// Discretized occupancy classification derived from passenger counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrowdLevel {
    Low,
    Medium,
    High,
}

/// Live state of one vehicle. Owned by the coordinator and mutated only
/// through the enrichment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub vehicle_id: String,
    pub route_id: Option<String>,
    pub position: Position,
    pub status: VehicleStatus,
    pub occupancy: u32,
    pub capacity: u32,
    pub last_update: DateTime<Utc>,
}

impl VehicleState {
    pub fn is_active(&self) -> bool {
        self.status == VehicleStatus::Active
    }

    /// Occupancy as a share of capacity, 0.0 when capacity is unset.
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            f64::from(self.occupancy) / f64::from(self.capacity)
        }
    }
}
