/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::error::BroadcastError;
use crate::model::Position;
use serde::{Deserialize, Serialize};

/// A single stop on a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: String,
    pub name: String,
    pub position: Position,
    /// 1-based, contiguous along the route.
    pub sequence: u32,
    pub is_terminal: bool,
}

/// Ordered stop list plus a denser path polyline for on-path checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteTopology {
    pub route_id: String,
    pub name: String,
    pub stops: Vec<Stop>,
    pub path: Vec<Position>,
}

impl RouteTopology {
    /// Enforces the structural invariants: at least two stops, contiguous
    /// 1-based sequencing, and terminal flags on both ends.
    pub fn validate(&self) -> Result<(), BroadcastError> {
        if self.stops.len() < 2 {
            return Err(BroadcastError::Validation(format!(
                "route '{}' has {} stops, need at least 2",
                self.route_id,
                self.stops.len()
            )));
        }
        for (index, stop) in self.stops.iter().enumerate() {
            let expected = index as u32 + 1;
            if stop.sequence != expected {
                return Err(BroadcastError::Validation(format!(
                    "route '{}' stop '{}' has sequence {}, expected {}",
                    self.route_id, stop.stop_id, stop.sequence, expected
                )));
            }
            stop.position.validate()?;
        }
        let first = self.stops.first().expect("len checked above");
        let last = self.stops.last().expect("len checked above");
        if !first.is_terminal || !last.is_terminal {
            return Err(BroadcastError::Validation(format!(
                "route '{}' must mark its first and last stops terminal",
                self.route_id
            )));
        }
        Ok(())
    }

    pub fn stop_count(&self) -> usize {
        self.stops.len()
    }

    pub fn stop_by_id(&self, stop_id: &str) -> Option<&Stop> {
        self.stops.iter().find(|stop| stop.stop_id == stop_id)
    }
}
