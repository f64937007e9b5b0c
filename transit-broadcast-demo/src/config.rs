/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use chrono::Utc;
use serde::{Deserialize, Serialize};
use transit_broadcast::{BrokerConfig, Position, RouteTopology, Stop};

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub(crate) demo: DemoConfig,
    #[serde(default)]
    pub(crate) broker: BrokerConfig,
    pub(crate) routes: Vec<RouteConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct DemoConfig {
    /// Stop after this many seconds; run until Ctrl-C when absent.
    pub(crate) run_secs: Option<u64>,
    pub(crate) synthesizer_seed: u64,
    pub(crate) vehicles: Vec<VehicleConfig>,
    pub(crate) riders: Vec<RiderConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct VehicleConfig {
    pub(crate) vehicle_id: String,
    pub(crate) route_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RiderConfig {
    pub(crate) client_id: String,
    pub(crate) route_id: String,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub(crate) route_id: String,
    pub(crate) name: String,
    pub(crate) stops: Vec<StopConfig>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StopConfig {
    pub(crate) stop_id: String,
    pub(crate) name: String,
    pub(crate) latitude: f64,
    pub(crate) longitude: f64,
}

impl RouteConfig {
    /// Sequence numbers come from file order; first and last stops are the
    /// terminals.
    pub(crate) fn to_topology(&self) -> RouteTopology {
        let now = Utc::now();
        let last = self.stops.len().saturating_sub(1);
        RouteTopology {
            route_id: self.route_id.clone(),
            name: self.name.clone(),
            stops: self
                .stops
                .iter()
                .enumerate()
                .map(|(index, stop)| Stop {
                    stop_id: stop.stop_id.clone(),
                    name: stop.name.clone(),
                    position: Position::new(stop.latitude, stop.longitude, now),
                    sequence: index as u32 + 1,
                    is_terminal: index == 0 || index == last,
                })
                .collect(),
            path: Vec::new(),
        }
    }
}
