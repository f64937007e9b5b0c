/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! # transit-broadcast
//!
//! `transit-broadcast` is a real-time state broadcast engine for transit
//! fleets: vehicles stream location updates into a [`BroadcastCoordinator`],
//! which enriches them with geospatial derivations and fans them out to
//! per-route topic subscribers, queueing for offline clients with
//! priority-tiered, backoff-scheduled redelivery.
//!
//! Typical usage is API-first and remains centered on [`BroadcastCoordinator`]
//! and the [`Transport`] / [`DurableStore`] seams. Internal modules are
//! organized by domain layer to keep behavior ownership explicit.
//!
//! ```
//! use std::sync::Arc;
//! use chrono::Utc;
//! use transit_broadcast::{
//!     BroadcastCoordinator, BrokerConfig, InMemoryStore, NoopMetricsSink, Position,
//!     RouteTopology, Stop, SystemClock, VehicleUpdateRequest,
//! };
//!
//! # pub mod mock_transport {
//! #     use async_trait::async_trait;
//! #     use transit_broadcast::{Envelope, Transport, TransportError};
//! #
//! #     pub struct MockTransport;
//! #
//! #     #[async_trait]
//! #     impl Transport for MockTransport {
//! #         async fn send(
//! #             &self,
//! #             _client_id: &str,
//! #             _envelope: &Envelope,
//! #         ) -> Result<(), TransportError> {
//! #             Ok(())
//! #         }
//! #     }
//! # }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let coordinator = BroadcastCoordinator::new(
//!     BrokerConfig::default(),
//!     Arc::new(mock_transport::MockTransport),
//!     Arc::new(InMemoryStore::new()),
//!     Arc::new(NoopMetricsSink),
//!     Arc::new(SystemClock),
//! );
//!
//! let now = Utc::now();
//! coordinator
//!     .register_route(RouteTopology {
//!         route_id: "R1".into(),
//!         name: "Line 1".into(),
//!         stops: vec![
//!             Stop {
//!                 stop_id: "s1".into(),
//!                 name: "Terminal West".into(),
//!                 position: Position::new(52.500, 13.400, now),
//!                 sequence: 1,
//!                 is_terminal: true,
//!             },
//!             Stop {
//!                 stop_id: "s2".into(),
//!                 name: "Terminal East".into(),
//!                 position: Position::new(52.510, 13.400, now),
//!                 sequence: 2,
//!                 is_terminal: true,
//!             },
//!         ],
//!         path: Vec::new(),
//!     })
//!     .await
//!     .unwrap();
//!
//! coordinator.start_session("bus-12", "R1").await.unwrap();
//! coordinator.subscribe("R1", "rider-1").await;
//! coordinator.client_connected("rider-1").await;
//!
//! let outcome = coordinator
//!     .submit_update(VehicleUpdateRequest {
//!         vehicle_id: "bus-12".into(),
//!         originator_id: "driver-7".into(),
//!         position: Position::new(52.503, 13.400, now).with_motion(28.0, 0.0),
//!         occupancy: Some(17),
//!         metadata: Default::default(),
//!     })
//!     .await
//!     .unwrap();
//!
//! assert_eq!(outcome.delivered_to, vec!["rider-1".to_string()]);
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API facade: the [`BroadcastCoordinator`] surface
//! - Control plane: per-client connectivity and delivery statistics
//! - Routing: route-topic ownership and subscriber resolution
//! - Data plane: delivery queue, retry backoff and the bounded dispatcher
//! - Runtime: the retry and synthesizer driving loops
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not unconditionally initialize a
//! global subscriber. Binaries/tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.

mod clock;
pub use clock::{Clock, ManualClock, SystemClock};

mod config;
pub use config::{BrokerConfig, CrowdThresholds, SynthesizerConfig, TrafficModel};

mod error;
pub use error::BroadcastError;

mod model;
pub use model::{CrowdLevel, Position, RouteTopology, Stop, VehicleState, VehicleStatus};

mod envelope;
pub use envelope::{
    metadata_keys, ClientReport, Envelope, EnvelopeBody, ReportKind, VehicleUpdate,
};

pub mod geo;

mod metrics;
pub use metrics::{MetricKind, MetricsSink, NoopMetricsSink, PerfMetric, RecordingMetricsSink};

mod transport;
pub use transport::{Transport, TransportError};

mod store;
pub use store::{DurableStore, InMemoryStore, StoreError};

mod control_plane;
pub use control_plane::ConnectionState;

mod data_plane;
pub use data_plane::{Priority, QueuedEnvelope, TickReport};
mod routing;
pub use routing::{topic_name_for_route, Topic};

#[doc(hidden)]
pub mod observability;

mod coordinator;
pub use coordinator::{
    BroadcastCoordinator, BroadcastOutcome, RetryTickSummary, VehicleUpdateRequest,
};

mod synthesizer;
pub use synthesizer::FleetSynthesizer;

mod runtime;
pub use runtime::BrokerRuntime;
