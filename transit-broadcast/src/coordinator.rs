/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! The broadcast coordinator: session state machine, update enrichment,
//! topic fan-out and the retry pass over the delivery queue.

use crate::clock::Clock;
use crate::config::BrokerConfig;
use crate::control_plane::ConnectionTracker;
use crate::data_plane::{DeliveryDispatcher, DeliveryQueue, Priority, RetryOutcome, RetryPolicy};
use crate::envelope::{ClientReport, Envelope, VehicleUpdate};
use crate::error::BroadcastError;
use crate::geo;
use crate::metrics::{MetricKind, MetricsSink, PerfMetric};
use crate::model::{Position, RouteTopology, VehicleState, VehicleStatus};
use crate::observability::events;
use crate::routing::TopicRegistry;
use crate::store::DurableStore;
use crate::transport::Transport;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const COMPONENT: &str = "coordinator";

/// Raw location report submitted by a driver or the synthesizer. The route is
/// implied by the vehicle's active session, never by the request.
#[derive(Debug, Clone)]
pub struct VehicleUpdateRequest {
    pub vehicle_id: String,
    pub originator_id: String,
    pub position: Position,
    pub occupancy: Option<u32>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Result of one accepted broadcast: the enriched envelope plus who received
/// it immediately and who will receive it from the queue.
#[derive(Debug, Clone)]
pub struct BroadcastOutcome {
    pub envelope: Envelope,
    pub delivered_to: Vec<String>,
    pub queued_for: Vec<String>,
}

/// Summary of one retry pass driven by the runtime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryTickSummary {
    pub attempted: usize,
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// Central owner of routes, vehicle sessions and the delivery pipeline.
///
/// All mutable state lives behind per-concern locks; no operation holds two of
/// them at once, so the coordinator is freely shareable across tasks.
pub struct BroadcastCoordinator {
    config: BrokerConfig,
    routes: Mutex<HashMap<String, RouteTopology>>,
    vehicles: Mutex<HashMap<String, VehicleState>>,
    registry: TopicRegistry,
    tracker: ConnectionTracker,
    queue: DeliveryQueue,
    dispatcher: DeliveryDispatcher,
    store: Arc<dyn DurableStore>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl BroadcastCoordinator {
    pub fn new(
        config: BrokerConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn DurableStore>,
        metrics: Arc<dyn MetricsSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let policy = RetryPolicy::from(&config);
        let timeout = std::time::Duration::from_millis(config.delivery_timeout_ms);
        Self {
            registry: TopicRegistry::new(clock.clone()),
            tracker: ConnectionTracker::new(clock.clone(), config.latency_smoothing),
            queue: DeliveryQueue::new(policy, clock.clone(), metrics.clone()),
            dispatcher: DeliveryDispatcher::new(transport, timeout),
            config,
            routes: Mutex::new(HashMap::new()),
            vehicles: Mutex::new(HashMap::new()),
            store,
            metrics,
            clock,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Current instant from the injected clock.
    pub fn clock_now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Validates and registers a route, creating its topic. Re-registering a
    /// route replaces its topology and keeps existing subscribers.
    pub async fn register_route(&self, route: RouteTopology) -> Result<(), BroadcastError> {
        route.validate()?;
        self.registry.ensure_topic(&route.route_id).await;
        let mut routes = self.routes.lock().await;
        routes.insert(route.route_id.clone(), route);
        Ok(())
    }

    /// Loads routes and vehicle snapshots from the durable store. Returns the
    /// number of routes and vehicles loaded.
    pub async fn load_from_store(&self) -> Result<(usize, usize), BroadcastError> {
        let routes = self
            .store
            .load_routes()
            .await
            .map_err(|err| BroadcastError::Store(err.to_string()))?;
        let route_count = routes.len();
        for route in routes {
            self.register_route(route).await?;
        }

        let vehicles = self
            .store
            .load_vehicles()
            .await
            .map_err(|err| BroadcastError::Store(err.to_string()))?;
        let vehicle_count = vehicles.len();
        let mut map = self.vehicles.lock().await;
        for vehicle in vehicles {
            map.insert(vehicle.vehicle_id.clone(), vehicle);
        }
        Ok((route_count, vehicle_count))
    }

    /// Starts (or restarts) a driving session, assigning the vehicle to a
    /// registered route and marking it active. A vehicle seen for the first
    /// time starts at the route's first stop.
    pub async fn start_session(
        &self,
        vehicle_id: &str,
        route_id: &str,
    ) -> Result<(), BroadcastError> {
        let origin = {
            let routes = self.routes.lock().await;
            let route = routes.get(route_id).ok_or_else(|| {
                BroadcastError::Validation(format!("route '{route_id}' is not registered"))
            })?;
            route
                .stops
                .first()
                .map(|stop| stop.position)
                .ok_or_else(|| {
                    BroadcastError::Validation(format!("route '{route_id}' has no stops"))
                })?
        };

        let now = self.clock.now();
        let mut vehicles = self.vehicles.lock().await;
        let vehicle = vehicles
            .entry(vehicle_id.to_string())
            .or_insert_with(|| VehicleState {
                vehicle_id: vehicle_id.to_string(),
                route_id: None,
                position: origin,
                status: VehicleStatus::Inactive,
                occupancy: 0,
                capacity: self.config.synthesizer.default_capacity,
                last_update: now,
            });
        if vehicle.status == VehicleStatus::Maintenance {
            return Err(BroadcastError::StateConflict(format!(
                "vehicle '{vehicle_id}' is in maintenance"
            )));
        }
        vehicle.status = VehicleStatus::Active;
        vehicle.route_id = Some(route_id.to_string());
        vehicle.last_update = now;
        info!(
            event = events::SESSION_START,
            component = COMPONENT,
            vehicle_id,
            route_id,
            "session started"
        );
        Ok(())
    }

    /// Ends an active session. Ending a session that is not active is a state
    /// conflict, not a silent no-op.
    pub async fn end_session(&self, vehicle_id: &str) -> Result<(), BroadcastError> {
        let now = self.clock.now();
        let mut vehicles = self.vehicles.lock().await;
        let vehicle = vehicles.get_mut(vehicle_id).ok_or_else(|| {
            BroadcastError::Validation(format!("vehicle '{vehicle_id}' is unknown"))
        })?;
        if vehicle.status != VehicleStatus::Active {
            return Err(BroadcastError::StateConflict(format!(
                "vehicle '{vehicle_id}' has no active session"
            )));
        }
        vehicle.status = VehicleStatus::Inactive;
        vehicle.last_update = now;
        info!(
            event = events::SESSION_END,
            component = COMPONENT,
            vehicle_id,
            "session ended"
        );
        Ok(())
    }

    /// Toggles the maintenance flag. Clearing it returns a vehicle that was
    /// in maintenance to active service; clearing it on any other status is a
    /// no-op, so a session can only start through [`Self::start_session`].
    pub async fn set_maintenance(
        &self,
        vehicle_id: &str,
        maintenance: bool,
    ) -> Result<(), BroadcastError> {
        let now = self.clock.now();
        let mut vehicles = self.vehicles.lock().await;
        let vehicle = vehicles.get_mut(vehicle_id).ok_or_else(|| {
            BroadcastError::Validation(format!("vehicle '{vehicle_id}' is unknown"))
        })?;
        vehicle.status = match (maintenance, vehicle.status) {
            (true, _) => VehicleStatus::Maintenance,
            (false, VehicleStatus::Maintenance) => VehicleStatus::Active,
            (false, status) => status,
        };
        vehicle.last_update = now;
        info!(
            event = events::MAINTENANCE_TOGGLE,
            component = COMPONENT,
            vehicle_id,
            maintenance,
            "maintenance flag toggled"
        );
        Ok(())
    }

    /// Accepts, enriches and broadcasts one vehicle update.
    ///
    /// The update is validated against the position invariants and the session
    /// state machine, enriched with bearing, progress and crowd level, applied
    /// to the in-memory vehicle state, persisted best-effort, then fanned out
    /// to every subscriber of the route topic. Emergency-flagged updates are
    /// delivered at high priority.
    pub async fn submit_update(
        &self,
        request: VehicleUpdateRequest,
    ) -> Result<BroadcastOutcome, BroadcastError> {
        debug!(
            event = events::BROADCAST_START,
            component = COMPONENT,
            vehicle_id = request.vehicle_id.as_str(),
            "update received"
        );
        if let Err(err) = request.position.validate() {
            warn!(
                event = events::UPDATE_REJECTED,
                component = COMPONENT,
                vehicle_id = request.vehicle_id.as_str(),
                err = %err,
                "update rejected"
            );
            return Err(err);
        }

        let now = self.clock.now();
        // Apply to the session state under the vehicles lock, then release it
        // before any I/O.
        let (route_id, occupancy, status) = {
            let mut vehicles = self.vehicles.lock().await;
            let vehicle = vehicles.get_mut(&request.vehicle_id).ok_or_else(|| {
                BroadcastError::Validation(format!(
                    "vehicle '{}' is unknown",
                    request.vehicle_id
                ))
            })?;
            if vehicle.status != VehicleStatus::Active {
                warn!(
                    event = events::UPDATE_REJECTED,
                    component = COMPONENT,
                    vehicle_id = request.vehicle_id.as_str(),
                    "update rejected: no active session"
                );
                return Err(BroadcastError::StateConflict(format!(
                    "vehicle '{}' has no active session",
                    request.vehicle_id
                )));
            }
            let route_id = vehicle.route_id.clone().ok_or_else(|| {
                BroadcastError::StateConflict(format!(
                    "vehicle '{}' has no route assignment",
                    request.vehicle_id
                ))
            })?;
            if let Some(occupancy) = request.occupancy {
                if occupancy > vehicle.capacity {
                    warn!(
                        event = events::UPDATE_REJECTED,
                        component = COMPONENT,
                        vehicle_id = request.vehicle_id.as_str(),
                        occupancy,
                        capacity = vehicle.capacity,
                        "update rejected: occupancy exceeds capacity"
                    );
                    return Err(BroadcastError::Validation(format!(
                        "occupancy {occupancy} exceeds capacity {} for vehicle '{}'",
                        vehicle.capacity, request.vehicle_id
                    )));
                }
                vehicle.occupancy = occupancy;
            }
            vehicle.position = request.position;
            vehicle.last_update = now;
            (route_id, vehicle.occupancy, vehicle.status)
        };

        let (bearing, progress) = {
            let routes = self.routes.lock().await;
            match routes.get(&route_id) {
                Some(route) => {
                    let bearing = geo::nearest_stop(&request.position, &route.stops)
                        .and_then(|nearest| {
                            route
                                .stops
                                .get(nearest.sequence as usize)
                                .map(|next| geo::bearing_deg(&request.position, &next.position))
                        });
                    (bearing, Some(geo::route_progress(&request.position, route)))
                }
                None => (None, None),
            }
        };

        if let Err(err) = self
            .store
            .persist_vehicle_position(
                &request.vehicle_id,
                &request.position,
                Some(&route_id),
                Some(status),
            )
            .await
        {
            // Broadcast continuity outranks durability for position samples.
            warn!(
                event = events::POSITION_PERSIST_FAILED,
                component = COMPONENT,
                vehicle_id = request.vehicle_id.as_str(),
                err = %err,
                "position not persisted"
            );
        }

        let update = VehicleUpdate {
            vehicle_id: request.vehicle_id.clone(),
            route_id: route_id.clone(),
            originator_id: request.originator_id,
            position: request.position,
            speed_kmh: request.position.speed_kmh,
            heading_deg: request.position.heading_deg,
            occupancy,
            crowd_level: self.config.crowd_thresholds.classify(f64::from(occupancy)),
            bearing_deg: bearing,
            progress,
            timestamp: request.position.timestamp,
            metadata: request.metadata,
        };
        let priority = if update.is_emergency() {
            Priority::High
        } else {
            Priority::Normal
        };
        let envelope = Envelope::vehicle_update(update);

        let topic = crate::routing::topic_name_for_route(&route_id);
        let subscribers = self.registry.subscribers_of(&route_id).await;
        let mut delivered_to = Vec::new();
        let mut queued_for = Vec::new();
        for client_id in subscribers {
            if self
                .deliver_or_queue(&client_id, &envelope, priority, &topic)
                .await
            {
                delivered_to.push(client_id);
            } else {
                queued_for.push(client_id);
            }
        }

        self.metrics.record(PerfMetric::new(
            MetricKind::Throughput,
            "broadcast",
            1.0,
            "envelopes",
            now,
        ));
        info!(
            event = events::BROADCAST_OK,
            component = COMPONENT,
            vehicle_id = request.vehicle_id.as_str(),
            route_id = route_id.as_str(),
            delivered = delivered_to.len(),
            queued = queued_for.len(),
            "update broadcast"
        );
        Ok(BroadcastOutcome {
            envelope,
            delivered_to,
            queued_for,
        })
    }

    /// Handles a client report. Subscription-control reports mutate the topic
    /// registry; all other kinds are persisted and, when they name a route,
    /// fanned out at low priority to the route's other subscribers.
    pub async fn handle_report(&self, report: ClientReport) -> Result<(), BroadcastError> {
        if report.kind.is_subscription_control() {
            let route_id = report.route_id.as_deref().ok_or_else(|| {
                BroadcastError::Validation("subscription control requires a route id".into())
            })?;
            if report.kind == crate::envelope::ReportKind::Subscribe {
                self.registry.subscribe(route_id, &report.reporter_id).await;
            } else {
                self.registry
                    .unsubscribe(route_id, &report.reporter_id)
                    .await;
            }
            return Ok(());
        }

        self.store.append_report(&report).await.map_err(|err| {
            warn!(
                event = events::REPORT_STORE_FAILED,
                component = COMPONENT,
                reporter_id = report.reporter_id.as_str(),
                err = %err,
                "report not stored"
            );
            BroadcastError::Store(err.to_string())
        })?;
        debug!(
            event = events::REPORT_STORED,
            component = COMPONENT,
            reporter_id = report.reporter_id.as_str(),
            "report stored"
        );

        if let Some(route_id) = report.route_id.clone() {
            let reporter_id = report.reporter_id.clone();
            let topic = crate::routing::topic_name_for_route(&route_id);
            let envelope = Envelope::client_report(report);
            for client_id in self.registry.subscribers_of(&route_id).await {
                if client_id == reporter_id {
                    continue;
                }
                self.deliver_or_queue(&client_id, &envelope, Priority::Low, &topic)
                    .await;
            }
        }
        Ok(())
    }

    /// Marks a client connected and flushes its backlog in priority order.
    /// Returns the number of envelopes delivered from the backlog.
    pub async fn client_connected(&self, client_id: &str) -> usize {
        self.tracker.on_connect(client_id).await;
        let now = self.clock.now();
        let mut delivered = 0;
        for entry in self.queue.drain_for(client_id).await {
            if self.attempt(&entry.client_id, &entry.envelope).await {
                delivered += 1;
            } else {
                self.queue.fail_attempt(entry, now).await;
            }
        }
        self.record_connection_count().await;
        delivered
    }

    pub async fn client_disconnected(&self, client_id: &str) {
        self.tracker.on_disconnect(client_id).await;
        self.record_connection_count().await;
    }

    /// Subscribes a client to a route topic directly, outside the report path.
    pub async fn subscribe(&self, route_id: &str, client_id: &str) -> bool {
        self.registry.subscribe(route_id, client_id).await
    }

    pub async fn unsubscribe(&self, route_id: &str, client_id: &str) -> bool {
        self.registry.unsubscribe(route_id, client_id).await
    }

    /// One pass over the delivery queue: claims due entries, retries the ones
    /// whose targets are connected, reschedules or drops the rest.
    pub async fn retry_tick(&self) -> RetryTickSummary {
        let now = self.clock.now();
        let report = self.queue.tick(now, &self.tracker).await;
        let mut summary = RetryTickSummary {
            attempted: report.attempts.len(),
            requeued: report.requeued,
            dropped: report.dropped,
            ..RetryTickSummary::default()
        };
        for entry in report.attempts {
            if self.attempt(&entry.client_id, &entry.envelope).await {
                summary.delivered += 1;
            } else if let RetryOutcome::Dropped = self.queue.fail_attempt(entry, now).await {
                summary.dropped += 1;
            } else {
                summary.requeued += 1;
            }
        }
        self.metrics.record(PerfMetric::new(
            MetricKind::QueueSize,
            "retry_tick",
            self.queue.depth().await as f64,
            "envelopes",
            now,
        ));
        debug!(
            event = events::RETRY_TICK,
            component = COMPONENT,
            attempted = summary.attempted,
            delivered = summary.delivered,
            requeued = summary.requeued,
            dropped = summary.dropped,
            "retry pass complete"
        );
        summary
    }

    /// Traffic-adjusted ETA from a vehicle's current position to a stop on
    /// its route.
    pub async fn eta_to_stop(
        &self,
        vehicle_id: &str,
        stop_id: &str,
    ) -> Result<Duration, BroadcastError> {
        let (position, route_id) = {
            let vehicles = self.vehicles.lock().await;
            let vehicle = vehicles.get(vehicle_id).ok_or_else(|| {
                BroadcastError::Validation(format!("vehicle '{vehicle_id}' is unknown"))
            })?;
            let route_id = vehicle.route_id.clone().ok_or_else(|| {
                BroadcastError::StateConflict(format!(
                    "vehicle '{vehicle_id}' has no route assignment"
                ))
            })?;
            (vehicle.position, route_id)
        };
        let routes = self.routes.lock().await;
        let route = routes.get(&route_id).ok_or_else(|| {
            BroadcastError::Validation(format!("route '{route_id}' is not registered"))
        })?;

        let nominal = position
            .speed_kmh
            .filter(|speed| *speed > 0.0)
            .unwrap_or(self.config.default_speed_kmh);
        let effective = nominal * geo::traffic_factor(self.clock.now(), &self.config.traffic);
        geo::eta_to_stop(
            &position,
            stop_id,
            route,
            effective,
            self.config.dwell_minutes_per_stop,
        )
    }

    /// Aggregate metrics over the vehicles currently assigned to a route.
    pub async fn metrics_for_route(&self, route_id: &str) -> geo::RouteMetrics {
        let vehicles = self.vehicles.lock().await;
        let on_route: Vec<crate::model::VehicleState> = vehicles
            .values()
            .filter(|vehicle| vehicle.route_id.as_deref() == Some(route_id))
            .cloned()
            .collect();
        geo::route_metrics(&on_route, &self.config.crowd_thresholds)
    }

    /// Snapshot of every vehicle with an active session.
    pub async fn active_vehicles(&self) -> Vec<VehicleState> {
        let vehicles = self.vehicles.lock().await;
        vehicles
            .values()
            .filter(|vehicle| vehicle.is_active())
            .cloned()
            .collect()
    }

    pub async fn vehicle(&self, vehicle_id: &str) -> Option<VehicleState> {
        let vehicles = self.vehicles.lock().await;
        vehicles.get(vehicle_id).cloned()
    }

    pub async fn route(&self, route_id: &str) -> Option<RouteTopology> {
        let routes = self.routes.lock().await;
        routes.get(route_id).cloned()
    }

    pub async fn queue_depth(&self) -> usize {
        self.queue.depth().await
    }

    /// Connection bookkeeping for one client, if it was ever seen.
    pub async fn client_stats(&self, client_id: &str) -> Option<crate::control_plane::ConnectionState> {
        self.tracker.snapshot(client_id).await
    }

    pub async fn connected_clients(&self) -> usize {
        self.tracker.connected_count().await
    }

    /// Immediate delivery when the target is connected, queue otherwise.
    /// Returns `true` on immediate delivery. A failed immediate attempt
    /// queues the envelope and starts its retry ladder from zero.
    async fn deliver_or_queue(
        &self,
        client_id: &str,
        envelope: &Envelope,
        priority: Priority,
        topic: &str,
    ) -> bool {
        if self.tracker.is_connected(client_id).await && self.attempt(client_id, envelope).await {
            return true;
        }
        self.queue
            .enqueue(client_id, envelope.clone(), priority, Some(topic.to_string()))
            .await;
        false
    }

    /// One bounded delivery attempt with latency bookkeeping.
    async fn attempt(&self, client_id: &str, envelope: &Envelope) -> bool {
        let started = Instant::now();
        match self.dispatcher.deliver(client_id, envelope).await {
            Ok(()) => {
                let elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0;
                self.tracker.record_sent(client_id).await;
                self.tracker.record_received(client_id, elapsed_ms).await;
                self.metrics.record(PerfMetric::new(
                    MetricKind::Latency,
                    "deliver",
                    elapsed_ms,
                    "ms",
                    self.clock.now(),
                ));
                true
            }
            Err(_) => false,
        }
    }

    async fn record_connection_count(&self) {
        self.metrics.record(PerfMetric::new(
            MetricKind::ConnectionCount,
            "connections",
            self.tracker.connected_count().await as f64,
            "clients",
            self.clock.now(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::{BroadcastCoordinator, VehicleUpdateRequest};
    use crate::clock::ManualClock;
    use crate::config::BrokerConfig;
    use crate::envelope::{metadata_keys, Envelope, EnvelopeBody};
    use crate::error::BroadcastError;
    use crate::metrics::RecordingMetricsSink;
    use crate::model::{Position, RouteTopology, Stop, VehicleStatus};
    use crate::store::InMemoryStore;
    use crate::transport::{Transport, TransportError};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    struct RecordingTransport {
        sent: StdMutex<Vec<(String, Envelope)>>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(String, Envelope)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, client_id: &str, envelope: &Envelope) -> Result<(), TransportError> {
            self.sent
                .lock()
                .unwrap()
                .push((client_id.to_string(), envelope.clone()));
            Ok(())
        }
    }

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
    }

    fn route() -> RouteTopology {
        let stops = (0..3)
            .map(|i| Stop {
                stop_id: format!("s{}", i + 1),
                name: format!("Stop {}", i + 1),
                position: Position::new(52.50 + f64::from(i) * 0.008993, 13.40, ts()),
                sequence: i + 1,
                is_terminal: i == 0 || i == 2,
            })
            .collect();
        RouteTopology {
            route_id: "R1".into(),
            name: "Line 1".into(),
            stops,
            path: Vec::new(),
        }
    }

    fn fixture() -> (Arc<BroadcastCoordinator>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::new());
        let coordinator = Arc::new(BroadcastCoordinator::new(
            BrokerConfig::default(),
            transport.clone(),
            Arc::new(InMemoryStore::new()),
            Arc::new(RecordingMetricsSink::new()),
            Arc::new(ManualClock::new(ts())),
        ));
        (coordinator, transport)
    }

    fn request(vehicle_id: &str) -> VehicleUpdateRequest {
        VehicleUpdateRequest {
            vehicle_id: vehicle_id.into(),
            originator_id: "driver-1".into(),
            // Nearest to the middle stop, so progress lands strictly inside
            // (0,1) and a next stop exists for the bearing.
            position: Position::new(52.508, 13.40, ts()).with_motion(30.0, 0.0),
            occupancy: Some(12),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn update_without_session_is_a_state_conflict() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();

        let err = coordinator.submit_update(request("v1")).await.unwrap_err();
        assert!(matches!(err, BroadcastError::Validation(_)));

        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.end_session("v1").await.unwrap();
        let err = coordinator.submit_update(request("v1")).await.unwrap_err();
        assert!(matches!(err, BroadcastError::StateConflict(_)));
    }

    #[tokio::test]
    async fn maintenance_blocks_sessions_until_cleared() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.set_maintenance("v1", true).await.unwrap();

        assert!(matches!(
            coordinator.start_session("v1", "R1").await,
            Err(BroadcastError::StateConflict(_))
        ));

        coordinator.set_maintenance("v1", false).await.unwrap();
        let vehicle = coordinator.vehicle("v1").await.unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Active);
        assert!(coordinator.submit_update(request("v1")).await.is_ok());
    }

    #[tokio::test]
    async fn clearing_maintenance_on_an_idle_vehicle_starts_no_session() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.end_session("v1").await.unwrap();

        coordinator.set_maintenance("v1", false).await.unwrap();
        let vehicle = coordinator.vehicle("v1").await.unwrap();
        assert_eq!(vehicle.status, VehicleStatus::Inactive);
        assert!(matches!(
            coordinator.submit_update(request("v1")).await,
            Err(BroadcastError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn over_capacity_occupancy_is_rejected() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.submit_update(request("v1")).await.unwrap();

        // Default capacity is 40; a count above it never reaches the state.
        let mut overloaded = request("v1");
        overloaded.occupancy = Some(1_000);
        assert!(matches!(
            coordinator.submit_update(overloaded).await,
            Err(BroadcastError::Validation(_))
        ));
        let vehicle = coordinator.vehicle("v1").await.unwrap();
        assert_eq!(vehicle.occupancy, 12);
    }

    #[tokio::test]
    async fn ending_an_inactive_session_conflicts() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.end_session("v1").await.unwrap();
        assert!(matches!(
            coordinator.end_session("v1").await,
            Err(BroadcastError::StateConflict(_))
        ));
    }

    #[tokio::test]
    async fn updates_are_enriched_before_fanout() {
        let (coordinator, transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.subscribe("R1", "rider-1").await;
        coordinator.client_connected("rider-1").await;

        let outcome = coordinator.submit_update(request("v1")).await.unwrap();
        assert_eq!(outcome.delivered_to, vec!["rider-1".to_string()]);
        assert!(outcome.queued_for.is_empty());

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        let EnvelopeBody::VehicleUpdate(update) = &sent[0].1.body else {
            panic!("expected a vehicle update");
        };
        assert!(update.bearing_deg.is_some());
        let progress = update.progress.unwrap();
        assert!(progress > 0.0 && progress < 1.0, "got {progress}");
    }

    #[tokio::test]
    async fn disconnected_subscribers_get_queued_deliveries() {
        let (coordinator, transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.subscribe("R1", "rider-1").await;

        let outcome = coordinator.submit_update(request("v1")).await.unwrap();
        assert_eq!(outcome.queued_for, vec!["rider-1".to_string()]);
        assert!(transport.sent().is_empty());
        assert_eq!(coordinator.queue_depth().await, 1);

        let flushed = coordinator.client_connected("rider-1").await;
        assert_eq!(flushed, 1);
        assert_eq!(coordinator.queue_depth().await, 0);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn emergency_updates_flush_ahead_of_earlier_normal_ones() {
        let (coordinator, transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.subscribe("R1", "rider-1").await;

        // Queue a normal update first, then an emergency one.
        coordinator.submit_update(request("v1")).await.unwrap();
        let mut emergency = request("v1");
        emergency
            .metadata
            .insert(metadata_keys::EMERGENCY.into(), serde_json::json!(true));
        let outcome = coordinator.submit_update(emergency).await.unwrap();
        let emergency_id = outcome.envelope.id;

        let flushed = coordinator.client_connected("rider-1").await;
        assert_eq!(flushed, 2);
        let sent = transport.sent();
        assert_eq!(sent[0].1.id, emergency_id);
    }

    #[tokio::test]
    async fn eta_uses_traffic_adjusted_speed() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.submit_update(request("v1")).await.unwrap();

        // Weekday 08:00, rush hour: effective speed 30 * 0.6 = 18 km/h.
        let eta = coordinator.eta_to_stop("v1", "s3").await.unwrap();
        assert!(eta.num_seconds() > 0);
        assert!(coordinator.eta_to_stop("v1", "s9").await.is_err());
    }

    #[tokio::test]
    async fn route_metrics_cover_assigned_vehicles() {
        let (coordinator, _transport) = fixture();
        coordinator.register_route(route()).await.unwrap();
        coordinator.start_session("v1", "R1").await.unwrap();
        coordinator.start_session("v2", "R1").await.unwrap();
        coordinator.submit_update(request("v1")).await.unwrap();

        let metrics = coordinator.metrics_for_route("R1").await;
        assert_eq!(metrics.active_vehicles, 2);
        assert_eq!(metrics.mean_speed_kmh, 30.0);
        assert_eq!(coordinator.active_vehicles().await.len(), 2);
    }
}
