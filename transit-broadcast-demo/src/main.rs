/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;

use crate::config::Config;
use async_trait::async_trait;
use clap::Parser;
use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use transit_broadcast::{
    BroadcastCoordinator, BrokerRuntime, Envelope, InMemoryStore, MetricKind,
    RecordingMetricsSink, SystemClock, Transport, TransportError,
};

#[derive(Parser)]
#[command()]
struct DemoArgs {
    #[arg(short, long, value_name = "FILE")]
    config: String,
}

/// Transport that logs every delivery instead of putting it on a wire.
struct LoggingTransport;

#[async_trait]
impl Transport for LoggingTransport {
    async fn send(&self, client_id: &str, envelope: &Envelope) -> Result<(), TransportError> {
        info!(
            client_id,
            envelope_id = %envelope.id,
            route_id = envelope.route_id().unwrap_or("-"),
            "delivered"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = tracing_subscriber::fmt::try_init();

    info!("Started transit-broadcast-demo");

    let args = DemoArgs::parse();
    let mut file = File::open(&args.config)
        .map_err(|e| format!("unable to open config file '{}': {e}", args.config))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)
        .map_err(|e| format!("unable to read config file: {e}"))?;
    let config: Config =
        json5::from_str(&contents).map_err(|e| format!("unable to parse config file: {e}"))?;

    let metrics = Arc::new(RecordingMetricsSink::new());
    let coordinator = Arc::new(BroadcastCoordinator::new(
        config.broker.clone(),
        Arc::new(LoggingTransport),
        Arc::new(InMemoryStore::new()),
        metrics.clone(),
        Arc::new(SystemClock),
    ));

    for route in &config.routes {
        coordinator.register_route(route.to_topology()).await?;
    }
    for vehicle in &config.demo.vehicles {
        coordinator
            .start_session(&vehicle.vehicle_id, &vehicle.route_id)
            .await?;
    }
    for rider in &config.demo.riders {
        coordinator.client_connected(&rider.client_id).await;
        coordinator
            .subscribe(&rider.route_id, &rider.client_id)
            .await;
    }
    info!(
        routes = config.routes.len(),
        vehicles = config.demo.vehicles.len(),
        riders = config.demo.riders.len(),
        "fleet loaded"
    );

    let runtime = BrokerRuntime::start(coordinator.clone(), Some(config.demo.synthesizer_seed));

    match config.demo.run_secs {
        Some(secs) => {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }
    runtime.shutdown().await;

    for route in &config.routes {
        let summary = coordinator.metrics_for_route(&route.route_id).await;
        info!(
            route_id = route.route_id.as_str(),
            active_vehicles = summary.active_vehicles,
            mean_speed_kmh = summary.mean_speed_kmh,
            total_occupancy = summary.total_occupancy,
            crowd_level = ?summary.crowd_level,
            "route summary"
        );
    }
    info!(
        broadcasts = metrics.count_of(MetricKind::Throughput),
        deliveries = metrics.count_of(MetricKind::Latency),
        drops = metrics.count_of(MetricKind::DropRate),
        queue_depth = coordinator.queue_depth().await,
        connected = coordinator.connected_clients().await,
        "demo finished"
    );
    Ok(())
}
