//! Scheduled driving loops: the delivery-queue retry pass and the demo-mode
//! fleet synthesizer. Both run as plain tokio tasks cancelled through a
//! shared watch channel.

use crate::coordinator::BroadcastCoordinator;
use crate::observability::events;
use crate::synthesizer::FleetSynthesizer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const COMPONENT: &str = "runtime";

/// Handle over the spawned loops. Dropping it without calling
/// [`BrokerRuntime::shutdown`] aborts nothing; the loops stop when the
/// coordinator is dropped with them.
pub struct BrokerRuntime {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BrokerRuntime {
    /// Spawns the retry loop and, when `synthesizer_seed` is given, the
    /// synthesizer loop driving perturbed updates through the coordinator.
    pub fn start(
        coordinator: Arc<BroadcastCoordinator>,
        synthesizer_seed: Option<u64>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::new();

        handles.push(tokio::spawn(retry_loop(
            coordinator.clone(),
            shutdown_rx.clone(),
        )));
        if let Some(seed) = synthesizer_seed {
            let synthesizer =
                FleetSynthesizer::with_seed(coordinator.config().synthesizer.clone(), seed);
            handles.push(tokio::spawn(synthesizer_loop(
                coordinator,
                synthesizer,
                shutdown_rx,
            )));
        }

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signals both loops and waits for them to finish their current tick.
    pub async fn shutdown(self) {
        // Receivers may already be gone when the loops exited early.
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(component = COMPONENT, err = %err, "loop task panicked");
            }
        }
        info!(component = COMPONENT, "runtime stopped");
    }
}

async fn retry_loop(
    coordinator: Arc<BroadcastCoordinator>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker =
        tokio::time::interval(Duration::from_millis(coordinator.config().retry_tick_ms));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                coordinator.retry_tick().await;
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!(
        event = events::RETRY_LOOP_STOPPED,
        component = COMPONENT,
        "retry loop stopped"
    );
}

async fn synthesizer_loop(
    coordinator: Arc<BroadcastCoordinator>,
    mut synthesizer: FleetSynthesizer,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_millis(
        coordinator.config().synthesizer_tick_ms,
    ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let vehicles = coordinator.active_vehicles().await;
                let mut broadcast = 0usize;
                for vehicle in &vehicles {
                    let request = synthesizer.perturb(vehicle, coordinator.clock_now());
                    // A session may end between the snapshot and the submit.
                    match coordinator.submit_update(request).await {
                        Ok(_) => broadcast += 1,
                        Err(err) => {
                            debug!(
                                component = COMPONENT,
                                vehicle_id = vehicle.vehicle_id.as_str(),
                                err = %err,
                                "synthesized update not accepted"
                            );
                        }
                    }
                }
                debug!(
                    event = events::SYNTH_TICK,
                    component = COMPONENT,
                    vehicles = vehicles.len(),
                    broadcast,
                    "synthesizer tick"
                );
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
    info!(
        event = events::SYNTH_LOOP_STOPPED,
        component = COMPONENT,
        "synthesizer loop stopped"
    );
}
