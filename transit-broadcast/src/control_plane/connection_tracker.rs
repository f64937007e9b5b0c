//! Per-client connectivity and delivery-performance tracking.

use crate::clock::Clock;
use crate::observability::events;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const COMPONENT: &str = "connection_tracker";

/// Connectivity snapshot for one client. Mutated only by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub client_id: String,
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Exponential moving average of observed delivery latency, milliseconds.
    pub avg_latency_ms: f64,
}

impl ConnectionState {
    fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            connected: false,
            connected_at: None,
            disconnected_at: None,
            messages_sent: 0,
            messages_received: 0,
            avg_latency_ms: 0.0,
        }
    }

    /// Time connected: `now - connected_at` while connected, the closed
    /// interval once disconnected, absent when the client never connected.
    pub fn connection_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let connected_at = self.connected_at?;
        if self.connected {
            Some(now - connected_at)
        } else {
            self.disconnected_at.map(|end| end - connected_at)
        }
    }
}

/// Tracker owning all per-client connection state.
pub struct ConnectionTracker {
    states: Mutex<HashMap<String, ConnectionState>>,
    clock: Arc<dyn Clock>,
    /// EMA smoothing factor in (0,1]; higher weighs recent samples more.
    smoothing: f64,
}

impl ConnectionTracker {
    pub fn new(clock: Arc<dyn Clock>, smoothing: f64) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            clock,
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
        }
    }

    pub async fn on_connect(&self, client_id: &str) {
        let now = self.clock.now();
        let mut states = self.states.lock().await;
        let state = states
            .entry(client_id.to_string())
            .or_insert_with(|| ConnectionState::new(client_id));
        state.connected = true;
        state.connected_at = Some(now);
        state.disconnected_at = None;
        debug!(
            event = events::CLIENT_CONNECTED,
            component = COMPONENT,
            client_id,
            "client connected"
        );
    }

    pub async fn on_disconnect(&self, client_id: &str) {
        let now = self.clock.now();
        let mut states = self.states.lock().await;
        let state = states
            .entry(client_id.to_string())
            .or_insert_with(|| ConnectionState::new(client_id));
        state.connected = false;
        state.disconnected_at = Some(now);
        debug!(
            event = events::CLIENT_DISCONNECTED,
            component = COMPONENT,
            client_id,
            "client disconnected"
        );
    }

    pub async fn record_sent(&self, client_id: &str) {
        let mut states = self.states.lock().await;
        let state = states
            .entry(client_id.to_string())
            .or_insert_with(|| ConnectionState::new(client_id));
        state.messages_sent += 1;
    }

    /// Records a delivery observation and folds its latency into the EMA.
    /// The first sample seeds the average directly.
    pub async fn record_received(&self, client_id: &str, latency_ms: f64) {
        let mut states = self.states.lock().await;
        let state = states
            .entry(client_id.to_string())
            .or_insert_with(|| ConnectionState::new(client_id));
        state.messages_received += 1;
        state.avg_latency_ms = if state.messages_received == 1 {
            latency_ms
        } else {
            self.smoothing * latency_ms + (1.0 - self.smoothing) * state.avg_latency_ms
        };
    }

    /// Unknown clients are simply not connected; this is not an error.
    pub async fn is_connected(&self, client_id: &str) -> bool {
        let states = self.states.lock().await;
        states
            .get(client_id)
            .map(|state| state.connected)
            .unwrap_or(false)
    }

    pub async fn snapshot(&self, client_id: &str) -> Option<ConnectionState> {
        let states = self.states.lock().await;
        states.get(client_id).cloned()
    }

    pub async fn connected_count(&self) -> usize {
        let states = self.states.lock().await;
        states.values().filter(|state| state.connected).count()
    }
}
