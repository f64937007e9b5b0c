//! Offline-tolerant delivery queue with priority tiers, exponential retry
//! backoff and a hard retry ceiling.

use crate::clock::Clock;
use crate::control_plane::ConnectionTracker;
use crate::data_plane::backoff_ms;
use crate::envelope::Envelope;
use crate::metrics::{MetricKind, MetricsSink, PerfMetric};
use crate::observability::{events, fields};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const COMPONENT: &str = "delivery_queue";

/// Delivery priority tier. Drains ahead of lower tiers regardless of age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

/// An envelope parked for a client that could not receive it immediately.
/// Retries replace the entry with a copy; a partially-delivered duplicate is
/// never observable as the canonical queued item.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEnvelope {
    pub envelope: Envelope,
    pub client_id: String,
    pub target_topic: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub retry_count: u8,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub priority: Priority,
    /// Enqueue ordinal, preserved across retries to keep FIFO order within a
    /// priority tier.
    seq: u64,
}

impl QueuedEnvelope {
    /// Queue residence time, exposed for eviction policies. The default
    /// policy is retry-count based, not age based.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.queued_at
    }

    fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now)
    }

    fn retry_copy(&self, now: DateTime<Utc>, policy: &RetryPolicy) -> Self {
        let window = backoff_ms(
            policy.backoff_base_ms,
            policy.backoff_cap_ms,
            self.retry_count,
        );
        let mut copy = self.clone();
        copy.retry_count += 1;
        copy.next_retry_at = Some(now + Duration::milliseconds(window as i64));
        copy
    }
}

/// Retry shape applied by the queue.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retry_count: u8,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl From<&crate::config::BrokerConfig> for RetryPolicy {
    fn from(config: &crate::config::BrokerConfig) -> Self {
        Self {
            max_retry_count: config.max_retry_count,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
        }
    }
}

/// Outcome of feeding a failed delivery attempt back into the queue.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Requeued(QueuedEnvelope),
    Dropped,
}

/// Summary of one retry pass.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Due entries whose target is connected, claimed for a delivery attempt.
    /// Claimed entries are already removed from the queue; the caller either
    /// delivers them or feeds them back through [`DeliveryQueue::fail_attempt`].
    pub attempts: Vec<QueuedEnvelope>,
    pub requeued: usize,
    pub dropped: usize,
}

struct QueueInner {
    pending: HashMap<String, Vec<QueuedEnvelope>>,
    next_seq: u64,
}

/// Pending-envelope owner. All claim and requeue operations happen under one
/// lock, so a given entry is claimed exactly once even when `tick` and
/// `drain_for` race for the same client.
pub struct DeliveryQueue {
    inner: Mutex<QueueInner>,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
}

impl DeliveryQueue {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                pending: HashMap::new(),
                next_seq: 0,
            }),
            policy,
            clock,
            metrics,
        }
    }

    /// Parks an envelope for later delivery and returns a copy of the entry.
    pub async fn enqueue(
        &self,
        client_id: &str,
        envelope: Envelope,
        priority: Priority,
        target_topic: Option<String>,
    ) -> QueuedEnvelope {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let entry = QueuedEnvelope {
            envelope,
            client_id: client_id.to_string(),
            target_topic,
            queued_at: now,
            retry_count: 0,
            next_retry_at: None,
            priority,
            seq,
        };
        debug!(
            event = events::QUEUE_ENQUEUE,
            component = COMPONENT,
            client_id,
            priority = priority.as_str(),
            envelope_id = %entry.envelope.id,
            "envelope queued"
        );
        inner
            .pending
            .entry(client_id.to_string())
            .or_default()
            .push(entry.clone());

        let depth: usize = inner.pending.values().map(Vec::len).sum();
        self.metrics.record(PerfMetric::new(
            MetricKind::QueueSize,
            "enqueue",
            depth as f64,
            "envelopes",
            now,
        ));
        entry
    }

    /// Removes and returns everything addressed to a now-connected client,
    /// ordered by priority tier and FIFO within a tier.
    pub async fn drain_for(&self, client_id: &str) -> Vec<QueuedEnvelope> {
        let mut inner = self.inner.lock().await;
        let mut drained = inner.pending.remove(client_id).unwrap_or_default();
        drained.sort_by_key(|entry| (entry.priority.rank(), entry.seq));
        if !drained.is_empty() {
            debug!(
                event = events::QUEUE_DRAIN,
                component = COMPONENT,
                client_id,
                drained = drained.len(),
                "queue drained"
            );
        }
        drained
    }

    /// One retry pass over every due entry.
    ///
    /// Entries at the retry ceiling are dropped with a drop-rate metric, the
    /// sole path by which a message is permanently lost. Due entries for
    /// still-disconnected targets are replaced by backoff-scheduled retry
    /// copies. Due entries for connected targets are claimed and handed back
    /// for a delivery attempt.
    pub async fn tick(&self, now: DateTime<Utc>, tracker: &ConnectionTracker) -> TickReport {
        let client_ids: Vec<String> = {
            let inner = self.inner.lock().await;
            inner.pending.keys().cloned().collect()
        };
        let mut connected = HashSet::new();
        for client_id in &client_ids {
            if tracker.is_connected(client_id).await {
                connected.insert(client_id.clone());
            }
        }

        let mut report = TickReport::default();
        let mut inner = self.inner.lock().await;
        for client_id in client_ids {
            let Some(entries) = inner.pending.remove(&client_id) else {
                continue;
            };
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries {
                if !entry.is_due(now) {
                    kept.push(entry);
                } else if entry.retry_count >= self.policy.max_retry_count {
                    self.report_drop(&entry, now);
                    report.dropped += 1;
                } else if connected.contains(&client_id) {
                    report.attempts.push(entry);
                } else {
                    debug!(
                        event = events::QUEUE_RETRY_REQUEUE,
                        component = COMPONENT,
                        client_id = client_id.as_str(),
                        retry_count = entry.retry_count + 1,
                        envelope_id = %entry.envelope.id,
                        "retry scheduled for disconnected client"
                    );
                    kept.push(entry.retry_copy(now, &self.policy));
                    report.requeued += 1;
                }
            }
            if !kept.is_empty() {
                inner.pending.insert(client_id, kept);
            }
        }
        report
    }

    /// Feeds a claimed-but-undelivered entry back into the queue: a retry
    /// copy below the ceiling, a reported drop at it.
    pub async fn fail_attempt(&self, entry: QueuedEnvelope, now: DateTime<Utc>) -> RetryOutcome {
        if entry.retry_count >= self.policy.max_retry_count {
            self.report_drop(&entry, now);
            return RetryOutcome::Dropped;
        }
        let copy = entry.retry_copy(now, &self.policy);
        let mut inner = self.inner.lock().await;
        inner
            .pending
            .entry(copy.client_id.clone())
            .or_default()
            .push(copy.clone());
        RetryOutcome::Requeued(copy)
    }

    pub async fn depth(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.pending.values().map(Vec::len).sum()
    }

    pub async fn depth_for(&self, client_id: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.pending.get(client_id).map_or(0, Vec::len)
    }

    fn report_drop(&self, entry: &QueuedEnvelope, now: DateTime<Utc>) {
        warn!(
            event = events::QUEUE_RETRY_DROP,
            component = COMPONENT,
            client_id = entry.client_id.as_str(),
            retry_count = entry.retry_count,
            envelope_id = %entry.envelope.id,
            "retry ceiling exceeded, dropping envelope"
        );
        self.metrics.record(
            PerfMetric::new(
                MetricKind::DropRate,
                format!("deliver:{}", entry.client_id),
                1.0,
                "count",
                now,
            )
            .with_tag(fields::CLIENT_ID, entry.client_id.clone())
            .with_tag(fields::ENVELOPE_ID, fields::format_envelope_id(&entry.envelope)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{DeliveryQueue, Priority, RetryOutcome, RetryPolicy};
    use crate::clock::{Clock, ManualClock};
    use crate::control_plane::ConnectionTracker;
    use crate::envelope::{ClientReport, Envelope, ReportKind};
    use crate::metrics::{MetricKind, RecordingMetricsSink};
    use chrono::{Duration, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retry_count: 5,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 8_000,
        }
    }

    fn fixture() -> (
        DeliveryQueue,
        ConnectionTracker,
        Arc<ManualClock>,
        Arc<RecordingMetricsSink>,
    ) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        ));
        let metrics = Arc::new(RecordingMetricsSink::new());
        let queue = DeliveryQueue::new(policy(), clock.clone(), metrics.clone());
        let tracker = ConnectionTracker::new(clock.clone(), 0.2);
        (queue, tracker, clock, metrics)
    }

    fn envelope() -> Envelope {
        Envelope::client_report(ClientReport {
            reporter_id: "svc".into(),
            vehicle_id: None,
            route_id: Some("R1".into()),
            kind: ReportKind::DelayReport,
            payload: HashMap::new(),
            timestamp: Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap(),
        })
    }

    #[tokio::test]
    async fn drain_orders_by_priority_then_fifo() {
        let (queue, _tracker, _clock, _metrics) = fixture();

        queue
            .enqueue("c1", envelope(), Priority::Low, None)
            .await;
        queue
            .enqueue("c1", envelope(), Priority::High, None)
            .await;
        queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;
        queue
            .enqueue("c1", envelope(), Priority::High, None)
            .await;

        let drained = queue.drain_for("c1").await;
        let priorities: Vec<Priority> = drained.iter().map(|e| e.priority).collect();
        assert_eq!(
            priorities,
            vec![Priority::High, Priority::High, Priority::Normal, Priority::Low]
        );
        // FIFO within the High tier.
        assert!(drained[0].queued_at <= drained[1].queued_at);
        assert_eq!(queue.depth().await, 0);
    }

    #[tokio::test]
    async fn drain_for_unknown_client_is_empty() {
        let (queue, _tracker, _clock, _metrics) = fixture();
        assert!(queue.drain_for("nobody").await.is_empty());
    }

    #[tokio::test]
    async fn disconnected_entries_retry_with_growing_backoff() {
        let (queue, tracker, clock, _metrics) = fixture();
        queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;

        let report = queue.tick(clock.now(), &tracker).await;
        assert_eq!(report.requeued, 1);
        assert_eq!(report.dropped, 0);
        assert!(report.attempts.is_empty());

        // The retry copy is not due again before its backoff window passes.
        let report = queue.tick(clock.now(), &tracker).await;
        assert_eq!(report.requeued, 0);

        clock.advance(Duration::milliseconds(1_000));
        let report = queue.tick(clock.now(), &tracker).await;
        assert_eq!(report.requeued, 1);
        assert_eq!(queue.depth_for("c1").await, 1);
    }

    #[tokio::test]
    async fn retry_ceiling_drops_with_exactly_one_metric() {
        let (queue, tracker, clock, metrics) = fixture();
        queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;

        // Five bookkeeping retries, then the drop on the sixth due pass.
        for _ in 0..6 {
            queue.tick(clock.now(), &tracker).await;
            clock.advance(Duration::milliseconds(8_000));
        }

        assert_eq!(queue.depth().await, 0);
        assert_eq!(metrics.count_of(MetricKind::DropRate), 1);
        let drop = metrics
            .recorded()
            .into_iter()
            .find(|m| m.kind == MetricKind::DropRate)
            .unwrap();
        assert_eq!(drop.operation, "deliver:c1");
    }

    #[tokio::test]
    async fn connected_due_entries_are_claimed_for_attempts() {
        let (queue, tracker, clock, _metrics) = fixture();
        tracker.on_connect("c1").await;
        queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;

        let report = queue.tick(clock.now(), &tracker).await;
        assert_eq!(report.attempts.len(), 1);
        // Claim removed the entry; a concurrent drain sees nothing.
        assert!(queue.drain_for("c1").await.is_empty());
    }

    #[tokio::test]
    async fn fail_attempt_requeues_then_drops_at_ceiling() {
        let (queue, _tracker, clock, metrics) = fixture();
        queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;

        // fail_attempt takes claimed entries, so claim the fresh one first.
        let mut current = queue
            .drain_for("c1")
            .await
            .into_iter()
            .next()
            .unwrap();
        for expected_retry in 1..=5u8 {
            match queue.fail_attempt(current.clone(), clock.now()).await {
                RetryOutcome::Requeued(copy) => {
                    assert_eq!(copy.retry_count, expected_retry);
                    // Requeued copies stay claimable.
                    let drained = queue.drain_for("c1").await;
                    assert_eq!(drained.len(), 1);
                    current = drained.into_iter().next().unwrap();
                }
                RetryOutcome::Dropped => panic!("dropped before the ceiling"),
            }
        }

        assert_eq!(
            queue.fail_attempt(current, clock.now()).await,
            RetryOutcome::Dropped
        );
        assert_eq!(metrics.count_of(MetricKind::DropRate), 1);
    }

    #[tokio::test]
    async fn retry_pass_preserves_enqueue_order_within_tier() {
        let (queue, tracker, clock, _metrics) = fixture();
        let a = queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;
        let b = queue
            .enqueue("c1", envelope(), Priority::Normal, None)
            .await;

        // A retry pass rewrites both entries as backoff copies.
        queue.tick(clock.now(), &tracker).await;
        clock.advance(Duration::milliseconds(1_000));
        tracker.on_connect("c1").await;

        let report = queue.tick(clock.now(), &tracker).await;
        assert_eq!(report.attempts.len(), 2);
        let mut attempts = report.attempts;
        attempts.sort_by_key(|e| (e.priority as u8, e.queued_at));
        assert_eq!(attempts[0].envelope.id, a.envelope.id);
        assert_eq!(attempts[1].envelope.id, b.envelope.id);
    }
}
