//! Topic registry: the single owner of route-to-subscriber membership.

use crate::clock::Clock;
use crate::observability::events;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const COMPONENT: &str = "topic_registry";

/// Derives the canonical topic name for a route.
pub fn topic_name_for_route(route_id: &str) -> String {
    format!("route/{route_id}/updates")
}

/// One named channel. An empty subscriber set is a valid, inert state; topics
/// are created lazily and never destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub route_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub subscribers: HashSet<String>,
}

/// Mutex-guarded topic storage. Membership mutation and lookup are mutually
/// exclusive; every read hands out a point-in-time snapshot, never a live
/// reference into the map.
pub struct TopicRegistry {
    topics: Mutex<HashMap<String, Topic>>,
    clock: Arc<dyn Clock>,
}

impl TopicRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Idempotently creates the topic for a route and returns a snapshot.
    pub async fn ensure_topic(&self, route_id: &str) -> Topic {
        let mut topics = self.topics.lock().await;
        self.ensure_locked(&mut topics, route_id).clone()
    }

    /// Adds a subscriber, creating the topic on first use. Returns `true`
    /// when the client was not already a member.
    pub async fn subscribe(&self, route_id: &str, client_id: &str) -> bool {
        let mut topics = self.topics.lock().await;
        let topic = self.ensure_locked(&mut topics, route_id);
        let inserted = topic.subscribers.insert(client_id.to_string());
        if inserted {
            debug!(
                event = events::TOPIC_SUBSCRIBE,
                component = COMPONENT,
                route_id,
                client_id,
                subscribers = topic.subscribers.len(),
                "subscriber added"
            );
        }
        inserted
    }

    /// Removes a subscriber. Removing a non-member is a no-op, not an error;
    /// returns `true` only when a member was actually removed.
    pub async fn unsubscribe(&self, route_id: &str, client_id: &str) -> bool {
        let mut topics = self.topics.lock().await;
        let Some(topic) = topics.get_mut(route_id) else {
            return false;
        };
        let removed = topic.subscribers.remove(client_id);
        if removed {
            debug!(
                event = events::TOPIC_UNSUBSCRIBE,
                component = COMPONENT,
                route_id,
                client_id,
                subscribers = topic.subscribers.len(),
                "subscriber removed"
            );
        }
        removed
    }

    /// Snapshot of the subscriber set. An absent topic yields an empty set,
    /// never an error.
    pub async fn subscribers_of(&self, route_id: &str) -> HashSet<String> {
        let topics = self.topics.lock().await;
        topics
            .get(route_id)
            .map(|topic| topic.subscribers.clone())
            .unwrap_or_default()
    }

    pub async fn topic_count(&self) -> usize {
        self.topics.lock().await.len()
    }

    fn ensure_locked<'a>(
        &self,
        topics: &'a mut HashMap<String, Topic>,
        route_id: &str,
    ) -> &'a mut Topic {
        topics.entry(route_id.to_string()).or_insert_with(|| {
            debug!(
                event = events::TOPIC_CREATED,
                component = COMPONENT,
                route_id,
                "topic created"
            );
            Topic {
                route_id: route_id.to_string(),
                name: topic_name_for_route(route_id),
                created_at: self.clock.now(),
                subscribers: HashSet::new(),
            }
        })
    }
}
