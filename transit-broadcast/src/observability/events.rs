//! Canonical structured event names used across `transit-broadcast`.

// Coordinator pipeline events.
pub const BROADCAST_START: &str = "broadcast_start";
pub const BROADCAST_OK: &str = "broadcast_ok";
pub const UPDATE_REJECTED: &str = "update_rejected";
pub const REPORT_STORED: &str = "report_stored";
pub const REPORT_STORE_FAILED: &str = "report_store_failed";
pub const POSITION_PERSIST_FAILED: &str = "position_persist_failed";

// Session and connection lifecycle events.
pub const SESSION_START: &str = "session_start";
pub const SESSION_END: &str = "session_end";
pub const MAINTENANCE_TOGGLE: &str = "maintenance_toggle";
pub const CLIENT_CONNECTED: &str = "client_connected";
pub const CLIENT_DISCONNECTED: &str = "client_disconnected";

// Topic registry events.
pub const TOPIC_CREATED: &str = "topic_created";
pub const TOPIC_SUBSCRIBE: &str = "topic_subscribe";
pub const TOPIC_UNSUBSCRIBE: &str = "topic_unsubscribe";

// Delivery and queue events.
pub const DELIVER_ATTEMPT: &str = "deliver_attempt";
pub const DELIVER_OK: &str = "deliver_ok";
pub const DELIVER_FAILED: &str = "deliver_failed";
pub const QUEUE_ENQUEUE: &str = "queue_enqueue";
pub const QUEUE_DRAIN: &str = "queue_drain";
pub const QUEUE_RETRY_REQUEUE: &str = "queue_retry_requeue";
pub const QUEUE_RETRY_DROP: &str = "queue_retry_drop";

// Scheduled runtime events.
pub const RETRY_TICK: &str = "retry_tick";
pub const RETRY_LOOP_STOPPED: &str = "retry_loop_stopped";
pub const SYNTH_TICK: &str = "synth_tick";
pub const SYNTH_LOOP_STOPPED: &str = "synth_loop_stopped";
