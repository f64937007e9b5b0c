//! Delivery mechanics: the offline-tolerant queue, retry backoff, and the
//! timeout-bounded per-client dispatcher.

mod backoff;
mod delivery_queue;
mod dispatcher;

pub use backoff::backoff_ms;
pub use delivery_queue::{
    DeliveryQueue, Priority, QueuedEnvelope, RetryOutcome, RetryPolicy, TickReport,
};
pub(crate) use dispatcher::DeliveryDispatcher;
