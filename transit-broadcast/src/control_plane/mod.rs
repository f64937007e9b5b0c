//! Client connectivity state, the single source of truth consulted before
//! immediate-vs-queued delivery decisions.

mod connection_tracker;

pub use connection_tracker::{ConnectionState, ConnectionTracker};
