//! Structured logging vocabulary. The library emits `tracing` events and never
//! installs a global subscriber; binaries own one-time subscriber setup.

pub mod events;
pub mod fields;
