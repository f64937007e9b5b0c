//! Canonical structured field keys and value-format helpers.

use crate::envelope::{Envelope, EnvelopeBody};

pub const EVENT: &str = "event";
pub const COMPONENT: &str = "component";
pub const CLIENT_ID: &str = "client_id";
pub const VEHICLE_ID: &str = "vehicle_id";
pub const ROUTE_ID: &str = "route_id";
pub const ENVELOPE_ID: &str = "envelope_id";
pub const RETRY_COUNT: &str = "retry_count";
pub const PRIORITY: &str = "priority";
pub const REASON: &str = "reason";
pub const ERR: &str = "err";

pub const NONE: &str = "none";

/// Compact envelope id for correlation logs.
pub fn format_envelope_id(envelope: &Envelope) -> String {
    envelope.id.hyphenated().to_string()
}

/// Stable short name for the envelope payload kind.
pub fn format_envelope_kind(envelope: &Envelope) -> &'static str {
    match &envelope.body {
        EnvelopeBody::VehicleUpdate(_) => "vehicle_update",
        EnvelopeBody::ClientReport(_) => "client_report",
    }
}

/// Route label for log fields, `none` when the envelope names no route.
pub fn format_route(envelope: &Envelope) -> String {
    envelope
        .route_id()
        .map(str::to_string)
        .unwrap_or_else(|| NONE.to_string())
}
