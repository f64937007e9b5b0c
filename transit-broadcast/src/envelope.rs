/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! The unit of delivery: an enriched vehicle update or a client report, plus
//! the process-unique id the queue and transports correlate on.

use crate::model::{CrowdLevel, Position};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Recognized metadata keys. Unknown keys are preserved opaquely and never
/// interpreted.
pub mod metadata_keys {
    /// Boolean flag elevating delivery priority for the carrying update.
    pub const EMERGENCY: &str = "emergency";
    /// Free-form operator note attached to an update.
    pub const NOTE: &str = "note";
    /// Identifier of the producing source, for example `synthesizer`.
    pub const SOURCE: &str = "source";
}

/// Enriched location broadcast for one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleUpdate {
    pub vehicle_id: String,
    pub route_id: String,
    /// Driver or producer the update originated from.
    pub originator_id: String,
    pub position: Position,
    pub speed_kmh: Option<f64>,
    pub heading_deg: Option<f64>,
    pub occupancy: u32,
    pub crowd_level: CrowdLevel,
    /// Bearing toward the next stop, attached by the derivation stage.
    pub bearing_deg: Option<f64>,
    /// Route progress in [0,1], attached by the derivation stage.
    pub progress: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl VehicleUpdate {
    /// True when the update carries a truthy emergency flag.
    pub fn is_emergency(&self) -> bool {
        self.metadata
            .get(metadata_keys::EMERGENCY)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

/// Kinds of client-originated reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    Boarding,
    Alighting,
    CrowdingReport,
    DelayReport,
    Feedback,
    Subscribe,
    Unsubscribe,
}

impl ReportKind {
    /// Subscribe and unsubscribe mutate the registry instead of being stored
    /// or broadcast.
    pub fn is_subscription_control(&self) -> bool {
        matches!(self, ReportKind::Subscribe | ReportKind::Unsubscribe)
    }
}

/// A rider- or operator-originated report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReport {
    pub reporter_id: String,
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
    pub kind: ReportKind,
    pub payload: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// Payload of an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EnvelopeBody {
    VehicleUpdate(VehicleUpdate),
    ClientReport(ClientReport),
}

/// Delivery unit wrapping one payload with a time-ordered, process-unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: Uuid,
    pub body: EnvelopeBody,
}

impl Envelope {
    pub fn vehicle_update(update: VehicleUpdate) -> Self {
        Self {
            id: Uuid::now_v7(),
            body: EnvelopeBody::VehicleUpdate(update),
        }
    }

    pub fn client_report(report: ClientReport) -> Self {
        Self {
            id: Uuid::now_v7(),
            body: EnvelopeBody::ClientReport(report),
        }
    }

    /// Route the envelope concerns, when one is named.
    pub fn route_id(&self) -> Option<&str> {
        match &self.body {
            EnvelopeBody::VehicleUpdate(update) => Some(update.route_id.as_str()),
            EnvelopeBody::ClientReport(report) => report.route_id.as_deref(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match &self.body {
            EnvelopeBody::VehicleUpdate(update) => update.timestamp,
            EnvelopeBody::ClientReport(report) => report.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{metadata_keys, ClientReport, Envelope, ReportKind, VehicleUpdate};
    use crate::model::{CrowdLevel, Position};
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;

    fn update() -> VehicleUpdate {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 7, 45, 0).unwrap();
        VehicleUpdate {
            vehicle_id: "v1".into(),
            route_id: "R1".into(),
            originator_id: "driver-1".into(),
            position: Position::new(52.5, 13.4, ts),
            speed_kmh: Some(28.0),
            heading_deg: Some(90.0),
            occupancy: 12,
            crowd_level: CrowdLevel::Low,
            bearing_deg: Some(88.0),
            progress: Some(0.25),
            timestamp: ts,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn envelope_ids_are_unique() {
        let first = Envelope::vehicle_update(update());
        let second = Envelope::vehicle_update(update());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn emergency_flag_requires_truthy_bool() {
        let mut with_flag = update();
        with_flag
            .metadata
            .insert(metadata_keys::EMERGENCY.into(), serde_json::json!(true));
        assert!(with_flag.is_emergency());

        let mut with_false = update();
        with_false
            .metadata
            .insert(metadata_keys::EMERGENCY.into(), serde_json::json!(false));
        assert!(!with_false.is_emergency());

        let mut with_string = update();
        with_string
            .metadata
            .insert(metadata_keys::EMERGENCY.into(), serde_json::json!("yes"));
        assert!(!with_string.is_emergency());

        assert!(!update().is_emergency());
    }

    #[test]
    fn subscription_control_kinds_are_closed() {
        assert!(ReportKind::Subscribe.is_subscription_control());
        assert!(ReportKind::Unsubscribe.is_subscription_control());
        for kind in [
            ReportKind::Boarding,
            ReportKind::Alighting,
            ReportKind::CrowdingReport,
            ReportKind::DelayReport,
            ReportKind::Feedback,
        ] {
            assert!(!kind.is_subscription_control());
        }
    }

    #[test]
    fn route_id_resolves_for_both_bodies() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 7, 45, 0).unwrap();
        let report = Envelope::client_report(ClientReport {
            reporter_id: "rider-1".into(),
            vehicle_id: None,
            route_id: Some("R2".into()),
            kind: ReportKind::Feedback,
            payload: HashMap::new(),
            timestamp: ts,
        });
        assert_eq!(report.route_id(), Some("R2"));
        assert_eq!(
            Envelope::vehicle_update(update()).route_id(),
            Some("R1")
        );
    }

    #[test]
    fn envelope_round_trips_through_serde() {
        let envelope = Envelope::vehicle_update(update());
        let json = serde_json::to_string(&envelope).expect("serialize");
        let back: Envelope = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(envelope, back);
    }
}
