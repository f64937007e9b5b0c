/********************************************************************************
 * Copyright (c) 2026 Contributors to the transit-broadcast project
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::error::BroadcastError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geographic fix. Immutable value; each update replaces the previous
/// position wholesale, never mutates it field by field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported ground speed, km/h. `None` when the fix carries no speed.
    pub speed_kmh: Option<f64>,
    /// Reported heading in degrees, [0,360).
    pub heading_deg: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            speed_kmh: None,
            heading_deg: None,
            timestamp,
        }
    }

    pub fn with_motion(mut self, speed_kmh: f64, heading_deg: f64) -> Self {
        self.speed_kmh = Some(speed_kmh);
        self.heading_deg = Some(heading_deg);
        self
    }

    /// Rejects out-of-range coordinates and malformed motion fields.
    pub fn validate(&self) -> Result<(), BroadcastError> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(BroadcastError::Validation(format!(
                "latitude {} outside [-90, 90]",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(BroadcastError::Validation(format!(
                "longitude {} outside [-180, 180]",
                self.longitude
            )));
        }
        if let Some(speed) = self.speed_kmh {
            if speed < 0.0 || !speed.is_finite() {
                return Err(BroadcastError::Validation(format!(
                    "speed {speed} must be finite and non-negative"
                )));
            }
        }
        if let Some(heading) = self.heading_deg {
            if !(0.0..360.0).contains(&heading) {
                return Err(BroadcastError::Validation(format!(
                    "heading {heading} outside [0, 360)"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Position;
    use chrono::{TimeZone, Utc};

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 8, 30, 0).unwrap()
    }

    #[test]
    fn in_range_fix_validates() {
        let position = Position::new(52.52, 13.405, ts()).with_motion(32.0, 270.0);
        assert!(position.validate().is_ok());
    }

    #[test]
    fn out_of_range_latitude_is_rejected() {
        let position = Position::new(91.0, 0.0, ts());
        assert!(position.validate().is_err());
    }

    #[test]
    fn out_of_range_longitude_is_rejected() {
        let position = Position::new(0.0, -181.0, ts());
        assert!(position.validate().is_err());
    }

    #[test]
    fn negative_speed_is_rejected() {
        let position = Position::new(0.0, 0.0, ts()).with_motion(-1.0, 0.0);
        assert!(position.validate().is_err());
    }

    #[test]
    fn heading_of_360_is_rejected() {
        let mut position = Position::new(0.0, 0.0, ts());
        position.heading_deg = Some(360.0);
        assert!(position.validate().is_err());
    }
}
