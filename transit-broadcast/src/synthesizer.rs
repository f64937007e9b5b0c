//! Demo-mode fleet synthesizer. Produces plausible perturbed updates for
//! every vehicle with an active session, so the pipeline can be exercised
//! without live GPS feeds.

use crate::config::SynthesizerConfig;
use crate::coordinator::VehicleUpdateRequest;
use crate::envelope::metadata_keys;
use crate::model::{Position, VehicleState};
use chrono::{DateTime, Utc};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Stateful perturbation source. One instance per driving loop; not shared.
pub struct FleetSynthesizer {
    rng: SmallRng,
    config: SynthesizerConfig,
}

impl FleetSynthesizer {
    pub fn new(config: SynthesizerConfig) -> Self {
        Self {
            rng: SmallRng::from_entropy(),
            config,
        }
    }

    /// Seeded constructor for reproducible simulations.
    pub fn with_seed(config: SynthesizerConfig, seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            config,
        }
    }

    /// One perturbed update for a vehicle: bounded positional drift, a
    /// resampled speed, a nudged heading and a small occupancy change clamped
    /// to capacity.
    pub fn perturb(&mut self, vehicle: &VehicleState, now: DateTime<Utc>) -> VehicleUpdateRequest {
        let jitter = self.config.position_jitter_deg;
        let latitude =
            (vehicle.position.latitude + self.rng.gen_range(-jitter..=jitter)).clamp(-90.0, 90.0);
        let longitude = (vehicle.position.longitude + self.rng.gen_range(-jitter..=jitter))
            .clamp(-180.0, 180.0);

        let speed = self
            .rng
            .gen_range(self.config.speed_min_kmh..=self.config.speed_max_kmh);
        let heading_jitter = self.config.heading_jitter_deg;
        let mut heading = (vehicle.position.heading_deg.unwrap_or(0.0)
            + self.rng.gen_range(-heading_jitter..=heading_jitter))
        .rem_euclid(360.0);
        // rem_euclid can round up to exactly 360.0 near zero.
        if heading >= 360.0 {
            heading = 0.0;
        }

        let capacity = if vehicle.capacity == 0 {
            self.config.default_capacity
        } else {
            vehicle.capacity
        };
        let delta = self
            .rng
            .gen_range(-(self.config.occupancy_jitter as i64)..=self.config.occupancy_jitter as i64);
        let occupancy = (i64::from(vehicle.occupancy) + delta).clamp(0, i64::from(capacity)) as u32;

        let mut metadata = HashMap::new();
        metadata.insert(
            metadata_keys::SOURCE.to_string(),
            serde_json::json!("synthesizer"),
        );

        VehicleUpdateRequest {
            vehicle_id: vehicle.vehicle_id.clone(),
            originator_id: "synthesizer".into(),
            position: Position::new(latitude, longitude, now).with_motion(speed, heading),
            occupancy: Some(occupancy),
            metadata,
        }
    }
}
