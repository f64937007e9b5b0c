//! Distance, bearing, progress, ETA and aggregate route metrics.

use crate::config::CrowdThresholds;
use crate::error::BroadcastError;
use crate::model::{CrowdLevel, Position, RouteTopology, Stop, VehicleState};
use chrono::Duration;

/// Spherical Earth radius in meters. Ellipsoidal precision is deliberately
/// out of scope for stop-to-stop distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two fixes in meters (haversine).
pub fn distance_m(a: &Position, b: &Position) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Initial great-circle bearing from `a` to `b`, degrees normalized to [0,360).
pub fn bearing_deg(a: &Position, b: &Position) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let y = delta_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * delta_lon.cos();

    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Stop minimizing distance to `position`. Ties resolve to the first stop in
/// sequence order, so the result is deterministic.
pub fn nearest_stop<'a>(position: &Position, stops: &'a [Stop]) -> Option<&'a Stop> {
    let mut best: Option<(&Stop, f64)> = None;
    for stop in stops {
        let candidate = distance_m(position, &stop.position);
        match best {
            Some((_, current)) if candidate >= current => {}
            _ => best = Some((stop, candidate)),
        }
    }
    best.map(|(stop, _)| stop)
}

/// Route progress in [0.0, 1.0] from the nearest stop's sequence number.
/// A single-stop (or empty) route degenerates to 0.0.
pub fn route_progress(position: &Position, route: &RouteTopology) -> f64 {
    let stop_count = route.stop_count();
    if stop_count < 2 {
        return 0.0;
    }
    let Some(nearest) = nearest_stop(position, &route.stops) else {
        return 0.0;
    };
    let progress = f64::from(nearest.sequence - 1) / (stop_count as f64 - 1.0);
    progress.clamp(0.0, 1.0)
}

/// Estimated travel time from `position` to the stop named `target_stop_id`.
///
/// Remaining distance is the fix-to-nearest-stop leg plus the straight
/// stop-to-stop legs up to the target; it is zero when the nearest stop's
/// sequence already meets or exceeds the target's (the stop is behind the
/// vehicle, and the result floors at the dwell component, never negative).
/// `effective_speed_kmh` is the traffic-adjusted speed and must be positive.
pub fn eta_to_stop(
    position: &Position,
    target_stop_id: &str,
    route: &RouteTopology,
    effective_speed_kmh: f64,
    dwell_minutes_per_stop: f64,
) -> Result<Duration, BroadcastError> {
    if effective_speed_kmh <= 0.0 || !effective_speed_kmh.is_finite() {
        return Err(BroadcastError::Validation(format!(
            "effective speed {effective_speed_kmh} must be positive"
        )));
    }
    let target = route.stop_by_id(target_stop_id).ok_or_else(|| {
        BroadcastError::Validation(format!(
            "stop '{target_stop_id}' not on route '{}'",
            route.route_id
        ))
    })?;
    let nearest = nearest_stop(position, &route.stops).ok_or_else(|| {
        BroadcastError::Validation(format!("route '{}' has no stops", route.route_id))
    })?;

    let (remaining_m, intervening_stops) = if nearest.sequence >= target.sequence {
        (0.0, 0u32)
    } else {
        let mut distance = distance_m(position, &nearest.position);
        let from = nearest.sequence as usize - 1;
        let to = target.sequence as usize - 1;
        for window in route.stops[from..=to].windows(2) {
            distance += distance_m(&window[0].position, &window[1].position);
        }
        (distance, target.sequence - nearest.sequence - 1)
    };

    let speed_mps = effective_speed_kmh / 3.6;
    let travel_secs = remaining_m / speed_mps;
    let dwell_secs = dwell_minutes_per_stop * 60.0 * f64::from(intervening_stops);

    Ok(Duration::milliseconds(
        ((travel_secs + dwell_secs) * 1_000.0) as i64,
    ))
}

/// Aggregate view of all vehicles currently assigned to one route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMetrics {
    /// Mean of the positive reported speeds, 0.0 when none report one.
    pub mean_speed_kmh: f64,
    pub total_occupancy: u32,
    pub active_vehicles: usize,
    /// Derived from the mean occupancy of active vehicles.
    pub crowd_level: CrowdLevel,
}

/// Computes route aggregates over the given vehicles.
pub fn route_metrics(vehicles: &[VehicleState], thresholds: &CrowdThresholds) -> RouteMetrics {
    let speeds: Vec<f64> = vehicles
        .iter()
        .filter_map(|vehicle| vehicle.position.speed_kmh)
        .filter(|speed| *speed > 0.0)
        .collect();
    let mean_speed_kmh = if speeds.is_empty() {
        0.0
    } else {
        speeds.iter().sum::<f64>() / speeds.len() as f64
    };

    let total_occupancy = vehicles.iter().map(|vehicle| vehicle.occupancy).sum();

    let active: Vec<&VehicleState> = vehicles.iter().filter(|v| v.is_active()).collect();
    let mean_active_occupancy = if active.is_empty() {
        0.0
    } else {
        active.iter().map(|v| f64::from(v.occupancy)).sum::<f64>() / active.len() as f64
    };

    RouteMetrics {
        mean_speed_kmh,
        total_occupancy,
        active_vehicles: active.len(),
        crowd_level: thresholds.classify(mean_active_occupancy),
    }
}
