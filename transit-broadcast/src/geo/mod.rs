//! Geospatial derivation engine. Pure functions only; the single wall-clock
//! dependency (the traffic factor) takes its instant as an argument.

mod derivation;
mod traffic;

pub use derivation::{
    bearing_deg, distance_m, eta_to_stop, nearest_stop, route_metrics, route_progress,
    RouteMetrics, EARTH_RADIUS_M,
};
pub use traffic::traffic_factor;
