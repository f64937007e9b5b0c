//! Domain value objects shared across the pipeline.

mod position;
mod route;
mod vehicle;

pub use position::Position;
pub use route::{RouteTopology, Stop};
pub use vehicle::{CrowdLevel, VehicleState, VehicleStatus};
