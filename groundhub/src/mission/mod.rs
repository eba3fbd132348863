//! # Mission distance reporting
//!
//! [`MissionReporter`] keeps, for every waypoint, obstacle, and target of the active mission,
//! the closest distance the aircraft has ever been at and its current distance.

pub mod geo;
pub mod model;
mod reporter;

pub use model::{Mission, MovingObstacle, Obstacles, Position, StationaryObstacle, Waypoint};
pub use reporter::{DistanceStatus, MissionReporter, MissionStatus};
