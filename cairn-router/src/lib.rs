#![doc = include_str!("../README.md")]

mod engine;
mod follower;
mod route;
mod turns;

use thiserror::Error;

pub use engine::{DEFAULT_SNAP_RADIUS_METERS, RoutingEngine};
pub use follower::{NavigationState, RouteFollower};
pub use route::ComputedRoute;
pub use turns::{TurnDirection, TurnInstruction, detect_turns};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("no routable node within {radius_meters} m of ({latitude}, {longitude})")]
    NoNearbyNode {
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    },
    #[error("no route exists between the requested points")]
    NoRouteFound,
    #[error("routing database error: {0}")]
    Database(#[from] cairn_graph::db::DbError),
    #[error(transparent)]
    Cancelled(#[from] cairn_cancel::Cancelled),
}
