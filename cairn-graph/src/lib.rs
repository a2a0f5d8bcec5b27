#![doc = include_str!("../README.md")]

pub mod builder;
pub mod cost;
pub mod db;
pub mod osm;
mod progress;

use thiserror::Error;

pub use builder::{BuildSummary, GraphBuilder};
pub use progress::{BuildProgress, BuildStage, ProgressSink};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The activity a route is computed for.
///
/// The mode selects base speed, surface tolerance, and climb/descent
/// penalties in the cost model, and gates a handful of hard filters in
/// the routing engine (cycling never expands steps).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum RoutingMode {
    Hiking,
    Cycling,
}

impl RoutingMode {
    /// Sustainable travel speed on flat, good ground in m/s.
    pub const fn base_speed(self) -> f64 {
        match self {
            // 4.8 km/h, the conventional flat walking speed.
            Self::Hiking => 1.33,
            // 15 km/h, a relaxed touring pace.
            Self::Cycling => 4.17,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("invalid OSM input: {0}")]
    InvalidOsmInput(String),
    #[error("OSM source error: {0}")]
    OsmSource(#[from] osm::OsmSourceError),
    #[error("elevation source error: {0}")]
    Elevation(#[from] cairn_elevation::ElevationError),
    #[error("routing database error: {0}")]
    Database(#[from] db::DbError),
    #[error(transparent)]
    Cancelled(#[from] cairn_cancel::Cancelled),
}
