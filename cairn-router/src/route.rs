use cairn_geo::Coordinate;
use cairn_graph::db::{RoutingEdge, RoutingNode};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A finished route computation.
///
/// Plain data owned by the caller; nothing here refers back into the
/// routing database. `nodes` and `edges` zip together:
/// `edges[i]` leads from `nodes[i]` to `nodes[i + 1]`, so
/// `nodes.len() == edges.len() + 1` always holds.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ComputedRoute {
    pub nodes: Vec<RoutingNode>,
    pub edges: Vec<RoutingEdge>,
    /// The full path shape, including edge-internal geometry, with
    /// junction duplicates removed at edge joins.
    pub coordinates: Vec<Coordinate>,
    /// Meters.
    pub total_distance: f64,
    /// Seconds, per the cost model used for the query.
    pub total_cost: f64,
    /// Seconds. The cost model's unit is time, so this equals
    /// `total_cost`.
    pub estimated_duration: f64,
    /// Meters of accumulated climb.
    pub elevation_gain: f64,
    /// Meters of accumulated descent.
    pub elevation_loss: f64,
    /// The via points the route was requested through, in order.
    pub via_points: Vec<Coordinate>,
}
