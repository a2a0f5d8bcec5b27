//! # Routing engine
//!
//! Weighted A\* over the persisted routing graph. Each query snaps its
//! endpoints to graph nodes, runs one search per consecutive waypoint
//! pair, and assembles the concatenated result into a [`ComputedRoute`].
//!
//! The heuristic is the straight-line Haversine distance divided by the
//! mode's base speed. No edge can be traversed faster than
//! `distance / base_speed` (every multiplier in the cost model is >= 1
//! and penalties only add), so the heuristic never overestimates and the
//! search is optimal.
//!
//! Determinism: ties on `f` break toward the smaller accumulated `g`,
//! then the smaller node id, so identical databases produce identical
//! routes on every platform.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use cairn_cancel::CancelToken;
use cairn_geo::{Coordinate, spherical};
use cairn_graph::RoutingMode;
use cairn_graph::cost::{EdgeCostInput, INFINITE_COST, edge_cost};
use cairn_graph::db::{RoutingDatabase, RoutingEdge, RoutingNode};
use tracing::debug;

use crate::{ComputedRoute, RouterError};

/// How far an endpoint may be from the nearest graph node.
pub const DEFAULT_SNAP_RADIUS_METERS: f64 = 500.0;

/// A route query interface over one routing database.
///
/// The engine itself holds no mutable state; every search builds its own
/// open and closed sets, so separate engines over the same file may run
/// concurrently.
pub struct RoutingEngine {
    db: RoutingDatabase,
    snap_radius: f64,
    cancel: CancelToken,
}

/// Open-set entry, ordered as a min-heap on `(f, g, node)`.
///
/// `BinaryHeap` is a max-heap, so the comparisons are inverted: the entry
/// with the smallest `f` (then smallest `g`, then smallest node id)
/// compares greatest.
#[derive(Clone, Copy, Debug)]
struct OpenEntry {
    f: f64,
    g: f64,
    node: i64,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.g.total_cmp(&self.g))
            .then_with(|| other.node.cmp(&self.node))
    }
}

/// One A\* search segment: the settled node path and the edges taken.
struct SegmentResult {
    node_ids: Vec<i64>,
    edges: Vec<RoutingEdge>,
}

impl RoutingEngine {
    pub fn new(db: RoutingDatabase) -> Self {
        Self {
            db,
            snap_radius: DEFAULT_SNAP_RADIUS_METERS,
            cancel: CancelToken::new(),
        }
    }

    /// Overrides the endpoint snap radius (meters).
    pub fn with_snap_radius(mut self, radius_meters: f64) -> Self {
        self.snap_radius = radius_meters;
        self
    }

    /// Token checked once per node expansion.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Computes the cheapest route from `from` through `via` to `to`.
    ///
    /// # Errors
    ///
    /// Fails with [`RouterError::NoNearbyNode`] when an endpoint cannot be
    /// snapped, [`RouterError::NoRouteFound`] when the graph does not
    /// connect consecutive waypoints, [`RouterError::Cancelled`] when the
    /// token fires mid-search, and [`RouterError::Database`] for I/O.
    pub fn find_route(
        &self,
        from: Coordinate,
        via: &[Coordinate],
        to: Coordinate,
        mode: RoutingMode,
    ) -> Result<ComputedRoute, RouterError> {
        let mut waypoints = Vec::with_capacity(via.len() + 2);
        waypoints.push(self.snap(from)?);
        for point in via {
            waypoints.push(self.snap(*point)?);
        }
        waypoints.push(self.snap(to)?);

        // Identity query: both endpoints snap to the same node.
        if via.is_empty() && waypoints[0].id == waypoints[1].id {
            return Ok(self.identity_route(waypoints[0], via));
        }

        let mut node_ids: Vec<i64> = vec![waypoints[0].id];
        let mut edges: Vec<RoutingEdge> = Vec::new();
        for pair in waypoints.windows(2) {
            if pair[0].id == pair[1].id {
                continue;
            }
            let segment = self.search(pair[0], pair[1], mode)?;
            // The segment starts at the node the previous one ended on.
            node_ids.extend(&segment.node_ids[1..]);
            edges.extend(segment.edges);
        }

        debug!(
            nodes = node_ids.len(),
            edges = edges.len(),
            ?mode,
            "route found"
        );
        self.assemble(node_ids, edges, via, mode)
    }

    fn snap(&self, coordinate: Coordinate) -> Result<RoutingNode, RouterError> {
        self.db
            .nearest_node(coordinate, self.snap_radius)?
            .ok_or(RouterError::NoNearbyNode {
                latitude: coordinate.latitude(),
                longitude: coordinate.longitude(),
                radius_meters: self.snap_radius,
            })
    }

    /// The per-mode traversal price of one stored edge row, or `None`
    /// when the row is impassable in this mode.
    ///
    /// Stored costs are computed with the hiking profile at build time;
    /// other modes reprice from the stored attributes. The impassability
    /// encoding (oneway reverse rows) is mode-independent.
    fn traversal_cost(edge: &RoutingEdge, mode: RoutingMode) -> Option<f64> {
        if edge.cost >= INFINITE_COST {
            return None;
        }
        match mode {
            RoutingMode::Hiking => Some(edge.cost),
            RoutingMode::Cycling => {
                // Hard filter: bikes never take stairs.
                if edge.highway_type.as_deref() == Some("steps") {
                    return None;
                }
                Some(edge_cost(
                    &EdgeCostInput {
                        distance: edge.distance,
                        elevation_gain: edge.elevation_gain,
                        elevation_loss: edge.elevation_loss,
                        surface: edge.surface.as_deref(),
                        highway: edge.highway_type.as_deref(),
                        sac_scale: edge.sac_scale.as_deref(),
                    },
                    mode,
                ))
            }
        }
    }

    fn search(
        &self,
        origin: RoutingNode,
        target: RoutingNode,
        mode: RoutingMode,
    ) -> Result<SegmentResult, RouterError> {
        let target_coordinate = target
            .coordinate()
            .expect("stored nodes have valid coordinates");
        let heuristic = |coordinate: Coordinate| -> f64 {
            spherical::distance(coordinate, target_coordinate) / mode.base_speed()
        };

        let mut open: BinaryHeap<OpenEntry> = BinaryHeap::new();
        let mut closed: HashSet<i64> = HashSet::new();
        let mut g_scores: HashMap<i64, f64> = HashMap::new();
        let mut predecessors: HashMap<i64, (i64, RoutingEdge)> = HashMap::new();
        // Node positions are needed for the heuristic; cache them per
        // search to avoid re-reading rows.
        let mut coordinates: HashMap<i64, Coordinate> = HashMap::new();

        let origin_coordinate = origin
            .coordinate()
            .expect("stored nodes have valid coordinates");
        coordinates.insert(origin.id, origin_coordinate);
        g_scores.insert(origin.id, 0.0);
        open.push(OpenEntry {
            f: heuristic(origin_coordinate),
            g: 0.0,
            node: origin.id,
        });

        while let Some(entry) = open.pop() {
            self.cancel.check()?;

            if entry.node == target.id {
                return Ok(Self::reconstruct(origin.id, target.id, &predecessors));
            }
            if !closed.insert(entry.node) {
                continue;
            }

            for edge in self.db.outgoing_edges(entry.node)? {
                if closed.contains(&edge.to_node) {
                    continue;
                }
                let Some(step_cost) = Self::traversal_cost(&edge, mode) else {
                    continue;
                };

                let tentative = entry.g + step_cost;
                let improved = g_scores
                    .get(&edge.to_node)
                    .is_none_or(|best| tentative < *best);
                if !improved {
                    continue;
                }

                let to_coordinate = match coordinates.get(&edge.to_node) {
                    Some(coordinate) => *coordinate,
                    None => {
                        let node = self
                            .db
                            .node(edge.to_node)?
                            .ok_or(RouterError::NoRouteFound)?;
                        let coordinate = node
                            .coordinate()
                            .expect("stored nodes have valid coordinates");
                        coordinates.insert(edge.to_node, coordinate);
                        coordinate
                    }
                };

                g_scores.insert(edge.to_node, tentative);
                let to_node = edge.to_node;
                predecessors.insert(to_node, (entry.node, edge));
                open.push(OpenEntry {
                    f: tentative + heuristic(to_coordinate),
                    g: tentative,
                    node: to_node,
                });
            }
        }

        Err(RouterError::NoRouteFound)
    }

    fn reconstruct(
        origin: i64,
        target: i64,
        predecessors: &HashMap<i64, (i64, RoutingEdge)>,
    ) -> SegmentResult {
        let mut node_ids = vec![target];
        let mut edges = Vec::new();
        let mut current = target;
        while current != origin {
            let (previous, edge) = &predecessors[&current];
            edges.push(edge.clone());
            node_ids.push(*previous);
            current = *previous;
        }
        node_ids.reverse();
        edges.reverse();
        SegmentResult { node_ids, edges }
    }

    fn identity_route(&self, node: RoutingNode, via: &[Coordinate]) -> ComputedRoute {
        let coordinates = node.coordinate().into_iter().collect();
        ComputedRoute {
            nodes: vec![node],
            edges: Vec::new(),
            coordinates,
            total_distance: 0.0,
            total_cost: 0.0,
            estimated_duration: 0.0,
            elevation_gain: 0.0,
            elevation_loss: 0.0,
            via_points: via.to_vec(),
        }
    }

    fn assemble(
        &self,
        node_ids: Vec<i64>,
        edges: Vec<RoutingEdge>,
        via: &[Coordinate],
        mode: RoutingMode,
    ) -> Result<ComputedRoute, RouterError> {
        let mut nodes = Vec::with_capacity(node_ids.len());
        for id in &node_ids {
            nodes.push(self.db.node(*id)?.ok_or(RouterError::NoRouteFound)?);
        }

        let mut total_distance = 0.0;
        let mut total_cost = 0.0;
        let mut elevation_gain = 0.0;
        let mut elevation_loss = 0.0;
        let mut coordinates: Vec<Coordinate> = Vec::new();

        for edge in &edges {
            total_distance += edge.distance;
            total_cost += Self::traversal_cost(edge, mode)
                .expect("assembled edges were expanded by the search");
            elevation_gain += edge.elevation_gain;
            elevation_loss += edge.elevation_loss;

            let shape = edge.decoded_geometry().map_err(cairn_graph::db::DbError::from)?;
            let points = if shape.is_empty() {
                // Fall back to the edge endpoints.
                let from = self.db.node(edge.from_node)?.and_then(|n| n.coordinate());
                let to = self.db.node(edge.to_node)?.and_then(|n| n.coordinate());
                from.into_iter().chain(to).collect()
            } else {
                shape
                    .iter()
                    .filter_map(|p| Coordinate::new(p.latitude, p.longitude).ok())
                    .collect::<Vec<_>>()
            };
            // Drop the join point shared with the previous edge.
            let skip = usize::from(!coordinates.is_empty());
            coordinates.extend(points.into_iter().skip(skip));
        }

        if coordinates.is_empty() {
            coordinates.extend(nodes.iter().filter_map(RoutingNode::coordinate));
        }

        Ok(ComputedRoute {
            nodes,
            edges,
            coordinates,
            total_distance,
            total_cost,
            estimated_duration: total_cost,
            elevation_gain,
            elevation_loss,
            via_points: via.to_vec(),
        })
    }
}
