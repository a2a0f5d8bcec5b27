//! # Graph builder
//!
//! Turns a parsed OSM extract plus a DEM into the persisted routing
//! database. The pipeline runs in five stages (filter, junctions,
//! elevation, edges, write); all SQL happens in the final stage inside a
//! single transaction, so a cancelled or failed build leaves either a
//! complete database or nothing.
//!
//! The builder is deterministic for a given input: node rows are emitted
//! in ascending id order and edge ids follow way order, so rebuilding the
//! same extract yields identical tables on every platform.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use cairn_cancel::CancelToken;
use cairn_elevation::ElevationProvider;
use cairn_geo::{BoundingBox, Coordinate, spherical};
use tracing::debug;

use crate::cost::{COST_MODEL_VERSION, EdgeCostInput, INFINITE_COST, edge_cost, reverse_edge_cost};
use crate::db::{GeometryPoint, RoutingEdge, RoutingNode, RoutingDatabaseWriter, encode_geometry, meta_keys};
use crate::osm::{OsmSource, OsmWay};
use crate::progress::{BuildProgress, BuildStage, ProgressSink};
use crate::{GraphError, RoutingMode};

/// Highway values admitted into the graph: the union of everything either
/// activity can use. Cycling-only restrictions (steps) are enforced by
/// the cost model and the routing engine, not here.
pub const ROUTABLE_HIGHWAYS: [&str; 12] = [
    "path",
    "footway",
    "track",
    "steps",
    "bridleway",
    "cycleway",
    "pedestrian",
    "via_ferrata",
    "living_street",
    "residential",
    "unclassified",
    "service",
];

/// Altitude steps smaller than this are sensor/DEM noise and do not count
/// toward gain or loss. Matches the hike recorder's filter.
pub const CLIMB_NOISE_FILTER_METERS: f64 = 3.0;

/// Rows written between cancellation checks in the write stage.
const WRITE_BATCH_SIZE: u64 = 512;

/// What a finished build produced.
#[derive(Clone, Debug)]
pub struct BuildSummary {
    pub node_count: u64,
    pub edge_count: u64,
    pub bounds: Option<BoundingBox>,
}

/// Configurable graph build. See the module docs for the pipeline.
pub struct GraphBuilder<'a> {
    elevation: &'a ElevationProvider,
    cancel: CancelToken,
    progress: ProgressSink,
    strict_refs: bool,
    strict_elevation: bool,
    osm_snapshot: String,
    dem_source: String,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(elevation: &'a ElevationProvider) -> Self {
        Self {
            elevation,
            cancel: CancelToken::new(),
            progress: ProgressSink::new(),
            strict_refs: false,
            strict_elevation: false,
            osm_snapshot: String::new(),
            dem_source: String::new(),
        }
    }

    /// Token checked after each way and each write batch.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sink the builder publishes progress records to.
    pub fn with_progress(mut self, progress: ProgressSink) -> Self {
        self.progress = progress;
        self
    }

    /// When set, a way referencing an unknown node aborts the build with
    /// [`GraphError::InvalidOsmInput`]. The default drops the unknown
    /// refs and skips ways left with fewer than two.
    pub fn strict_refs(mut self, strict: bool) -> Self {
        self.strict_refs = strict;
        self
    }

    /// When set, a node outside DEM coverage aborts the build. The
    /// default records the elevation as unknown.
    pub fn strict_elevation(mut self, strict: bool) -> Self {
        self.strict_elevation = strict;
        self
    }

    /// Extract snapshot identifier recorded in metadata.
    pub fn with_osm_snapshot(mut self, snapshot: impl Into<String>) -> Self {
        self.osm_snapshot = snapshot.into();
        self
    }

    /// DEM provenance string recorded in metadata.
    pub fn with_dem_source(mut self, source: impl Into<String>) -> Self {
        self.dem_source = source.into();
        self
    }

    /// Runs the build and writes the routing database to `output`.
    ///
    /// # Errors
    ///
    /// Fails with [`GraphError::Cancelled`] when the token fires (nothing
    /// is persisted), [`GraphError::InvalidOsmInput`] in strict-refs mode,
    /// [`GraphError::Elevation`] for DEM failures (always for corrupt
    /// tiles; missing tiles only in strict-elevation mode), and
    /// [`GraphError::Database`] / [`GraphError::OsmSource`] for I/O.
    pub fn build(
        &self,
        source: &mut dyn OsmSource,
        output: &Path,
    ) -> Result<BuildSummary, GraphError> {
        let mut nodes: HashMap<i64, Coordinate> = HashMap::new();
        source.each_node(&mut |node| {
            if let Ok(coordinate) = Coordinate::new(node.latitude, node.longitude) {
                nodes.insert(node.id, coordinate);
            }
        })?;

        let mut all_ways: Vec<OsmWay> = Vec::new();
        source.each_way(&mut |way| all_ways.push(way))?;
        debug!(
            nodes = nodes.len(),
            ways = all_ways.len(),
            "finished reading extract"
        );

        let retained = self.filter_ways(all_ways, &nodes)?;
        let junctions = self.detect_junctions(&retained)?;
        let elevations = self.assign_elevations(&retained, &nodes)?;
        let edges = self.split_edges(&retained, &nodes, &junctions, &elevations)?;
        debug!(
            ways = retained.len(),
            junctions = junctions.len(),
            edges = edges.len(),
            "derived graph"
        );

        self.write(output, &nodes, &junctions, &elevations, &edges)
    }

    fn publish(&self, stage: BuildStage, units_done: u64, units_total: u64) {
        self.progress.publish(BuildProgress {
            stage,
            units_done,
            units_total,
        });
    }

    /// Stage 1: keep routable ways, resolve node refs.
    fn filter_ways(
        &self,
        ways: Vec<OsmWay>,
        nodes: &HashMap<i64, Coordinate>,
    ) -> Result<Vec<OsmWay>, GraphError> {
        let total = ways.len() as u64;
        let mut retained = Vec::new();
        for (index, mut way) in ways.into_iter().enumerate() {
            self.cancel.check()?;
            self.publish(BuildStage::Filter, index as u64 + 1, total);

            let routable = way
                .tags
                .highway
                .as_deref()
                .is_some_and(|highway| ROUTABLE_HIGHWAYS.contains(&highway));
            if !routable {
                continue;
            }

            let known = way
                .node_refs
                .iter()
                .filter(|id| nodes.contains_key(*id))
                .count();
            if known != way.node_refs.len() {
                if self.strict_refs {
                    return Err(GraphError::InvalidOsmInput(format!(
                        "way {} references nodes missing from the extract",
                        way.id
                    )));
                }
                way.node_refs.retain(|id| nodes.contains_key(id));
            }
            if way.node_refs.len() < 2 {
                continue;
            }
            retained.push(way);
        }
        Ok(retained)
    }

    /// Stage 2: a node is a junction if at least two retained ways pass
    /// through it, or it starts/ends any retained way.
    fn detect_junctions(&self, ways: &[OsmWay]) -> Result<HashSet<i64>, GraphError> {
        let total = ways.len() as u64;
        let mut reference_counts: HashMap<i64, u32> = HashMap::new();
        let mut junctions: HashSet<i64> = HashSet::new();

        for (index, way) in ways.iter().enumerate() {
            self.cancel.check()?;
            self.publish(BuildStage::Junctions, index as u64 + 1, total);

            for &node_id in &way.node_refs {
                let count = reference_counts.entry(node_id).or_insert(0);
                *count += 1;
                if *count >= 2 {
                    junctions.insert(node_id);
                }
            }
            junctions.insert(way.node_refs[0]);
            junctions.insert(*way.node_refs.last().expect("ways have >= 2 refs"));
        }
        Ok(junctions)
    }

    /// Stage 3: one DEM query per distinct referenced node, in id order.
    fn assign_elevations(
        &self,
        ways: &[OsmWay],
        nodes: &HashMap<i64, Coordinate>,
    ) -> Result<HashMap<i64, Option<f64>>, GraphError> {
        let mut referenced: Vec<i64> = ways
            .iter()
            .flat_map(|way| way.node_refs.iter().copied())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        referenced.sort_unstable();

        let total = referenced.len() as u64;
        let mut elevations = HashMap::with_capacity(referenced.len());
        for (index, node_id) in referenced.into_iter().enumerate() {
            if index % 256 == 0 {
                self.cancel.check()?;
            }
            self.publish(BuildStage::Elevation, index as u64 + 1, total);

            let coordinate = nodes[&node_id];
            let elevation = if self.strict_elevation {
                self.elevation
                    .elevation_strict(coordinate.latitude(), coordinate.longitude())?
            } else {
                self.elevation
                    .elevation(coordinate.latitude(), coordinate.longitude())?
            };
            elevations.insert(node_id, elevation);
        }
        Ok(elevations)
    }

    /// Stage 4: split each way at junctions and derive edge attributes.
    fn split_edges(
        &self,
        ways: &[OsmWay],
        nodes: &HashMap<i64, Coordinate>,
        junctions: &HashSet<i64>,
        elevations: &HashMap<i64, Option<f64>>,
    ) -> Result<Vec<RoutingEdge>, GraphError> {
        let total = ways.len() as u64;
        let mut edges = Vec::new();

        for (index, way) in ways.iter().enumerate() {
            self.cancel.check()?;
            self.publish(BuildStage::Edges, index as u64 + 1, total);

            let oneway = way.tags.is_oneway();
            let mut segment_start = 0;
            for (position, node_id) in way.node_refs.iter().enumerate().skip(1) {
                if !junctions.contains(node_id) {
                    continue;
                }
                let segment = &way.node_refs[segment_start..=position];
                segment_start = position;

                let from = segment[0];
                let to = *segment.last().expect("segment has >= 2 nodes");
                if from == to {
                    // Degenerate loop back to the same junction.
                    continue;
                }

                let geometry: Vec<GeometryPoint> = segment
                    .iter()
                    .map(|id| {
                        let coordinate = nodes[id];
                        #[expect(clippy::cast_possible_truncation)]
                        let elevation = elevations
                            .get(id)
                            .copied()
                            .flatten()
                            .map(|meters| meters.round().clamp(-32_767.0, 32_767.0) as i16);
                        GeometryPoint::new(
                            coordinate.latitude(),
                            coordinate.longitude(),
                            elevation,
                        )
                    })
                    .collect();

                let distance: f64 = segment
                    .windows(2)
                    .map(|pair| spherical::distance(nodes[&pair[0]], nodes[&pair[1]]))
                    .sum();
                if distance <= 0.0 {
                    continue;
                }

                let profile: Vec<Option<f64>> = segment
                    .iter()
                    .map(|id| elevations.get(id).copied().flatten())
                    .collect();
                let (elevation_gain, elevation_loss) = accumulate_climb(&profile);

                let input = EdgeCostInput {
                    distance,
                    elevation_gain,
                    elevation_loss,
                    surface: way.tags.surface.as_deref(),
                    highway: way.tags.highway.as_deref(),
                    sac_scale: way.tags.sac_scale.as_deref(),
                };
                // Stored costs use the hiking profile; the engine reprices
                // edges from the stored attributes for other modes.
                let cost = edge_cost(&input, RoutingMode::Hiking);
                let reverse_cost = if oneway {
                    INFINITE_COST
                } else {
                    reverse_edge_cost(&input, RoutingMode::Hiking)
                };

                edges.push(RoutingEdge {
                    id: 0,
                    from_node: from,
                    to_node: to,
                    distance,
                    elevation_gain,
                    elevation_loss,
                    surface: way.tags.surface.clone(),
                    highway_type: way.tags.highway.clone(),
                    sac_scale: way.tags.sac_scale.clone(),
                    trail_visibility: way.tags.trail_visibility.clone(),
                    name: way.tags.name.clone(),
                    osm_way_id: way.id,
                    cost,
                    reverse_cost,
                    is_oneway: oneway,
                    geometry: Some(encode_geometry(&geometry)),
                });
            }
        }
        Ok(edges)
    }

    /// Stage 5: everything hits SQLite here, inside one transaction.
    ///
    /// A failed or cancelled write also removes the output file, so the
    /// caller never observes a schema-only husk.
    fn write(
        &self,
        output: &Path,
        nodes: &HashMap<i64, Coordinate>,
        junctions: &HashSet<i64>,
        elevations: &HashMap<i64, Option<f64>>,
        edges: &[RoutingEdge],
    ) -> Result<BuildSummary, GraphError> {
        let result = self.write_inner(output, nodes, junctions, elevations, edges);
        if result.is_err() {
            let _ = std::fs::remove_file(output);
        }
        result
    }

    fn write_inner(
        &self,
        output: &Path,
        nodes: &HashMap<i64, Coordinate>,
        junctions: &HashSet<i64>,
        elevations: &HashMap<i64, Option<f64>>,
        edges: &[RoutingEdge],
    ) -> Result<BuildSummary, GraphError> {
        let mut node_ids: Vec<i64> = junctions.iter().copied().collect();
        node_ids.sort_unstable();

        let planned_edge_rows =
            edges.len() as u64 + edges.iter().filter(|e| !e.is_oneway).count() as u64;
        let total = node_ids.len() as u64 + planned_edge_rows;
        let mut written: u64 = 0;
        let mut writer = RoutingDatabaseWriter::create(output)?;

        // Dropping the writer on any error path below unwinds the open
        // transaction, so a cancelled build leaves no partial database.
        let check_batch = |written: u64| -> Result<(), GraphError> {
            if written % WRITE_BATCH_SIZE == 0 {
                self.cancel.check()?;
            }
            Ok(())
        };

        for node_id in &node_ids {
            let coordinate = nodes[node_id];
            writer.insert_node(&RoutingNode {
                id: *node_id,
                latitude: coordinate.latitude(),
                longitude: coordinate.longitude(),
                elevation: elevations.get(node_id).copied().flatten(),
            })?;
            written += 1;
            check_batch(written)?;
            self.publish(BuildStage::Write, written, total);
        }

        for edge in edges {
            writer.insert_edge(edge)?;
            written += 1;
            check_batch(written)?;

            if !edge.is_oneway {
                writer.insert_edge(&reversed_edge(edge)?)?;
                written += 1;
                check_batch(written)?;
            }
            self.publish(BuildStage::Write, written, total);
        }

        let bounds = BoundingBox::enclosing(node_ids.iter().map(|id| nodes[id]));
        if let Some(bounds) = &bounds {
            writer.set_metadata(
                meta_keys::BOUNDS,
                &format!(
                    "{},{},{},{}",
                    bounds.west(),
                    bounds.south(),
                    bounds.east(),
                    bounds.north()
                ),
            )?;
        }
        writer.set_metadata(meta_keys::OSM_SNAPSHOT, &self.osm_snapshot)?;
        writer.set_metadata(meta_keys::DEM_SOURCE, &self.dem_source)?;
        writer.set_metadata(meta_keys::COST_MODEL_VERSION, COST_MODEL_VERSION)?;

        writer.create_indices()?;
        self.cancel.check()?;
        writer.commit()?;

        debug!(
            nodes = node_ids.len(),
            edge_rows = planned_edge_rows,
            "routing database committed"
        );
        Ok(BuildSummary {
            node_count: node_ids.len() as u64,
            edge_count: planned_edge_rows,
            bounds,
        })
    }
}

/// Accumulated climb along an elevation profile, applying the noise
/// filter. Steps involving an unknown elevation contribute nothing.
fn accumulate_climb(profile: &[Option<f64>]) -> (f64, f64) {
    let mut gain = 0.0;
    let mut loss = 0.0;
    for pair in profile.windows(2) {
        let (Some(from), Some(to)) = (pair[0], pair[1]) else {
            continue;
        };
        let delta = to - from;
        if delta.abs() < CLIMB_NOISE_FILTER_METERS {
            continue;
        }
        if delta > 0.0 {
            gain += delta;
        } else {
            loss -= delta;
        }
    }
    (gain, loss)
}

/// The mirror row for a bidirectional edge: endpoints swapped, gain and
/// loss swapped, geometry reversed, costs exchanged.
fn reversed_edge(edge: &RoutingEdge) -> Result<RoutingEdge, GraphError> {
    let mut geometry = None;
    if let Some(blob) = &edge.geometry {
        let mut points = crate::db::decode_geometry(blob).map_err(crate::db::DbError::from)?;
        points.reverse();
        geometry = Some(encode_geometry(&points));
    }
    Ok(RoutingEdge {
        id: 0,
        from_node: edge.to_node,
        to_node: edge.from_node,
        distance: edge.distance,
        elevation_gain: edge.elevation_loss,
        elevation_loss: edge.elevation_gain,
        surface: edge.surface.clone(),
        highway_type: edge.highway_type.clone(),
        sac_scale: edge.sac_scale.clone(),
        trail_visibility: edge.trail_visibility.clone(),
        name: edge.name.clone(),
        osm_way_id: edge.osm_way_id,
        cost: edge.reverse_cost,
        reverse_cost: edge.cost,
        is_oneway: false,
        geometry,
    })
}
