//! # The routing database
//!
//! A routing graph persisted to SQLite: one row per node, two rows per
//! bidirectional edge (one per direction, each carrying its own cost), and
//! a key/value metadata table. Storing directed pairs means the query
//! side answers "outgoing edges of node N" with a single indexed read and
//! never has to reason about direction.
//!
//! The file has exactly one writer for its whole lifetime (the graph
//! builder, inside one transaction) and any number of concurrent readers
//! afterwards.

mod geometry;

use std::path::Path;

use cairn_geo::{BoundingBox, Coordinate, METERS_PER_DEGREE_LAT, spherical};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use geometry::{GeometryError, GeometryPoint, POINT_LEN, decode_geometry, encode_geometry};

/// Metadata keys the builder writes.
pub mod meta_keys {
    /// Bounding box as `west,south,east,north`.
    pub const BOUNDS: &str = "bounds";
    /// Identifier of the OSM extract snapshot the graph was built from.
    pub const OSM_SNAPSHOT: &str = "osm_snapshot";
    /// Identifier of the DEM source (directory or dataset name).
    pub const DEM_SOURCE: &str = "dem_source";
    /// Cost model version the stored costs were computed with.
    pub const COST_MODEL_VERSION: &str = "cost_model_version";
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("file does not have the routing database schema")]
    CorruptSchema,
    #[error("geometry blob is corrupt: {0}")]
    Geometry(#[from] GeometryError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A node retained in the routing graph (always an original OSM node id).
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct RoutingNode {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
}

impl RoutingNode {
    pub fn coordinate(&self) -> Option<Coordinate> {
        Coordinate::new(self.latitude, self.longitude).ok()
    }
}

/// One stored edge direction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct RoutingEdge {
    pub id: i64,
    pub from_node: i64,
    pub to_node: i64,
    pub distance: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub surface: Option<String>,
    pub highway_type: Option<String>,
    pub sac_scale: Option<String>,
    pub trail_visibility: Option<String>,
    pub name: Option<String>,
    pub osm_way_id: i64,
    pub cost: f64,
    pub reverse_cost: f64,
    pub is_oneway: bool,
    pub geometry: Option<Vec<u8>>,
}

impl RoutingEdge {
    /// Decodes the stored shape, ordered from `from_node` to `to_node`.
    ///
    /// # Errors
    ///
    /// Fails with [`GeometryError`] for a torn blob.
    pub fn decoded_geometry(&self) -> Result<Vec<GeometryPoint>, GeometryError> {
        match &self.geometry {
            Some(blob) => decode_geometry(blob),
            None => Ok(Vec::new()),
        }
    }
}

const SCHEMA: &str = "
CREATE TABLE routing_nodes (
    id INTEGER PRIMARY KEY,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    elevation REAL
);
CREATE TABLE routing_edges (
    id INTEGER PRIMARY KEY,
    from_node INTEGER NOT NULL,
    to_node INTEGER NOT NULL,
    distance REAL NOT NULL,
    elevation_gain REAL NOT NULL,
    elevation_loss REAL NOT NULL,
    surface TEXT,
    highway_type TEXT,
    sac_scale TEXT,
    trail_visibility TEXT,
    name TEXT,
    osm_way_id INTEGER NOT NULL,
    cost REAL NOT NULL,
    reverse_cost REAL NOT NULL,
    is_oneway INTEGER NOT NULL,
    geometry BLOB
);
CREATE TABLE routing_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const INDICES: &str = "
CREATE INDEX idx_routing_edges_from_node ON routing_edges (from_node);
CREATE INDEX idx_routing_edges_to_node ON routing_edges (to_node);
CREATE INDEX idx_routing_nodes_latitude ON routing_nodes (latitude);
";

const EDGE_COLUMNS: &str = "id, from_node, to_node, distance, elevation_gain, elevation_loss, \
     surface, highway_type, sac_scale, trail_visibility, name, osm_way_id, \
     cost, reverse_cost, is_oneway, geometry";

fn edge_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutingEdge> {
    Ok(RoutingEdge {
        id: row.get(0)?,
        from_node: row.get(1)?,
        to_node: row.get(2)?,
        distance: row.get(3)?,
        elevation_gain: row.get(4)?,
        elevation_loss: row.get(5)?,
        surface: row.get(6)?,
        highway_type: row.get(7)?,
        sac_scale: row.get(8)?,
        trail_visibility: row.get(9)?,
        name: row.get(10)?,
        osm_way_id: row.get(11)?,
        cost: row.get(12)?,
        reverse_cost: row.get(13)?,
        is_oneway: row.get(14)?,
        geometry: row.get(15)?,
    })
}

fn node_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutingNode> {
    Ok(RoutingNode {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        elevation: row.get(3)?,
    })
}

/// Exclusive write handle used while building a graph.
///
/// All writes happen inside one transaction held open from creation;
/// dropping the writer without [`RoutingDatabaseWriter::commit`] rolls the
/// whole build back, leaving no partial database behind.
pub struct RoutingDatabaseWriter {
    conn: Connection,
    next_edge_id: i64,
}

impl RoutingDatabaseWriter {
    /// Creates a new routing database and opens the build transaction.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error when the file cannot be created or
    /// already contains a schema.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            conn,
            next_edge_id: 1,
        })
    }

    /// Inserts one node row.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error (e.g. on a duplicate node id).
    pub fn insert_node(&mut self, node: &RoutingNode) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO routing_nodes (id, latitude, longitude, elevation)
             VALUES (?1, ?2, ?3, ?4)",
            params![node.id, node.latitude, node.longitude, node.elevation],
        )?;
        Ok(())
    }

    /// Inserts one edge row, assigning the next sequential edge id.
    ///
    /// The `id` field of `edge` is ignored; ids are dense and ordered by
    /// insertion, which is what makes rebuilds byte-identical.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn insert_edge(&mut self, edge: &RoutingEdge) -> Result<i64, DbError> {
        let id = self.next_edge_id;
        self.conn.execute(
            &format!(
                "INSERT INTO routing_edges ({EDGE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                id,
                edge.from_node,
                edge.to_node,
                edge.distance,
                edge.elevation_gain,
                edge.elevation_loss,
                edge.surface,
                edge.highway_type,
                edge.sac_scale,
                edge.trail_visibility,
                edge.name,
                edge.osm_way_id,
                edge.cost,
                edge.reverse_cost,
                edge.is_oneway,
                edge.geometry,
            ],
        )?;
        self.next_edge_id += 1;
        Ok(id)
    }

    /// Writes one metadata row.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO routing_metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Builds the query indices. Called once, after all rows are inserted.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn create_indices(&mut self) -> Result<(), DbError> {
        self.conn.execute_batch(INDICES)?;
        Ok(())
    }

    /// Commits the build transaction.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error; on failure nothing is persisted.
    pub fn commit(self) -> Result<(), DbError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Discards everything written so far.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn rollback(self) -> Result<(), DbError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

/// Shared read-only handle over a built routing database.
///
/// A handle is cheap; concurrent queries each open their own.
pub struct RoutingDatabase {
    conn: Connection,
}

impl RoutingDatabase {
    /// Opens a routing database read-only.
    ///
    /// # Errors
    ///
    /// Fails with [`DbError::CorruptSchema`] when the routing tables are
    /// missing, or a SQLite error for unreadable files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let db = Self { conn };
        for table in ["routing_nodes", "routing_edges", "routing_metadata"] {
            let count: i64 = db.conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |row| row.get(0),
            )?;
            if count == 0 {
                return Err(DbError::CorruptSchema);
            }
        }
        Ok(db)
    }

    /// Fetches a node by id.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn node(&self, id: i64) -> Result<Option<RoutingNode>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, latitude, longitude, elevation FROM routing_nodes WHERE id = ?1",
                params![id],
                node_from_row,
            )
            .optional()?)
    }

    /// All stored edges leaving `from_node`, ordered by edge id.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn outgoing_edges(&self, from_node: i64) -> Result<Vec<RoutingEdge>, DbError> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM routing_edges WHERE from_node = ?1 ORDER BY id"
        ))?;
        let edges = stmt
            .query_map(params![from_node], edge_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// The node nearest to a coordinate, within `max_radius_meters`.
    ///
    /// Candidates are pruned with the latitude index first (a radius-wide
    /// window), then ranked by exact Haversine distance.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn nearest_node(
        &self,
        coordinate: Coordinate,
        max_radius_meters: f64,
    ) -> Result<Option<RoutingNode>, DbError> {
        let window = max_radius_meters / METERS_PER_DEGREE_LAT;
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, latitude, longitude, elevation FROM routing_nodes
             WHERE latitude BETWEEN ?1 AND ?2",
        )?;
        let candidates = stmt.query_map(
            params![
                coordinate.latitude() - window,
                coordinate.latitude() + window
            ],
            node_from_row,
        )?;

        let mut best: Option<(f64, RoutingNode)> = None;
        for candidate in candidates {
            let node = candidate?;
            let Some(node_coordinate) = node.coordinate() else {
                continue;
            };
            let distance = spherical::distance(coordinate, node_coordinate);
            if distance <= max_radius_meters
                && best.as_ref().is_none_or(|(d, _)| distance < *d)
            {
                best = Some((distance, node));
            }
        }
        Ok(best.map(|(_, node)| node))
    }

    /// Reads one metadata value.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn metadata(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM routing_metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// The bounding box recorded at build time, if parseable.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn bounds(&self) -> Result<Option<BoundingBox>, DbError> {
        let Some(raw) = self.metadata(meta_keys::BOUNDS)? else {
            return Ok(None);
        };
        let parts: Vec<f64> = raw
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect();
        let [west, south, east, north] = parts.as_slice() else {
            return Ok(None);
        };
        Ok(BoundingBox::new(*north, *south, *east, *west).ok())
    }

    /// Number of node rows.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn node_count(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM routing_nodes", [], |row| row.get(0))?;
        Ok(count.unsigned_abs())
    }

    /// Number of stored edge rows (directed).
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error.
    pub fn edge_count(&self) -> Result<u64, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM routing_edges", [], |row| row.get(0))?;
        Ok(count.unsigned_abs())
    }
}
