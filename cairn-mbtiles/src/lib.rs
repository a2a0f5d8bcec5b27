//! # MBTiles tile store
//!
//! A thin read/write wrapper around the MBTiles 1.3 SQLite schema. The
//! only subtlety worth knowing about: `tile_row` on disk is TMS (row 0 at
//! the south pole) while everything in memory speaks slippy-map y (row 0
//! at the north pole). The conversion happens exactly once, at this
//! crate's boundary.
//!
//! Writers are exclusive per file; any number of readers may share a file
//! that is not being written. Readers transparently retry on SQLite lock
//! contention with exponential backoff before surfacing
//! [`MbtilesError::Busy`].

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use cairn_geo::{BoundingBox, GeoError, TileCoordinate};
use rusqlite::{Connection, ErrorCode, OpenFlags, OptionalExtension, params};
use thiserror::Error;

/// Attempts made against a locked database before giving up.
const BUSY_RETRY_LIMIT: u32 = 5;

/// Initial backoff; doubles per retry (10, 20, 40, 80, 160 ms).
const BUSY_RETRY_BASE: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum MbtilesError {
    #[error("file does not have the MBTiles 1.3 schema")]
    CorruptSchema,
    #[error("database is locked by another writer (after {BUSY_RETRY_LIMIT} retries)")]
    Busy,
    #[error("invalid tile address: {0}")]
    InvalidTile(#[from] GeoError),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Raster format recorded in MBTiles metadata.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TileFormat {
    Png,
    Jpg,
}

impl TileFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpg),
            _ => None,
        }
    }
}

/// An open MBTiles database.
///
/// Obtained through [`Mbtiles::open`] (shared read) or [`Mbtiles::create`]
/// (exclusive write). A single handle is not thread-safe; concurrent
/// readers each open their own handle.
pub struct Mbtiles {
    conn: Connection,
}

impl Mbtiles {
    /// Opens an existing MBTiles file read-only.
    ///
    /// # Errors
    ///
    /// Fails with [`MbtilesError::CorruptSchema`] when the `tiles` or
    /// `metadata` table is missing, or a SQLite error for unreadable files.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MbtilesError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self { conn };
        if !store.has_table("tiles")? || !store.has_table("metadata")? {
            return Err(MbtilesError::CorruptSchema);
        }
        Ok(store)
    }

    /// Creates a new MBTiles file with schema and initial metadata.
    ///
    /// The `bounds` and `center` metadata rows follow the 1.3 conventions
    /// (`west,south,east,north` and `lon,lat,zoom`).
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error when the file cannot be created or the
    /// schema statements fail (e.g. the file already has content).
    pub fn create(
        path: impl AsRef<Path>,
        name: &str,
        format: TileFormat,
        bounds: &BoundingBox,
        minzoom: u8,
        maxzoom: u8,
    ) -> Result<Self, MbtilesError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE metadata (name TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE tiles (
                 zoom_level INTEGER,
                 tile_column INTEGER,
                 tile_row INTEGER,
                 tile_data BLOB
             );
             CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);",
        )?;

        let store = Self { conn };
        let center = bounds.center();
        store.set_metadata("name", name)?;
        store.set_metadata("format", format.as_str())?;
        store.set_metadata("minzoom", &minzoom.to_string())?;
        store.set_metadata("maxzoom", &maxzoom.to_string())?;
        store.set_metadata(
            "bounds",
            &format!(
                "{},{},{},{}",
                bounds.west(),
                bounds.south(),
                bounds.east(),
                bounds.north()
            ),
        )?;
        store.set_metadata(
            "center",
            &format!("{},{},{minzoom}", center.longitude(), center.latitude()),
        )?;
        Ok(store)
    }

    /// Fetches a tile blob by slippy-map address.
    ///
    /// # Errors
    ///
    /// Fails with [`MbtilesError::Busy`] when a writer holds the database
    /// locked past the retry budget, or a SQLite error otherwise.
    pub fn get_tile(&self, tile: TileCoordinate) -> Result<Option<Vec<u8>>, MbtilesError> {
        let tms_row = tile.tms_y();
        with_busy_retry(|| {
            self.conn
                .query_row(
                    "SELECT tile_data FROM tiles
                     WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                    params![tile.z, tile.x, tms_row],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    /// Inserts or replaces a tile blob at a slippy-map address.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error; notably when called on a read-only
    /// handle.
    pub fn insert_tile(&self, tile: TileCoordinate, data: &[u8]) -> Result<(), MbtilesError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data)
             VALUES (?1, ?2, ?3, ?4)",
            params![tile.z, tile.x, tile.tms_y(), data],
        )?;
        Ok(())
    }

    /// Starts a batch of inserts. The tile downloader commits every 150
    /// tiles; earlier committed batches survive a later rollback.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error, e.g. when a batch is already open.
    pub fn begin_batch(&self) -> Result<(), MbtilesError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commits the open batch.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error when no batch is open.
    pub fn commit_batch(&self) -> Result<(), MbtilesError> {
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    /// Rolls back the open batch. Tiles from previously committed batches
    /// are unaffected and the file remains a valid partial dataset.
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error when no batch is open.
    pub fn rollback_batch(&self) -> Result<(), MbtilesError> {
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    /// All metadata rows as a key/value map.
    ///
    /// # Errors
    ///
    /// Fails with [`MbtilesError::Busy`] past the retry budget or a SQLite
    /// error otherwise.
    pub fn metadata(&self) -> Result<HashMap<String, String>, MbtilesError> {
        with_busy_retry(|| {
            let mut stmt = self.conn.prepare("SELECT name, value FROM metadata")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
    }

    /// Writes one metadata row (upsert).
    ///
    /// # Errors
    ///
    /// Fails with a SQLite error; notably when called on a read-only
    /// handle.
    pub fn set_metadata(&self, name: &str, value: &str) -> Result<(), MbtilesError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
        Ok(())
    }

    /// The declared bounds, if present and well-formed.
    ///
    /// # Errors
    ///
    /// Propagates metadata read failures; a missing or malformed `bounds`
    /// row is `Ok(None)`.
    pub fn bounds(&self) -> Result<Option<BoundingBox>, MbtilesError> {
        let Some(raw) = self.metadata_value("bounds")? else {
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

    /// The declared tile format, if present and recognized.
    ///
    /// # Errors
    ///
    /// Propagates metadata read failures.
    pub fn format(&self) -> Result<Option<TileFormat>, MbtilesError> {
        Ok(self
            .metadata_value("format")?
            .as_deref()
            .and_then(TileFormat::from_str))
    }

    /// The declared zoom range, if both ends are present and numeric.
    ///
    /// # Errors
    ///
    /// Propagates metadata read failures.
    pub fn zoom_range(&self) -> Result<Option<(u8, u8)>, MbtilesError> {
        let min = self.metadata_value("minzoom")?;
        let max = self.metadata_value("maxzoom")?;
        match (
            min.and_then(|v| v.parse().ok()),
            max.and_then(|v| v.parse().ok()),
        ) {
            (Some(min), Some(max)) => Ok(Some((min, max))),
            _ => Ok(None),
        }
    }

    fn metadata_value(&self, name: &str) -> Result<Option<String>, MbtilesError> {
        with_busy_retry(|| {
            self.conn
                .query_row(
                    "SELECT value FROM metadata WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    fn has_table(&self, name: &str) -> Result<bool, MbtilesError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Runs `op`, retrying on SQLite lock contention with exponential backoff.
fn with_busy_retry<T>(
    mut op: impl FnMut() -> Result<T, rusqlite::Error>,
) -> Result<T, MbtilesError> {
    let mut delay = BUSY_RETRY_BASE;
    for _ in 0..BUSY_RETRY_LIMIT {
        match op() {
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked =>
            {
                std::thread::sleep(delay);
                delay *= 2;
            }
            other => return other.map_err(MbtilesError::from),
        }
    }
    Err(MbtilesError::Busy)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_bounds() -> BoundingBox {
        BoundingBox::new(47.5, 47.0, 11.5, 11.0).unwrap()
    }

    fn create_store(dir: &tempfile::TempDir) -> Mbtiles {
        Mbtiles::create(
            dir.path().join("test.mbtiles"),
            "Test Region",
            TileFormat::Png,
            &test_bounds(),
            10,
            14,
        )
        .unwrap()
    }

    #[test]
    fn tiles_round_trip_through_the_tms_flip() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(&dir);

        let tile = TileCoordinate::new(5, 3, 4).unwrap();
        let blob = [1_u8, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        store.insert_tile(tile, &blob).unwrap();

        assert_eq!(store.get_tile(tile).unwrap().as_deref(), Some(&blob[..]));

        // The stored row is TMS 12; the slippy address (5, 12, 4) must
        // therefore be empty.
        let mirrored = TileCoordinate::new(5, 12, 4).unwrap();
        assert_eq!(store.get_tile(mirrored).unwrap(), None);

        // Verify the raw row directly against the schema.
        let raw_row: i64 = store
            .conn
            .query_row(
                "SELECT tile_row FROM tiles WHERE zoom_level = 4 AND tile_column = 5",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(raw_row, 12);
    }

    #[test]
    fn insert_is_an_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(&dir);
        let tile = TileCoordinate::new(1, 2, 3).unwrap();
        store.insert_tile(tile, b"old").unwrap();
        store.insert_tile(tile, b"new").unwrap();
        assert_eq!(store.get_tile(tile).unwrap().as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn rollback_preserves_committed_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(&dir);

        let kept = TileCoordinate::new(0, 0, 1).unwrap();
        store.begin_batch().unwrap();
        store.insert_tile(kept, b"kept").unwrap();
        store.commit_batch().unwrap();

        let dropped = TileCoordinate::new(1, 0, 1).unwrap();
        store.begin_batch().unwrap();
        store.insert_tile(dropped, b"dropped").unwrap();
        store.rollback_batch().unwrap();

        assert!(store.get_tile(kept).unwrap().is_some());
        assert_eq!(store.get_tile(dropped).unwrap(), None);
    }

    #[test]
    fn metadata_is_written_and_typed() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(&dir);
        drop(store);

        let reopened = Mbtiles::open(dir.path().join("test.mbtiles")).unwrap();
        let metadata = reopened.metadata().unwrap();
        assert_eq!(metadata.get("name").map(String::as_str), Some("Test Region"));
        assert_eq!(reopened.format().unwrap(), Some(TileFormat::Png));
        assert_eq!(reopened.zoom_range().unwrap(), Some((10, 14)));
        assert_eq!(reopened.bounds().unwrap(), Some(test_bounds()));
    }

    #[test]
    fn open_rejects_non_mbtiles_databases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE unrelated (a INTEGER)")
            .unwrap();
        drop(conn);

        assert!(matches!(
            Mbtiles::open(&path),
            Err(MbtilesError::CorruptSchema)
        ));
    }

    #[test]
    fn read_only_handles_cannot_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = create_store(&dir);
        drop(store);

        let reader = Mbtiles::open(dir.path().join("test.mbtiles")).unwrap();
        let tile = TileCoordinate::new(0, 0, 0).unwrap();
        assert!(reader.insert_tile(tile, b"nope").is_err());
    }
}
