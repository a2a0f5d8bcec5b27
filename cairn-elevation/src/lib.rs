//! # DEM elevation provider
//!
//! Maps a latitude/longitude to a meter altitude using a directory of
//! SRTM HGT tiles (optionally gzip-wrapped). Tiles are decoded once and
//! held in an LRU cache; absent tiles are negatively cached so a graph
//! build over a partially covered region does not hammer the filesystem.

mod hgt;

use std::io::Read;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use flate2::read::GzDecoder;
use lru::LruCache;
use thiserror::Error;

pub use hgt::{HgtTile, SRTM1_FILE_LEN, SRTM3_FILE_LEN, VOID_SAMPLE};

/// Tiles kept in memory by default. An SRTM1 tile decodes to ~25 MB, so
/// this bounds the cache at well under a gigabyte for continental builds.
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Error)]
pub enum ElevationError {
    #[error("no DEM tile {name} covering latitude {latitude}, longitude {longitude}")]
    MissingTile {
        name: String,
        latitude: f64,
        longitude: f64,
    },
    #[error("DEM tile {path} has unrecognized size {len} bytes")]
    CorruptTile { path: PathBuf, len: usize },
    #[error("I/O error reading DEM tile: {0}")]
    Io(#[from] std::io::Error),
    #[error("tile cache lock is poisoned: {0}")]
    PoisonedCacheLock(String),
}

/// An elevation source backed by a directory of `*.hgt` / `*.hgt.gz`
/// files named by the integer coordinates of their south-west corner.
pub struct ElevationProvider {
    dem_dir: PathBuf,
    // `None` entries record tiles known to be absent on disk.
    cache: Mutex<LruCache<(i32, i32), Option<Arc<HgtTile>>>>,
}

impl ElevationProvider {
    pub fn new(dem_dir: impl Into<PathBuf>) -> Self {
        Self::with_cache_capacity(
            dem_dir,
            NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("default capacity is nonzero"),
        )
    }

    pub fn with_cache_capacity(dem_dir: impl Into<PathBuf>, capacity: NonZeroUsize) -> Self {
        Self {
            dem_dir: dem_dir.into(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The canonical tile name for a south-west corner, e.g. `N47E011` or
    /// `S01W072`.
    pub fn tile_name(lat_floor: i32, lon_floor: i32) -> String {
        let ns = if lat_floor < 0 { 'S' } else { 'N' };
        let ew = if lon_floor < 0 { 'W' } else { 'E' };
        format!(
            "{ns}{:02}{ew}{:03}",
            lat_floor.unsigned_abs(),
            lon_floor.unsigned_abs()
        )
    }

    /// Elevation in meters, or `None` when the sample is void *or* no tile
    /// covers the point.
    ///
    /// # Errors
    ///
    /// Fails with [`ElevationError::CorruptTile`] for files of unrecognized
    /// size and [`ElevationError::Io`] for underlying read failures. A
    /// missing tile is not an error through this entry point.
    pub fn elevation(&self, latitude: f64, longitude: f64) -> Result<Option<f64>, ElevationError> {
        match self.lookup(latitude, longitude) {
            Err(ElevationError::MissingTile { .. }) => Ok(None),
            other => other,
        }
    }

    /// Elevation in meters; requires DEM coverage for the queried point.
    ///
    /// # Errors
    ///
    /// As [`ElevationProvider::elevation`], but a tile absent from the DEM
    /// directory fails with [`ElevationError::MissingTile`].
    pub fn elevation_strict(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<f64>, ElevationError> {
        self.lookup(latitude, longitude)
    }

    fn lookup(&self, latitude: f64, longitude: f64) -> Result<Option<f64>, ElevationError> {
        #[expect(clippy::cast_possible_truncation)]
        let lat_floor = latitude.floor() as i32;
        #[expect(clippy::cast_possible_truncation)]
        let lon_floor = longitude.floor() as i32;

        let Some(tile) = self.tile(lat_floor, lon_floor)? else {
            return Err(ElevationError::MissingTile {
                name: Self::tile_name(lat_floor, lon_floor),
                latitude,
                longitude,
            });
        };

        let max_index = f64::from(tile.samples_per_side() - 1);
        // Row 0 is the tile's north edge (lat_floor + 1).
        let row = (f64::from(lat_floor) + 1.0 - latitude) * max_index;
        let col = (longitude - f64::from(lon_floor)) * max_index;
        Ok(tile.interpolate(row, col))
    }

    fn tile(
        &self,
        lat_floor: i32,
        lon_floor: i32,
    ) -> Result<Option<Arc<HgtTile>>, ElevationError> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|e| ElevationError::PoisonedCacheLock(e.to_string()))?;
        cache
            .try_get_or_insert((lat_floor, lon_floor), || {
                self.load_tile(lat_floor, lon_floor)
            })
            .cloned()
    }

    fn load_tile(
        &self,
        lat_floor: i32,
        lon_floor: i32,
    ) -> Result<Option<Arc<HgtTile>>, ElevationError> {
        let name = Self::tile_name(lat_floor, lon_floor);

        let plain = self.dem_dir.join(format!("{name}.hgt"));
        let gzipped = self.dem_dir.join(format!("{name}.hgt.gz"));

        let (path, data) = if plain.is_file() {
            let data = std::fs::read(&plain)?;
            (plain, data)
        } else if gzipped.is_file() {
            let file = std::fs::File::open(&gzipped)?;
            let mut decoder = GzDecoder::new(file);
            let mut data = Vec::with_capacity(SRTM3_FILE_LEN);
            decoder.read_to_end(&mut data)?;
            (gzipped, data)
        } else {
            return Ok(None);
        };

        let tile = HgtTile::from_bytes(data)
            .map_err(|len| ElevationError::CorruptTile { path, len })?;
        Ok(Some(Arc::new(tile)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn synthetic_tile(value: i16) -> Vec<u8> {
        let mut data = vec![0_u8; SRTM3_FILE_LEN];
        for chunk in data.chunks_exact_mut(2) {
            chunk.copy_from_slice(&value.to_be_bytes());
        }
        data
    }

    fn provider_with_tile(name: &str, data: &[u8]) -> (tempfile::TempDir, ElevationProvider) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(name), data).unwrap();
        let provider = ElevationProvider::new(dir.path());
        (dir, provider)
    }

    #[test]
    fn tile_names_follow_the_srtm_convention() {
        assert_eq!(ElevationProvider::tile_name(47, 11), "N47E011");
        assert_eq!(ElevationProvider::tile_name(-1, -72), "S01W072");
        assert_eq!(ElevationProvider::tile_name(0, 0), "N00E000");
        assert_eq!(ElevationProvider::tile_name(-33, 151), "S33E151");
    }

    #[test]
    fn uniform_tile_queries_return_the_constant() {
        let (_dir, provider) = provider_with_tile("N47E011.hgt", &synthetic_tile(1234));
        for (lat, lon) in [(47.0001, 11.0001), (47.5, 11.5), (47.9999, 11.9999)] {
            let elevation = provider.elevation(lat, lon).unwrap().unwrap();
            assert!((elevation - 1234.0).abs() < 1e-9);
        }
    }

    #[test]
    fn void_at_the_northwest_corner_returns_none() {
        let mut data = synthetic_tile(1234);
        data[0] = 0x80;
        data[1] = 0x00;
        let (_dir, provider) = provider_with_tile("N47E011.hgt", &data);
        // Just inside the NW corner of N47E011: the nearest sample is the
        // void at (row 0, col 0).
        assert_eq!(provider.elevation(47.9999, 11.0001).unwrap(), None);
        // One step away the void loses nearest-neighbour status.
        let recovered = provider.elevation(47.999, 11.001).unwrap().unwrap();
        assert!((recovered - 1234.0).abs() < 1e-9);
    }

    #[test]
    fn missing_tile_is_none_lenient_and_error_strict() {
        let (_dir, provider) = provider_with_tile("N47E011.hgt", &synthetic_tile(7));
        assert_eq!(provider.elevation(10.5, 10.5).unwrap(), None);
        assert!(matches!(
            provider.elevation_strict(10.5, 10.5),
            Err(ElevationError::MissingTile { .. })
        ));
    }

    #[test]
    fn truncated_tile_is_rejected() {
        let (_dir, provider) = provider_with_tile("N47E011.hgt", &[0_u8; 1000]);
        assert!(matches!(
            provider.elevation(47.5, 11.5),
            Err(ElevationError::CorruptTile { len: 1000, .. })
        ));
    }

    #[test]
    fn gzip_wrapped_tiles_are_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let raw = synthetic_tile(555);
        let file = std::fs::File::create(dir.path().join("N47E011.hgt.gz")).unwrap();
        let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        encoder.write_all(&raw).unwrap();
        encoder.finish().unwrap();

        let provider = ElevationProvider::new(dir.path());
        let elevation = provider.elevation(47.5, 11.5).unwrap().unwrap();
        assert!((elevation - 555.0).abs() < 1e-9);
    }

    #[test]
    fn queries_on_the_shared_edge_hit_the_southern_tile_row() {
        // lat = 47.0 is both the south edge of N47 and the north edge of
        // N46; the provider floors to N47 only for lat > 47.
        let mut data = synthetic_tile(100);
        // Southern edge row of N47E011 (row 1200) reads 900.
        for col in 0..1201_usize {
            let index = (1200 * 1201 + col) * 2;
            data[index..index + 2].copy_from_slice(&900_i16.to_be_bytes());
        }
        let (_dir, provider) = provider_with_tile("N47E011.hgt", &data);
        let elevation = provider.elevation(47.0, 11.5).unwrap().unwrap();
        assert!((elevation - 900.0).abs() < 1e-9);
    }
}
