#![doc = include_str!("../README.md")]

mod coordinate;
pub mod mercator;
pub mod spherical;
mod tile;

use thiserror::Error;

pub use coordinate::{BoundingBox, Coordinate};
pub use tile::{MAX_ZOOM, TileCoordinate, TileRange};

/// Mean Earth radius in meters, shared by all spherical formulas.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude (WGS84 mean).
pub const METERS_PER_DEGREE_LAT: f64 = 111_132.954;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum GeoError {
    #[error("invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("invalid bounding box: n={north} s={south} e={east} w={west}")]
    InvalidBoundingBox {
        north: f64,
        south: f64,
        east: f64,
        west: f64,
    },
    #[error("tile ({x}, {y}) does not exist at zoom {z}")]
    InvalidTile { x: u32, y: u32, z: u8 },
    #[error("zoom {0} is beyond the supported maximum of {MAX_ZOOM}")]
    InvalidZoom(u8),
}
