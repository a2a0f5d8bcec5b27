//! # Edge geometry codec
//!
//! Edge shapes are persisted as packed little-endian
//! `(lat µ°: i32, lon µ°: i32, elevation m: i16)` triples: ten bytes per
//! point, first point = from-node, last point = to-node. Unknown
//! elevations carry the DEM void sentinel. Fixed-width packing (rather
//! than varint deltas) keeps the decoder branch-free; trail-length shapes
//! are short enough that the size difference doesn't matter.

use cairn_elevation::VOID_SAMPLE;
use thiserror::Error;
use zerocopy::{FromBytes, I16, I32, IntoBytes, LE};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Encoded size of one geometry point.
pub const POINT_LEN: usize = 10;

const MICRODEGREES: f64 = 1e6;

#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("geometry blob length {0} is not a multiple of {POINT_LEN}")]
    Misaligned(usize),
}

#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct PackedPoint {
    lat: I32<LE>,
    lon: I32<LE>,
    elevation: I16<LE>,
}

/// One decoded shape point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometryPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters; `None` where the DEM had no answer.
    pub elevation: Option<i16>,
}

impl GeometryPoint {
    pub fn new(latitude: f64, longitude: f64, elevation: Option<i16>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
        }
    }
}

/// Packs shape points into the on-disk blob.
pub fn encode_geometry(points: &[GeometryPoint]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(points.len() * POINT_LEN);
    for point in points {
        #[expect(clippy::cast_possible_truncation)]
        let packed = PackedPoint {
            lat: I32::new((point.latitude * MICRODEGREES).round() as i32),
            lon: I32::new((point.longitude * MICRODEGREES).round() as i32),
            elevation: I16::new(point.elevation.unwrap_or(VOID_SAMPLE)),
        };
        blob.extend_from_slice(packed.as_bytes());
    }
    blob
}

/// Unpacks an on-disk blob into shape points.
///
/// # Errors
///
/// Fails with [`GeometryError::Misaligned`] when the blob length is not a
/// whole number of points.
pub fn decode_geometry(blob: &[u8]) -> Result<Vec<GeometryPoint>, GeometryError> {
    if blob.len() % POINT_LEN != 0 {
        return Err(GeometryError::Misaligned(blob.len()));
    }
    let mut points = Vec::with_capacity(blob.len() / POINT_LEN);
    for chunk in blob.chunks_exact(POINT_LEN) {
        let packed = PackedPoint::read_from_bytes(chunk).expect("chunk is exactly one point");
        let elevation = match packed.elevation.get() {
            VOID_SAMPLE => None,
            value => Some(value),
        };
        points.push(GeometryPoint {
            latitude: f64::from(packed.lat.get()) / MICRODEGREES,
            longitude: f64::from(packed.lon.get()) / MICRODEGREES,
            elevation,
        });
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_ten_bytes_per_point_little_endian() {
        let blob = encode_geometry(&[GeometryPoint::new(47.123456, 11.654321, Some(2100))]);
        assert_eq!(blob.len(), POINT_LEN);
        assert_eq!(&blob[0..4], 47_123_456_i32.to_le_bytes().as_slice());
        assert_eq!(&blob[4..8], 11_654_321_i32.to_le_bytes().as_slice());
        assert_eq!(&blob[8..10], 2100_i16.to_le_bytes().as_slice());
    }

    #[test]
    fn void_elevation_round_trips_as_none() {
        let points = [
            GeometryPoint::new(47.0, 11.0, Some(500)),
            GeometryPoint::new(-33.5, 151.25, None),
        ];
        let decoded = decode_geometry(&encode_geometry(&points)).unwrap();
        assert_eq!(decoded.as_slice(), points.as_slice());
    }

    #[test]
    fn rejects_torn_blobs() {
        assert_eq!(decode_geometry(&[0_u8; 13]), Err(GeometryError::Misaligned(13)));
    }
}
