use std::ops::RangeInclusive;

use crate::{Coordinate, BoundingBox, GeoError, mercator};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The deepest zoom level any tile source in this application serves.
pub const MAX_ZOOM: u8 = 22;

/// A slippy-map tile address.
///
/// In memory (and over the wire to tile servers) y grows southward from 0
/// at the north edge. MBTiles files on disk use the opposite TMS
/// convention; [`TileCoordinate::tms_y`] performs that flip and is its own
/// inverse.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TileCoordinate {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoordinate {
    /// Creates a tile coordinate, checking that `x` and `y` fit the zoom.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidZoom`] for `z > 22` and
    /// [`GeoError::InvalidTile`] when `x` or `y` is outside `[0, 2^z)`.
    pub fn new(x: u32, y: u32, z: u8) -> Result<Self, GeoError> {
        if z > MAX_ZOOM {
            return Err(GeoError::InvalidZoom(z));
        }
        let extent = 1_u32 << z;
        if x >= extent || y >= extent {
            return Err(GeoError::InvalidTile { x, y, z });
        }
        Ok(Self { x, y, z })
    }

    /// The tile containing `coordinate` at zoom `z`.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidZoom`] for `z > 22`.
    pub fn from_coordinate(coordinate: Coordinate, z: u8) -> Result<Self, GeoError> {
        if z > MAX_ZOOM {
            return Err(GeoError::InvalidZoom(z));
        }
        let (px, py) = mercator::coordinate_to_pixel(coordinate, z);
        let max_index = f64::from((1_u32 << z) - 1);
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let x = (px / f64::from(mercator::TILE_SIZE)).floor().clamp(0.0, max_index) as u32;
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let y = (py / f64::from(mercator::TILE_SIZE)).floor().clamp(0.0, max_index) as u32;
        Ok(Self { x, y, z })
    }

    /// The TMS row for this tile: `(2^z - 1) - y`.
    ///
    /// Applying the same formula to the result returns the slippy y, so the
    /// conversion is an involution.
    pub const fn tms_y(&self) -> u32 {
        ((1_u32 << self.z) - 1) - self.y
    }

    /// Builds a tile coordinate from a TMS row as stored in MBTiles.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidZoom`] or [`GeoError::InvalidTile`] as
    /// in [`TileCoordinate::new`].
    pub fn from_tms(x: u32, tms_y: u32, z: u8) -> Result<Self, GeoError> {
        if z > MAX_ZOOM {
            return Err(GeoError::InvalidZoom(z));
        }
        let extent = 1_u32 << z;
        if x >= extent || tms_y >= extent {
            return Err(GeoError::InvalidTile { x, y: tms_y, z });
        }
        Ok(Self {
            x,
            y: (extent - 1) - tms_y,
            z,
        })
    }
}

/// The rectangular set of tiles covering a bounding box at one zoom level.
///
/// Inclusive on all four edges: a bbox touching a tile boundary includes
/// the tiles on both sides of it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TileRange {
    pub z: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Computes the covering range of `bbox` at zoom `z`.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidZoom`] for `z > 22`.
    pub fn from_bounding_box(bbox: &BoundingBox, z: u8) -> Result<Self, GeoError> {
        let nw = Coordinate::new(bbox.north(), bbox.west())
            .expect("bbox corners are validated at construction");
        let se = Coordinate::new(bbox.south(), bbox.east())
            .expect("bbox corners are validated at construction");
        let top_left = TileCoordinate::from_coordinate(nw, z)?;
        let bottom_right = TileCoordinate::from_coordinate(se, z)?;
        Ok(Self {
            z,
            min_x: top_left.x,
            max_x: bottom_right.x,
            min_y: top_left.y,
            max_y: bottom_right.y,
        })
    }

    /// Number of tiles in the range.
    pub const fn tile_count(&self) -> u64 {
        let width = (self.max_x - self.min_x + 1) as u64;
        let height = (self.max_y - self.min_y + 1) as u64;
        width * height
    }

    /// Iterates the range row-major (north to south, west to east).
    pub fn tiles(&self) -> impl Iterator<Item = TileCoordinate> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_x..=self.max_x).map(move |x| TileCoordinate { x, y, z: self.z })
        })
    }

    /// Total tile count for `bbox` across an inclusive zoom range.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidZoom`] when the range reaches past the
    /// supported maximum.
    pub fn estimate_tile_count(
        bbox: &BoundingBox,
        zoom_levels: RangeInclusive<u8>,
    ) -> Result<u64, GeoError> {
        let mut total = 0;
        for z in zoom_levels {
            total += Self::from_bounding_box(bbox, z)?.tile_count();
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn rejects_tiles_outside_the_zoom_extent() {
        assert!(TileCoordinate::new(0, 0, 0).is_ok());
        assert!(TileCoordinate::new(1, 0, 0).is_err());
        assert!(TileCoordinate::new(15, 15, 4).is_ok());
        assert!(TileCoordinate::new(16, 15, 4).is_err());
        assert!(TileCoordinate::new(0, 0, 23).is_err());
    }

    #[test]
    fn tms_flip_matches_the_documented_example() {
        let tile = TileCoordinate::new(5, 3, 4).unwrap();
        assert_eq!(tile.tms_y(), 12);
        assert_eq!(TileCoordinate::from_tms(5, 12, 4).unwrap(), tile);
    }

    #[test]
    fn world_tile_at_zoom_zero() {
        let anywhere = Coordinate::new(47.0, 11.0).unwrap();
        let tile = TileCoordinate::from_coordinate(anywhere, 0).unwrap();
        assert_eq!(tile, TileCoordinate { x: 0, y: 0, z: 0 });
    }

    #[test]
    fn innsbruck_tile_at_zoom_14() {
        // Precomputed with the standard slippy formula.
        let innsbruck = Coordinate::new(47.2692, 11.4041).unwrap();
        let tile = TileCoordinate::from_coordinate(innsbruck, 14).unwrap();
        assert_eq!((tile.x, tile.y), (8711, 5744));
    }

    #[test]
    fn range_is_inclusive_of_both_corners() {
        let bbox = BoundingBox::new(47.1, 47.0, 11.2, 11.0).unwrap();
        let range = TileRange::from_bounding_box(&bbox, 12).unwrap();
        let tiles: Vec<_> = range.tiles().collect();
        assert_eq!(tiles.len() as u64, range.tile_count());
        // The northwest corner lands in the first tile, southeast in the last.
        let nw = TileCoordinate::from_coordinate(Coordinate::new(47.1, 11.0).unwrap(), 12).unwrap();
        let se = TileCoordinate::from_coordinate(Coordinate::new(47.0, 11.2).unwrap(), 12).unwrap();
        assert_eq!(tiles.first(), Some(&nw));
        assert_eq!(tiles.last(), Some(&se));
    }

    #[test]
    fn estimate_sums_across_zooms() {
        let bbox = BoundingBox::new(47.1, 47.0, 11.2, 11.0).unwrap();
        let sum: u64 = (10..=14)
            .map(|z| {
                TileRange::from_bounding_box(&bbox, z)
                    .unwrap()
                    .tile_count()
            })
            .sum();
        assert_eq!(TileRange::estimate_tile_count(&bbox, 10..=14).unwrap(), sum);
    }

    proptest! {
        #[test]
        fn tms_conversion_is_an_involution(z in 0_u8..=18, seed in any::<u32>()) {
            let extent = 1_u32 << z;
            let x = seed % extent;
            let y = seed.rotate_left(7) % extent;
            let tile = TileCoordinate::new(x, y, z).unwrap();
            let twice = ((1_u32 << z) - 1) - tile.tms_y();
            prop_assert_eq!(twice, tile.y);
            prop_assert_eq!(TileCoordinate::from_tms(x, tile.tms_y(), z).unwrap(), tile);
        }

        #[test]
        fn range_count_matches_enumeration(
            south in -80.0f64..79.0,
            west in -170.0f64..169.0,
            d_lat in 0.001f64..1.0,
            d_lon in 0.001f64..1.0,
            z in 0_u8..=14,
        ) {
            let bbox = BoundingBox::new(south + d_lat, south, west + d_lon, west).unwrap();
            let range = TileRange::from_bounding_box(&bbox, z).unwrap();
            prop_assert_eq!(range.tiles().count() as u64, range.tile_count());
            prop_assert_eq!(
                TileRange::estimate_tile_count(&bbox, z..=z).unwrap(),
                range.tile_count()
            );
        }
    }
}
