use crate::{GeoError, METERS_PER_DEGREE_LAT};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A validated WGS84 coordinate.
///
/// Latitude is restricted to `[-90, 90]` and longitude to `[-180, 180]`;
/// NaN and infinities are rejected at construction, so every `Coordinate`
/// in the program is usable in spherical math without further checks.
///
/// Equality is exact (bitwise on the two floats). Call sites that want
/// "same point" semantics are expected to round explicitly first.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

impl Coordinate {
    /// Creates a coordinate, validating the ranges.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidCoordinate`] when either component is
    /// NaN, infinite, or outside its valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(GeoError::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    pub const fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// An axis-aligned geographic bounding box.
///
/// The box never crosses the antimeridian: `west <= east` always holds,
/// as does `south <= north`, so the box is non-empty by construction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct BoundingBox {
    north: f64,
    south: f64,
    east: f64,
    west: f64,
}

impl BoundingBox {
    /// Creates a bounding box from its four edges.
    ///
    /// # Errors
    ///
    /// Fails with [`GeoError::InvalidBoundingBox`] when the edges are not
    /// finite, are out of coordinate range, or are ordered such that the box
    /// would be empty or cross the antimeridian.
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Result<Self, GeoError> {
        let corners_valid = Coordinate::new(north, east).is_ok() && Coordinate::new(south, west).is_ok();
        if !corners_valid || south > north || west > east {
            return Err(GeoError::InvalidBoundingBox {
                north,
                south,
                east,
                west,
            });
        }
        Ok(Self {
            north,
            south,
            east,
            west,
        })
    }

    /// The smallest box containing every coordinate in the iterator.
    ///
    /// Returns `None` for an empty iterator.
    pub fn enclosing(coordinates: impl IntoIterator<Item = Coordinate>) -> Option<Self> {
        let mut iter = coordinates.into_iter();
        let first = iter.next()?;
        let mut bbox = Self {
            north: first.latitude(),
            south: first.latitude(),
            east: first.longitude(),
            west: first.longitude(),
        };
        for c in iter {
            bbox.north = bbox.north.max(c.latitude());
            bbox.south = bbox.south.min(c.latitude());
            bbox.east = bbox.east.max(c.longitude());
            bbox.west = bbox.west.min(c.longitude());
        }
        Some(bbox)
    }

    pub const fn north(&self) -> f64 {
        self.north
    }

    pub const fn south(&self) -> f64 {
        self.south
    }

    pub const fn east(&self) -> f64 {
        self.east
    }

    pub const fn west(&self) -> f64 {
        self.west
    }

    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: f64::midpoint(self.south, self.north),
            longitude: f64::midpoint(self.west, self.east),
        }
    }

    pub fn contains(&self, coordinate: Coordinate) -> bool {
        (self.south..=self.north).contains(&coordinate.latitude())
            && (self.west..=self.east).contains(&coordinate.longitude())
    }

    /// Approximate surface area in km².
    ///
    /// Uses the cosine-of-mean-latitude correction for the longitudinal
    /// extent; good to well under a percent at the box sizes this
    /// application downloads (tens of kilometers).
    pub fn area_km2(&self) -> f64 {
        let mean_lat = f64::midpoint(self.south, self.north).to_radians();
        let height_km = (self.north - self.south) * METERS_PER_DEGREE_LAT / 1000.0;
        let width_km = (self.east - self.west) * METERS_PER_DEGREE_LAT * mean_lat.cos() / 1000.0;
        height_km * width_km
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(-90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, 180.1).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
        assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn accepts_boundary_coordinates() {
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(-90.0, -180.0).is_ok());
    }

    #[test]
    fn rejects_inverted_bounding_box() {
        assert!(BoundingBox::new(46.0, 47.0, 11.0, 10.0).is_err());
        assert!(BoundingBox::new(47.0, 46.0, 10.0, 11.0).is_err());
    }

    #[test]
    fn enclosing_covers_all_points() {
        let points = [
            Coordinate::new(47.0, 11.0).unwrap(),
            Coordinate::new(47.5, 10.5).unwrap(),
            Coordinate::new(46.8, 11.2).unwrap(),
        ];
        let bbox = BoundingBox::enclosing(points).unwrap();
        assert_eq!(bbox.north(), 47.5);
        assert_eq!(bbox.south(), 46.8);
        assert_eq!(bbox.east(), 11.2);
        assert_eq!(bbox.west(), 10.5);
        for p in points {
            assert!(bbox.contains(p));
        }
    }

    #[test]
    fn area_of_one_degree_square_at_equator() {
        let bbox = BoundingBox::new(0.5, -0.5, 0.5, -0.5).unwrap();
        // Roughly 111km x 111km.
        let area = bbox.area_km2();
        assert!((12_000.0..13_000.0).contains(&area), "area was {area}");
    }
}
