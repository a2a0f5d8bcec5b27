//! # Spherical math
//!
//! Great-circle helpers over the mean-radius sphere. These are the hot
//! functions of the routing core (edge lengths, the A\* heuristic, turn
//! bearings), so they are hand-rolled rather than pulled from a geometry
//! crate; the test suite cross-checks them against `geo`'s Haversine
//! implementation as an oracle.

use crate::{Coordinate, EARTH_RADIUS_METERS};

/// Great-circle distance between two coordinates in meters.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat_a = a.latitude().to_radians();
    let lat_b = b.latitude().to_radians();
    let d_lat = (b.latitude() - a.latitude()).to_radians();
    let d_lon = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // Clamp guards against rounding pushing h past 1 for antipodal pairs.
    2.0 * EARTH_RADIUS_METERS * h.sqrt().min(1.0).asin()
}

/// Initial (forward) bearing from `a` to `b` in degrees, normalized to
/// `[0, 360)`.
///
/// Coincident inputs return `0.0` so that callers classifying turns never
/// see NaN.
pub fn initial_bearing(a: Coordinate, b: Coordinate) -> f64 {
    if a == b {
        return 0.0;
    }
    let lat_a = a.latitude().to_radians();
    let lat_b = b.latitude().to_radians();
    let d_lon = (b.longitude() - a.longitude()).to_radians();

    let y = d_lon.sin() * lat_b.cos();
    let x = lat_a.cos() * lat_b.sin() - lat_a.sin() * lat_b.cos() * d_lon.cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Projects a destination point from `origin` along `bearing_degrees` for
/// `distance_meters` on the sphere.
pub fn destination(origin: Coordinate, bearing_degrees: f64, distance_meters: f64) -> Coordinate {
    let lat = origin.latitude().to_radians();
    let lon = origin.longitude().to_radians();
    let bearing = bearing_degrees.to_radians();
    let angular = distance_meters / EARTH_RADIUS_METERS;

    let dest_lat = (lat.sin() * angular.cos() + lat.cos() * angular.sin() * bearing.cos()).asin();
    let dest_lon = lon
        + (bearing.sin() * angular.sin() * lat.cos())
            .atan2(angular.cos() - lat.sin() * dest_lat.sin());

    // Normalize longitude back into [-180, 180].
    let lon_deg = (dest_lon.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    let lat_deg = dest_lat.to_degrees().clamp(-90.0, 90.0);
    Coordinate::new(lat_deg, lon_deg).expect("projected point is normalized to valid ranges")
}
