//! # Activity cost model
//!
//! A pure function from edge attributes to traversal time in seconds.
//! The same function prices both directions of an edge: the reverse cost
//! is obtained by swapping elevation gain and loss.
//!
//! Every constant here is part of cost-model version "1", which the graph
//! builder stamps into the routing database metadata. Changing any value
//! means bumping [`COST_MODEL_VERSION`], because persisted costs and
//! freshly computed ones must agree.

use crate::RoutingMode;

/// Version stamp written to routing database metadata.
pub const COST_MODEL_VERSION: &str = "1";

/// Costs at or above this threshold mark an edge direction as impassable.
///
/// Oneway restrictions are encoded as `reverse_cost = INFINITE_COST`; the
/// routing engine refuses to expand any edge priced at or beyond it.
pub const INFINITE_COST: f64 = 1.0e15;

/// Seconds added per meter of climb while hiking (Naismith's rule).
pub const HIKING_CLIMB_PENALTY: f64 = 7.92;

/// Seconds added per meter of climb while cycling.
pub const CYCLING_CLIMB_PENALTY: f64 = 12.0;

/// Surface multiplier when the surface tag is absent or unrecognized.
/// Cycling assumes the worst; unknown ground is usually rideable only
/// slowly on a touring bike.
const UNKNOWN_SURFACE: [f64; 2] = [1.3, 2.0];

/// Descent grade band edges (grade = loss / distance).
const DESCENT_BANDS: [f64; 3] = [0.05, 0.15, 0.25];

/// Seconds per meter of loss within each descent band, per mode.
/// Monotone in grade: steeper descents are never cheaper.
const DESCENT_PENALTY: [[f64; 4]; 2] = [
    [0.0, 2.0, 6.0, 10.0], // hiking
    [0.0, 1.0, 4.0, 8.0],  // cycling
];

/// Multiplier applied to stairways. Hikers slow down; cyclists carry the
/// bike, priced so high that any detour wins (but still finite and below
/// [`INFINITE_COST`], so a staircase-only connection remains routable).
const STEPS_MULTIPLIER: [f64; 2] = [2.5, 1.0e6];

/// Edge attributes the cost model consumes.
///
/// `elevation_gain` and `elevation_loss` are the accumulated positive and
/// negative altitude deltas along the edge geometry, in meters.
#[derive(Clone, Copy, Debug, Default)]
pub struct EdgeCostInput<'a> {
    pub distance: f64,
    pub elevation_gain: f64,
    pub elevation_loss: f64,
    pub surface: Option<&'a str>,
    pub highway: Option<&'a str>,
    pub sac_scale: Option<&'a str>,
}

const fn mode_index(mode: RoutingMode) -> usize {
    match mode {
        RoutingMode::Hiking => 0,
        RoutingMode::Cycling => 1,
    }
}

fn surface_multiplier(surface: Option<&str>, mode: RoutingMode) -> f64 {
    let index = mode_index(mode);
    let Some(surface) = surface else {
        return UNKNOWN_SURFACE[index];
    };
    // (hiking, cycling) pairs; the cycling column climbs steeply for
    // ground a touring bike handles badly.
    let (hiking, cycling) = match surface {
        "asphalt" | "paved" | "concrete" => (1.0, 1.0),
        "paving_stones" | "sett" => (1.05, 1.2),
        "compacted" | "fine_gravel" => (1.0, 1.2),
        "gravel" | "pebblestone" => (1.05, 1.5),
        "ground" | "dirt" | "earth" | "unpaved" => (1.1, 1.8),
        "grass" => (1.2, 2.5),
        "rock" | "scree" => (1.4, 4.0),
        "sand" | "mud" => (1.5, 4.0),
        _ => (UNKNOWN_SURFACE[0], UNKNOWN_SURFACE[1]),
    };
    match mode {
        RoutingMode::Hiking => hiking,
        RoutingMode::Cycling => cycling,
    }
}

fn climb_penalty(elevation_gain: f64, mode: RoutingMode) -> f64 {
    let per_meter = match mode {
        RoutingMode::Hiking => HIKING_CLIMB_PENALTY,
        RoutingMode::Cycling => CYCLING_CLIMB_PENALTY,
    };
    elevation_gain * per_meter
}

fn descent_penalty(elevation_loss: f64, distance: f64, mode: RoutingMode) -> f64 {
    let grade = elevation_loss / distance;
    let band = DESCENT_BANDS.iter().position(|edge| grade < *edge).unwrap_or(DESCENT_BANDS.len());
    elevation_loss * DESCENT_PENALTY[mode_index(mode)][band]
}

/// Multiplier for the SAC hiking scale. Cycling ignores the scale (the
/// surface and highway terms already price technical ground).
fn sac_multiplier(sac_scale: Option<&str>) -> f64 {
    match sac_scale {
        Some("mountain_hiking") => 1.2,
        Some("demanding_mountain_hiking") => 1.5,
        Some("alpine_hiking") => 2.0,
        Some("demanding_alpine_hiking") => 3.0,
        Some("difficult_alpine_hiking") => 4.0,
        _ => 1.0,
    }
}

fn highway_multiplier(highway: Option<&str>, mode: RoutingMode) -> f64 {
    match highway {
        Some("steps") => STEPS_MULTIPLIER[mode_index(mode)],
        _ => 1.0,
    }
}

/// Traversal time for one edge direction, in seconds.
///
/// Zero-length edges cost zero. The result is always finite and
/// non-negative, and for passable edges it is monotone in distance and in
/// elevation gain.
pub fn edge_cost(input: &EdgeCostInput, mode: RoutingMode) -> f64 {
    if input.distance <= 0.0 {
        return 0.0;
    }

    let base = input.distance / mode.base_speed() * surface_multiplier(input.surface, mode);
    let climb = climb_penalty(input.elevation_gain, mode);
    let descent = descent_penalty(input.elevation_loss, input.distance, mode);

    let sac = match mode {
        RoutingMode::Hiking => sac_multiplier(input.sac_scale),
        RoutingMode::Cycling => 1.0,
    };

    (base + climb + descent) * sac * highway_multiplier(input.highway, mode)
}

/// Traversal time against the edge's stored direction.
///
/// Climbing one way is descending the other, so gain and loss swap.
pub fn reverse_edge_cost(input: &EdgeCostInput, mode: RoutingMode) -> f64 {
    let reversed = EdgeCostInput {
        elevation_gain: input.elevation_loss,
        elevation_loss: input.elevation_gain,
        ..*input
    };
    edge_cost(&reversed, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn flat_paved(distance: f64) -> EdgeCostInput<'static> {
        EdgeCostInput {
            distance,
            surface: Some("asphalt"),
            highway: Some("footway"),
            ..Default::default()
        }
    }

    #[test]
    fn flat_paved_kilometer_hiking() {
        let cost = edge_cost(&flat_paved(1000.0), RoutingMode::Hiking);
        assert!((cost - 751.9).abs() < 1.0, "cost was {cost}");
    }

    #[test]
    fn cycling_beats_hiking_on_pavement() {
        let hiking = edge_cost(&flat_paved(1000.0), RoutingMode::Hiking);
        let cycling = edge_cost(&flat_paved(1000.0), RoutingMode::Cycling);
        assert!(cycling < hiking);
    }

    #[test]
    fn naismith_climb_surcharge_is_exact() {
        let flat = edge_cost(&flat_paved(1000.0), RoutingMode::Hiking);
        let climb = edge_cost(
            &EdgeCostInput {
                elevation_gain: 100.0,
                ..flat_paved(1000.0)
            },
            RoutingMode::Hiking,
        );
        assert!((climb - (flat + 100.0 * 7.92)).abs() < 1.0);
    }

    #[test]
    fn zero_distance_is_free() {
        let input = EdgeCostInput {
            distance: 0.0,
            elevation_gain: 50.0,
            ..Default::default()
        };
        assert_eq!(edge_cost(&input, RoutingMode::Hiking), 0.0);
    }

    #[test]
    fn unknown_surface_defaults() {
        let known = edge_cost(&flat_paved(1000.0), RoutingMode::Hiking);
        let unknown = edge_cost(
            &EdgeCostInput {
                distance: 1000.0,
                highway: Some("footway"),
                ..Default::default()
            },
            RoutingMode::Hiking,
        );
        assert!((unknown / known - 1.3).abs() < 1e-9);
    }

    #[test]
    fn descent_bands_are_monotone_in_grade() {
        // Same loss, shrinking distance -> rising grade; per the banded
        // model the penalty must never decrease.
        let mut previous = 0.0;
        for distance in [4000.0, 1500.0, 800.0, 500.0, 300.0] {
            let penalty = descent_penalty(100.0, distance, RoutingMode::Hiking);
            assert!(penalty >= previous, "grade rose but penalty fell");
            previous = penalty;
        }
    }

    #[test]
    fn gentle_descents_are_free() {
        // 100m loss over 4km is a 2.5% grade, inside the free band.
        assert_eq!(descent_penalty(100.0, 4000.0, RoutingMode::Hiking), 0.0);
    }

    #[test]
    fn demanding_alpine_is_at_least_three_times_plain_hiking() {
        let plain = edge_cost(
            &EdgeCostInput {
                sac_scale: Some("hiking"),
                ..flat_paved(1000.0)
            },
            RoutingMode::Hiking,
        );
        let alpine = edge_cost(
            &EdgeCostInput {
                sac_scale: Some("demanding_alpine_hiking"),
                ..flat_paved(1000.0)
            },
            RoutingMode::Hiking,
        );
        assert!(alpine >= plain * 3.0);
    }

    #[test]
    fn sac_scale_is_ignored_for_cycling() {
        let base = edge_cost(&flat_paved(1000.0), RoutingMode::Cycling);
        let scaled = edge_cost(
            &EdgeCostInput {
                sac_scale: Some("difficult_alpine_hiking"),
                ..flat_paved(1000.0)
            },
            RoutingMode::Cycling,
        );
        assert_eq!(base, scaled);
    }

    #[test]
    fn steps_are_prohibitive_but_finite_for_cycling() {
        let steps = edge_cost(
            &EdgeCostInput {
                distance: 20.0,
                surface: Some("paved"),
                highway: Some("steps"),
                ..Default::default()
            },
            RoutingMode::Cycling,
        );
        assert!(steps > 1_000.0);
        assert!(steps < INFINITE_COST);
    }

    #[test]
    fn reverse_cost_swaps_gain_and_loss() {
        let input = EdgeCostInput {
            distance: 500.0,
            elevation_gain: 80.0,
            elevation_loss: 10.0,
            surface: Some("gravel"),
            highway: Some("path"),
            sac_scale: None,
        };
        let reversed = EdgeCostInput {
            elevation_gain: 10.0,
            elevation_loss: 80.0,
            ..input
        };
        assert_eq!(
            reverse_edge_cost(&input, RoutingMode::Hiking),
            edge_cost(&reversed, RoutingMode::Hiking)
        );
    }

    proptest! {
        #[test]
        fn cost_is_monotone_in_distance(
            d1 in 1.0f64..10_000.0,
            extra in 0.0f64..10_000.0,
            gain in 0.0f64..500.0,
        ) {
            // Hold the descent term out (loss = 0) so the banded grade
            // model cannot reshuffle between bands.
            let shorter = edge_cost(
                &EdgeCostInput { distance: d1, elevation_gain: gain, ..Default::default() },
                RoutingMode::Hiking,
            );
            let longer = edge_cost(
                &EdgeCostInput { distance: d1 + extra, elevation_gain: gain, ..Default::default() },
                RoutingMode::Hiking,
            );
            prop_assert!(longer >= shorter);
        }

        #[test]
        fn cost_is_monotone_in_gain(
            distance in 1.0f64..10_000.0,
            g1 in 0.0f64..1_000.0,
            extra in 0.0f64..1_000.0,
        ) {
            let lower = edge_cost(
                &EdgeCostInput { distance, elevation_gain: g1, ..Default::default() },
                RoutingMode::Hiking,
            );
            let higher = edge_cost(
                &EdgeCostInput { distance, elevation_gain: g1 + extra, ..Default::default() },
                RoutingMode::Hiking,
            );
            prop_assert!(higher >= lower);
        }

        #[test]
        fn cost_is_finite_and_nonnegative(
            distance in 0.0f64..50_000.0,
            gain in 0.0f64..3_000.0,
            loss in 0.0f64..3_000.0,
        ) {
            for mode in [RoutingMode::Hiking, RoutingMode::Cycling] {
                let cost = edge_cost(
                    &EdgeCostInput {
                        distance,
                        elevation_gain: gain,
                        elevation_loss: loss,
                        highway: Some("steps"),
                        ..Default::default()
                    },
                    mode,
                );
                prop_assert!(cost.is_finite());
                prop_assert!(cost >= 0.0);
            }
        }
    }
}
