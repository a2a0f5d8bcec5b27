//! # Turn detection
//!
//! Collapses a computed route's node path into a short list of
//! instructions. Classification is purely geometric (bearing deltas at
//! each junction) plus one semantic rule: going straight is only worth
//! announcing when the trail name changes.

use cairn_geo::{Coordinate, spherical};
use itertools::Itertools;

use crate::ComputedRoute;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bearing deltas below this are "straight on".
pub const STRAIGHT_THRESHOLD_DEGREES: f64 = 20.0;

/// Bearing deltas at or above this are sharp turns.
pub const SHARP_THRESHOLD_DEGREES: f64 = 120.0;

/// Bearing deltas at or above this are U-turns.
pub const U_TURN_THRESHOLD_DEGREES: f64 = 160.0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum TurnDirection {
    Start,
    Straight,
    Left,
    Right,
    SharpLeft,
    SharpRight,
    UTurn,
    Arrive,
}

/// One navigation instruction along a route.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct TurnInstruction {
    pub coordinate: Coordinate,
    pub direction: TurnDirection,
    /// Outgoing bearing in degrees, `[0, 360)`.
    pub bearing: f64,
    /// Meters since the previous instruction.
    pub distance_from_previous: f64,
    /// Meters from the route start.
    pub cumulative_distance: f64,
    pub description: String,
}

/// Normalizes a bearing difference to `(-180, 180]`.
fn normalize_delta(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped > 180.0 { wrapped - 360.0 } else { wrapped }
}

fn compass_name(bearing: f64) -> &'static str {
    const NAMES: [&str; 8] = [
        "north",
        "northeast",
        "east",
        "southeast",
        "south",
        "southwest",
        "west",
        "northwest",
    ];
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let sector = ((bearing + 22.5).rem_euclid(360.0) / 45.0) as usize;
    NAMES[sector.min(7)]
}

fn classify(delta: f64) -> TurnDirection {
    let magnitude = delta.abs();
    if magnitude < STRAIGHT_THRESHOLD_DEGREES {
        TurnDirection::Straight
    } else if magnitude >= U_TURN_THRESHOLD_DEGREES {
        TurnDirection::UTurn
    } else if magnitude >= SHARP_THRESHOLD_DEGREES {
        if delta < 0.0 {
            TurnDirection::SharpLeft
        } else {
            TurnDirection::SharpRight
        }
    } else if delta < 0.0 {
        TurnDirection::Left
    } else {
        TurnDirection::Right
    }
}

fn describe(direction: TurnDirection, bearing: f64, trail_name: Option<&str>) -> String {
    let phrase = match direction {
        TurnDirection::Start => format!("Head {}", compass_name(bearing)),
        TurnDirection::Straight => "Continue".to_string(),
        TurnDirection::Left => "Turn left".to_string(),
        TurnDirection::Right => "Turn right".to_string(),
        TurnDirection::SharpLeft => "Make a sharp left".to_string(),
        TurnDirection::SharpRight => "Make a sharp right".to_string(),
        TurnDirection::UTurn => "Make a U-turn".to_string(),
        TurnDirection::Arrive => return "Arrive at destination".to_string(),
    };
    match trail_name {
        Some(name) if direction == TurnDirection::Start => format!("{phrase} on {name}"),
        Some(name) => format!("{phrase} onto {name}"),
        None => phrase,
    }
}

/// Derives the instruction list for a computed route.
///
/// Routes with fewer than two nodes produce no instructions. Otherwise
/// the list starts with `Start`, ends with `Arrive`, and contains an
/// entry for every junction whose bearing delta or trail-name change is
/// worth announcing.
pub fn detect_turns(route: &ComputedRoute) -> Vec<TurnInstruction> {
    let positions: Vec<Coordinate> = route
        .nodes
        .iter()
        .filter_map(cairn_graph::db::RoutingNode::coordinate)
        .collect();
    if positions.len() < 2
        || positions.len() != route.nodes.len()
        || route.edges.len() + 1 != route.nodes.len()
    {
        return Vec::new();
    }

    // Cumulative distance at each node, from the edge lengths.
    let mut cumulative = vec![0.0];
    for edge in &route.edges {
        cumulative.push(cumulative.last().expect("nonempty") + edge.distance);
    }

    let mut instructions = Vec::new();
    let start_bearing = spherical::initial_bearing(positions[0], positions[1]);
    instructions.push(TurnInstruction {
        coordinate: positions[0],
        direction: TurnDirection::Start,
        bearing: start_bearing,
        distance_from_previous: 0.0,
        cumulative_distance: 0.0,
        description: describe(
            TurnDirection::Start,
            start_bearing,
            route.edges[0].name.as_deref(),
        ),
    });

    for (index, (before, at, after)) in positions.iter().tuple_windows().enumerate() {
        // The interior node between edges `index` and `index + 1`.
        let incoming = spherical::initial_bearing(*before, *at);
        let outgoing = spherical::initial_bearing(*at, *after);
        let delta = normalize_delta(outgoing - incoming);

        let direction = classify(delta);
        let incoming_name = route.edges[index].name.as_deref();
        let outgoing_name = route.edges[index + 1].name.as_deref();

        // Straight-on is noise unless the trail changes out from under
        // the user.
        if direction == TurnDirection::Straight && incoming_name == outgoing_name {
            continue;
        }

        let cumulative_distance = cumulative[index + 1];
        let previous_cumulative = instructions
            .last()
            .expect("the start instruction is always present")
            .cumulative_distance;
        instructions.push(TurnInstruction {
            coordinate: *at,
            direction,
            bearing: outgoing,
            distance_from_previous: cumulative_distance - previous_cumulative,
            cumulative_distance,
            description: describe(direction, outgoing, outgoing_name),
        });
    }

    let total = *cumulative.last().expect("nonempty");
    let previous_cumulative = instructions
        .last()
        .expect("the start instruction is always present")
        .cumulative_distance;
    let arrive_bearing = spherical::initial_bearing(
        positions[positions.len() - 2],
        positions[positions.len() - 1],
    );
    instructions.push(TurnInstruction {
        coordinate: positions[positions.len() - 1],
        direction: TurnDirection::Arrive,
        bearing: arrive_bearing,
        distance_from_previous: total - previous_cumulative,
        cumulative_distance: total,
        description: describe(TurnDirection::Arrive, arrive_bearing, None),
    });

    instructions
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_graph::db::{RoutingEdge, RoutingNode};

    fn route_from(points: &[(f64, f64)], names: &[Option<&str>]) -> ComputedRoute {
        assert_eq!(names.len() + 1, points.len());
        let nodes: Vec<RoutingNode> = points
            .iter()
            .enumerate()
            .map(|(i, (lat, lon))| RoutingNode {
                id: i64::try_from(i).unwrap() + 1,
                latitude: *lat,
                longitude: *lon,
                elevation: None,
            })
            .collect();
        let edges: Vec<RoutingEdge> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let from = &nodes[i];
                let to = &nodes[i + 1];
                let distance = spherical::distance(
                    from.coordinate().unwrap(),
                    to.coordinate().unwrap(),
                );
                RoutingEdge {
                    id: i64::try_from(i).unwrap() + 1,
                    from_node: from.id,
                    to_node: to.id,
                    distance,
                    elevation_gain: 0.0,
                    elevation_loss: 0.0,
                    surface: None,
                    highway_type: Some("path".into()),
                    sac_scale: None,
                    trail_visibility: None,
                    name: name.map(str::to_owned),
                    osm_way_id: 1,
                    cost: distance / 1.33,
                    reverse_cost: distance / 1.33,
                    is_oneway: false,
                    geometry: None,
                }
            })
            .collect();
        let total_distance = edges.iter().map(|e| e.distance).sum();
        let coordinates = nodes.iter().filter_map(RoutingNode::coordinate).collect();
        ComputedRoute {
            nodes,
            edges,
            coordinates,
            total_distance,
            total_cost: 0.0,
            estimated_duration: 0.0,
            elevation_gain: 0.0,
            elevation_loss: 0.0,
            via_points: Vec::new(),
        }
    }

    #[test]
    fn right_angle_route_yields_start_right_arrive() {
        // North, then east: a clean right turn at B.
        let route = route_from(
            &[(0.0, 0.0), (0.001, 0.0), (0.001, 0.001)],
            &[None, None],
        );
        let instructions = detect_turns(&route);
        assert_eq!(instructions.len(), 3);

        assert_eq!(instructions[0].direction, TurnDirection::Start);
        assert!(instructions[0].bearing.abs() < 0.01);

        assert_eq!(instructions[1].direction, TurnDirection::Right);
        assert!((instructions[1].bearing - 90.0).abs() < 0.1);

        assert_eq!(instructions[2].direction, TurnDirection::Arrive);
        assert_eq!(instructions[2].description, "Arrive at destination");
    }

    #[test]
    fn straight_with_same_name_is_suppressed() {
        let route = route_from(
            &[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)],
            &[Some("Zirbenweg"), Some("Zirbenweg")],
        );
        let instructions = detect_turns(&route);
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].direction, TurnDirection::Start);
        assert_eq!(instructions[1].direction, TurnDirection::Arrive);
    }

    #[test]
    fn straight_with_name_change_is_announced() {
        let route = route_from(
            &[(0.0, 0.0), (0.001, 0.0), (0.002, 0.0)],
            &[Some("Zirbenweg"), Some("Almweg")],
        );
        let instructions = detect_turns(&route);
        assert_eq!(instructions.len(), 3);
        assert_eq!(instructions[1].direction, TurnDirection::Straight);
        assert_eq!(instructions[1].description, "Continue onto Almweg");
    }

    #[test]
    fn classification_thresholds_are_exact() {
        assert_eq!(classify(0.0), TurnDirection::Straight);
        assert_eq!(classify(19.99), TurnDirection::Straight);
        assert_eq!(classify(20.0), TurnDirection::Right);
        assert_eq!(classify(-20.0), TurnDirection::Left);
        assert_eq!(classify(119.99), TurnDirection::Right);
        assert_eq!(classify(120.0), TurnDirection::SharpRight);
        assert_eq!(classify(-120.0), TurnDirection::SharpLeft);
        assert_eq!(classify(159.99), TurnDirection::SharpRight);
        assert_eq!(classify(160.0), TurnDirection::UTurn);
        assert_eq!(classify(-179.0), TurnDirection::UTurn);
    }

    #[test]
    fn cumulative_distance_is_monotonic() {
        let route = route_from(
            &[
                (0.0, 0.0),
                (0.001, 0.0),
                (0.001, 0.001),
                (0.002, 0.001),
                (0.002, 0.0),
            ],
            &[None, Some("a"), Some("b"), Some("c")],
        );
        let instructions = detect_turns(&route);
        assert_eq!(instructions[0].direction, TurnDirection::Start);
        assert_eq!(
            instructions.last().unwrap().direction,
            TurnDirection::Arrive
        );
        for pair in instructions.windows(2) {
            assert!(pair[1].cumulative_distance >= pair[0].cumulative_distance);
            assert!(
                (pair[1].distance_from_previous
                    - (pair[1].cumulative_distance - pair[0].cumulative_distance))
                    .abs()
                    < 1e-9
            );
        }
        let total: f64 = route.edges.iter().map(|e| e.distance).sum();
        assert!((instructions.last().unwrap().cumulative_distance - total).abs() < 1e-9);
    }

    #[test]
    fn degenerate_routes_produce_no_instructions() {
        let route = route_from(&[(0.0, 0.0)], &[]);
        assert!(detect_turns(&route).is_empty());
    }

    proptest::proptest! {
        #[test]
        fn classification_side_follows_the_delta_sign(delta in -180.0f64..=180.0) {
            let direction = classify(delta);
            if delta <= -STRAIGHT_THRESHOLD_DEGREES && delta > -U_TURN_THRESHOLD_DEGREES {
                proptest::prop_assert!(matches!(
                    direction,
                    TurnDirection::Left | TurnDirection::SharpLeft
                ));
            } else if delta >= STRAIGHT_THRESHOLD_DEGREES && delta < U_TURN_THRESHOLD_DEGREES {
                proptest::prop_assert!(matches!(
                    direction,
                    TurnDirection::Right | TurnDirection::SharpRight
                ));
            } else if delta.abs() < STRAIGHT_THRESHOLD_DEGREES {
                proptest::prop_assert!(matches!(direction, TurnDirection::Straight));
            } else {
                proptest::prop_assert!(matches!(direction, TurnDirection::UTurn));
            }
        }
    }

    #[test]
    fn left_turns_have_negative_delta() {
        // North, then west.
        let route = route_from(
            &[(0.0, 0.0), (0.001, 0.0), (0.001, -0.001)],
            &[None, None],
        );
        let instructions = detect_turns(&route);
        assert_eq!(instructions[1].direction, TurnDirection::Left);
        assert!((instructions[1].bearing - 270.0).abs() < 0.1);
    }
}
