//! # Route follower
//!
//! Consumes live positions against a computed route and answers the
//! questions a navigation screen asks every tick: how far along are we,
//! what comes next, are we still on the trail, have we arrived.
//!
//! The follower owns mutable state (the last instruction index and the
//! off-route latch) and must be driven from a single task.

use cairn_geo::{Coordinate, METERS_PER_DEGREE_LAT, spherical};

use crate::TurnInstruction;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distance from the route at which the follower reports off-route.
pub const OFF_ROUTE_TRIGGER_METERS: f64 = 50.0;

/// Distance at which an off-route follower snaps back to on-route.
/// Strictly below the trigger: positions in between keep the prior state,
/// so GPS jitter around a single threshold cannot flap the flag.
pub const OFF_ROUTE_CLEAR_METERS: f64 = 30.0;

/// "Approaching turn" lead-in distance.
pub const APPROACH_TURN_METERS: f64 = 100.0;

/// "At the turn" distance.
pub const AT_TURN_METERS: f64 = 30.0;

/// Arrival radius around the final route coordinate.
pub const ARRIVAL_METERS: f64 = 30.0;

/// Everything a navigation UI needs for one tick.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct NavigationState {
    /// The next instruction to execute, if any remain.
    pub current_instruction: Option<TurnInstruction>,
    /// Meters along the route until that instruction.
    pub distance_to_next_turn: f64,
    /// Fraction of the route walked, in `[0, 1]`.
    pub progress: f32,
    /// Meters of route left.
    pub remaining_distance: f64,
    pub is_approaching_turn: bool,
    pub is_at_turn: bool,
    pub is_off_route: bool,
    /// Perpendicular meters from the route polyline.
    pub distance_from_route: f64,
    pub has_arrived: bool,
}

/// Stateful navigation tracker for one computed route.
pub struct RouteFollower {
    coordinates: Vec<Coordinate>,
    instructions: Vec<TurnInstruction>,
    total_distance: f64,
    /// Index of the next unexecuted instruction; only ever advances.
    next_instruction: usize,
    off_route: bool,
}

impl RouteFollower {
    pub fn new(
        coordinates: Vec<Coordinate>,
        instructions: Vec<TurnInstruction>,
        total_distance: f64,
    ) -> Self {
        Self {
            coordinates,
            instructions,
            total_distance,
            next_instruction: 0,
            off_route: false,
        }
    }

    /// Feeds one position sample and the caller-maintained cumulative
    /// walked distance; returns the state for this tick.
    ///
    /// Degenerate routes (fewer than two coordinates, or no length)
    /// always produce the default state.
    pub fn update(
        &mut self,
        latitude: f64,
        longitude: f64,
        walked_distance: f64,
    ) -> NavigationState {
        if self.coordinates.len() < 2 || self.total_distance <= 0.0 {
            return NavigationState::default();
        }
        let Ok(position) = Coordinate::new(latitude, longitude) else {
            return NavigationState::default();
        };

        let distance_from_route = self.distance_from_route(position);
        if self.off_route {
            if distance_from_route <= OFF_ROUTE_CLEAR_METERS {
                self.off_route = false;
            }
        } else if distance_from_route > OFF_ROUTE_TRIGGER_METERS {
            self.off_route = true;
        }

        #[expect(clippy::cast_possible_truncation)]
        let progress = (walked_distance / self.total_distance).clamp(0.0, 1.0) as f32;
        let remaining_distance = (self.total_distance - walked_distance).max(0.0);

        // Skip every instruction whose point the user has already passed.
        while self
            .instructions
            .get(self.next_instruction)
            .is_some_and(|i| i.cumulative_distance <= walked_distance)
        {
            self.next_instruction += 1;
        }

        let current_instruction = self.instructions.get(self.next_instruction).cloned();
        let distance_to_next_turn = current_instruction
            .as_ref()
            .map_or(0.0, |i| (i.cumulative_distance - walked_distance).max(0.0));

        let has_turn = current_instruction.is_some();
        let last = self.coordinates.last().expect("checked nonempty above");
        let has_arrived = spherical::distance(position, *last) <= ARRIVAL_METERS;

        NavigationState {
            current_instruction,
            distance_to_next_turn,
            progress,
            remaining_distance,
            is_approaching_turn: has_turn && distance_to_next_turn <= APPROACH_TURN_METERS,
            is_at_turn: has_turn && distance_to_next_turn <= AT_TURN_METERS,
            is_off_route: self.off_route,
            distance_from_route,
            has_arrived,
        }
    }

    /// Minimum distance from a position to any segment of the route
    /// polyline.
    ///
    /// Computed in a local planar frame (meters per degree, longitude
    /// scaled by cos latitude), which is accurate to well under a meter
    /// at the distances the off-route thresholds care about.
    fn distance_from_route(&self, position: Coordinate) -> f64 {
        let lon_scale = position.latitude().to_radians().cos();
        let project = |c: Coordinate| -> (f64, f64) {
            (
                (c.longitude() - position.longitude()) * METERS_PER_DEGREE_LAT * lon_scale,
                (c.latitude() - position.latitude()) * METERS_PER_DEGREE_LAT,
            )
        };

        let mut best = f64::INFINITY;
        for pair in self.coordinates.windows(2) {
            let (ax, ay) = project(pair[0]);
            let (bx, by) = project(pair[1]);
            let (dx, dy) = (bx - ax, by - ay);
            let length_squared = dx * dx + dy * dy;
            // The query point is the local origin; project it onto the
            // segment and clamp to the endpoints.
            let t = if length_squared > 0.0 {
                ((-ax * dx - ay * dy) / length_squared).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let (px, py) = (ax + t * dx, ay + t * dy);
            best = best.min((px * px + py * py).sqrt());
        }
        best
    }
}
