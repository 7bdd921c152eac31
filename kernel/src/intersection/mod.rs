//! Intersection traffic synchronizer (§4.6).
//!
//! A single blocking lock guards the list of vehicles currently inside
//! the intersection, plus one condition variable per origin direction.
//! `before_entry` loops on the non-conflict predicate; `after_exit` wakes
//! the three *other* origins' queues (a waiter on its own origin's queue
//! cannot have become newly compatible with itself) in a randomized
//! order to mitigate starvation. Fairness here is statistical, not
//! guaranteed — exactly as §4.6 requires us to document.

mod random;

use alloc::vec::Vec;

use crate::sync::{CondVar, Mutex};

pub use random::{RandomSource, ScriptedRandomSource, XorshiftRandomSource};

/// One of the four cardinal approaches to the intersection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    const ALL: [Direction; 4] = [Direction::North, Direction::East, Direction::South, Direction::West];

    fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::East => 1,
            Direction::South => 2,
            Direction::West => 3,
        }
    }
}

/// A vehicle's entry/exit direction pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vehicle {
    pub origin: Direction,
    pub destination: Direction,
}

/// True for the four compass-ordered right turns (§4.6/GLOSSARY).
fn is_right_turn(v: Vehicle) -> bool {
    matches!(
        (v.origin, v.destination),
        (Direction::West, Direction::South)
            | (Direction::South, Direction::East)
            | (Direction::East, Direction::North)
            | (Direction::North, Direction::West)
    )
}

/// The non-conflict predicate: `new` may share the intersection with
/// `curr` iff any of the three conditions in §4.6 holds.
fn compatible(new: Vehicle, curr: Vehicle) -> bool {
    new.origin == curr.origin
        || (new.origin == curr.destination && new.destination == curr.origin)
        || ((is_right_turn(new) || is_right_turn(curr)) && new.destination != curr.destination)
}

/// The traffic synchronizer itself.
pub struct Intersection {
    inside: Mutex<Vec<Vehicle>>,
    waiting: [CondVar; 4],
    rng: alloc::boxed::Box<dyn RandomSource>,
}

impl Intersection {
    pub fn new() -> Self {
        Self::with_random_source(alloc::boxed::Box::new(XorshiftRandomSource::new(0x2545_f491_4f6c_dd1d)))
    }

    /// Construct with an injected RNG source, per §9's "make the RNG
    /// source injectable to make the test suite deterministic".
    pub fn with_random_source(rng: alloc::boxed::Box<dyn RandomSource>) -> Self {
        Self {
            inside: Mutex::new(Vec::new()),
            waiting: [CondVar::new(), CondVar::new(), CondVar::new(), CondVar::new()],
            rng,
        }
    }

    /// Block until `vehicle` is compatible with every vehicle currently
    /// inside, then record it as inside.
    pub fn before_entry(&self, vehicle: Vehicle) {
        let mut inside = self.inside.lock();
        while inside.iter().any(|&curr| !compatible(vehicle, curr)) {
            inside = self.waiting[vehicle.origin.index()].wait(inside, &self.inside);
        }
        inside.push(vehicle);
    }

    /// Remove one matching entry and wake the three other origins'
    /// queues in a randomized order.
    pub fn after_exit(&self, vehicle: Vehicle) {
        let mut inside = self.inside.lock();
        let position = inside
            .iter()
            .position(|&v| v == vehicle)
            .expect("after_exit: vehicle was not recorded as inside (caller contract violation)");
        inside.remove(position);
        drop(inside);

        let mut others: Vec<Direction> = Direction::ALL
            .into_iter()
            .filter(|&d| d != vehicle.origin)
            .collect();
        // Randomized tie-breaking order (§4.6/§9): an anti-starvation
        // heuristic, not a fairness guarantee.
        if self.rng.next_bool() {
            others.swap(0, 1);
        }
        for direction in others {
            self.waiting[direction.index()].notify_all();
        }
    }

    #[cfg(test)]
    pub fn occupancy(&self) -> usize {
        self.inside.lock().len()
    }
}

impl Default for Intersection {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Vehicle {
    fn eq(&self, other: &Self) -> bool {
        self.origin == other.origin && self.destination == other.destination
    }
}
impl Eq for Vehicle {}

#[cfg(test)]
mod tests {
    use alloc::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn opposite_directions_may_be_inside_simultaneously() {
        let isect = Intersection::new();
        isect.before_entry(Vehicle {
            origin: Direction::North,
            destination: Direction::South,
        });
        isect.before_entry(Vehicle {
            origin: Direction::South,
            destination: Direction::North,
        });
        assert_eq!(isect.occupancy(), 2);
    }

    #[test]
    fn a_conflicting_vehicle_blocks_until_the_conflict_leaves() {
        let isect = Arc::new(Intersection::new());
        let north_south = Vehicle {
            origin: Direction::North,
            destination: Direction::South,
        };
        let east_west = Vehicle {
            origin: Direction::East,
            destination: Direction::West,
        };
        isect.before_entry(north_south);

        let waiter_isect = Arc::clone(&isect);
        let handle = thread::spawn(move || {
            waiter_isect.before_entry(east_west);
        });

        thread::sleep(Duration::from_millis(20));
        assert_eq!(isect.occupancy(), 1, "incompatible vehicle must not have entered yet");

        isect.after_exit(north_south);
        handle.join().expect("waiter thread panicked");
        assert_eq!(isect.occupancy(), 1);
    }

    #[test]
    fn right_turn_with_different_destination_is_compatible() {
        let isect = Intersection::new();
        // west -> south is a right turn; north -> east has a different
        // destination, so the pair is compatible per §4.6(iii).
        isect.before_entry(Vehicle {
            origin: Direction::West,
            destination: Direction::South,
        });
        isect.before_entry(Vehicle {
            origin: Direction::North,
            destination: Direction::East,
        });
        assert_eq!(isect.occupancy(), 2);
    }
}
