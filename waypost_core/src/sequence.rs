//! The "SEQUENCE" Engine - waypoint progression state machines
//!
//! One [`Sequence`] type with a pluggable transition policy ([`Progression`]):
//! - **Linear**: monotonic walk over `[start, end]`
//! - **Pendulum**: toggles between waypoints 0 and 1, counting swings
//! - **Spiral**: sweeps `[0, last]` and bounces at both ends
//!
//! Gating (proximity, not-animating) belongs to the caller; the state machine
//! only guarantees that `pointer` stays in range and `visited` never shrinks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a waypoint. Signed so that "one before the first" is representable.
pub type WaypointId = i32;

/// Highest waypoint id of the default spiral board.
pub const SPIRAL_LAST_ID: WaypointId = 6;

/// Transition policy of a sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progression {
    /// Forward-only over `[start, end]`
    Linear { start: WaypointId, end: WaypointId },

    /// Binary toggle over `{0, 1}`
    Pendulum,

    /// Bounce sweep over `[0, last]`
    Spiral { last: WaypointId },
}

impl Progression {
    /// Default spiral board `[0, 6]`.
    pub fn spiral() -> Self {
        Progression::Spiral { last: SPIRAL_LAST_ID }
    }

    /// Inclusive id range valid for `pointer`.
    pub fn range(&self) -> (WaypointId, WaypointId) {
        match *self {
            Progression::Linear { start, end } => (start, end),
            Progression::Pendulum => (0, 1),
            Progression::Spiral { last } => (0, last),
        }
    }

    fn initial_pointer(&self) -> WaypointId {
        self.range().0
    }

    fn validate(&self) -> Result<(), SequenceError> {
        let (lo, hi) = self.range();
        let ok = match self {
            Progression::Linear { .. } => lo <= hi,
            Progression::Pendulum => true,
            // A bounce needs somewhere to bounce to
            Progression::Spiral { .. } => hi >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(SequenceError::InvalidRange { start: lo, end: hi })
        }
    }
}

/// Result of one successful advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: WaypointId,
    pub to: WaypointId,
    pub reversed: bool,
}

/// Progress through a waypoint board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    progression: Progression,
    pointer: WaypointId,
    visited: BTreeSet<WaypointId>,
    reversed: bool,
    movement_count: u64,
}

impl Sequence {
    /// Creates a sequence armed at the first waypoint of its range.
    pub fn new(progression: Progression) -> Result<Self, SequenceError> {
        progression.validate()?;
        let pointer = progression.initial_pointer();
        Ok(Self {
            progression,
            pointer,
            visited: BTreeSet::from([pointer]),
            reversed: false,
            movement_count: 0,
        })
    }

    /// Moves the pointer one step according to the progression policy.
    ///
    /// A linear sequence at its last waypoint has nowhere to go: the call is
    /// rejected with [`SequenceError::AtBoundary`] and nothing changes.
    pub fn advance(&mut self) -> Result<Step, SequenceError> {
        let from = self.pointer;
        let (lo, hi) = self.progression.range();

        match self.progression {
            Progression::Linear { end, .. } => {
                if self.pointer >= end {
                    return Err(SequenceError::AtBoundary { pointer: self.pointer });
                }
                self.pointer += 1;
            }
            Progression::Pendulum => {
                self.movement_count += 1;
                self.pointer = match self.pointer {
                    0 => 1,
                    1 => 0,
                    other => unreachable!("pendulum pointer escaped {{0, 1}}: {other}"),
                };
                self.reversed = self.pointer == 0;
            }
            Progression::Spiral { last } => {
                if self.reversed {
                    if self.pointer > 0 {
                        self.pointer -= 1;
                    } else {
                        self.reversed = false;
                        self.pointer += 1;
                    }
                } else if self.pointer < last {
                    self.pointer += 1;
                } else {
                    self.reversed = true;
                    self.pointer -= 1;
                }
            }
        }

        assert!(
            (lo..=hi).contains(&self.pointer),
            "pointer {} left range [{lo}, {hi}]",
            self.pointer
        );
        self.visited.insert(self.pointer);

        Ok(Step {
            from,
            to: self.pointer,
            reversed: self.reversed,
        })
    }

    /// The currently armed waypoint.
    pub fn pointer(&self) -> WaypointId {
        self.pointer
    }

    /// Direction of the last transition.
    pub fn reversed(&self) -> bool {
        self.reversed
    }

    /// Number of pendulum swings so far (always 0 for other policies).
    pub fn movement_count(&self) -> u64 {
        self.movement_count
    }

    pub fn progression(&self) -> Progression {
        self.progression
    }

    /// Visited waypoints in ascending order.
    pub fn visited(&self) -> impl Iterator<Item = WaypointId> + '_ {
        self.visited.iter().copied()
    }

    /// Smallest visited id, used to park the cursor when a view mounts.
    pub fn first_visited(&self) -> WaypointId {
        // visited always holds at least the initial pointer
        self.visited.first().copied().unwrap_or(self.pointer)
    }

    pub fn has_visited(&self, id: WaypointId) -> bool {
        self.visited.contains(&id)
    }

    /// The waypoint the cursor is leaving when the pointer changes.
    pub fn previous_id(&self) -> WaypointId {
        if self.reversed {
            self.pointer + 1
        } else {
            self.pointer - 1
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Errors raised by sequence construction and advancing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    #[error("Invalid waypoint range [{start}, {end}]")]
    InvalidRange { start: WaypointId, end: WaypointId },

    #[error("No transition beyond waypoint {pointer}")]
    AtBoundary { pointer: WaypointId },
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn visited(seq: &Sequence) -> Vec<WaypointId> {
        seq.visited().collect()
    }

    #[test]
    fn test_linear_advances_monotonically() {
        let mut seq = Sequence::new(Progression::Linear { start: 0, end: 7 }).unwrap();
        for k in 1..=5 {
            let step = seq.advance().unwrap();
            assert_eq!(step.to, k);
            assert!(!step.reversed);
        }
        assert_eq!(seq.pointer(), 5);
        assert_eq!(visited(&seq), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_linear_rejects_advance_at_end() {
        let mut seq = Sequence::new(Progression::Linear { start: 4, end: 5 }).unwrap();
        seq.advance().unwrap();
        let before = seq.clone();

        assert_eq!(seq.advance(), Err(SequenceError::AtBoundary { pointer: 5 }));
        assert_eq!(seq, before);
    }

    #[test]
    fn test_linear_invalid_range() {
        assert!(matches!(
            Sequence::new(Progression::Linear { start: 3, end: 1 }),
            Err(SequenceError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_pendulum_alternates_and_counts() {
        let mut seq = Sequence::new(Progression::Pendulum).unwrap();
        for i in 1..=9u64 {
            let step = seq.advance().unwrap();
            let expected = if i % 2 == 1 { 1 } else { 0 };
            assert_eq!(step.to, expected);
            assert_eq!(seq.reversed(), expected == 0);
            assert_eq!(seq.movement_count(), i);
        }
        assert_eq!(visited(&seq), vec![0, 1]);
    }

    #[test]
    fn test_spiral_bounces_at_top() {
        let mut seq = Sequence::new(Progression::spiral()).unwrap();
        let pointers: Vec<_> = (0..6).map(|_| seq.advance().unwrap().to).collect();
        assert_eq!(pointers, vec![1, 2, 3, 4, 5, 6]);

        let step = seq.advance().unwrap();
        assert!(step.reversed);
        assert_eq!(step.to, 5);
    }

    #[test]
    fn test_spiral_bounces_at_bottom() {
        let mut seq = Sequence::new(Progression::Spiral { last: 2 }).unwrap();
        // 0 -> 1 -> 2 -> 1 -> 0 -> 1
        let pointers: Vec<_> = (0..5).map(|_| seq.advance().unwrap().to).collect();
        assert_eq!(pointers, vec![1, 2, 1, 0, 1]);
        assert!(!seq.reversed());
    }

    #[test]
    fn test_previous_id_follows_direction() {
        let mut seq = Sequence::new(Progression::Spiral { last: 2 }).unwrap();
        seq.advance().unwrap();
        assert_eq!(seq.previous_id(), 0);
        seq.advance().unwrap();
        seq.advance().unwrap();
        assert_eq!(seq.pointer(), 1);
        assert_eq!(seq.previous_id(), 2);
    }

    #[test]
    fn test_visited_never_shrinks() {
        let mut seq = Sequence::new(Progression::spiral()).unwrap();
        let mut last_len = 1;
        for _ in 0..20 {
            seq.advance().unwrap();
            let len = seq.visited().count();
            assert!(len >= last_len);
            last_len = len;
        }
        assert_eq!(visited(&seq), (0..=6).collect::<Vec<_>>());
        assert_eq!(seq.first_visited(), 0);
    }
}
