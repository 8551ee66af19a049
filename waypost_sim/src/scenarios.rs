//! Scenarios for the deterministic harness.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// WP-001: several posters come and go while the visitor walks the gallery
    GalleryWalk,

    /// WP-002: one poster lost and found again, repeatedly
    Resighting,

    /// WP-003: updates/removals for unknown anchors mixed into the stream
    StaleEvents,

    /// WP-004: eight waypoints over two line boards, walked to the end
    FlowSequence,

    /// WP-005: pendulum swung back and forth, prompts followed
    PendulumSwing,

    /// WP-006: spiral swept outwards and back in
    SpiralSweep,

    /// WP-007: impatient visitor tapping while the cursor moves
    RapidTaps,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::GalleryWalk,
            ScenarioId::Resighting,
            ScenarioId::StaleEvents,
            ScenarioId::FlowSequence,
            ScenarioId::PendulumSwing,
            ScenarioId::SpiralSweep,
            ScenarioId::RapidTaps,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::GalleryWalk => "gallery_walk",
            ScenarioId::Resighting => "resighting",
            ScenarioId::StaleEvents => "stale_events",
            ScenarioId::FlowSequence => "flow_sequence",
            ScenarioId::PendulumSwing => "pendulum_swing",
            ScenarioId::SpiralSweep => "spiral_sweep",
            ScenarioId::RapidTaps => "rapid_taps",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::GalleryWalk => "3 posters with overlapping sightings, jittered updates, no residue after removal",
            ScenarioId::Resighting => "same poster added/removed 5 times, fresh subtree every time",
            ScenarioId::StaleEvents => "30% stale updates/removals interleaved, all ignored",
            ScenarioId::FlowSequence => "linear 0..=7 split over two boards, walked to the boundary",
            ScenarioId::PendulumSwing => "pendulum alternation with movement count and prompts",
            ScenarioId::SpiralSweep => "spiral bounce 0..6..0 with 60-point trail",
            ScenarioId::RapidTaps => "random taps during motion, last-tap-wins never corrupts state",
        }
    }

    /// Returns true if the scenario exercises the anchor lifecycle.
    pub fn is_anchor_scenario(&self) -> bool {
        matches!(
            self,
            ScenarioId::GalleryWalk | ScenarioId::Resighting | ScenarioId::StaleEvents
        )
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gallery_walk" | "gallerywalk" | "wp-001" => Ok(ScenarioId::GalleryWalk),
            "resighting" | "wp-002" => Ok(ScenarioId::Resighting),
            "stale_events" | "staleevents" | "wp-003" => Ok(ScenarioId::StaleEvents),
            "flow_sequence" | "flowsequence" | "wp-004" => Ok(ScenarioId::FlowSequence),
            "pendulum_swing" | "pendulumswing" | "wp-005" => Ok(ScenarioId::PendulumSwing),
            "spiral_sweep" | "spiralsweep" | "wp-006" => Ok(ScenarioId::SpiralSweep),
            "rapid_taps" | "rapidtaps" | "wp-007" => Ok(ScenarioId::RapidTaps),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
        }
        assert_eq!("WP-003".parse::<ScenarioId>(), Ok(ScenarioId::StaleEvents));
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }
}
