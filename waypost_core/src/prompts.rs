//! Guidance copy shown beside the pendulum board.

const LEFT_PROMPTS: [&str; 6] = [
    "Follow the line\nwith your gaze",
    "Notice the rhythm\nof movement",
    "Feel the flow\nof attention",
    "Observe without\nfixation",
    "Let awareness\nbe fluid",
    "Continue following\nthe movement",
];

const RIGHT_PROMPTS: [&str; 6] = [
    "Breathe naturally\nwhile watching",
    "Stay present\nwith the motion",
    "Release any\ntension",
    "Maintain soft\nfocus",
    "Allow natural\nrelaxation",
    "Continue with\ngentle attention",
];

/// Left and right prompt for the given swing count; empty once the script runs out.
pub fn pendulum_prompts(movement_count: u64) -> (&'static str, &'static str) {
    let idx = usize::try_from(movement_count).unwrap_or(usize::MAX);
    (
        LEFT_PROMPTS.get(idx).copied().unwrap_or(""),
        RIGHT_PROMPTS.get(idx).copied().unwrap_or(""),
    )
}

pub fn movement_label(movement_count: u64) -> String {
    format!("Movement: {movement_count}")
}

/// "Step n", shown only after the first swing.
pub fn step_label(movement_count: u64) -> Option<String> {
    (movement_count > 0).then(|| format!("Step {movement_count}"))
}
