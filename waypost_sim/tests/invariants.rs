//! Property-based invariant tests for layout, sequences, the path animator
//! and the anchor lifecycle.
//!
//! 1. Layout returns one position per waypoint, inside the view.
//! 2. Spiral waypoints move strictly outward and never leave the view.
//! 3. Linear progressions advance by one until the end, then refuse.
//! 4. Pendulum progressions alternate and count every swing.
//! 5. Spiral progressions bounce between 0 and the last waypoint.
//! 6. The animator trail is bounded, grows while moving and shrinks to its floor.
//! 7. A zero-length move finishes at once with a single trail point.
//! 8. Any add/update/remove interleaving leaves no residue once every anchor is gone.

use nalgebra::Vector2;
use proptest::prelude::*;
use std::time::Duration;
use waypost_core::layout::SpiralGeometry;
use waypost_core::{
    compute_layout, AnchorEvent, AnimatorConfig, AnimatorPhase, AttachmentSource, Bounds, ExperienceRuntime,
    ImageAnchor, LayoutStyle, PathAnimator, PathStyle, Position, Progression, RuntimeConfig, Sequence,
    SequenceError,
};
use waypost_env::AnchorId;
use waypost_sim::SimContext;

// ── Helpers ─────────────────────────────────────────────────────────────

fn bounds() -> impl Strategy<Value = Bounds> {
    (50.0f64..4000.0, 50.0f64..3000.0).prop_map(|(w, h)| Bounds::new(w, h))
}

fn animator_config() -> impl Strategy<Value = AnimatorConfig> {
    prop_oneof![
        Just(AnimatorConfig::linear()),
        Just(AnimatorConfig::pendulum()),
        Just(AnimatorConfig::spiral()),
    ]
}

/// Ticks a run to completion at the configured rate, checking the trail.
fn run_to_rest(animator: &mut PathAnimator, start: Duration) -> Result<(), TestCaseError> {
    let config = animator.config().clone();
    let mut now = start;
    let mut before = animator.trail_len();
    while animator.phase() == AnimatorPhase::Animating {
        now += config.tick_period();
        animator.tick(now);
        prop_assert!(animator.trail_len() >= before);
        prop_assert!(animator.trail_len() <= config.trail_capacity);
        before = animator.trail_len();
    }
    while animator.phase() == AnimatorPhase::Decaying {
        let len = animator.trail_len();
        if animator.decay_step() == AnimatorPhase::Decaying {
            prop_assert_eq!(animator.trail_len(), len - 1);
        }
    }
    prop_assert!(animator.trail_len() <= config.decay_floor.max(1));
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(u8),
    Update(u8, bool),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..4).prop_map(Op::Add),
        (0u8..4, any::<bool>()).prop_map(|(i, t)| Op::Update(i, t)),
        (0u8..4).prop_map(Op::Remove),
    ]
}

fn anchor(i: u8) -> ImageAnchor {
    ImageAnchor::new(AnchorId::from_seed(1000 + i as u64), Vector2::new(0.6, 0.9))
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Layout count and bounds
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn linear_layout_fits_view(count in 1usize..20, b in bounds(), fraction in 0.0f64..0.2) {
        let radius = b.width * fraction;
        let positions = compute_layout(count, b, radius, LayoutStyle::Linear);

        prop_assert_eq!(positions.len(), count);
        for p in &positions {
            prop_assert!((p.y - b.height / 2.0).abs() < 1e-9);
            prop_assert!(p.x >= radius - 1e-9 && p.x <= b.width - radius + 1e-9);
        }
        prop_assert!(positions.windows(2).all(|w| w[0].x <= w[1].x));
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Spiral r and θ monotonic
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn spiral_layout_moves_outward(count in 2usize..16, side in 300.0f64..3000.0, radius in 5.0f64..60.0) {
        let b = Bounds::new(side, side);
        let positions = compute_layout(count, b, radius, LayoutStyle::Spiral);
        let center = b.center();

        prop_assert_eq!(positions.len(), count);
        prop_assert!((positions[0] - center).norm() < 1e-9);

        let distances: Vec<f64> = positions.iter().map(|p| (p - center).norm()).collect();
        prop_assert!(distances.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(distances.iter().all(|d| *d <= side / 2.0 - radius + 1e-9));

        // parameters recovered from distance follow the sqrt warp
        let geometry = SpiralGeometry::for_waypoints(b, radius);
        for (i, p) in positions.iter().enumerate() {
            let expected = SpiralGeometry::waypoint_param(i, count);
            prop_assert!((geometry.progress_of(*p) - expected).abs() < 1e-9);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Linear advances
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn linear_advances_until_end(start in -5i32..5, len in 0i32..10, taps in 0usize..25) {
        let end = start + len;
        let mut seq = Sequence::new(Progression::Linear { start, end }).unwrap();

        for k in 0..taps {
            let pointer = seq.pointer();
            match seq.advance() {
                Ok(step) => {
                    prop_assert_eq!(step.from, pointer);
                    prop_assert_eq!(step.to, pointer + 1);
                }
                Err(e) => {
                    prop_assert_eq!(e, SequenceError::AtBoundary { pointer: end });
                    prop_assert!(k as i32 >= len);
                    prop_assert_eq!(seq.pointer(), end);
                }
            }
        }

        let pointer = seq.pointer();
        prop_assert_eq!(pointer, (start + taps as i32).min(end));
        prop_assert_eq!(seq.visited().collect::<Vec<_>>(), (start..=pointer).collect::<Vec<_>>());
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Pendulum alternation
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn pendulum_alternates(taps in 0u64..50) {
        let mut seq = Sequence::new(Progression::Pendulum).unwrap();
        for _ in 0..taps {
            let before = seq.pointer();
            let step = seq.advance().unwrap();
            prop_assert_eq!(step.to, 1 - before);
            prop_assert_eq!(step.reversed, step.to == 0);
        }
        prop_assert_eq!(seq.movement_count(), taps);
        prop_assert_eq!(seq.pointer() as u64, taps % 2);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Spiral bounce
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn spiral_bounces_between_ends(last in 1i32..10, taps in 0usize..60) {
        let mut seq = Sequence::new(Progression::Spiral { last }).unwrap();
        let mut trace = vec![seq.pointer()];
        for _ in 0..taps {
            let step = seq.advance().unwrap();
            prop_assert!((0..=last).contains(&step.to));
            prop_assert_eq!((step.to - step.from).abs(), 1);
            trace.push(step.to);
        }

        // direction only flips at the ends
        for w in trace.windows(3) {
            let turned = (w[1] - w[0]) != (w[2] - w[1]);
            if turned {
                prop_assert!(w[1] == 0 || w[1] == last, "turned at {} in {:?}", w[1], trace);
            }
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 6. Animator endpoints and trail monotonicity
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn straight_move_ends_on_target(
        config in animator_config(),
        x0 in 0.0f64..2000.0,
        x1 in 0.0f64..2000.0,
        y in 0.0f64..1000.0,
    ) {
        prop_assume!((x0 - x1).abs() > 1e-6);
        let mut animator = PathAnimator::new(config, PathStyle::Straight);
        let (from, to) = (Position::new(x0, y), Position::new(x1, y));
        animator.move_to(from, to, Duration::ZERO);
        prop_assert_eq!(animator.phase(), AnimatorPhase::Animating);

        run_to_rest(&mut animator, Duration::ZERO)?;
        prop_assert!((animator.cursor() - to).norm() < 1e-6);
        prop_assert_eq!(animator.phase(), AnimatorPhase::Idle);
    }
}

proptest! {
    #[test]
    fn spiral_move_ends_on_waypoint(from in 0usize..7, to in 0usize..7, side in 500.0f64..3000.0) {
        prop_assume!(from != to);
        let b = Bounds::new(side, side);
        let radius = side * 0.1;
        let positions = compute_layout(7, b, radius, LayoutStyle::Spiral);
        let geometry = SpiralGeometry::for_waypoints(b, radius);

        let mut animator = PathAnimator::new(AnimatorConfig::spiral(), PathStyle::Spiral(geometry));
        animator.move_to(positions[from], positions[to], Duration::ZERO);
        run_to_rest(&mut animator, Duration::ZERO)?;
        prop_assert!((animator.cursor() - positions[to]).norm() < 0.5);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 7. move_to with from == to
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn zero_length_move_completes_at_once(config in animator_config(), x in 0.0f64..2000.0, y in 0.0f64..2000.0) {
        let mut animator = PathAnimator::new(config, PathStyle::Straight);
        let p = Position::new(x, y);
        animator.move_to(p, p, Duration::from_secs(1));

        prop_assert_eq!(animator.phase(), AnimatorPhase::Decaying);
        prop_assert_eq!(animator.trail_len(), 1);
        prop_assert_eq!(animator.cursor(), p);
        prop_assert_eq!(animator.decay_step(), AnimatorPhase::Idle);
        prop_assert_eq!(animator.runs_started(), 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 8. Anchor add/remove leaves no residue
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn anchor_lifecycle_leaves_no_residue(ops in proptest::collection::vec(op(), 0..60)) {
        let mut runtime = ExperienceRuntime::new(SimContext::shared(1), RuntimeConfig::default());
        runtime.register_default_panels();
        let baseline = runtime.scene().len();

        let mut live = std::collections::HashSet::new();
        for op in ops {
            let event = match op {
                Op::Add(i) => {
                    live.insert(i);
                    AnchorEvent::Added(anchor(i))
                }
                Op::Update(i, tracked) => {
                    let a = anchor(i);
                    AnchorEvent::Updated(if tracked { a } else { a.untracked() })
                }
                Op::Remove(i) => {
                    live.remove(&i);
                    AnchorEvent::Removed(anchor(i))
                }
            };
            runtime.apply_anchor_event(event).unwrap();
            prop_assert_eq!(runtime.anchors().len(), live.len());
        }

        for i in live.clone() {
            runtime.apply_anchor_event(AnchorEvent::Removed(anchor(i))).unwrap();
        }

        prop_assert!(runtime.anchors().is_empty());
        prop_assert_eq!(runtime.scene().len(), baseline);
        for id in runtime.config.panel_ids() {
            let key = runtime.panels().entity_for(&id).unwrap();
            prop_assert!(runtime.scene().get(key).unwrap().parent().is_none());
        }
    }
}
