//! Ground truth oracle for simulation.
//!
//! The Oracle knows where every printed poster really hangs and produces the
//! event feed a recognition provider would report for a visitor walking past:
//! - `added` when a poster comes into view
//! - noisy `updated` reports at the provider rate, with tracking dropouts
//! - `removed` when it leaves
//!
//! It can also fabricate stale reports for anchors that no longer exist.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector2, Vector3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::time::Duration;
use waypost_core::{AnchorEvent, ImageAnchor};
use waypost_env::AnchorId;

/// A poster hanging in the simulated gallery.
#[derive(Debug, Clone)]
pub struct GroundTruthPoster {
    pub id: AnchorId,

    /// Reference image size [width, height] in metres
    pub physical_size: Vector2<f32>,

    /// Printed size / reference size
    pub scale: f32,

    /// True world pose
    pub pose: Isometry3<f32>,
}

/// An anchor event stamped with its virtual arrival time.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub at: Duration,
    pub event: AnchorEvent,
}

/// The Oracle - owns the posters and scripts provider feeds.
pub struct PosterOracle {
    /// RNG for noise, dropouts and jitter
    rng: ChaCha8Rng,

    posters: Vec<GroundTruthPoster>,

    /// Position noise standard deviation (metres)
    position_noise_std: f32,

    /// Chance that a given update reports the poster as not tracked
    dropout_probability: f64,

    /// Provider update rate in Hz
    update_hz: f64,
}

impl PosterOracle {
    /// Creates a new Oracle with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            posters: Vec::new(),
            position_noise_std: 0.005, // 5mm by default
            dropout_probability: 0.05,
            update_hz: 10.0,
        }
    }

    pub fn set_position_noise(&mut self, std_dev: f32) {
        self.position_noise_std = std_dev;
    }

    pub fn set_dropout_probability(&mut self, p: f64) {
        self.dropout_probability = p.clamp(0.0, 1.0);
    }

    pub fn set_update_rate(&mut self, hz: f64) {
        self.update_hz = hz;
    }

    /// Hangs a poster of random size at `position`, facing the visitor.
    pub fn spawn_poster(&mut self, position: Vector3<f32>) -> AnchorId {
        let id = AnchorId::from_seed(self.rng.gen());
        let physical_size = Vector2::new(self.rng.gen_range(0.4_f32..0.9), self.rng.gen_range(0.6_f32..1.2));
        let scale: f32 = self.rng.gen_range(0.9..1.1);
        let yaw: f32 = self.rng.gen_range(-0.3..0.3);
        let pose = Isometry3::from_parts(
            Translation3::from(position),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), yaw),
        );

        self.posters.push(GroundTruthPoster {
            id,
            physical_size,
            scale,
            pose,
        });
        id
    }

    pub fn poster(&self, id: &AnchorId) -> Option<&GroundTruthPoster> {
        self.posters.iter().find(|p| p.id == *id)
    }

    pub fn posters(&self) -> &[GroundTruthPoster] {
        &self.posters
    }

    /// One noisy provider report of poster `id`.
    pub fn observe(&mut self, id: &AnchorId) -> Option<ImageAnchor> {
        let poster = self.poster(id)?.clone();
        let tracked = !self.rng.gen_bool(self.dropout_probability);

        let mut translation = poster.pose.translation.vector;
        if let Ok(normal) = Normal::new(0.0_f32, self.position_noise_std) {
            translation += Vector3::new(
                normal.sample(&mut self.rng),
                normal.sample(&mut self.rng),
                normal.sample(&mut self.rng),
            );
        }

        let mut anchor = ImageAnchor::new(poster.id, poster.physical_size)
            .with_scale(poster.scale)
            .with_transform(Isometry3::from_parts(Translation3::from(translation), poster.pose.rotation));
        anchor.is_tracked = tracked;
        Some(anchor)
    }

    /// Feed for poster `id` seen from `start` until `end`.
    ///
    /// Update times are jittered by up to half a period, so reports for one
    /// poster never overtake each other.
    pub fn sighting(&mut self, id: &AnchorId, start: Duration, end: Duration) -> Vec<TimedEvent> {
        let mut events = Vec::new();
        let Some(first) = self.observe(id) else {
            return events;
        };

        let mut added = first;
        added.is_tracked = true;
        events.push(TimedEvent {
            at: start,
            event: AnchorEvent::Added(added),
        });

        let period = 1.0 / self.update_hz.max(1.0);
        let mut k = 1;
        loop {
            let jitter = self.rng.gen_range(0.0..period / 2.0);
            let at = start + Duration::from_secs_f64(period * k as f64 + jitter);
            if at >= end {
                break;
            }
            if let Some(anchor) = self.observe(id) {
                events.push(TimedEvent {
                    at,
                    event: AnchorEvent::Updated(anchor),
                });
            }
            k += 1;
        }

        if let Some(anchor) = self.observe(id) {
            events.push(TimedEvent {
                at: end,
                event: AnchorEvent::Removed(anchor),
            });
        }
        events
    }

    /// Reports about anchors nobody has added, spread over `[start, end)`.
    pub fn stale_events(&mut self, count: usize, start: Duration, end: Duration) -> Vec<TimedEvent> {
        let span = end.saturating_sub(start).as_secs_f64().max(f64::EPSILON);
        (0..count)
            .map(|_| {
                let ghost = ImageAnchor::new(AnchorId::from_seed(self.rng.gen()), Vector2::new(0.5, 0.5));
                let at = start + Duration::from_secs_f64(self.rng.gen_range(0.0..span));
                let event = if self.rng.gen_bool(0.5) {
                    AnchorEvent::Updated(ghost)
                } else {
                    AnchorEvent::Removed(ghost)
                };
                TimedEvent { at, event }
            })
            .collect()
    }
}

/// Merges feeds into one arrival-ordered stream.
///
/// The sort is stable, so events with equal times keep their feed order.
pub fn merge(feeds: Vec<Vec<TimedEvent>>) -> Vec<TimedEvent> {
    let mut all: Vec<TimedEvent> = feeds.into_iter().flatten().collect();
    all.sort_by_key(|e| e.at);
    all
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_sighting_shape() {
        let mut oracle = PosterOracle::new(42);
        let id = oracle.spawn_poster(Vector3::new(0.0, 1.5, -2.0));
        let feed = oracle.sighting(&id, secs(1.0), secs(3.0));

        assert!(matches!(feed.first().map(|e| &e.event), Some(AnchorEvent::Added(_))));
        assert!(matches!(feed.last().map(|e| &e.event), Some(AnchorEvent::Removed(_))));
        assert!(feed.windows(2).all(|w| w[0].at <= w[1].at));
        assert!(feed.len() > 10);
        assert!(feed.iter().all(|e| e.event.anchor().id == id));
    }

    #[test]
    fn test_observation_noise_is_small() {
        let mut oracle = PosterOracle::new(42);
        let id = oracle.spawn_poster(Vector3::new(1.0, 1.0, 1.0));
        let truth = oracle.poster(&id).unwrap().pose.translation.vector;
        for _ in 0..50 {
            let seen = oracle.observe(&id).unwrap();
            assert!((seen.transform.translation.vector - truth).norm() < 0.05);
        }
    }

    #[test]
    fn test_deterministic_feeds() {
        let mut a = PosterOracle::new(7);
        let mut b = PosterOracle::new(7);
        let ida = a.spawn_poster(Vector3::zeros());
        let idb = b.spawn_poster(Vector3::zeros());
        assert_eq!(ida, idb);

        let fa = a.sighting(&ida, secs(0.0), secs(2.0));
        let fb = b.sighting(&idb, secs(0.0), secs(2.0));
        assert_eq!(fa.len(), fb.len());
        assert!(fa.iter().zip(&fb).all(|(x, y)| x.at == y.at && x.event == y.event));
    }

    #[test]
    fn test_stale_events_use_unknown_ids() {
        let mut oracle = PosterOracle::new(3);
        let id = oracle.spawn_poster(Vector3::zeros());
        let stale = oracle.stale_events(20, secs(0.0), secs(5.0));
        assert_eq!(stale.len(), 20);
        assert!(stale.iter().all(|e| e.event.anchor().id != id));
        assert!(stale
            .iter()
            .all(|e| !matches!(e.event, AnchorEvent::Added(_))));
    }

    #[test]
    fn test_merge_orders_by_time() {
        let mut oracle = PosterOracle::new(9);
        let a = oracle.spawn_poster(Vector3::zeros());
        let b = oracle.spawn_poster(Vector3::x());
        let merged = merge(vec![
            oracle.sighting(&a, secs(0.0), secs(2.0)),
            oracle.sighting(&b, secs(1.0), secs(3.0)),
        ]);
        assert!(merged.windows(2).all(|w| w[0].at <= w[1].at));
    }
}
