//! Interface to the external 2D feature detector.
//!
//! ```rust
//! use vistrack_tracking::{FeatureTracker, ScriptedTracker, TrackedPoint};
//!
//! let mut tracker = ScriptedTracker::new([vec![TrackedPoint::new(7, 12.0, 34.0)]]);
//! assert_eq!(tracker.track(&()), vec![TrackedPoint::new(7, 12.0, 34.0)]);
//! assert!(tracker.track(&()).is_empty());
//! ```

use glam::DVec2;
use vistrack_features::FeatureId;

/// A feature position reported by the detector for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    /// Stable identifier assigned by the detector.
    pub id: FeatureId,
    /// Position in detector pixels.
    pub point: DVec2,
}

impl TrackedPoint {
    /// Create a tracked point.
    pub fn new(id: FeatureId, x: f64, y: f64) -> Self {
        Self {
            id,
            point: DVec2::new(x, y),
        }
    }
}

/// External 2D feature detector and tracker.
///
/// The estimator calls [`FeatureTracker::purge`] and then [`FeatureTracker::track`] once per
/// frame. Identifiers must stay stable while the detector follows the same feature.
pub trait FeatureTracker {
    /// The frame type consumed by the detector.
    type Image: ?Sized;

    /// Track features into `image` and return every feature currently followed.
    fn track(&mut self, image: &Self::Image) -> Vec<TrackedPoint>;

    /// Forget every feature.
    fn reset(&mut self);

    /// Drop features the detector considers unreliable before the next frame.
    fn purge(&mut self);
}

/// Detector replaying pre-recorded observations, one batch per frame.
///
/// The frame argument is ignored. Once the script is exhausted no feature is reported.
#[derive(Debug, Default, Clone)]
pub struct ScriptedTracker {
    frames: std::collections::VecDeque<Vec<TrackedPoint>>,
}

impl ScriptedTracker {
    /// Create a tracker replaying `frames` in order.
    pub fn new(frames: impl IntoIterator<Item = Vec<TrackedPoint>>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// Queue one more frame of observations.
    pub fn push_frame(&mut self, points: Vec<TrackedPoint>) {
        self.frames.push_back(points);
    }

    /// Number of frames left to replay.
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FeatureTracker for ScriptedTracker {
    type Image = ();

    fn track(&mut self, _image: &()) -> Vec<TrackedPoint> {
        self.frames.pop_front().unwrap_or_default()
    }

    fn reset(&mut self) {}

    fn purge(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_tracker_replays_in_order() {
        let mut tracker = ScriptedTracker::new([
            vec![TrackedPoint::new(1, 0.0, 0.0)],
            vec![TrackedPoint::new(1, 1.0, 0.0), TrackedPoint::new(2, 5.0, 5.0)],
        ]);
        assert_eq!(tracker.remaining(), 2);
        assert_eq!(tracker.track(&()).len(), 1);
        assert_eq!(tracker.track(&()).len(), 2);
        assert!(tracker.track(&()).is_empty());
    }
}
