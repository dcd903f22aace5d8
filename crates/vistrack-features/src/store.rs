use std::collections::{HashMap, HashSet};

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::{Feature, FeatureId, Status2D, Status3D, Status3DKind};

/// Errors raised by invalid correspondence updates.
#[derive(Debug, Error, PartialEq)]
pub enum CorrespondenceError {
    /// The feature was never observed or has been purged.
    #[error("Unknown feature {0}")]
    UnknownFeature(FeatureId),

    /// The operation requires a tracked feature.
    #[error("Feature {0} is not tracked")]
    NotTracked(FeatureId),

    /// The requested status change is not allowed from the current status.
    #[error("Feature {id}: invalid transition {from} -> {to}")]
    InvalidTransition {
        /// The feature identifier.
        id: FeatureId,
        /// The current status.
        from: Status3DKind,
        /// The requested status.
        to: Status3DKind,
    },

    /// The feature has no scene point taking part in pose estimation.
    #[error("Feature {id} has no active scene point (status {status})")]
    InactivePoint {
        /// The feature identifier.
        id: FeatureId,
        /// The current status.
        status: Status3DKind,
    },

    /// A coordinate is NaN or infinite.
    #[error("Feature {0}: non-finite coordinates")]
    NonFinitePoint(FeatureId),
}

/// Parameters of the correspondence lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceConfig {
    /// Reprojection residual, in pixels, above which a frame counts as bad.
    pub residual_threshold: f64,
    /// Consecutive bad frames after which a feature becomes an outlier.
    pub outlier_limit: u32,
    /// Purge rounds a feature may be missing from the detector output before it is removed.
    pub purge_grace_frames: u32,
}

impl Default for CorrespondenceConfig {
    fn default() -> Self {
        Self {
            residual_threshold: 3.0,
            outlier_limit: 20,
            purge_grace_frames: 5,
        }
    }
}

impl CorrespondenceConfig {
    /// Set the residual threshold.
    pub fn with_residual_threshold(mut self, threshold: f64) -> Self {
        self.residual_threshold = threshold;
        self
    }

    /// Set the number of consecutive bad frames tolerated before rejection.
    pub fn with_outlier_limit(mut self, limit: u32) -> Self {
        self.outlier_limit = limit;
        self
    }

    /// Set the purge grace period.
    pub fn with_purge_grace_frames(mut self, frames: u32) -> Self {
        self.purge_grace_frames = frames;
        self
    }
}

/// Outcome of [`CorrespondenceStore::penalize_residual`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualVerdict {
    /// The residual was within threshold. Carries the consecutive good frame count.
    Accepted {
        /// Consecutive frames within threshold, including this one.
        streak: u32,
    },
    /// The residual exceeded the threshold. Carries the consecutive bad frame count.
    Penalized {
        /// Consecutive frames above threshold, including this one.
        count: u32,
    },
    /// The residual exceeded the threshold for `outlier_limit` consecutive frames.
    BecameOutlier,
}

/// Owner of every feature and its correspondence state for one tracking session.
#[derive(Debug, Default)]
pub struct CorrespondenceStore {
    config: CorrespondenceConfig,
    features: HashMap<FeatureId, Feature>,
}

impl CorrespondenceStore {
    /// Create an empty store.
    pub fn new(config: CorrespondenceConfig) -> Self {
        Self {
            config,
            features: HashMap::new(),
        }
    }

    /// The lifecycle parameters.
    pub fn config(&self) -> &CorrespondenceConfig {
        &self.config
    }

    /// Record a detector observation.
    ///
    /// Creates the feature when the id is unseen and marks it tracked.
    ///
    /// # Returns
    ///
    /// `true` when a new feature was created.
    pub fn observe(&mut self, id: FeatureId, point: DVec2) -> Result<bool, CorrespondenceError> {
        if !point.is_finite() {
            return Err(CorrespondenceError::NonFinitePoint(id));
        }

        match self.features.get_mut(&id) {
            Some(feature) => {
                feature.point = point;
                feature.status_2d = Status2D::Tracked;
                feature.frames_missing = 0;
                Ok(false)
            }
            None => {
                self.features.insert(id, Feature::new(id, point));
                log::trace!("feature {} created at {:?}", id, point);
                Ok(true)
            }
        }
    }

    /// Mark a feature as no longer tracked. The feature is kept.
    ///
    /// A feature used for pose estimation falls back to `Initial` and has to be validated again.
    pub fn lose(&mut self, id: FeatureId) -> Result<(), CorrespondenceError> {
        let feature = self.feature_mut(id)?;
        feature.status_2d = Status2D::NotTracked;
        feature.good_residual_count = 0;
        if let Status3D::UseForPose { point } = feature.status_3d {
            feature.status_3d = Status3D::Initial { point };
            log::trace!("feature {} lost, demoted to Initial", id);
        }
        Ok(())
    }

    /// Attach a candidate scene point to a tracked feature.
    ///
    /// `None` and `Outlier` features become `Initial`. An `Initial` feature takes the new point
    /// and restarts validation, a `UseForPose` feature keeps its validated point.
    ///
    /// # Returns
    ///
    /// The resulting 3D status.
    pub fn propose_3d(
        &mut self,
        id: FeatureId,
        point: DVec3,
    ) -> Result<Status3DKind, CorrespondenceError> {
        if !point.is_finite() {
            return Err(CorrespondenceError::NonFinitePoint(id));
        }

        let feature = self.feature_mut(id)?;
        if !feature.is_tracked() {
            return Err(CorrespondenceError::NotTracked(id));
        }

        match feature.status_3d {
            Status3D::None | Status3D::Outlier { .. } | Status3D::Initial { .. } => {
                feature.status_3d = Status3D::Initial { point };
                feature.bad_residual_count = 0;
                feature.good_residual_count = 0;
            }
            Status3D::UseForPose { .. } => {}
        }

        Ok(feature.status_3d.kind())
    }

    /// Promote an `Initial` feature to `UseForPose`.
    pub fn validate(&mut self, id: FeatureId) -> Result<(), CorrespondenceError> {
        let feature = self.feature_mut(id)?;
        if !feature.is_tracked() {
            return Err(CorrespondenceError::NotTracked(id));
        }

        match feature.status_3d {
            Status3D::Initial { point } => {
                feature.status_3d = Status3D::UseForPose { point };
                log::trace!("feature {} validated", id);
                Ok(())
            }
            other => Err(CorrespondenceError::InvalidTransition {
                id,
                from: other.kind(),
                to: Status3DKind::UseForPose,
            }),
        }
    }

    /// Record the reprojection residual of a feature for the current frame.
    ///
    /// A residual above the threshold increments the bad frame counter, anything else resets it.
    /// Reaching `outlier_limit` consecutive bad frames turns the feature into an outlier, which
    /// excludes it from pose estimation until it is proposed again.
    pub fn penalize_residual(
        &mut self,
        id: FeatureId,
        residual: f64,
    ) -> Result<ResidualVerdict, CorrespondenceError> {
        let threshold = self.config.residual_threshold;
        let limit = self.config.outlier_limit;
        let feature = self.feature_mut(id)?;

        let point = match feature.status_3d {
            Status3D::Initial { point } | Status3D::UseForPose { point } => point,
            other => {
                return Err(CorrespondenceError::InactivePoint {
                    id,
                    status: other.kind(),
                })
            }
        };

        // NaN counts as bad
        if residual <= threshold {
            feature.bad_residual_count = 0;
            feature.good_residual_count = feature.good_residual_count.saturating_add(1);
            return Ok(ResidualVerdict::Accepted {
                streak: feature.good_residual_count,
            });
        }

        feature.good_residual_count = 0;
        feature.bad_residual_count = feature.bad_residual_count.saturating_add(1);

        if feature.bad_residual_count >= limit {
            feature.status_3d = Status3D::Outlier { point };
            feature.bad_residual_count = 0;
            log::warn!(
                "feature {} marked as outlier after {} frames above {} px",
                id,
                limit,
                threshold
            );
            return Ok(ResidualVerdict::BecameOutlier);
        }

        Ok(ResidualVerdict::Penalized {
            count: feature.bad_residual_count,
        })
    }

    /// Remove features missing from `active_ids` for longer than the grace period.
    ///
    /// Features present in `active_ids` restart their grace period.
    ///
    /// # Returns
    ///
    /// The removed identifiers in ascending order.
    pub fn purge(&mut self, active_ids: &HashSet<FeatureId>) -> Vec<FeatureId> {
        let grace = self.config.purge_grace_frames;
        let mut removed = Vec::new();

        self.features.retain(|id, feature| {
            if active_ids.contains(id) {
                feature.frames_missing = 0;
                return true;
            }
            feature.frames_missing = feature.frames_missing.saturating_add(1);
            if feature.frames_missing > grace {
                removed.push(*id);
                false
            } else {
                true
            }
        });

        removed.sort_unstable();
        if !removed.is_empty() {
            log::debug!("purged {} features", removed.len());
        }
        removed
    }

    /// Remove every feature.
    pub fn reset(&mut self) {
        self.features.clear();
    }

    /// Look up a feature.
    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features.get(&id)
    }

    /// Whether a feature with this id exists.
    pub fn contains(&self, id: FeatureId) -> bool {
        self.features.contains_key(&id)
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the store holds no feature.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Iterate over all features in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Identifiers of tracked features in ascending order.
    pub fn tracked_ids(&self) -> Vec<FeatureId> {
        let mut ids: Vec<_> = self
            .features
            .values()
            .filter(|f| f.is_tracked())
            .map(|f| f.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Tracked features with the given 3D status as `(id, image point, scene point)`, in
    /// ascending id order.
    pub fn correspondences(&self, kind: Status3DKind) -> Vec<(FeatureId, DVec2, DVec3)> {
        let mut out: Vec<_> = self
            .features
            .values()
            .filter(|f| f.is_tracked() && f.status_3d.kind() == kind)
            .filter_map(|f| f.point_3d().map(|p| (f.id, f.point, p)))
            .collect();
        out.sort_unstable_by_key(|(id, _, _)| *id);
        out
    }

    /// Number of features with the given 3D status, tracked or not.
    pub fn count(&self, kind: Status3DKind) -> usize {
        self.features
            .values()
            .filter(|f| f.status_3d.kind() == kind)
            .count()
    }

    /// Number of features used for pose estimation.
    pub fn count_use_for_pose(&self) -> usize {
        self.count(Status3DKind::UseForPose)
    }

    /// Number of tracked features whose scene point is `Initial` or `UseForPose`.
    pub fn count_usable(&self) -> usize {
        self.features
            .values()
            .filter(|f| {
                f.is_tracked()
                    && matches!(
                        f.status_3d.kind(),
                        Status3DKind::Initial | Status3DKind::UseForPose
                    )
            })
            .count()
    }

    fn feature_mut(&mut self, id: FeatureId) -> Result<&mut Feature, CorrespondenceError> {
        self.features
            .get_mut(&id)
            .ok_or(CorrespondenceError::UnknownFeature(id))
    }
}
