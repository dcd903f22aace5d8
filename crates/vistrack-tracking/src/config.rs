use serde::{Deserialize, Serialize};
use vistrack_features::CorrespondenceConfig;
use vistrack_optim::LevenbergMarquardt;

use crate::error::TrackingError;

/// Configuration of the pose estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Validated correspondences needed for a full 6-DOF solve.
    pub min_required: usize,
    /// Consecutive frames within threshold before an `Initial` point is validated.
    pub validation_frames: u32,
    /// Consecutive frames without usable correspondences tolerated before tracking is lost.
    pub lost_grace_frames: u32,
    /// Factor applied to detector coordinates to obtain camera pixels.
    pub image_scale: f64,
    /// Finite difference step for the pose Jacobian.
    pub step_size: f64,
    /// Iteration cap of one solve.
    pub max_iterations: usize,
    /// Depth at which tracked features without a scene point are seeded, if set.
    pub seed_depth: Option<f64>,
    /// Correspondence lifecycle parameters.
    pub correspondence: CorrespondenceConfig,
    /// Solver parameters.
    pub solver: LevenbergMarquardt,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_required: 4,
            validation_frames: 3,
            lost_grace_frames: 10,
            image_scale: 1.0,
            step_size: 1e-6,
            max_iterations: 20,
            seed_depth: None,
            correspondence: CorrespondenceConfig::default(),
            solver: LevenbergMarquardt::default(),
        }
    }
}

impl TrackerConfig {
    /// Create a configuration with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of correspondences needed for a full solve.
    pub fn with_min_required(mut self, min_required: usize) -> Self {
        self.min_required = min_required;
        self
    }

    /// Set the number of frames needed to validate a point.
    pub fn with_validation_frames(mut self, frames: u32) -> Self {
        self.validation_frames = frames;
        self
    }

    /// Set the lost grace period.
    pub fn with_lost_grace_frames(mut self, frames: u32) -> Self {
        self.lost_grace_frames = frames;
        self
    }

    /// Set the detector to camera coordinate scale.
    pub fn with_image_scale(mut self, scale: f64) -> Self {
        self.image_scale = scale;
        self
    }

    /// Seed unknown points at the given depth.
    pub fn with_seed_depth(mut self, depth: f64) -> Self {
        self.seed_depth = Some(depth);
        self
    }

    /// Set the correspondence parameters.
    pub fn with_correspondence(mut self, config: CorrespondenceConfig) -> Self {
        self.correspondence = config;
        self
    }

    /// Set the solver parameters.
    pub fn with_solver(mut self, solver: LevenbergMarquardt) -> Self {
        self.solver = solver;
        self
    }

    /// Check the configuration for values the estimator cannot work with.
    pub fn validate(&self) -> Result<(), TrackingError> {
        // a 6-DOF solve needs at least 6 measurements
        if self.min_required < 3 {
            return Err(TrackingError::InvalidConfig(format!(
                "min_required must be at least 3, got {}",
                self.min_required
            )));
        }
        if self.validation_frames == 0 {
            return Err(TrackingError::InvalidConfig(
                "validation_frames must be at least 1".to_string(),
            ));
        }
        if !self.image_scale.is_finite() || self.image_scale <= 0.0 {
            return Err(TrackingError::InvalidConfig(format!(
                "image_scale must be positive, got {}",
                self.image_scale
            )));
        }
        if !self.step_size.is_finite() || self.step_size <= 0.0 {
            return Err(TrackingError::InvalidConfig(format!(
                "step_size must be positive, got {}",
                self.step_size
            )));
        }
        if self.max_iterations == 0 {
            return Err(TrackingError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(depth) = self.seed_depth {
            if !depth.is_finite() || depth <= 0.0 {
                return Err(TrackingError::InvalidConfig(format!(
                    "seed_depth must be positive, got {depth}"
                )));
            }
        }
        if self.correspondence.outlier_limit == 0 {
            return Err(TrackingError::InvalidConfig(
                "outlier_limit must be at least 1".to_string(),
            ));
        }
        let threshold = self.correspondence.residual_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(TrackingError::InvalidConfig(format!(
                "residual_threshold must be non negative, got {threshold}"
            )));
        }
        Ok(())
    }
}
