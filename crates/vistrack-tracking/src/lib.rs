#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! The [`PoseEstimator`] drives one tracking session. It pulls 2D features from a
//! [`FeatureTracker`], keeps their correspondences in a
//! [`vistrack_features::CorrespondenceStore`] and refines the [`Pose`] with the
//! Levenberg-Marquardt solver of `vistrack-optim`, falling back to a rotation-only solve when
//! too few validated scene points are visible.

pub mod camera;
pub use camera::*;

pub mod detector;
pub use detector::{FeatureTracker, ScriptedTracker, TrackedPoint};

mod config;
pub use config::TrackerConfig;

mod error;
pub use error::TrackingError;

mod estimator;
pub use estimator::*;

mod pose;
pub use pose::Pose;
