use thiserror::Error;
use vistrack_features::{CorrespondenceError, FeatureId};
use vistrack_optim::OptimizerError;

/// Errors reported by the pose estimator.
///
/// Numerical trouble and loss of tracking are not errors, they are reported through
/// [`crate::TrackOutcome`].
#[derive(Debug, Error)]
pub enum TrackingError {
    /// A frame was tracked before the estimator was reset.
    #[error("Tracker is not initialized, call reset first")]
    NotInitialized,

    /// The detector reported the same identifier twice in one frame.
    #[error("Duplicate feature id {0} in detector output")]
    DuplicateFeatureId(FeatureId),

    /// The detector reported a NaN or infinite coordinate.
    #[error("Non-finite position for feature {0}")]
    NonFinitePoint(FeatureId),

    /// The tracker configuration is inconsistent.
    #[error("Invalid tracker configuration: {0}")]
    InvalidConfig(String),

    /// The solver rejected the problem.
    #[error(transparent)]
    Optimizer(#[from] OptimizerError),

    /// A correspondence update was rejected.
    #[error(transparent)]
    Correspondence(#[from] CorrespondenceError),
}
