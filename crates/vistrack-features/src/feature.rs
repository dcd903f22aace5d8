use glam::{DVec2, DVec3};

/// Identifier assigned to a feature by the external detector.
///
/// Identifiers are opaque and stable across frames for the lifetime of a tracking session.
pub type FeatureId = usize;

/// Whether the detector currently reports the feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status2D {
    /// The detector lost the feature.
    #[default]
    NotTracked,
    /// The detector reported the feature in the last frame.
    Tracked,
}

/// Trust level of the scene point attached to a feature.
///
/// Every variant but `None` carries the 3D point, so a feature used for pose estimation always
/// has one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Status3D {
    /// No scene point is known.
    #[default]
    None,
    /// A scene point was proposed and has not been validated yet.
    Initial {
        /// The proposed scene point.
        point: DVec3,
    },
    /// The scene point is trusted and used to estimate the pose.
    UseForPose {
        /// The validated scene point.
        point: DVec3,
    },
    /// The scene point repeatedly disagreed with the estimated pose.
    Outlier {
        /// The rejected scene point.
        point: DVec3,
    },
}

/// Fieldless mirror of [`Status3D`] used for counting and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status3DKind {
    /// See [`Status3D::None`].
    None,
    /// See [`Status3D::Initial`].
    Initial,
    /// See [`Status3D::UseForPose`].
    UseForPose,
    /// See [`Status3D::Outlier`].
    Outlier,
}

impl std::fmt::Display for Status3DKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status3DKind::None => "None",
            Status3DKind::Initial => "Initial",
            Status3DKind::UseForPose => "UseForPose",
            Status3DKind::Outlier => "Outlier",
        };
        f.write_str(name)
    }
}

impl Status3D {
    /// The fieldless kind of this status.
    pub fn kind(&self) -> Status3DKind {
        match self {
            Status3D::None => Status3DKind::None,
            Status3D::Initial { .. } => Status3DKind::Initial,
            Status3D::UseForPose { .. } => Status3DKind::UseForPose,
            Status3D::Outlier { .. } => Status3DKind::Outlier,
        }
    }

    /// The scene point, if any.
    pub fn point(&self) -> Option<DVec3> {
        match *self {
            Status3D::None => None,
            Status3D::Initial { point }
            | Status3D::UseForPose { point }
            | Status3D::Outlier { point } => Some(point),
        }
    }
}

/// A detector feature and its correspondence state.
///
/// Features are only mutated through [`crate::CorrespondenceStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub(crate) id: FeatureId,
    pub(crate) point: DVec2,
    pub(crate) status_2d: Status2D,
    pub(crate) status_3d: Status3D,
    pub(crate) bad_residual_count: u32,
    pub(crate) good_residual_count: u32,
    pub(crate) frames_missing: u32,
}

impl Feature {
    pub(crate) fn new(id: FeatureId, point: DVec2) -> Self {
        Self {
            id,
            point,
            status_2d: Status2D::Tracked,
            status_3d: Status3D::None,
            bad_residual_count: 0,
            good_residual_count: 0,
            frames_missing: 0,
        }
    }

    /// The detector identifier.
    pub fn id(&self) -> FeatureId {
        self.id
    }

    /// Last observed image position, in pixels.
    pub fn point(&self) -> DVec2 {
        self.point
    }

    /// 2D tracking status.
    pub fn status_2d(&self) -> Status2D {
        self.status_2d
    }

    /// 3D trust status.
    pub fn status_3d(&self) -> &Status3D {
        &self.status_3d
    }

    /// The attached scene point, if any.
    pub fn point_3d(&self) -> Option<DVec3> {
        self.status_3d.point()
    }

    /// Whether the detector currently tracks the feature.
    pub fn is_tracked(&self) -> bool {
        self.status_2d == Status2D::Tracked
    }

    /// Consecutive frames with a residual above threshold.
    pub fn bad_residual_count(&self) -> u32 {
        self.bad_residual_count
    }

    /// Consecutive frames with a residual at or below threshold.
    pub fn good_residual_count(&self) -> u32 {
        self.good_residual_count
    }

    /// Consecutive purge rounds in which the detector did not report the feature.
    pub fn frames_missing(&self) -> u32 {
        self.frames_missing
    }
}
