use glam::{DMat3, DQuat, DVec3};
use vistrack_lie::SE3;

/// Camera pose estimated by the tracker.
///
/// Stores the world to camera transform, `p_camera = R * p_world + t`. The pose belongs to a
/// single [`crate::PoseEstimator`] and is not `Clone`: consumers read it through a shared
/// borrow or take a [`Pose::to_gl_matrix`] snapshot.
#[derive(Debug, PartialEq, Default)]
pub struct Pose {
    transform: SE3,
}

impl Pose {
    /// The identity pose.
    pub fn identity() -> Self {
        Self::default()
    }

    pub(crate) fn set(&mut self, transform: SE3) {
        self.transform = transform;
    }

    /// The world to camera transform.
    pub fn se3(&self) -> SE3 {
        self.transform
    }

    /// Rotation as a unit quaternion.
    pub fn rotation(&self) -> DQuat {
        self.transform.r.q
    }

    /// Rotation matrix.
    pub fn rotation_matrix(&self) -> DMat3 {
        self.transform.r.matrix()
    }

    /// Rotation as an axis-angle vector.
    pub fn rotation_vector(&self) -> DVec3 {
        self.transform.r.log()
    }

    /// Translation in camera coordinates.
    pub fn translation(&self) -> DVec3 {
        self.transform.t
    }

    /// Camera center in world coordinates.
    pub fn camera_center(&self) -> DVec3 {
        self.transform.inverse().t
    }

    /// The transform as a column-major 4x4 matrix, the layout OpenGL expects.
    pub fn to_gl_matrix(&self) -> [f64; 16] {
        self.transform.to_cols_array()
    }
}
