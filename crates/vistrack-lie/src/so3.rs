use std::ops::Mul;

use glam::{DMat3, DQuat, DVec3};

/// Below this angle the exponential and logarithm maps use their first order expansion.
const SMALL_ANGLE: f64 = 1e-10;

/// A 3D rotation stored as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SO3 {
    /// The unit quaternion representing the rotation.
    pub q: DQuat,
}

impl Default for SO3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl SO3 {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { q: DQuat::IDENTITY };

    /// The rotation as a 3x3 matrix.
    pub fn matrix(&self) -> DMat3 {
        DMat3::from_quat(self.q)
    }

    /// The inverse rotation.
    pub fn inverse(&self) -> Self {
        Self {
            q: self.q.conjugate(),
        }
    }

    /// Rotate a point.
    pub fn transform(&self, point: DVec3) -> DVec3 {
        self.q * point
    }

    /// Lie algebra -> Lie group
    ///
    /// Maps a rotation vector (axis scaled by angle, in radians) to a rotation.
    pub fn exp(v: DVec3) -> Self {
        let theta = v.length();

        let q = if theta < SMALL_ANGLE {
            let xyz = 0.5 * v;
            DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, 1.0).normalize()
        } else {
            let theta_half = 0.5 * theta;
            let xyz = (theta_half.sin() / theta) * v;
            DQuat::from_xyzw(xyz.x, xyz.y, xyz.z, theta_half.cos())
        };

        Self { q }
    }

    /// Lie group -> Lie algebra
    ///
    /// Returns the rotation vector with angle in `[0, pi]`.
    pub fn log(&self) -> DVec3 {
        // take the shortest path
        let q = if self.q.w < 0.0 { -self.q } else { self.q };
        let vec = DVec3::new(q.x, q.y, q.z);
        let sin_half = vec.length();

        if sin_half < SMALL_ANGLE {
            return vec * (2.0 / q.w);
        }

        let theta = 2.0 * sin_half.atan2(q.w);
        vec * (theta / sin_half)
    }

    /// Rotation angle in radians, in `[0, pi]`.
    pub fn angle(&self) -> f64 {
        self.log().length()
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            q: (self.q * rhs.q).normalize(),
        }
    }
}

impl Mul<DVec3> for SO3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform(rhs)
    }
}
