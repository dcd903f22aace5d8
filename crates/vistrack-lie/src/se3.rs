use std::ops::Mul;

use glam::{DMat4, DVec3};

use crate::so3::SO3;

/// A rigid body transformation `x' = R * x + t`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SE3 {
    /// Rotation part.
    pub r: SO3,
    /// Translation part.
    pub t: DVec3,
}

impl SE3 {
    /// The identity transformation.
    pub const IDENTITY: Self = Self {
        r: SO3::IDENTITY,
        t: DVec3::ZERO,
    };

    /// Create a transformation from a rotation and a translation.
    pub fn new(r: SO3, t: DVec3) -> Self {
        Self { r, t }
    }

    /// Create a transformation from a rotation vector and a translation.
    pub fn from_rotation_vector(omega: DVec3, t: DVec3) -> Self {
        Self {
            r: SO3::exp(omega),
            t,
        }
    }

    /// The inverse transformation.
    pub fn inverse(&self) -> Self {
        let r_inv = self.r.inverse();
        Self {
            r: r_inv,
            t: -(r_inv * self.t),
        }
    }

    /// Apply the transformation to a point.
    pub fn transform(&self, point: DVec3) -> DVec3 {
        self.r * point + self.t
    }

    /// The transformation as a homogeneous 4x4 matrix.
    pub fn matrix(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.r.q, self.t)
    }

    /// The homogeneous matrix as 16 values in column-major order.
    pub fn to_cols_array(&self) -> [f64; 16] {
        self.matrix().to_cols_array()
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: Self) -> Self::Output {
        Self {
            r: self.r * rhs.r,
            t: self.t + self.r * rhs.t,
        }
    }
}

impl Mul<DVec3> for SE3 {
    type Output = DVec3;

    fn mul(self, rhs: DVec3) -> Self::Output {
        self.transform(rhs)
    }
}
