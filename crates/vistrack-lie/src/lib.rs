#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Vistrack Lie Groups
//!
//! Rotations and rigid body transformations in double precision, used to represent and
//! refine the camera pose.
//!
//! ## Supported Groups
//!
//! - **SO(3)**: 3D rotation group
//! - **SE(3)**: 3D rigid body transformations (rotation + translation)
//!
//! ## Example
//!
//! ```rust
//! use glam::DVec3;
//! use vistrack_lie::so3::SO3;
//!
//! // Create a rotation from its rotation vector
//! let rotation = SO3::exp(DVec3::new(0.0, 0.0, std::f64::consts::FRAC_PI_2));
//!
//! // Apply the rotation to a point
//! let rotated = rotation.transform(DVec3::X);
//! assert!((rotated - DVec3::Y).length() < 1e-12);
//! ```

/// Special Euclidean group SE(3) for 3D rigid transformations.
pub mod se3;

/// Special Orthogonal group SO(3) for 3D rotations.
pub mod so3;

pub use se3::SE3;
pub use so3::SO3;
