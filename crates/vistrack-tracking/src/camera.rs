//! Camera models used to project scene points into the image.
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vistrack_lie::SE3;

/// Points closer to the image plane than this are not projected.
const MIN_DEPTH: f64 = 1e-9;

/// Fixed point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 20;

/// Error types for camera operations.
#[derive(Debug, Error, PartialEq)]
pub enum CameraError {
    /// Focal lengths must be finite and positive, the principal point finite.
    #[error("Invalid camera intrinsics: {0}")]
    InvalidIntrinsics(String),

    /// Width and height must be non zero.
    #[error("Invalid resolution {width}x{height}")]
    InvalidResolution {
        /// Image width in pixels.
        width: usize,
        /// Image height in pixels.
        height: usize,
    },
}

/// Projection model consumed by the pose estimator.
///
/// Implementors map points in the camera frame to pixels and back. The camera looks along `+z`.
pub trait Camera {
    /// Project a point expressed in the camera frame.
    ///
    /// Returns `None` when the point is not in front of the camera.
    fn project_camera(&self, point_camera: DVec3) -> Option<DVec2>;

    /// Back-project a pixel to the point on its viewing ray at depth `z = 1`.
    fn unproject(&self, pixel: DVec2) -> DVec3;

    /// Project a world point seen from `pose`, the world to camera transform.
    fn project(&self, point_world: DVec3, pose: &SE3) -> Option<DVec2> {
        self.project_camera(pose.transform(point_world))
    }
}

/// Image resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
}

impl Resolution {
    /// Create a resolution.
    pub fn new(width: usize, height: usize) -> Result<Self, CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidResolution { width, height });
        }
        Ok(Self { width, height })
    }
}

/// Pinhole intrinsics in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Focal length in x direction
    pub fx: f64,
    /// Focal length in y direction
    pub fy: f64,
    /// Principal point x coordinate
    pub cx: f64,
    /// Principal point y coordinate
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Create intrinsics from focal lengths and principal point.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, CameraError> {
        let focal_ok = fx.is_finite() && fy.is_finite() && fx > 0.0 && fy > 0.0;
        if !focal_ok || !cx.is_finite() || !cy.is_finite() {
            return Err(CameraError::InvalidIntrinsics(format!(
                "fx={fx} fy={fy} cx={cx} cy={cy}"
            )));
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// The 3x3 intrinsics matrix, row-major.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, 0.0, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    fn scaled(&self, sx: f64, sy: f64) -> Self {
        Self {
            fx: self.fx * sx,
            fy: self.fy * sy,
            cx: self.cx * sx,
            cy: self.cy * sy,
        }
    }
}

/// Brown-Conrady distortion with three radial and two tangential coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    /// No distortion.
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether any coefficient is non zero.
    pub fn has_distortion(&self) -> bool {
        self.k1 != 0.0 || self.k2 != 0.0 || self.p1 != 0.0 || self.p2 != 0.0 || self.k3 != 0.0
    }

    /// Distort normalized image coordinates.
    pub fn distort(&self, p: DVec2) -> DVec2 {
        let (x, y) = (p.x, p.y);
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
        let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        DVec2::new(x * radial + dx, y * radial + dy)
    }

    /// Invert [`Distortion::distort`] by fixed point iteration.
    pub fn undistort(&self, distorted: DVec2) -> DVec2 {
        if !self.has_distortion() {
            return distorted;
        }

        let mut p = distorted;
        for _ in 0..UNDISTORT_ITERATIONS {
            let (x, y) = (p.x, p.y);
            let r2 = x * x + y * y;
            let radial = 1.0 + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3));
            let dx = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
            let dy = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
            p = DVec2::new((distorted.x - dx) / radial, (distorted.y - dy) / radial);
        }
        p
    }
}

/// Pinhole camera with lens distortion.
///
/// Intrinsics are stored for the calibration resolution and rescaled to the working resolution
/// set with [`PinholeCamera::set_resolution`].
#[derive(Debug, Clone, PartialEq)]
pub struct PinholeCamera {
    calibration: CameraIntrinsics,
    calibration_resolution: Resolution,
    resolution: Resolution,
    intrinsics: CameraIntrinsics,
    distortion: Distortion,
}

impl PinholeCamera {
    /// Create a calibrated camera working at its calibration resolution.
    pub fn new(
        intrinsics: CameraIntrinsics,
        distortion: Distortion,
        resolution: Resolution,
    ) -> Self {
        Self {
            calibration: intrinsics,
            calibration_resolution: resolution,
            resolution,
            intrinsics,
            distortion,
        }
    }

    /// Guess an uncalibrated camera from the image resolution.
    ///
    /// The principal point is the image center and both focal lengths equal the image width.
    pub fn with_resolution(resolution: Resolution) -> Self {
        let w = resolution.width as f64;
        let h = resolution.height as f64;
        let intrinsics = CameraIntrinsics {
            fx: w,
            fy: w,
            cx: w / 2.0,
            cy: h / 2.0,
        };
        Self::new(intrinsics, Distortion::none(), resolution)
    }

    /// Replace the calibration and keep the current working resolution.
    pub fn set_calibration(
        &mut self,
        intrinsics: CameraIntrinsics,
        distortion: Distortion,
        calibration_resolution: Resolution,
    ) {
        self.calibration = intrinsics;
        self.calibration_resolution = calibration_resolution;
        self.distortion = distortion;
        self.update_intrinsics();
        log::debug!(
            "camera calibration set for {}x{}",
            calibration_resolution.width,
            calibration_resolution.height
        );
    }

    /// Set the working resolution and rescale the intrinsics accordingly.
    pub fn set_resolution(&mut self, width: usize, height: usize) -> Result<(), CameraError> {
        self.resolution = Resolution::new(width, height)?;
        self.update_intrinsics();
        Ok(())
    }

    /// Intrinsics at the working resolution.
    pub fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }

    /// Distortion coefficients.
    pub fn distortion(&self) -> &Distortion {
        &self.distortion
    }

    /// Working resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Resolution the calibration was made at.
    pub fn calibration_resolution(&self) -> Resolution {
        self.calibration_resolution
    }

    fn update_intrinsics(&mut self) {
        let sx = self.resolution.width as f64 / self.calibration_resolution.width as f64;
        let sy = self.resolution.height as f64 / self.calibration_resolution.height as f64;
        self.intrinsics = self.calibration.scaled(sx, sy);
    }
}

impl Camera for PinholeCamera {
    fn project_camera(&self, point_camera: DVec3) -> Option<DVec2> {
        if point_camera.z.is_nan() || point_camera.z <= MIN_DEPTH {
            return None;
        }
        let normalized = point_camera.truncate() / point_camera.z;
        let d = self.distortion.distort(normalized);
        let k = &self.intrinsics;
        Some(DVec2::new(k.fx * d.x + k.cx, k.fy * d.y + k.cy))
    }

    fn unproject(&self, pixel: DVec2) -> DVec3 {
        let k = &self.intrinsics;
        let distorted = DVec2::new((pixel.x - k.cx) / k.fx, (pixel.y - k.cy) / k.fy);
        self.distortion.undistort(distorted).extend(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> PinholeCamera {
        PinholeCamera::new(
            CameraIntrinsics::new(500.0, 510.0, 320.0, 240.0).unwrap(),
            Distortion::none(),
            Resolution::new(640, 480).unwrap(),
        )
    }

    #[test]
    fn test_project_principal_axis() {
        let cam = camera();
        let p = cam.project_camera(DVec3::new(0.0, 0.0, 2.0)).unwrap();
        assert_eq!(p, DVec2::new(320.0, 240.0));

        let p = cam.project_camera(DVec3::new(0.2, -0.1, 2.0)).unwrap();
        assert_relative_eq!(p.x, 370.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 214.5, epsilon = 1e-12);
    }

    #[test]
    fn test_points_behind_camera_are_rejected() {
        let cam = camera();
        assert!(cam.project_camera(DVec3::new(0.0, 0.0, -1.0)).is_none());
        assert!(cam.project_camera(DVec3::new(1.0, 0.0, 0.0)).is_none());
        assert!(cam.project_camera(DVec3::new(0.0, 0.0, f64::NAN)).is_none());
    }

    #[test]
    fn test_project_with_pose() {
        let cam = camera();
        let pose = SE3::from_rotation_vector(DVec3::ZERO, DVec3::new(0.0, 0.0, 3.0));
        let p = cam.project(DVec3::new(0.0, 0.0, -1.0), &pose).unwrap();
        assert_eq!(p, DVec2::new(320.0, 240.0));
    }

    #[test]
    fn test_unproject_inverts_project_with_distortion() {
        let mut cam = camera();
        cam.set_calibration(
            *cam.intrinsics(),
            Distortion {
                k1: -0.2,
                k2: 0.05,
                p1: 0.001,
                p2: -0.002,
                k3: 0.0,
            },
            Resolution::new(640, 480).unwrap(),
        );

        let point = DVec3::new(0.3, -0.2, 1.5);
        let pixel = cam.project_camera(point).unwrap();
        let ray = cam.unproject(pixel);
        assert_relative_eq!(ray.x, point.x / point.z, epsilon = 1e-8);
        assert_relative_eq!(ray.y, point.y / point.z, epsilon = 1e-8);
        assert_eq!(ray.z, 1.0);
    }

    #[test]
    fn test_set_resolution_rescales_intrinsics() {
        let mut cam = camera();
        cam.set_resolution(320, 240).unwrap();
        let k = cam.intrinsics();
        assert_relative_eq!(k.fx, 250.0);
        assert_relative_eq!(k.fy, 255.0);
        assert_relative_eq!(k.cx, 160.0);
        assert_relative_eq!(k.cy, 120.0);

        cam.set_resolution(640, 480).unwrap();
        assert_eq!(cam.intrinsics(), &CameraIntrinsics::new(500.0, 510.0, 320.0, 240.0).unwrap());

        assert_eq!(
            cam.set_resolution(0, 480),
            Err(CameraError::InvalidResolution {
                width: 0,
                height: 480
            })
        );
    }

    #[test]
    fn test_default_guess_from_resolution() {
        let cam = PinholeCamera::with_resolution(Resolution::new(640, 480).unwrap());
        let k = cam.intrinsics();
        assert_eq!((k.fx, k.fy, k.cx, k.cy), (640.0, 640.0, 320.0, 240.0));
        assert!(!cam.distortion().has_distortion());
    }

    #[test]
    fn test_invalid_intrinsics() {
        assert!(CameraIntrinsics::new(0.0, 1.0, 0.0, 0.0).is_err());
        assert!(CameraIntrinsics::new(1.0, f64::INFINITY, 0.0, 0.0).is_err());
        assert!(CameraIntrinsics::new(1.0, 1.0, f64::NAN, 0.0).is_err());
    }
}
