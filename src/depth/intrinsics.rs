//! Pinhole camera intrinsics with the lens models used by depth sensors.

use crate::constants::UNDISTORT_ITERATIONS;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Lens distortion model attached to a stream's intrinsics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    /// Rectilinear images, no distortion
    #[default]
    None,
    /// Distortion applied at projection only; deprojection is pinhole
    ModifiedBrownConrady,
    /// Coefficients undistort directly, closed form on deprojection
    InverseBrownConrady,
    /// Standard Brown-Conrady, inverted iteratively on deprojection
    BrownConrady,
}

/// Intrinsics of the stream a depth frame is aligned to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    /// Image width in pixels
    pub width: i32,
    /// Image height in pixels
    pub height: i32,
    /// Focal length along x, in pixels
    pub fx: f64,
    /// Focal length along y, in pixels
    pub fy: f64,
    /// Principal point column
    pub ppx: f64,
    /// Principal point row
    pub ppy: f64,
    /// Distortion model
    #[serde(default)]
    pub model: DistortionModel,
    /// `[k1, k2, p1, p2, k3]`
    #[serde(default)]
    pub coeffs: [f64; 5],
}

impl CameraIntrinsics {
    /// Distortion-free intrinsics
    #[must_use]
    pub const fn pinhole(width: i32, height: i32, fx: f64, fy: f64, ppx: f64, ppy: f64) -> Self {
        Self {
            width,
            height,
            fx,
            fy,
            ppx,
            ppy,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    /// Whether the focal lengths are usable
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.fx.abs() > f64::EPSILON && self.fy.abs() > f64::EPSILON
    }

    /// Map a pixel and its range along the optical axis to a camera-frame point
    #[must_use]
    pub fn deproject(&self, pixel: (f64, f64), depth: f64) -> Vector3<f64> {
        let mut x = (pixel.0 - self.ppx) / self.fx;
        let mut y = (pixel.1 - self.ppy) / self.fy;
        let [k1, k2, p1, p2, k3] = self.coeffs;

        match self.model {
            DistortionModel::None | DistortionModel::ModifiedBrownConrady => {}
            DistortionModel::InverseBrownConrady => {
                let r2 = x.mul_add(x, y * y);
                let f = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                let ux = x * f + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                let uy = y * f + 2.0 * p2 * x * y + p1 * (r2 + 2.0 * y * y);
                x = ux;
                y = uy;
            }
            DistortionModel::BrownConrady => {
                let (xd, yd) = (x, y);
                for _ in 0..UNDISTORT_ITERATIONS {
                    let r2 = x.mul_add(x, y * y);
                    let radial = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
                    let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
                    let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
                    x = (xd - dx) / radial;
                    y = (yd - dy) / radial;
                }
            }
        }

        Vector3::new(depth * x, depth * y, depth)
    }

    /// Project a camera-frame point to pixel coordinates
    #[must_use]
    pub fn project(&self, point: &Vector3<f64>) -> (f64, f64) {
        let mut x = point.x / point.z;
        let mut y = point.y / point.z;
        let [k1, k2, p1, p2, k3] = self.coeffs;

        if matches!(self.model, DistortionModel::BrownConrady | DistortionModel::ModifiedBrownConrady) {
            let r2 = x.mul_add(x, y * y);
            let f = 1.0 + k1 * r2 + k2 * r2 * r2 + k3 * r2 * r2 * r2;
            let dx = x * f + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
            let dy = y * f + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
            x = dx;
            y = dy;
        }

        (x.mul_add(self.fx, self.ppx), y.mul_add(self.fy, self.ppy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_principal_point_maps_to_optical_axis() {
        let intrinsics = CameraIntrinsics::pinhole(640, 480, 615.0, 615.0, 320.0, 240.0);
        let point = intrinsics.deproject((320.0, 240.0), 2.5);
        assert!(point.x.abs() < 1e-12);
        assert!(point.y.abs() < 1e-12);
        assert!((point.z - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_pinhole_offset() {
        let intrinsics = CameraIntrinsics::pinhole(640, 480, 500.0, 400.0, 320.0, 240.0);
        let point = intrinsics.deproject((420.0, 200.0), 2.0);
        assert!((point.x - 0.4).abs() < 1e-12);
        assert!((point.y + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_brown_conrady_inverts_projection() {
        let mut intrinsics = CameraIntrinsics::pinhole(640, 480, 600.0, 600.0, 320.0, 240.0);
        intrinsics.model = DistortionModel::BrownConrady;
        intrinsics.coeffs = [0.05, -0.01, 0.001, -0.0005, 0.0];

        let original = Vector3::new(0.3, -0.2, 1.5);
        let pixel = intrinsics.project(&original);
        let recovered = intrinsics.deproject(pixel, 1.5);
        assert!((recovered - original).norm() < 1e-6);
    }

    proptest! {
        #[test]
        fn prop_depth_is_preserved(u in 0.0f64..640.0, v in 0.0f64..480.0, depth in 0.1f64..20.0) {
            let intrinsics = CameraIntrinsics::pinhole(640, 480, 610.0, 612.0, 318.0, 243.0);
            let point = intrinsics.deproject((u, v), depth);
            prop_assert!((point.z - depth).abs() < 1e-12);
            let (pu, pv) = intrinsics.project(&point);
            prop_assert!((pu - u).abs() < 1e-6);
            prop_assert!((pv - v).abs() < 1e-6);
        }
    }
}
