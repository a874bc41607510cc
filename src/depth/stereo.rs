use super::{DepthSample, Rejection, ValidityWindow};
use crate::{constants::SGBM_DISPARITY_SCALE, utils::in_bounds, Error, Result};
use nalgebra::{Matrix4, Vector4};
use opencv::{
    core::{Mat, CV_16SC1, CV_32F, CV_32FC1},
    prelude::*,
};

/// Disparity collaborator: a map aligned with the left/reference image
pub trait DisparityMap {
    /// Disparity in pixels at `(x, y)`; non-positive when unmatched
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be read
    fn disparity_at(&self, x: i32, y: i32) -> Result<f64>;
}

/// Floating point disparity map
#[derive(Debug, Clone)]
pub struct DisparityImage {
    disparity: Mat,
}

impl DisparityImage {
    /// Wrap a `CV_32FC1` disparity map in pixel units
    ///
    /// # Errors
    ///
    /// Returns an error if the map has the wrong type
    pub fn new(disparity: Mat) -> Result<Self> {
        if disparity.typ() != CV_32FC1 {
            return Err(Error::InvalidInput(format!(
                "Disparity map must be 32-bit float single channel, got Mat type {}",
                disparity.typ()
            )));
        }
        Ok(Self { disparity })
    }

    /// Convert the fixed-point `CV_16SC1` output of a semi-global matcher
    ///
    /// # Errors
    ///
    /// Returns an error if the map has the wrong type or conversion fails
    pub fn from_fixed_point(raw: &Mat) -> Result<Self> {
        if raw.typ() != CV_16SC1 {
            return Err(Error::InvalidInput(format!(
                "Matcher output must be 16-bit signed single channel, got Mat type {}",
                raw.typ()
            )));
        }
        let mut disparity = Mat::default();
        raw.convert_to(&mut disparity, CV_32F, SGBM_DISPARITY_SCALE, 0.0)?;
        Ok(Self { disparity })
    }

    /// Underlying map
    #[must_use]
    pub const fn image(&self) -> &Mat {
        &self.disparity
    }
}

impl DisparityMap for DisparityImage {
    fn disparity_at(&self, x: i32, y: i32) -> Result<f64> {
        if !in_bounds(&self.disparity, x, y) {
            return Ok(0.0);
        }
        Ok(f64::from(*self.disparity.at_2d::<f32>(y, x)?))
    }
}

/// Lifts pixels by reprojecting `[x, y, d, 1]` through the `Q` matrix
#[derive(Debug, Clone)]
pub struct StereoDisparityAdapter {
    q: Matrix4<f64>,
    window: ValidityWindow,
}

impl StereoDisparityAdapter {
    /// Create an adapter for the rectified pair described by `q`
    #[must_use]
    pub const fn new(q: Matrix4<f64>, window: ValidityWindow) -> Self {
        Self { q, window }
    }

    /// Reprojection matrix
    #[must_use]
    pub const fn q(&self) -> &Matrix4<f64> {
        &self.q
    }

    /// Validity window in reprojection units
    #[must_use]
    pub const fn window(&self) -> ValidityWindow {
        self.window
    }

    /// Reproject a pixel with a known disparity, gating on `z`
    #[must_use]
    pub fn reproject(&self, x: f64, y: f64, disparity: f64) -> DepthSample {
        let homogeneous = self.q * Vector4::new(x, y, disparity, 1.0);
        let w = homogeneous.w;
        if !w.is_finite() || w.abs() < f64::EPSILON {
            return DepthSample::Rejected(Rejection::DegenerateReprojection);
        }

        let point = homogeneous.xyz() / w;
        if !self.window.contains(point.z) {
            return DepthSample::Rejected(Rejection::OutOfWindow { z: point.z });
        }
        DepthSample::Point(point)
    }

    /// Read the disparity at `(x, y)` and reproject it
    ///
    /// # Errors
    ///
    /// Returns an error if the disparity read fails
    pub fn sample(&self, x: i32, y: i32, map: &dyn DisparityMap) -> Result<DepthSample> {
        let disparity = map.disparity_at(x, y)?;
        Ok(self.reproject(f64::from(x), f64::from(y), disparity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{STEREO_MAX_Z, STEREO_MIN_Z};
    use opencv::core::Scalar;

    fn window() -> ValidityWindow {
        ValidityWindow::new(STEREO_MIN_Z, STEREO_MAX_Z)
    }

    #[test]
    fn test_identity_q_passes_disparity_through() {
        let adapter = StereoDisparityAdapter::new(Matrix4::identity(), window());
        match adapter.reproject(12.0, 34.0, 500.0) {
            DepthSample::Point(p) => {
                assert_eq!(p.x, 12.0);
                assert_eq!(p.y, 34.0);
                assert_eq!(p.z, 500.0);
            }
            other => panic!("Expected a point, got {other:?}"),
        }
    }

    #[test]
    fn test_far_field_noise_is_rejected() {
        let adapter = StereoDisparityAdapter::new(Matrix4::identity(), window());
        assert!(matches!(
            adapter.reproject(0.0, 0.0, 50.0),
            DepthSample::Rejected(Rejection::OutOfWindow { .. })
        ));
        assert!(matches!(
            adapter.reproject(0.0, 0.0, 2500.0),
            DepthSample::Rejected(Rejection::OutOfWindow { .. })
        ));
    }

    #[test]
    fn test_zero_homogeneous_scale() {
        let mut q = Matrix4::identity();
        q[(3, 3)] = 0.0;
        let adapter = StereoDisparityAdapter::new(q, window());
        assert_eq!(
            adapter.reproject(10.0, 10.0, 500.0),
            DepthSample::Rejected(Rejection::DegenerateReprojection)
        );
    }

    #[test]
    fn test_fixed_point_conversion() {
        let raw = Mat::new_rows_cols_with_default(4, 4, CV_16SC1, Scalar::all(160.0)).unwrap();
        let map = DisparityImage::from_fixed_point(&raw).unwrap();
        assert!((map.disparity_at(1, 1).unwrap() - 10.0).abs() < 1e-6);
        assert_eq!(map.disparity_at(4, 0).unwrap(), 0.0);
    }
}
