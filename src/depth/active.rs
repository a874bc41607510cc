use super::{CameraIntrinsics, DepthSample, Rejection, ValidityWindow};
use crate::{utils::in_bounds, Error, Result};
use opencv::{
    core::{Mat, CV_16UC1},
    prelude::*,
};

/// Depth collaborator: a range frame aligned to the color stream
pub trait DepthFrame {
    /// Range along the optical axis at `(x, y)`, in meters; 0 when unknown
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be read
    fn depth_at(&self, x: i32, y: i32) -> Result<f64>;

    /// Intrinsics of the stream the depth is aligned to
    fn intrinsics(&self) -> &CameraIntrinsics;
}

/// z16 depth image with its scale and intrinsics
#[derive(Debug, Clone)]
pub struct RangeImage {
    depth: Mat,
    depth_scale: f64,
    intrinsics: CameraIntrinsics,
}

impl RangeImage {
    /// Wrap a `CV_16UC1` depth image
    ///
    /// # Errors
    ///
    /// Returns an error if the image has the wrong type or the scale is not positive
    pub fn new(depth: Mat, depth_scale: f64, intrinsics: CameraIntrinsics) -> Result<Self> {
        if depth.typ() != CV_16UC1 {
            return Err(Error::InvalidInput(format!(
                "Depth image must be 16-bit single channel, got Mat type {}",
                depth.typ()
            )));
        }
        if !(depth_scale.is_finite() && depth_scale > 0.0) {
            return Err(Error::InvalidInput(format!("Depth scale must be positive, got {depth_scale}")));
        }
        Ok(Self {
            depth,
            depth_scale,
            intrinsics,
        })
    }

    /// Raw depth image
    #[must_use]
    pub const fn image(&self) -> &Mat {
        &self.depth
    }
}

impl DepthFrame for RangeImage {
    fn depth_at(&self, x: i32, y: i32) -> Result<f64> {
        if !in_bounds(&self.depth, x, y) {
            return Ok(0.0);
        }
        let raw = *self.depth.at_2d::<u16>(y, x)?;
        Ok(f64::from(raw) * self.depth_scale)
    }

    fn intrinsics(&self) -> &CameraIntrinsics {
        &self.intrinsics
    }
}

/// Lifts pixels with a depth sensor range and pinhole deprojection
#[derive(Debug, Clone)]
pub struct ActiveDepthAdapter {
    window: ValidityWindow,
}

impl ActiveDepthAdapter {
    /// Create an adapter gating depths to `window` (meters)
    #[must_use]
    pub const fn new(window: ValidityWindow) -> Self {
        Self { window }
    }

    /// Validity window in meters
    #[must_use]
    pub const fn window(&self) -> ValidityWindow {
        self.window
    }

    /// Query the range at `(x, y)` and deproject it
    ///
    /// # Errors
    ///
    /// Returns an error if the depth read fails or the intrinsics are unusable
    pub fn sample(&self, x: i32, y: i32, frame: &dyn DepthFrame) -> Result<DepthSample> {
        let depth = frame.depth_at(x, y)?;
        if depth <= 0.0 || !depth.is_finite() {
            return Ok(DepthSample::Rejected(Rejection::NoRange));
        }

        let intrinsics = frame.intrinsics();
        if !intrinsics.is_valid() {
            return Err(Error::InvalidInput(format!(
                "Degenerate intrinsics fx={} fy={}",
                intrinsics.fx, intrinsics.fy
            )));
        }

        let point = intrinsics.deproject((f64::from(x), f64::from(y)), depth);
        if !self.window.contains(point.z) {
            return Ok(DepthSample::Rejected(Rejection::OutOfWindow { z: point.z }));
        }
        Ok(DepthSample::Point(point))
    }
}
