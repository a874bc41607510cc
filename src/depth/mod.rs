//! Depth acquisition strategies: lifting a detected pixel into a camera-frame point.
//!
//! Two interchangeable adapters are provided. The active adapter reads a
//! metric range from a depth sensor frame and deprojects it through the
//! stream intrinsics; the stereo adapter reads a disparity value and
//! reprojects it with the rectification `Q` matrix. The strategy is picked
//! once per session.

/// Range-sensor adapter
pub mod active;

/// Camera intrinsics and deprojection
pub mod intrinsics;

/// Disparity reprojection adapter
pub mod stereo;

use crate::{Error, Result};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

pub use active::{ActiveDepthAdapter, DepthFrame, RangeImage};
pub use intrinsics::{CameraIntrinsics, DistortionModel};
pub use stereo::{DisparityImage, DisparityMap, StereoDisparityAdapter};

/// Which depth acquisition strategy a session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthMode {
    /// Depth sensor range + deprojection
    #[default]
    Active,
    /// Stereo disparity + Q reprojection
    Stereo,
}

impl std::str::FromStr for DepthMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "active" | "rgbd" | "realsense" => Ok(Self::Active),
            "stereo" => Ok(Self::Stereo),
            _ => Err(Error::InvalidInput(format!("Unknown depth mode: {s}"))),
        }
    }
}

/// Interval a point's `z` must fall in to be kept
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidityWindow {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
    /// Whether the bounds themselves are accepted
    #[serde(default)]
    pub inclusive: bool,
}

impl ValidityWindow {
    /// Create an open window, both bounds rejected
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max, inclusive: false }
    }

    /// Create a closed window, both bounds accepted
    #[must_use]
    pub const fn closed(min: f64, max: f64) -> Self {
        Self { min, max, inclusive: true }
    }

    /// Whether `z` lies inside the window
    #[must_use]
    pub fn contains(&self, z: f64) -> bool {
        if !z.is_finite() {
            return false;
        }
        if self.inclusive {
            z >= self.min && z <= self.max
        } else {
            z > self.min && z < self.max
        }
    }

    /// Validate the bounds
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are not finite or not increasing
    pub fn validate(&self) -> Result<()> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min >= self.max {
            return Err(Error::ConfigError(format!(
                "Validity window ({}, {}) must be finite and increasing",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Why a detection did not produce a point
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    /// Nothing was detected, depth was never queried
    NotDetected(crate::blob_detection::MissReason),
    /// Sensor reported no range at the pixel
    NoRange,
    /// Homogeneous scale of the reprojection was zero or non-finite
    DegenerateReprojection,
    /// Point fell outside the validity window
    OutOfWindow {
        /// Rejected depth value
        z: f64,
    },
}

/// Result of lifting one pixel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DepthSample {
    /// Camera-frame point that passed the validity gate
    Point(Vector3<f64>),
    /// No usable point
    Rejected(Rejection),
}

/// Per-frame depth payload handed to the strategy
pub enum DepthChannel<'a> {
    /// Range image with intrinsics
    Range(&'a dyn DepthFrame),
    /// Disparity map aligned with the reference image
    Disparity(&'a dyn DisparityMap),
}

impl DepthChannel<'_> {
    /// Mode this payload belongs to
    #[must_use]
    pub const fn mode(&self) -> DepthMode {
        match self {
            Self::Range(_) => DepthMode::Active,
            Self::Disparity(_) => DepthMode::Stereo,
        }
    }
}

/// Session-wide depth strategy
#[derive(Debug, Clone)]
pub enum DepthStrategy {
    /// Active depth sensor
    Active(ActiveDepthAdapter),
    /// Passive stereo pair
    Stereo(StereoDisparityAdapter),
}

impl DepthStrategy {
    /// Mode of this strategy
    #[must_use]
    pub const fn mode(&self) -> DepthMode {
        match self {
            Self::Active(_) => DepthMode::Active,
            Self::Stereo(_) => DepthMode::Stereo,
        }
    }

    /// Lift pixel `(x, y)` using the frame's depth payload
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not match the strategy or the
    /// underlying depth read fails
    pub fn sample(&self, x: i32, y: i32, channel: &DepthChannel<'_>) -> Result<DepthSample> {
        match (self, channel) {
            (Self::Active(adapter), DepthChannel::Range(frame)) => adapter.sample(x, y, *frame),
            (Self::Stereo(adapter), DepthChannel::Disparity(map)) => adapter.sample(x, y, *map),
            _ => Err(Error::InvalidInput(format!(
                "{:?} depth strategy cannot read a {:?} frame",
                self.mode(),
                channel.mode()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_window_is_open() {
        let window = ValidityWindow::new(100.0, 2000.0);
        assert!(window.contains(100.5));
        assert!(window.contains(1999.0));
        assert!(!window.contains(100.0));
        assert!(!window.contains(2000.0));
        assert!(!window.contains(f64::NAN));
        assert!(window.validate().is_ok());
        assert!(ValidityWindow::new(5.0, 1.0).validate().is_err());
    }

    #[test]
    fn test_closed_window_keeps_bounds() {
        let window = ValidityWindow::closed(1.0, 20.0);
        assert!(window.contains(1.0));
        assert!(window.contains(20.0));
        assert!(!window.contains(0.999));
        assert!(!window.contains(20.001));
        assert!(!window.contains(f64::INFINITY));
        assert!(ValidityWindow::closed(2.0, 2.0).validate().is_err());
    }

    #[test]
    fn test_depth_mode_parsing() {
        assert_eq!("stereo".parse::<DepthMode>().unwrap(), DepthMode::Stereo);
        assert_eq!("RealSense".parse::<DepthMode>().unwrap(), DepthMode::Active);
        assert!("lidar".parse::<DepthMode>().is_err());
    }
}
