//! Offline trajectory smoothing.
//!
//! Trajectories are smoothed after capture with a Butterworth low-pass run
//! forward and backward, so the smoothed positions have no phase lag with
//! respect to the raw samples.

/// Butterworth low-pass coefficient design
pub mod butterworth;

/// IIR filtering primitives and zero-phase filtering
pub mod zero_phase;

use crate::{
    config::SmoothingConfig,
    depth::DepthMode,
    trajectory::{TrackedPoint, Trajectory},
    Result,
};
use nalgebra::Vector3;

pub use butterworth::ButterworthDesign;
pub use zero_phase::{filtfilt, lfilter, lfilter_zi};

/// Zero-phase Butterworth smoother
#[derive(Debug, Clone)]
pub struct SmoothingFilter {
    design: ButterworthDesign,
    pad_len: usize,
}

impl SmoothingFilter {
    /// Create a smoother for the given design and padding
    #[must_use]
    pub const fn new(design: ButterworthDesign, pad_len: usize) -> Self {
        Self { design, pad_len }
    }

    /// Build from configuration; the sample rate falls back to the depth
    /// mode's capture rate when not set.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured design is invalid
    pub fn from_config(config: &SmoothingConfig, mode: DepthMode) -> Result<Self> {
        let sample_rate = config.sample_rate_for(mode);
        let design = ButterworthDesign::lowpass(config.order, config.cutoff_hz, sample_rate)?;
        log::debug!(
            "Smoothing: order {} cutoff {} Hz at {} Hz, pad {}",
            config.order,
            config.cutoff_hz,
            sample_rate,
            config.pad_len
        );
        Ok(Self::new(design, config.pad_len))
    }

    /// Filter coefficients
    #[must_use]
    pub const fn design(&self) -> &ButterworthDesign {
        &self.design
    }

    /// Padding length
    #[must_use]
    pub const fn pad_len(&self) -> usize {
        self.pad_len
    }

    /// Smooth one scalar series
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientSamples`] when the series is not
    /// longer than the padding
    pub fn smooth(&self, samples: &[f64]) -> Result<Vec<f64>> {
        filtfilt(&self.design.b, &self.design.a, samples, self.pad_len)
    }

    /// Smooth each axis of a trajectory into a new trajectory with the same
    /// timestamps
    ///
    /// # Errors
    ///
    /// Returns an error if any axis cannot be smoothed
    pub fn smooth_trajectory(&self, trajectory: &Trajectory) -> Result<Trajectory> {
        let xs = self.smooth(&trajectory.xs())?;
        let ys = self.smooth(&trajectory.ys())?;
        let zs = self.smooth(&trajectory.zs())?;

        Ok(trajectory
            .points()
            .iter()
            .zip(xs.into_iter().zip(ys).zip(zs))
            .map(|(point, ((x, y), z))| TrackedPoint::new(Vector3::new(x, y, z), point.timestamp))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_uses_mode_rate() {
        let config = SmoothingConfig::default();
        let active = SmoothingFilter::from_config(&config, DepthMode::Active).unwrap();
        let stereo = SmoothingFilter::from_config(&config, DepthMode::Stereo).unwrap();
        assert_eq!(active.design().order(), 3);
        assert_ne!(active.design(), stereo.design());
        assert_eq!(active.pad_len(), 50);
    }

    #[test]
    fn test_smooth_trajectory_keeps_timestamps() {
        let filter = SmoothingFilter::from_config(&SmoothingConfig::default(), DepthMode::Active).unwrap();
        let trajectory: Trajectory = (0..70)
            .map(|i| TrackedPoint::new(Vector3::new(0.0, 0.1, 1.5), Some(f64::from(i) / 60.0)))
            .collect();
        let smoothed = filter.smooth_trajectory(&trajectory).unwrap();
        assert_eq!(smoothed.len(), 70);
        assert_eq!(smoothed.timestamps(), trajectory.timestamps());
        for z in smoothed.zs() {
            assert!((z - 1.5).abs() < 1e-9);
        }
    }

    #[test]
    fn test_short_trajectory_fails() {
        let filter = SmoothingFilter::from_config(&SmoothingConfig::default(), DepthMode::Active).unwrap();
        let trajectory: Trajectory = (0..10).map(|_| TrackedPoint::new(Vector3::zeros(), None)).collect();
        assert!(filter.smooth_trajectory(&trajectory).is_err());
    }
}
