//! Error types for the ball and goal tracker.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Calibration bundle missing or malformed
    #[error("Calibration load failure: {0}")]
    CalibrationLoad(String),

    /// Capture device could not deliver a frame
    #[error("Acquisition failure: {0}")]
    Acquisition(String),

    /// SLAM collaborator failed to track or deliver a pose
    #[error("SLAM error: {0}")]
    Slam(String),

    /// Filter design or processing error
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Sequence too short for zero-phase filtering
    #[error("Need at least {required} samples for smoothing, got {actual}")]
    InsufficientSamples {
        /// Minimum number of samples
        required: usize,
        /// Number of samples provided
        actual: usize,
    },

    /// Malformed line in a trajectory log
    #[error("Trajectory log line {line}: {reason}")]
    TrajectoryFormat {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: String,
    },
}

impl Error {
    /// Whether the error ends a tracking session (as opposed to a per-frame miss).
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Acquisition(_) | Self::CalibrationLoad(_) | Self::Slam(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
