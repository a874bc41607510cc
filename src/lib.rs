//! Ball and goal 3D tracking library.
//!
//! This library tracks two colored objects, a ball and a goal marker, in a
//! video stream and recovers their 3D positions over time using:
//! - `OpenCV` for color segmentation, rectification and stereo matching
//! - `nalgebra` for deprojection, reprojection and pose math
//! - A zero-phase Butterworth filter for offline smoothing
//!
//! The per-frame pipeline consists of:
//! 1. HSV blob detection of each object
//! 2. Depth lookup at the detected pixel, from a range sensor or a stereo
//!    disparity map
//! 3. Triangulation into a camera-frame point, gated by a validity window
//! 4. Accumulation into per-object trajectories
//! 5. Optional fusion with SLAM camera poses into a world frame
//!
//! # Examples
//!
//! ## Detecting the ball
//!
//! ```no_run
//! use ball_goal_tracker::blob_detection::{BlobDetector, BlobOutcome, ColorProfile};
//! use opencv::imgcodecs;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let detector = BlobDetector::new(ColorProfile::ball())?;
//! let image = imgcodecs::imread("frame.png", imgcodecs::IMREAD_COLOR)?;
//!
//! match detector.detect(&image)? {
//!     BlobOutcome::Found(blob) => println!("Ball at ({}, {}) r={}", blob.x, blob.y, blob.radius),
//!     BlobOutcome::NotFound(reason) => println!("No ball: {reason:?}"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a session on a recording
//!
//! ```no_run
//! use ball_goal_tracker::{
//!     capture::RecordedRgbdSource,
//!     config::Config,
//!     session::{build_depth_strategy, NeverStop, TrackingSession},
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let strategy = build_depth_strategy(&config, None)?;
//! let mut session = TrackingSession::from_config(&config, strategy)?;
//! let mut source = RecordedRgbdSource::open(&config.depth.active)?;
//!
//! let report = session.run(&mut source, &mut NeverStop)?;
//! println!("{} frames, {} ball points", report.frames, session.ball_trajectory().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Smoothing a trajectory
//!
//! ```no_run
//! use ball_goal_tracker::{config::SmoothingConfig, depth::DepthMode, filters::SmoothingFilter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let filter = SmoothingFilter::from_config(&SmoothingConfig::default(), DepthMode::Active)?;
//! let zs: Vec<f64> = (0..120).map(|i| 1.5 + 0.01 * (f64::from(i) * 0.7).sin()).collect();
//! let smoothed = filter.smooth(&zs)?;
//! assert_eq!(smoothed.len(), zs.len());
//! # Ok(())
//! # }
//! ```

/// HSV blob detection of the tracked objects
pub mod blob_detection;

/// Stereo calibration bundle and rectification
pub mod calibration;

/// Frame sources
pub mod capture;

/// Depth acquisition strategies
pub mod depth;

/// Preview windows
pub mod display;

/// File sinks for positions and trajectories
pub mod export;

/// Offline zero-phase smoothing
pub mod filters;

/// World-frame fusion with camera poses
pub mod fusion;

/// Frame loop orchestration
pub mod session;

/// SLAM collaborator and trajectory log format
pub mod slam;

/// Per-object trajectories
pub mod trajectory;

/// 2D to 3D lifting
pub mod triangulation;

/// Pixel and matrix helpers
pub mod utils;

/// Error types and result handling
pub mod error;

/// Constants used throughout the tracker
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
