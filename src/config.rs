//! Configuration management for the tracker

use crate::{
    blob_detection::ColorProfile,
    constants::{
        ACTIVE_MAX_DEPTH_M, ACTIVE_MIN_DEPTH_M, ACTIVE_SAMPLE_RATE_HZ, DEFAULT_CUTOFF_HZ, DEFAULT_DEPTH_SCALE,
        DEFAULT_FILTER_ORDER, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH, DEFAULT_PAD_LEN, DEFAULT_WARMUP_FRAMES,
        SGBM_BLOCK_SIZE, SGBM_DISP12_MAX_DIFF, SGBM_DISPARITY_MULTIPLIER, SGBM_MIN_DISPARITY, SGBM_PRE_FILTER_CAP,
        SGBM_SPECKLE_RANGE, SGBM_SPECKLE_WINDOW_SIZE, SGBM_UNIQUENESS_RATIO, SGBM_WINDOW_SIZE,
        STEREO_BALL_DILATE_ITERATIONS, STEREO_MAX_Z, STEREO_MIN_Z, STEREO_SAMPLE_RATE_HZ,
    },
    depth::{CameraIntrinsics, DepthMode, ValidityWindow},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame loop settings
    pub session: SessionConfig,

    /// Depth acquisition
    pub depth: DepthConfig,

    /// Color profiles
    pub tracking: TrackingConfig,

    /// Offline smoothing
    pub smoothing: SmoothingConfig,

    /// SLAM collaborator
    pub slam: SlamConfig,

    /// Output sinks
    pub output: OutputConfig,
}

/// Frame loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Frames detected but not accumulated at session start
    pub warmup_frames: usize,

    /// Stop after this many frames
    pub max_frames: Option<usize>,

    /// Show annotated frames and masks
    pub display: bool,
}

/// Depth acquisition settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthConfig {
    /// Strategy used for the whole session
    pub mode: DepthMode,

    /// Range sensor settings
    pub active: ActiveDepthConfig,

    /// Stereo pair settings
    pub stereo: StereoConfig,

    /// Semi-global matcher parameters
    pub matcher: MatcherConfig,
}

/// Range sensor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveDepthConfig {
    /// Meters per raw depth unit
    pub depth_scale: f64,

    /// Accepted depth range in meters
    pub validity: ValidityWindow,

    /// Intrinsics of the color stream depth is aligned to
    pub intrinsics: CameraIntrinsics,

    /// Recorded color video
    pub color_video: PathBuf,

    /// Directory of 16-bit depth PNGs named `depth_000000.png`, ...
    pub depth_dir: PathBuf,
}

/// Stereo pair settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoConfig {
    /// Calibration bundle (YAML)
    pub calibration: PathBuf,

    /// Accepted `z` range in calibration units
    pub validity: ValidityWindow,

    /// Use the fisheye model for rectification maps
    pub fisheye: bool,

    /// Left camera device index
    pub left_device: i32,

    /// Right camera device index
    pub right_device: i32,

    /// Capture width
    pub width: i32,

    /// Capture height
    pub height: i32,
}

/// Semi-global block matching parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Window size used for the smoothness penalties
    pub window_size: i32,
    /// Minimum disparity
    pub min_disparity: i32,
    /// Number of disparities, in multiples of 16
    pub disparity_multiplier: i32,
    /// Matched block size
    pub block_size: i32,
    /// Left-right consistency tolerance
    pub disp12_max_diff: i32,
    /// Uniqueness margin in percent
    pub uniqueness_ratio: i32,
    /// Speckle filter window
    pub speckle_window_size: i32,
    /// Speckle filter range
    pub speckle_range: i32,
    /// Prefilter truncation
    pub pre_filter_cap: i32,
}

impl MatcherConfig {
    /// Number of disparities searched
    #[must_use]
    pub const fn num_disparities(&self) -> i32 {
        16 * self.disparity_multiplier
    }

    /// First smoothness penalty
    #[must_use]
    pub const fn p1(&self) -> i32 {
        8 * 3 * self.window_size * self.window_size
    }

    /// Second smoothness penalty
    #[must_use]
    pub const fn p2(&self) -> i32 {
        32 * 3 * self.window_size * self.window_size
    }
}

/// Color profiles of the tracked objects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Ball profile
    pub ball: ColorProfile,

    /// Goal profile
    pub goal: ColorProfile,
}

/// Offline smoothing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Butterworth order
    pub order: usize,

    /// Cutoff frequency in Hz
    pub cutoff_hz: f64,

    /// Sample rate in Hz; the depth mode's capture rate when unset
    pub sample_rate_hz: Option<f64>,

    /// Odd-extension padding on each side
    pub pad_len: usize,
}

impl SmoothingConfig {
    /// Sample rate in effect for `mode`
    #[must_use]
    pub fn sample_rate_for(&self, mode: DepthMode) -> f64 {
        self.sample_rate_hz.unwrap_or(match mode {
            DepthMode::Active => ACTIVE_SAMPLE_RATE_HZ,
            DepthMode::Stereo => STEREO_SAMPLE_RATE_HZ,
        })
    }
}

/// SLAM collaborator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamConfig {
    /// Fuse object positions with camera poses
    pub enabled: bool,

    /// Recorded trajectory log replayed as the pose source
    pub trajectory_replay: Option<PathBuf>,

    /// Where the camera trajectory is written at shutdown
    pub trajectory_output: Option<PathBuf>,

    /// Where keyframe poses are written at shutdown
    pub keyframe_output: Option<PathBuf>,
}

/// Output sinks
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `x, y, z` log of accepted ball samples
    pub position_log: Option<PathBuf>,

    /// Directory receiving per-object trajectory tables
    pub export_dir: Option<PathBuf>,

    /// Add smoothed columns to exported tables
    pub smooth_export: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            max_frames: None,
            display: false,
        }
    }
}

impl Default for ActiveDepthConfig {
    fn default() -> Self {
        Self {
            depth_scale: DEFAULT_DEPTH_SCALE,
            validity: ValidityWindow::closed(ACTIVE_MIN_DEPTH_M, ACTIVE_MAX_DEPTH_M),
            intrinsics: CameraIntrinsics::pinhole(
                DEFAULT_FRAME_WIDTH,
                DEFAULT_FRAME_HEIGHT,
                615.0,
                615.0,
                f64::from(DEFAULT_FRAME_WIDTH) / 2.0,
                f64::from(DEFAULT_FRAME_HEIGHT) / 2.0,
            ),
            color_video: PathBuf::from("recording/color.avi"),
            depth_dir: PathBuf::from("recording/depth"),
        }
    }
}

impl Default for StereoConfig {
    fn default() -> Self {
        Self {
            calibration: PathBuf::from("calibration/stereo.yaml"),
            validity: ValidityWindow::new(STEREO_MIN_Z, STEREO_MAX_Z),
            fisheye: false,
            left_device: 0,
            right_device: 1,
            width: DEFAULT_FRAME_WIDTH,
            height: DEFAULT_FRAME_HEIGHT,
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            window_size: SGBM_WINDOW_SIZE,
            min_disparity: SGBM_MIN_DISPARITY,
            disparity_multiplier: SGBM_DISPARITY_MULTIPLIER,
            block_size: SGBM_BLOCK_SIZE,
            disp12_max_diff: SGBM_DISP12_MAX_DIFF,
            uniqueness_ratio: SGBM_UNIQUENESS_RATIO,
            speckle_window_size: SGBM_SPECKLE_WINDOW_SIZE,
            speckle_range: SGBM_SPECKLE_RANGE,
            pre_filter_cap: SGBM_PRE_FILTER_CAP,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            ball: ColorProfile::ball(),
            goal: ColorProfile::goal(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_FILTER_ORDER,
            cutoff_hz: DEFAULT_CUTOFF_HZ,
            sample_rate_hz: None,
            pad_len: DEFAULT_PAD_LEN,
        }
    }
}

impl Config {
    /// Defaults for a depth mode; stereo cleans the ball mask with fewer
    /// dilations
    #[must_use]
    pub fn for_mode(mode: DepthMode) -> Self {
        let mut config = Self::default();
        config.depth.mode = mode;
        if mode == DepthMode::Stereo {
            config.tracking.ball.dilate_iterations = STEREO_BALL_DILATE_ITERATIONS;
        }
        config
    }

    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validity window of the configured depth mode
    #[must_use]
    pub const fn validity_window(&self) -> ValidityWindow {
        match self.depth.mode {
            DepthMode::Active => self.depth.active.validity,
            DepthMode::Stereo => self.depth.stereo.validity,
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns a [`Error::ConfigError`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        self.tracking.ball.validate()?;
        self.tracking.goal.validate()?;

        // Depth
        self.depth.active.validity.validate()?;
        self.depth.stereo.validity.validate()?;
        if !(self.depth.active.depth_scale.is_finite() && self.depth.active.depth_scale > 0.0) {
            return Err(Error::ConfigError("Depth scale must be positive".to_string()));
        }
        if self.depth.mode == DepthMode::Active && !self.depth.active.intrinsics.is_valid() {
            return Err(Error::ConfigError("Focal lengths must be non-zero".to_string()));
        }
        if self.depth.stereo.width <= 0 || self.depth.stereo.height <= 0 {
            return Err(Error::ConfigError("Stereo capture size must be positive".to_string()));
        }
        if self.depth.matcher.disparity_multiplier <= 0 || self.depth.matcher.block_size <= 0 {
            return Err(Error::ConfigError(
                "Matcher disparity multiplier and block size must be positive".to_string(),
            ));
        }

        // Smoothing
        if self.smoothing.order == 0 {
            return Err(Error::ConfigError("Smoothing order must be greater than 0".to_string()));
        }
        let nyquist = self.smoothing.sample_rate_for(self.depth.mode) / 2.0;
        if !(self.smoothing.cutoff_hz > 0.0 && self.smoothing.cutoff_hz < nyquist) {
            return Err(Error::ConfigError(format!(
                "Smoothing cutoff must be between 0 and {nyquist} Hz"
            )));
        }

        if self.session.max_frames == Some(0) {
            return Err(Error::ConfigError("Maximum frame count must be greater than 0".to_string()));
        }

        if let Some(replay) = &self.slam.trajectory_replay {
            if !replay.exists() {
                return Err(Error::ConfigError(format!(
                    "SLAM trajectory replay not found: {}",
                    replay.display()
                )));
            }
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Ball and goal tracker configuration

session:
  warmup_frames: 50
  display: false

# Depth acquisition: "active" (range sensor) or "stereo"
depth:
  mode: active
  active:
    depth_scale: 0.001
    validity: { min: 1.0, max: 20.0, inclusive: true }
    intrinsics:
      width: 640
      height: 480
      fx: 615.0
      fy: 615.0
      ppx: 320.0
      ppy: 240.0
      model: none
      coeffs: [0.0, 0.0, 0.0, 0.0, 0.0]
    color_video: "recording/color.avi"
    depth_dir: "recording/depth"
  stereo:
    calibration: "calibration/stereo.yaml"
    validity: { min: 100.0, max: 2000.0 }
    fisheye: false
    left_device: 0
    right_device: 1
    width: 640
    height: 480
  matcher:
    window_size: 8
    min_disparity: 0
    disparity_multiplier: 8
    block_size: 4
    disp12_max_diff: 50
    uniqueness_ratio: 3
    speckle_window_size: 5
    speckle_range: 2
    pre_filter_cap: 55

# HSV ranges use OpenCV's hue scale (0-180)
tracking:
  ball:
    name: ball
    hsv: { lower: [0, 100, 20], upper: [20, 255, 255] }
    erode_iterations: 1
    dilate_iterations: 3
    min_radius: 10.0
  goal:
    name: goal
    hsv: { lower: [40, 100, 40], upper: [90, 255, 255] }
    erode_iterations: 1
    dilate_iterations: 3
    min_radius: 10.0

smoothing:
  order: 3
  cutoff_hz: 2.0
  pad_len: 50

slam:
  enabled: false

output:
  position_log: "ball_positions.txt"
  export_dir: "trajectories"
  smooth_export: true
"#;
