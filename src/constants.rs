//! Constants used throughout the tracker

/// Default capture resolution
pub const DEFAULT_FRAME_WIDTH: i32 = 640;
pub const DEFAULT_FRAME_HEIGHT: i32 = 480;

/// Frames discarded while auto-exposure and the sensor pipeline settle
pub const DEFAULT_WARMUP_FRAMES: usize = 50;

/// Ball HSV range (OpenCV hue scale 0-180)
pub const BALL_HSV_LOWER: [u8; 3] = [0, 100, 20];
pub const BALL_HSV_UPPER: [u8; 3] = [20, 255, 255];

/// Goal HSV range
pub const GOAL_HSV_LOWER: [u8; 3] = [40, 100, 40];
pub const GOAL_HSV_UPPER: [u8; 3] = [90, 255, 255];

/// Morphology defaults
pub const DEFAULT_ERODE_ITERATIONS: i32 = 1;
pub const DEFAULT_DILATE_ITERATIONS: i32 = 3;
pub const STEREO_BALL_DILATE_ITERATIONS: i32 = 2;

/// Enclosing radius a blob must exceed, in pixels
pub const DEFAULT_MIN_RADIUS: f32 = 10.0;

/// Active depth validity window in meters
pub const ACTIVE_MIN_DEPTH_M: f64 = 1.0;
pub const ACTIVE_MAX_DEPTH_M: f64 = 20.0;

/// Stereo validity window in raw reprojection units
pub const STEREO_MIN_Z: f64 = 100.0;
pub const STEREO_MAX_Z: f64 = 2000.0;

/// Meters per raw unit of a z16 depth image
pub const DEFAULT_DEPTH_SCALE: f64 = 0.001;

/// Smoothing filter defaults
pub const DEFAULT_FILTER_ORDER: usize = 3;
pub const DEFAULT_CUTOFF_HZ: f64 = 2.0;
pub const ACTIVE_SAMPLE_RATE_HZ: f64 = 60.0;
pub const STEREO_SAMPLE_RATE_HZ: f64 = 30.0;
pub const DEFAULT_PAD_LEN: usize = 50;

/// SGBM matcher defaults
pub const SGBM_WINDOW_SIZE: i32 = 8;
pub const SGBM_MIN_DISPARITY: i32 = 0;
pub const SGBM_DISPARITY_MULTIPLIER: i32 = 8;
pub const SGBM_BLOCK_SIZE: i32 = 4;
pub const SGBM_DISP12_MAX_DIFF: i32 = 50;
pub const SGBM_UNIQUENESS_RATIO: i32 = 3;
pub const SGBM_SPECKLE_WINDOW_SIZE: i32 = 5;
pub const SGBM_SPECKLE_RANGE: i32 = 2;
pub const SGBM_PRE_FILTER_CAP: i32 = 55;

/// SGBM output is fixed point with 4 fractional bits
pub const SGBM_DISPARITY_SCALE: f64 = 1.0 / 16.0;

/// Iterations of the fixed-point Brown-Conrady undistortion
pub const UNDISTORT_ITERATIONS: usize = 10;

