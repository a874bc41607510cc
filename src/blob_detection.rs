//! Color-based blob detection for the ball and the goal marker.
//!
//! An object is isolated by thresholding the image in HSV space, cleaning the
//! mask with erosion followed by dilation, and keeping the largest external
//! contour. The contour's moment centroid is reported together with the
//! radius of its minimum enclosing circle.

use crate::{
    constants::{
        BALL_HSV_LOWER, BALL_HSV_UPPER, DEFAULT_DILATE_ITERATIONS, DEFAULT_ERODE_ITERATIONS, DEFAULT_MIN_RADIUS,
        GOAL_HSV_LOWER, GOAL_HSV_UPPER,
    },
    utils::to_pixel,
    Error, Result,
};
use opencv::{
    core::{self, Mat, Point, Point2f, Scalar, Vector, CV_8UC3},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};

/// Inclusive HSV bounds on OpenCV's 8-bit scale (hue 0-180)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Lower bound `[h, s, v]`
    pub lower: [u8; 3],
    /// Upper bound `[h, s, v]`
    pub upper: [u8; 3],
}

impl HsvRange {
    /// Create a new range
    #[must_use]
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Lower bound as an OpenCV scalar
    #[must_use]
    pub fn lower_scalar(&self) -> Scalar {
        Scalar::new(
            f64::from(self.lower[0]),
            f64::from(self.lower[1]),
            f64::from(self.lower[2]),
            0.0,
        )
    }

    /// Upper bound as an OpenCV scalar
    #[must_use]
    pub fn upper_scalar(&self) -> Scalar {
        Scalar::new(
            f64::from(self.upper[0]),
            f64::from(self.upper[1]),
            f64::from(self.upper[2]),
            0.0,
        )
    }
}

/// Color and morphology parameters for one tracked object class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorProfile {
    /// Human readable name used in logs
    pub name: String,

    /// HSV threshold
    pub hsv: HsvRange,

    /// Erosion passes applied to the raw mask
    pub erode_iterations: i32,

    /// Dilation passes applied after erosion
    pub dilate_iterations: i32,

    /// Enclosing radius a blob must exceed, in pixels
    pub min_radius: f32,
}

impl ColorProfile {
    /// Orange/red ball profile
    #[must_use]
    pub fn ball() -> Self {
        Self {
            name: "ball".to_string(),
            hsv: HsvRange::new(BALL_HSV_LOWER, BALL_HSV_UPPER),
            erode_iterations: DEFAULT_ERODE_ITERATIONS,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            min_radius: DEFAULT_MIN_RADIUS,
        }
    }

    /// Green goal marker profile
    #[must_use]
    pub fn goal() -> Self {
        Self {
            name: "goal".to_string(),
            hsv: HsvRange::new(GOAL_HSV_LOWER, GOAL_HSV_UPPER),
            erode_iterations: DEFAULT_ERODE_ITERATIONS,
            dilate_iterations: DEFAULT_DILATE_ITERATIONS,
            min_radius: DEFAULT_MIN_RADIUS,
        }
    }

    /// Validate the profile
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are inverted, the hue exceeds 180,
    /// iteration counts are negative, erosion outnumbers dilation (small
    /// objects would vanish) or the minimum radius is negative.
    pub fn validate(&self) -> Result<()> {
        if self.hsv.lower.iter().zip(self.hsv.upper.iter()).any(|(lo, hi)| lo > hi) {
            return Err(Error::ConfigError(format!(
                "{}: HSV lower bound {:?} exceeds upper bound {:?}",
                self.name, self.hsv.lower, self.hsv.upper
            )));
        }
        if self.hsv.upper[0] > 180 {
            return Err(Error::ConfigError(format!(
                "{}: hue upper bound must be at most 180",
                self.name
            )));
        }
        if self.erode_iterations < 0 || self.dilate_iterations < 0 {
            return Err(Error::ConfigError(format!(
                "{}: morphology iteration counts must be non-negative",
                self.name
            )));
        }
        if self.erode_iterations > self.dilate_iterations {
            return Err(Error::ConfigError(format!(
                "{}: erosion iterations ({}) must not exceed dilation iterations ({})",
                self.name, self.erode_iterations, self.dilate_iterations
            )));
        }
        if !self.min_radius.is_finite() || self.min_radius < 0.0 {
            return Err(Error::ConfigError(format!(
                "{}: minimum radius must be a non-negative number",
                self.name
            )));
        }
        Ok(())
    }
}

/// A located blob in pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blob {
    /// Moment centroid column
    pub x: i32,
    /// Moment centroid row
    pub y: i32,
    /// Enclosing radius, truncated to whole pixels
    pub radius: i32,
    /// Center of the minimum enclosing circle
    pub enclosing_center: Point2f,
    /// Unrounded enclosing radius
    pub enclosing_radius: f32,
    /// Contour area in square pixels
    pub area: f64,
}

/// Why no blob was reported for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No pixel survived thresholding and morphology
    EmptyMask,
    /// Largest contour's enclosing circle is not above the minimum radius
    TooSmall,
    /// Zero-area contour, the moment centroid is undefined
    DegenerateMoments,
}

/// Result of running the detector on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlobOutcome {
    /// Object located
    Found(Blob),
    /// Object not present this frame
    NotFound(MissReason),
}

impl BlobOutcome {
    /// The blob, if one was found
    #[must_use]
    pub const fn blob(&self) -> Option<&Blob> {
        match self {
            Self::Found(blob) => Some(blob),
            Self::NotFound(_) => None,
        }
    }

    /// Whether a blob was found
    #[must_use]
    pub const fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Convert a BGR image to HSV
///
/// # Errors
///
/// Returns an error if the image is empty, not 8-bit 3-channel, or the
/// conversion fails
pub fn to_hsv(image: &Mat) -> Result<Mat> {
    if image.empty() {
        return Err(Error::InvalidInput("Cannot detect blobs in an empty image".to_string()));
    }
    if image.typ() != CV_8UC3 {
        return Err(Error::InvalidInput(format!(
            "Expected an 8-bit BGR image, got Mat type {}",
            image.typ()
        )));
    }
    let mut hsv = Mat::default();
    imgproc::cvt_color_def(image, &mut hsv, imgproc::COLOR_BGR2HSV)?;
    Ok(hsv)
}

/// HSV blob detector for a single color profile
pub struct BlobDetector {
    profile: ColorProfile,
}

impl BlobDetector {
    /// Create a detector for the given profile
    ///
    /// # Errors
    ///
    /// Returns an error if the profile fails validation
    pub fn new(profile: ColorProfile) -> Result<Self> {
        profile.validate()?;
        log::debug!(
            "Blob detector '{}' HSV {:?}-{:?}, erode {}, dilate {}, min radius {}",
            profile.name,
            profile.hsv.lower,
            profile.hsv.upper,
            profile.erode_iterations,
            profile.dilate_iterations,
            profile.min_radius
        );
        Ok(Self { profile })
    }

    /// The profile this detector thresholds against
    #[must_use]
    pub const fn profile(&self) -> &ColorProfile {
        &self.profile
    }

    /// Detect the object in a BGR image
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid images or OpenCV failures; an absent
    /// object is reported as [`BlobOutcome::NotFound`].
    pub fn detect(&self, image: &Mat) -> Result<BlobOutcome> {
        let hsv = to_hsv(image)?;
        self.detect_hsv(&hsv)
    }

    /// Detect the object in an image already converted to HSV
    ///
    /// # Errors
    ///
    /// Returns an error if OpenCV operations fail
    pub fn detect_hsv(&self, hsv: &Mat) -> Result<BlobOutcome> {
        let mask = self.mask(hsv)?;
        self.locate(&mask)
    }

    /// Detect and also return the cleaned binary mask, for display
    ///
    /// # Errors
    ///
    /// Returns an error if OpenCV operations fail
    pub fn detect_with_mask(&self, hsv: &Mat) -> Result<(BlobOutcome, Mat)> {
        let mask = self.mask(hsv)?;
        let outcome = self.locate(&mask)?;
        Ok((outcome, mask))
    }

    /// Threshold and clean the HSV image into a binary mask
    ///
    /// # Errors
    ///
    /// Returns an error if OpenCV operations fail
    pub fn mask(&self, hsv: &Mat) -> Result<Mat> {
        let mut raw = Mat::default();
        core::in_range(hsv, &self.profile.hsv.lower_scalar(), &self.profile.hsv.upper_scalar(), &mut raw)?;

        let eroded = morphology(&raw, self.profile.erode_iterations, Morph::Erode)?;
        morphology(&eroded, self.profile.dilate_iterations, Morph::Dilate)
    }

    /// Find the largest contour in a binary mask and measure it
    fn locate(&self, mask: &Mat) -> Result<BlobOutcome> {
        let mut contours = Vector::<Vector<Point>>::new();
        imgproc::find_contours(
            mask,
            &mut contours,
            imgproc::RETR_EXTERNAL,
            imgproc::CHAIN_APPROX_SIMPLE,
            Point::new(0, 0),
        )?;

        let mut largest: Option<(Vector<Point>, f64)> = None;
        for contour in contours.iter() {
            let area = imgproc::contour_area(&contour, false)?;
            if largest.as_ref().map_or(true, |(_, best)| area > *best) {
                largest = Some((contour, area));
            }
        }
        let Some((contour, area)) = largest else {
            return Ok(BlobOutcome::NotFound(MissReason::EmptyMask));
        };

        let mut center = Point2f::default();
        let mut radius = 0.0_f32;
        imgproc::min_enclosing_circle(&contour, &mut center, &mut radius)?;
        if radius <= self.profile.min_radius {
            return Ok(BlobOutcome::NotFound(MissReason::TooSmall));
        }

        let moments = imgproc::moments(&contour, false)?;
        if moments.m00.abs() < f64::EPSILON {
            return Ok(BlobOutcome::NotFound(MissReason::DegenerateMoments));
        }

        Ok(BlobOutcome::Found(Blob {
            x: to_pixel((moments.m10 / moments.m00).round())?,
            y: to_pixel((moments.m01 / moments.m00).round())?,
            radius: to_pixel(f64::from(radius))?,
            enclosing_center: center,
            enclosing_radius: radius,
            area,
        }))
    }
}

#[derive(Clone, Copy)]
enum Morph {
    Erode,
    Dilate,
}

/// Apply erosion or dilation with OpenCV's default 3x3 kernel
fn morphology(src: &Mat, iterations: i32, op: Morph) -> Result<Mat> {
    if iterations == 0 {
        return Ok(src.try_clone()?);
    }
    let mut dst = Mat::default();
    let kernel = Mat::default();
    let anchor = Point::new(-1, -1);
    let border_value = imgproc::morphology_default_border_value()?;
    match op {
        Morph::Erode => {
            imgproc::erode(src, &mut dst, &kernel, anchor, iterations, core::BORDER_CONSTANT, border_value)?;
        }
        Morph::Dilate => {
            imgproc::dilate(src, &mut dst, &kernel, anchor, iterations, core::BORDER_CONSTANT, border_value)?;
        }
    }
    Ok(dst)
}
