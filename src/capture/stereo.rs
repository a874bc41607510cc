use super::{DepthData, Frame, FrameSource};
use crate::{
    calibration::{CalibrationBundle, RectificationMaps},
    config::{MatcherConfig, StereoConfig},
    depth::DisparityImage,
    Error, Result,
};
use log::{debug, info, warn};
use opencv::{
    calib3d::{self, StereoSGBM},
    core::{Mat, Ptr, Size},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, CAP_PROP_BUFFERSIZE, CAP_PROP_FRAME_HEIGHT, CAP_PROP_FRAME_WIDTH},
};

/// Two cameras, rectified with a calibration bundle, matched with SGBM
pub struct StereoCameraSource {
    left: VideoCapture,
    right: VideoCapture,
    maps: RectificationMaps,
    matcher: Ptr<StereoSGBM>,
    index: usize,
    released: bool,
}

impl StereoCameraSource {
    /// Open both cameras and prepare rectification and matching
    ///
    /// # Errors
    ///
    /// Returns [`Error::Acquisition`] if a camera cannot be opened, or an
    /// OpenCV error if the maps or matcher cannot be created
    pub fn open(config: &StereoConfig, matcher: &MatcherConfig, calibration: &CalibrationBundle) -> Result<Self> {
        let left = open_camera(config.left_device, config)?;
        let right = open_camera(config.right_device, config)?;

        let size = Size::new(config.width, config.height);
        let maps = calibration.rectification_maps(config.fisheye, size)?;
        info!(
            "Rectification maps ready ({}x{}, {} model)",
            config.width,
            config.height,
            if config.fisheye { "fisheye" } else { "pinhole" }
        );

        let matcher = create_matcher(matcher)?;

        Ok(Self {
            left,
            right,
            maps,
            matcher,
            index: 0,
            released: false,
        })
    }

    fn read(capture: &mut VideoCapture, side: &str) -> Result<Mat> {
        let mut image = Mat::default();
        if !capture.read(&mut image)? || image.empty() {
            return Err(Error::Acquisition(format!("{side} camera returned no frame")));
        }
        Ok(image)
    }
}

fn open_camera(device: i32, config: &StereoConfig) -> Result<VideoCapture> {
    info!("Opening camera {device}");
    let mut capture = VideoCapture::new(device, videoio::CAP_ANY)?;
    if !capture.is_opened()? {
        return Err(Error::Acquisition(format!("Camera {device} could not be opened")));
    }
    capture.set(CAP_PROP_FRAME_WIDTH, f64::from(config.width))?;
    capture.set(CAP_PROP_FRAME_HEIGHT, f64::from(config.height))?;
    capture.set(CAP_PROP_BUFFERSIZE, 1.0)?;
    Ok(capture)
}

/// Semi-global matcher configured with `config`
///
/// # Errors
///
/// Returns an error if OpenCV rejects the parameters
pub fn create_matcher(config: &MatcherConfig) -> Result<Ptr<StereoSGBM>> {
    debug!("SGBM parameters: {config:?}");
    Ok(StereoSGBM::create(
        config.min_disparity,
        config.num_disparities(),
        config.block_size,
        config.p1(),
        config.p2(),
        config.disp12_max_diff,
        config.pre_filter_cap,
        config.uniqueness_ratio,
        config.speckle_window_size,
        config.speckle_range,
        calib3d::StereoSGBM_MODE_SGBM_3WAY,
    )?)
}

/// Disparity of a rectified BGR pair, in pixels
///
/// # Errors
///
/// Returns an error if OpenCV fails
pub fn compute_disparity(matcher: &mut Ptr<StereoSGBM>, left: &Mat, right: &Mat) -> Result<DisparityImage> {
    let mut left_gray = Mat::default();
    let mut right_gray = Mat::default();
    imgproc::cvt_color_def(left, &mut left_gray, imgproc::COLOR_BGR2GRAY)?;
    imgproc::cvt_color_def(right, &mut right_gray, imgproc::COLOR_BGR2GRAY)?;

    let mut raw = Mat::default();
    matcher.compute(&left_gray, &right_gray, &mut raw)?;
    DisparityImage::from_fixed_point(&raw)
}

impl FrameSource for StereoCameraSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        let raw_left = Self::read(&mut self.left, "Left")?;
        let raw_right = Self::read(&mut self.right, "Right")?;

        let (left, right) = self.maps.rectify(&raw_left, &raw_right)?;
        let disparity = compute_disparity(&mut self.matcher, &left, &right)?;

        let frame = Frame {
            image: left,
            depth: DepthData::Disparity(disparity),
            right: Some(right),
            index: self.index,
        };
        self.index += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.left.release()?;
        self.right.release()?;
        info!("Stereo cameras released");
        Ok(())
    }
}

impl Drop for StereoCameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release stereo cameras: {e}");
        }
    }
}
