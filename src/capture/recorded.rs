use super::{DepthData, Frame, FrameSource};
use crate::{
    config::ActiveDepthConfig,
    depth::{CameraIntrinsics, RangeImage},
    Error, Result,
};
use log::{info, warn};
use opencv::{
    core::Mat,
    imgcodecs,
    prelude::*,
    videoio::{self, VideoCapture},
};
use std::path::{Path, PathBuf};

/// Path of the depth image recorded for frame `index`
#[must_use]
pub fn depth_image_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("depth_{index:06}.png"))
}

/// Color video plus one 16-bit depth PNG per frame
pub struct RecordedRgbdSource {
    color: VideoCapture,
    depth_dir: PathBuf,
    depth_scale: f64,
    intrinsics: CameraIntrinsics,
    index: usize,
    released: bool,
}

impl RecordedRgbdSource {
    /// Open a recording
    ///
    /// # Errors
    ///
    /// Returns [`Error::Acquisition`] if the video or depth directory is missing
    pub fn open(config: &ActiveDepthConfig) -> Result<Self> {
        info!("Opening recording {}", config.color_video.display());
        let path = config.color_video.to_string_lossy();
        let color = VideoCapture::from_file(&path, videoio::CAP_ANY)?;
        if !color.is_opened()? {
            return Err(Error::Acquisition(format!(
                "Color video {} could not be opened",
                config.color_video.display()
            )));
        }
        if !config.depth_dir.is_dir() {
            return Err(Error::Acquisition(format!(
                "Depth directory {} does not exist",
                config.depth_dir.display()
            )));
        }

        Ok(Self {
            color,
            depth_dir: config.depth_dir.clone(),
            depth_scale: config.depth_scale,
            intrinsics: config.intrinsics.clone(),
            index: 0,
            released: false,
        })
    }

    fn read_depth(&self) -> Result<RangeImage> {
        let path = depth_image_path(&self.depth_dir, self.index);
        let depth = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_ANYDEPTH)?;
        if depth.empty() {
            return Err(Error::Acquisition(format!("Missing depth image {}", path.display())));
        }
        RangeImage::new(depth, self.depth_scale, self.intrinsics.clone())
    }
}

impl FrameSource for RecordedRgbdSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        let mut image = Mat::default();
        if !self.color.read(&mut image)? || image.empty() {
            info!("End of recording after {} frames", self.index);
            return Ok(None);
        }

        let depth = self.read_depth()?;
        let frame = Frame {
            image,
            depth: DepthData::Range(depth),
            right: None,
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
        self.color.release()?;
        Ok(())
    }
}

impl Drop for RecordedRgbdSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("Failed to release recording: {e}");
        }
    }
}
