//! Frame sources: live stereo cameras, recorded RGB-D sequences and
//! in-memory replays.

/// Recorded color video with per-frame depth images
pub mod recorded;

/// Rectified stereo camera pair with semi-global matching
pub mod stereo;

use crate::{
    depth::{DepthChannel, DisparityImage, RangeImage},
    Result,
};
use opencv::core::Mat;
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

pub use recorded::RecordedRgbdSource;
pub use stereo::StereoCameraSource;

/// Depth payload delivered with a frame
#[derive(Debug, Clone)]
pub enum DepthData {
    /// Range image aligned to the color image
    Range(RangeImage),
    /// Disparity map aligned to the rectified left image
    Disparity(DisparityImage),
}

/// One captured cycle
#[derive(Debug, Clone)]
pub struct Frame {
    /// BGR reference image (rectified left image for stereo)
    pub image: Mat,
    /// Depth payload
    pub depth: DepthData,
    /// Rectified right image, stereo only
    pub right: Option<Mat>,
    /// Zero-based position in the stream
    pub index: usize,
}

impl Frame {
    /// Borrow the depth payload for triangulation
    #[must_use]
    pub fn depth_channel(&self) -> DepthChannel<'_> {
        match &self.depth {
            DepthData::Range(range) => DepthChannel::Range(range),
            DepthData::Disparity(map) => DepthChannel::Disparity(map),
        }
    }
}

/// Capture collaborator
pub trait FrameSource {
    /// Block until the next frame is available.
    ///
    /// Returns `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Acquisition`] if the device fails
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Release the underlying devices
    ///
    /// # Errors
    ///
    /// Returns an error if a device fails to close
    fn release(&mut self) -> Result<()>;
}

/// Frames prepared in memory, delivered in order
#[derive(Debug, Default)]
pub struct ReplaySource {
    frames: VecDeque<Frame>,
    released: Arc<AtomicBool>,
}

impl ReplaySource {
    /// Replay `frames`
    pub fn new<I: IntoIterator<Item = Frame>>(frames: I) -> Self {
        Self {
            frames: frames.into_iter().collect(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Frames left to deliver
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Flag set once the source has been released
    #[must_use]
    pub fn released_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self.frames.pop_front())
    }

    fn release(&mut self) -> Result<()> {
        self.released.store(true, Ordering::SeqCst);
        self.frames.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::{CameraIntrinsics, DepthMode};
    use opencv::core::{Scalar, CV_16UC1, CV_8UC3};

    fn frame(index: usize) -> Frame {
        let image = Mat::new_rows_cols_with_default(8, 8, CV_8UC3, Scalar::all(0.0)).unwrap();
        let depth = Mat::new_rows_cols_with_default(8, 8, CV_16UC1, Scalar::all(1000.0)).unwrap();
        Frame {
            image,
            depth: DepthData::Range(
                RangeImage::new(depth, 0.001, CameraIntrinsics::pinhole(8, 8, 5.0, 5.0, 4.0, 4.0)).unwrap(),
            ),
            right: None,
            index,
        }
    }

    #[test]
    fn test_replay_order_and_end_of_stream() {
        let mut source = ReplaySource::new((0..3).map(frame));
        assert_eq!(source.remaining(), 3);
        for expected in 0..3 {
            let next = source.next_frame().unwrap().unwrap();
            assert_eq!(next.index, expected);
            assert_eq!(next.depth_channel().mode(), DepthMode::Active);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_release_stops_delivery() {
        let mut source = ReplaySource::new((0..3).map(frame));
        let released = source.released_flag();
        source.release().unwrap();
        assert!(released.load(Ordering::SeqCst));
        assert!(source.next_frame().unwrap().is_none());
    }
}
