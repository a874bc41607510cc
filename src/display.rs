//! Preview windows: annotated frame and the per-object masks.

use crate::{blob_detection::BlobOutcome, Result};
use log::warn;
use opencv::{
    core::{Mat, Point, Scalar},
    highgui,
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
    prelude::*,
};

const FRAME_WINDOW: &str = "Tracking";
const BALL_MASK_WINDOW: &str = "Ball mask";
const GOAL_MASK_WINDOW: &str = "Goal mask";

fn yellow() -> Scalar {
    Scalar::new(0.0, 255.0, 255.0, 0.0)
}

/// Draw the enclosing circle and centroid of a found blob
///
/// # Errors
///
/// Returns an error if drawing fails
pub fn annotate(image: &mut Mat, outcome: &BlobOutcome) -> Result<()> {
    let Some(blob) = outcome.blob() else {
        return Ok(());
    };

    #[allow(clippy::cast_possible_truncation)] // Drawing needs whole pixels
    let center = Point::new(blob.enclosing_center.x as i32, blob.enclosing_center.y as i32);
    imgproc::circle(image, center, blob.radius, yellow(), 1, LINE_8, 0)?;
    imgproc::circle(image, Point::new(blob.x, blob.y), 2, yellow(), imgproc::FILLED, LINE_8, 0)?;
    Ok(())
}

/// Preview windows for a running session
pub struct Preview {
    open: bool,
}

impl Preview {
    /// Open the preview windows
    ///
    /// # Errors
    ///
    /// Returns an error if the windows cannot be created
    pub fn open() -> Result<Self> {
        for name in [FRAME_WINDOW, BALL_MASK_WINDOW, GOAL_MASK_WINDOW] {
            highgui::named_window(name, highgui::WINDOW_NORMAL)?;
        }
        Ok(Self { open: true })
    }

    /// Show one cycle: annotated frame with the FPS, and both masks
    ///
    /// # Errors
    ///
    /// Returns an error if drawing or display fails
    pub fn show(
        &self,
        frame: &Mat,
        detections: [(&BlobOutcome, &Mat); 2],
        fps: f64,
    ) -> Result<()> {
        let mut canvas = frame.try_clone()?;
        for (outcome, _) in &detections {
            annotate(&mut canvas, outcome)?;
        }

        imgproc::put_text(
            &mut canvas,
            &format!("FPS: {fps:.1}"),
            Point::new(10, 30),
            FONT_HERSHEY_SIMPLEX,
            1.0,
            Scalar::new(0.0, 255.0, 0.0, 0.0),
            2,
            LINE_8,
            false,
        )?;

        highgui::imshow(FRAME_WINDOW, &canvas)?;
        highgui::imshow(BALL_MASK_WINDOW, detections[0].1)?;
        highgui::imshow(GOAL_MASK_WINDOW, detections[1].1)?;
        Ok(())
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = highgui::destroy_all_windows() {
                warn!("Failed to close preview windows: {e}");
            }
        }
    }
}
