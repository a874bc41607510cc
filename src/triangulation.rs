//! Lifting 2D detections into camera-frame 3D points

use crate::{
    blob_detection::BlobOutcome,
    depth::{DepthChannel, DepthMode, DepthSample, DepthStrategy, Rejection},
    trajectory::TrackedPoint,
    Result,
};

/// Result of triangulating one detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Triangulated {
    /// Point that passed the validity gate
    Accepted(TrackedPoint),
    /// No point this frame
    Rejected(Rejection),
}

impl Triangulated {
    /// The accepted point, if any
    #[must_use]
    pub const fn point(&self) -> Option<&TrackedPoint> {
        match self {
            Self::Accepted(point) => Some(point),
            Self::Rejected(_) => None,
        }
    }
}

/// Dispatches detections to the session's depth strategy
#[derive(Debug, Clone)]
pub struct Triangulator {
    strategy: DepthStrategy,
}

impl Triangulator {
    /// Create a triangulator for a fixed strategy
    #[must_use]
    pub const fn new(strategy: DepthStrategy) -> Self {
        Self { strategy }
    }

    /// Depth mode in use
    #[must_use]
    pub const fn mode(&self) -> DepthMode {
        self.strategy.mode()
    }

    /// Strategy in use
    #[must_use]
    pub const fn strategy(&self) -> &DepthStrategy {
        &self.strategy
    }

    /// Produce a 3D point for `detection`, stamped with `timestamp`.
    ///
    /// Detections that were not found are rejected without reading depth.
    ///
    /// # Errors
    ///
    /// Returns an error if the depth payload does not match the strategy or
    /// cannot be read
    pub fn triangulate(&self, detection: &BlobOutcome, channel: &DepthChannel<'_>, timestamp: f64) -> Result<Triangulated> {
        let blob = match detection {
            BlobOutcome::Found(blob) => blob,
            BlobOutcome::NotFound(reason) => return Ok(Triangulated::Rejected(Rejection::NotDetected(*reason))),
        };

        Ok(match self.strategy.sample(blob.x, blob.y, channel)? {
            DepthSample::Point(position) => Triangulated::Accepted(TrackedPoint::new(position, Some(timestamp))),
            DepthSample::Rejected(reason) => Triangulated::Rejected(reason),
        })
    }
}
