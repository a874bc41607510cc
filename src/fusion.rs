//! Expressing camera-frame points in the SLAM world frame

use crate::trajectory::{ObjectKind, TrackedPoint, Trajectory};
use nalgebra::{Matrix3, Vector3};

/// Rigid camera pose: `world = rotation * camera + translation`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// 3x3 rotation
    pub rotation: Matrix3<f64>,
    /// Translation
    pub translation: Vector3<f64>,
}

impl Pose {
    /// Create a pose
    #[must_use]
    pub const fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self { rotation, translation }
    }

    /// Pose at the world origin
    #[must_use]
    pub fn identity() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }

    /// Map a camera-frame point into the world frame
    #[must_use]
    pub fn transform(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// Pose with the frame time it was estimated for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedPose {
    /// Seconds since session start
    pub timestamp: f64,
    /// Camera pose
    pub pose: Pose,
}

/// Global-frame trajectories built from camera-frame points and poses
#[derive(Debug, Clone, Default)]
pub struct GlobalFusion {
    ball: Trajectory,
    goal: Trajectory,
}

impl GlobalFusion {
    /// Empty fusion state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform one point, keeping its timestamp
    #[must_use]
    pub fn fuse(point: &TrackedPoint, pose: &Pose) -> TrackedPoint {
        TrackedPoint::new(pose.transform(&point.position), point.timestamp)
    }

    /// Fuse the latest camera-frame point of `kind` with the engine's latest
    /// pose and append the result.
    ///
    /// Does nothing and returns `None` if there is no point or no pose yet.
    pub fn fuse_latest(
        &mut self,
        kind: ObjectKind,
        local: &Trajectory,
        latest_pose: Option<TimedPose>,
    ) -> Option<TrackedPoint> {
        let point = local.last()?;
        let pose = latest_pose?;
        Some(self.record(kind, point, &pose.pose))
    }

    /// Fuse a point with a pose and append it
    pub fn record(&mut self, kind: ObjectKind, point: &TrackedPoint, pose: &Pose) -> TrackedPoint {
        let global = Self::fuse(point, pose);
        self.trajectory_mut(kind).push(global);
        global
    }

    /// Global trajectory of one object
    #[must_use]
    pub const fn trajectory(&self, kind: ObjectKind) -> &Trajectory {
        match kind {
            ObjectKind::Ball => &self.ball,
            ObjectKind::Goal => &self.goal,
        }
    }

    fn trajectory_mut(&mut self, kind: ObjectKind) -> &mut Trajectory {
        match kind {
            ObjectKind::Ball => &mut self.ball,
            ObjectKind::Goal => &mut self.goal,
        }
    }
}
