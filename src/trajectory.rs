//! Per-object 3D trajectories
//!
//! Trajectories are append-only; smoothing and export read them and produce
//! new sequences.

use crate::triangulation::Triangulated;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A 3D point with the time it was observed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    /// Position in the frame the trajectory is expressed in
    pub position: Vector3<f64>,
    /// Seconds since session start
    pub timestamp: Option<f64>,
}

impl TrackedPoint {
    /// Create a point observed at `timestamp`
    #[must_use]
    pub const fn new(position: Vector3<f64>, timestamp: Option<f64>) -> Self {
        Self { position, timestamp }
    }
}

/// Tracked object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// The ball
    Ball,
    /// The goal marker
    Goal,
}

impl ObjectKind {
    /// Lowercase name used in logs and file names
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ball => "ball",
            Self::Goal => "goal",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, append-only sequence of points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectory {
    points: Vec<TrackedPoint>,
}

impl Trajectory {
    /// Empty trajectory
    #[must_use]
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Append a point
    pub fn push(&mut self, point: TrackedPoint) {
        self.points.push(point);
    }

    /// Number of points
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no point was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All points in insertion order
    #[must_use]
    pub fn points(&self) -> &[TrackedPoint] {
        &self.points
    }

    /// Most recent point
    #[must_use]
    pub fn last(&self) -> Option<&TrackedPoint> {
        self.points.last()
    }

    /// X coordinates
    #[must_use]
    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.position.x).collect()
    }

    /// Y coordinates
    #[must_use]
    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.position.y).collect()
    }

    /// Z coordinates
    #[must_use]
    pub fn zs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.position.z).collect()
    }

    /// Timestamps, `NaN` where a point has none
    #[must_use]
    pub fn timestamps(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.timestamp.unwrap_or(f64::NAN)).collect()
    }
}

impl FromIterator<TrackedPoint> for Trajectory {
    fn from_iter<I: IntoIterator<Item = TrackedPoint>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Outcome counts for one object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    /// Outcomes seen
    pub processed: usize,
    /// Outcomes appended
    pub accepted: usize,
    /// Outcomes dropped
    pub rejected: usize,
}

/// Camera-frame trajectories for ball and goal
#[derive(Debug, Clone, Default)]
pub struct TrajectoryAccumulator {
    ball: Trajectory,
    goal: Trajectory,
    ball_counts: OutcomeCounts,
    goal_counts: OutcomeCounts,
}

impl TrajectoryAccumulator {
    /// Empty accumulator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an accepted outcome to the object's trajectory.
    ///
    /// Returns whether a point was appended. Rejected outcomes leave the
    /// trajectory untouched.
    pub fn record(&mut self, kind: ObjectKind, outcome: &Triangulated) -> bool {
        let (trajectory, counts) = match kind {
            ObjectKind::Ball => (&mut self.ball, &mut self.ball_counts),
            ObjectKind::Goal => (&mut self.goal, &mut self.goal_counts),
        };
        counts.processed += 1;

        match outcome {
            Triangulated::Accepted(point) => {
                trajectory.push(*point);
                counts.accepted += 1;
                true
            }
            Triangulated::Rejected(reason) => {
                log::debug!("{kind} sample dropped: {reason:?}");
                counts.rejected += 1;
                false
            }
        }
    }

    /// Trajectory of one object
    #[must_use]
    pub const fn trajectory(&self, kind: ObjectKind) -> &Trajectory {
        match kind {
            ObjectKind::Ball => &self.ball,
            ObjectKind::Goal => &self.goal,
        }
    }

    /// Ball trajectory
    #[must_use]
    pub const fn ball(&self) -> &Trajectory {
        &self.ball
    }

    /// Goal trajectory
    #[must_use]
    pub const fn goal(&self) -> &Trajectory {
        &self.goal
    }

    /// Outcome counts of one object
    #[must_use]
    pub const fn counts(&self, kind: ObjectKind) -> OutcomeCounts {
        match kind {
            ObjectKind::Ball => self.ball_counts,
            ObjectKind::Goal => self.goal_counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{blob_detection::MissReason, depth::Rejection};

    fn accepted(z: f64) -> Triangulated {
        Triangulated::Accepted(TrackedPoint::new(Vector3::new(0.1, 0.2, z), Some(z)))
    }

    #[test]
    fn test_rejections_do_not_mutate() {
        let mut acc = TrajectoryAccumulator::new();
        assert!(!acc.record(ObjectKind::Ball, &Triangulated::Rejected(Rejection::NoRange)));
        assert!(!acc.record(
            ObjectKind::Ball,
            &Triangulated::Rejected(Rejection::NotDetected(MissReason::EmptyMask))
        ));
        assert!(acc.ball().is_empty());
        assert_eq!(acc.counts(ObjectKind::Ball).rejected, 2);
    }

    #[test]
    fn test_objects_are_independent() {
        let mut acc = TrajectoryAccumulator::new();
        for i in 0..5 {
            acc.record(ObjectKind::Ball, &accepted(1.0 + f64::from(i)));
        }
        acc.record(ObjectKind::Goal, &accepted(3.0));

        assert_eq!(acc.ball().len(), 5);
        assert_eq!(acc.goal().len(), 1);
        assert_eq!(acc.ball().zs(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(acc.ball().last().unwrap().position.z, 5.0);
    }

    #[test]
    fn test_timestamps_without_value_are_nan() {
        let trajectory: Trajectory = vec![TrackedPoint::new(Vector3::zeros(), None)].into_iter().collect();
        assert!(trajectory.timestamps()[0].is_nan());
    }
}
