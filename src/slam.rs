//! SLAM collaborator interface and the camera trajectory log format.
//!
//! Each pose is one line:
//!
//! ```text
//! TIME <t> r00 r01 r02 t0 r10 r11 r12 t1 r20 r21 r22 t2
//! ```
//!
//! i.e. the timestamp followed by the rows of the 3x4 `[R | t]` matrix.

use crate::{
    capture::Frame,
    fusion::{Pose, TimedPose},
    Error, Result,
};
use nalgebra::{Matrix3, Vector3};
use std::{
    io::{BufRead, BufReader, Write},
    path::Path,
};

const TIME_TAG: &str = "TIME";
const POSE_FIELDS: usize = 13;

/// Visual SLAM collaborator
pub trait SlamEngine {
    /// Feed a frame captured `timestamp` seconds into the session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Slam`] if tracking fails irrecoverably
    fn track(&mut self, frame: &Frame, timestamp: f64) -> Result<()>;

    /// Most recent camera pose, if tracking has produced one
    fn pose_at_latest(&self) -> Option<TimedPose>;

    /// All poses estimated so far
    fn trajectory(&self) -> &[TimedPose];

    /// Poses selected as keyframes
    fn keyframes(&self) -> &[TimedPose] {
        self.trajectory()
    }

    /// Stop the engine
    ///
    /// # Errors
    ///
    /// Returns [`Error::Slam`] if shutdown fails
    fn shutdown(&mut self) -> Result<()>;
}

/// Format one pose as a log line (without newline)
#[must_use]
pub fn format_pose_line(pose: &TimedPose) -> String {
    let r = &pose.pose.rotation;
    let t = &pose.pose.translation;
    let rows: Vec<String> = (0..3)
        .map(|row| format!("{:?} {:?} {:?} {:?}", r[(row, 0)], r[(row, 1)], r[(row, 2)], t[row]))
        .collect();
    format!("{TIME_TAG} {:?} {}", pose.timestamp, rows.join(" "))
}

/// Parse one log line; `line_no` is 1-based and only used for errors
///
/// # Errors
///
/// Returns [`Error::TrajectoryFormat`] if the line is malformed
pub fn parse_pose_line(line_no: usize, line: &str) -> Result<TimedPose> {
    let format_error = |reason: String| Error::TrajectoryFormat { line: line_no, reason };

    let mut tokens = line.split_whitespace();
    match tokens.next() {
        Some(TIME_TAG) => {}
        Some(other) => return Err(format_error(format!("expected {TIME_TAG}, found '{other}'"))),
        None => return Err(format_error("empty line".to_string())),
    }

    let values = tokens
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|e| format_error(format!("'{token}': {e}")))
        })
        .collect::<Result<Vec<f64>>>()?;
    if values.len() != POSE_FIELDS {
        return Err(format_error(format!(
            "expected {POSE_FIELDS} numbers, found {}",
            values.len()
        )));
    }

    let m = |row: usize, col: usize| values[1 + row * 4 + col];
    let rotation = Matrix3::from_fn(|row, col| m(row, col));
    let translation = Vector3::new(m(0, 3), m(1, 3), m(2, 3));
    Ok(TimedPose {
        timestamp: values[0],
        pose: Pose::new(rotation, translation),
    })
}

/// Write poses to `path`, one line each
///
/// # Errors
///
/// Returns an error if the file cannot be written
pub fn write_trajectory<P: AsRef<Path>>(path: P, poses: &[TimedPose]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for pose in poses {
        writeln!(file, "{}", format_pose_line(pose))?;
    }
    file.flush()?;
    Ok(())
}

/// Read poses from `path`, skipping blank lines
///
/// # Errors
///
/// Returns an error if the file cannot be read or a line is malformed
pub fn read_trajectory<P: AsRef<Path>>(path: P) -> Result<Vec<TimedPose>> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut poses = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        poses.push(parse_pose_line(i + 1, &line)?);
    }
    Ok(poses)
}

/// Replays a recorded camera trajectory, picking for each tracked frame the
/// last recorded pose at or before the frame time
#[derive(Debug, Clone, Default)]
pub struct ReplaySlam {
    recorded: Vec<TimedPose>,
    cursor: Option<usize>,
    history: Vec<TimedPose>,
    shut_down: bool,
}

impl ReplaySlam {
    /// Replay `recorded`, which is sorted by timestamp
    #[must_use]
    pub fn new(mut recorded: Vec<TimedPose>) -> Self {
        recorded.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
        Self {
            recorded,
            ..Self::default()
        }
    }

    /// Replay a trajectory log
    ///
    /// # Errors
    ///
    /// Returns an error if the log cannot be read
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let recorded = read_trajectory(&path)?;
        log::info!(
            "Replaying {} SLAM poses from {}",
            recorded.len(),
            path.as_ref().display()
        );
        Ok(Self::new(recorded))
    }

    /// Engine that reports the same pose for every frame
    #[must_use]
    pub fn stationary(pose: Pose) -> Self {
        Self::new(vec![TimedPose {
            timestamp: f64::NEG_INFINITY,
            pose,
        }])
    }

    /// Whether [`SlamEngine::shutdown`] ran
    #[must_use]
    pub const fn is_shut_down(&self) -> bool {
        self.shut_down
    }
}

impl SlamEngine for ReplaySlam {
    fn track(&mut self, _frame: &Frame, timestamp: f64) -> Result<()> {
        if self.shut_down {
            return Err(Error::Slam("Engine already shut down".to_string()));
        }
        if self.recorded.is_empty() {
            return Err(Error::Slam("No recorded poses to replay".to_string()));
        }

        let mut next = self.cursor.map_or(0, |c| c + 1);
        while next < self.recorded.len() && self.recorded[next].timestamp <= timestamp {
            self.cursor = Some(next);
            next += 1;
        }

        if let Some(cursor) = self.cursor {
            self.history.push(TimedPose {
                timestamp,
                pose: self.recorded[cursor].pose,
            });
        }
        Ok(())
    }

    fn pose_at_latest(&self) -> Option<TimedPose> {
        self.history.last().copied()
    }

    fn trajectory(&self) -> &[TimedPose] {
        &self.history
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.shut_down {
            self.shut_down = true;
            log::info!("SLAM replay shut down after {} poses", self.history.len());
        }
        Ok(())
    }
}
