//! The frame loop: detect, triangulate, accumulate and fuse, one frame at a
//! time.
//!
//! A [`TrackingSession`] owns every piece of per-session state. Capture and
//! SLAM are external collaborators reached through [`FrameSource`] and
//! [`SlamEngine`]. Whatever way the loop ends, the capture source is released
//! and the SLAM engine shut down, and the trajectories gathered so far stay
//! readable on the session.

use crate::{
    blob_detection::{to_hsv, BlobDetector, BlobOutcome},
    calibration::CalibrationBundle,
    capture::{Frame, FrameSource},
    config::Config,
    depth::{ActiveDepthAdapter, DepthMode, DepthStrategy, StereoDisparityAdapter},
    display::Preview,
    export::PositionLog,
    fusion::GlobalFusion,
    slam::{write_trajectory, SlamEngine},
    trajectory::{ObjectKind, OutcomeCounts, Trajectory, TrajectoryAccumulator},
    triangulation::{Triangulated, Triangulator},
    Error, Result,
};
use log::{debug, info, warn};
use opencv::highgui;
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Cooperative stop request, polled once per cycle
pub trait StopSignal {
    /// Whether the loop should end after the current cycle
    ///
    /// # Errors
    ///
    /// Returns an error if polling fails
    fn should_stop(&mut self) -> Result<bool>;
}

/// Never requests a stop
pub struct NeverStop;

impl StopSignal for NeverStop {
    fn should_stop(&mut self) -> Result<bool> {
        Ok(false)
    }
}

/// Stop requested through a shared flag
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Unset flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StopSignal for StopFlag {
    fn should_stop(&mut self) -> Result<bool> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

/// Stop on `q` or Escape in a preview window
pub struct KeyPress {
    delay_ms: i32,
}

impl KeyPress {
    /// Wait up to `delay_ms` for a key each cycle
    #[must_use]
    pub const fn new(delay_ms: i32) -> Self {
        Self { delay_ms }
    }
}

impl StopSignal for KeyPress {
    fn should_stop(&mut self) -> Result<bool> {
        let key = highgui::wait_key(self.delay_ms)?;
        Ok(key == i32::from(b'q') || key == 27)
    }
}

/// Build the depth strategy for the configured mode
///
/// # Errors
///
/// Returns [`Error::CalibrationLoad`] in stereo mode without a usable bundle
pub fn build_depth_strategy(config: &Config, calibration: Option<&CalibrationBundle>) -> Result<DepthStrategy> {
    match config.depth.mode {
        DepthMode::Active => Ok(DepthStrategy::Active(ActiveDepthAdapter::new(config.depth.active.validity))),
        DepthMode::Stereo => {
            let bundle = calibration
                .ok_or_else(|| Error::CalibrationLoad("Stereo mode needs a calibration bundle".to_string()))?;
            Ok(DepthStrategy::Stereo(StereoDisparityAdapter::new(
                bundle.q_matrix()?,
                config.depth.stereo.validity,
            )))
        }
    }
}

/// What one cycle did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cycle {
    /// Detected only, still warming up
    WarmingUp {
        /// Ball detection
        ball: BlobOutcome,
        /// Goal detection
        goal: BlobOutcome,
    },
    /// Triangulated and accumulated
    Tracked {
        /// Ball outcome
        ball: Triangulated,
        /// Goal outcome
        goal: Triangulated,
    },
}

/// Median and mean time spent in SLAM tracking per cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingTimes {
    /// Upper median
    pub median: Duration,
    /// Mean
    pub mean: Duration,
}

impl TrackingTimes {
    fn from_samples(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let total: Duration = sorted.iter().sum();
        let count = u32::try_from(sorted.len()).ok()?;
        Some(Self {
            median: sorted[sorted.len() / 2],
            mean: total / count,
        })
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Frames processed, warm-up included
    pub frames: usize,
    /// Wall time of the loop
    pub elapsed: Duration,
    /// Processed frames per second
    pub fps: f64,
    /// Ball outcome counts
    pub ball: OutcomeCounts,
    /// Goal outcome counts
    pub goal: OutcomeCounts,
    /// SLAM tracking times, when SLAM ran
    pub tracking_times: Option<TrackingTimes>,
}

/// Releases the capture source when dropped
struct ReleaseGuard<'a> {
    source: &'a mut dyn FrameSource,
    released: bool,
}

impl<'a> ReleaseGuard<'a> {
    fn new(source: &'a mut dyn FrameSource) -> Self {
        Self { source, released: false }
    }

    fn release(mut self) -> Result<()> {
        self.released = true;
        self.source.release()
    }
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.source.release() {
                warn!("Failed to release capture source: {e}");
            }
        }
    }
}

/// One tracking session
pub struct TrackingSession {
    ball_detector: BlobDetector,
    goal_detector: BlobDetector,
    triangulator: Triangulator,
    accumulator: TrajectoryAccumulator,
    fusion: GlobalFusion,
    slam: Option<Box<dyn SlamEngine>>,
    slam_outputs: (Option<PathBuf>, Option<PathBuf>),
    position_log: Option<PositionLog>,
    preview: Option<Preview>,
    warmup_frames: usize,
    max_frames: Option<usize>,
    cycles: usize,
    tracking_times: Vec<Duration>,
    started: Option<Instant>,
}

impl TrackingSession {
    /// Create a session without sinks or SLAM
    ///
    /// # Errors
    ///
    /// Returns an error if a color profile is invalid or the strategy does
    /// not match the configured mode
    pub fn new(config: &Config, strategy: DepthStrategy) -> Result<Self> {
        if strategy.mode() != config.depth.mode {
            return Err(Error::ConfigError(format!(
                "{:?} strategy given for a {:?} session",
                strategy.mode(),
                config.depth.mode
            )));
        }

        Ok(Self {
            ball_detector: BlobDetector::new(config.tracking.ball.clone())?,
            goal_detector: BlobDetector::new(config.tracking.goal.clone())?,
            triangulator: Triangulator::new(strategy),
            accumulator: TrajectoryAccumulator::new(),
            fusion: GlobalFusion::new(),
            slam: None,
            slam_outputs: (config.slam.trajectory_output.clone(), config.slam.keyframe_output.clone()),
            position_log: None,
            preview: None,
            warmup_frames: config.session.warmup_frames,
            max_frames: config.session.max_frames,
            cycles: 0,
            tracking_times: Vec::new(),
            started: None,
        })
    }

    /// Create a session with the sinks named in `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the session or a sink cannot be created
    pub fn from_config(config: &Config, strategy: DepthStrategy) -> Result<Self> {
        let mut session = Self::new(config, strategy)?;
        if let Some(path) = &config.output.position_log {
            session = session.with_position_log(PositionLog::create(path)?);
        }
        if config.session.display {
            session = session.with_preview(Preview::open()?);
        }
        Ok(session)
    }

    /// Attach a SLAM engine; positions are then also fused into the world frame
    #[must_use]
    pub fn with_slam(mut self, slam: Box<dyn SlamEngine>) -> Self {
        self.slam = Some(slam);
        self
    }

    /// Log every accepted ball position
    #[must_use]
    pub fn with_position_log(mut self, log: PositionLog) -> Self {
        self.position_log = Some(log);
        self
    }

    /// Show annotated frames
    #[must_use]
    pub fn with_preview(mut self, preview: Preview) -> Self {
        self.preview = Some(preview);
        self
    }

    /// Run until end of stream, the frame limit, a stop request or a fatal
    /// error.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: acquisition, SLAM or sink failure. The
    /// source is released and SLAM shut down before returning either way.
    pub fn run(&mut self, source: &mut dyn FrameSource, stop: &mut dyn StopSignal) -> Result<SessionReport> {
        info!(
            "Starting {:?} tracking session (warm-up {} frames, SLAM {})",
            self.triangulator.mode(),
            self.warmup_frames,
            if self.slam.is_some() { "on" } else { "off" }
        );
        let started = Instant::now();
        self.started = Some(started);

        let mut guard = ReleaseGuard::new(source);
        let loop_result = self.run_loop(&mut *guard.source, stop, started);
        let release_result = guard.release();
        let shutdown_result = self.shutdown();

        let elapsed = started.elapsed();
        let report = self.report(elapsed);
        match &loop_result {
            Ok(()) => info!("Session finished after {} frames", report.frames),
            Err(e) => warn!("Session aborted after {} frames: {e}", report.frames),
        }
        info!("Time taken : {:.3} seconds", elapsed.as_secs_f64());
        info!("Estimated frames per second : {:.2}", report.fps);
        if let Some(times) = report.tracking_times {
            info!("median tracking time: {:?}", times.median);
            info!("mean tracking time: {:?}", times.mean);
        }

        loop_result?;
        release_result?;
        shutdown_result?;
        Ok(report)
    }

    fn run_loop(&mut self, source: &mut dyn FrameSource, stop: &mut dyn StopSignal, started: Instant) -> Result<()> {
        loop {
            if self.max_frames.is_some_and(|max| self.cycles >= max) {
                info!("Frame limit reached");
                return Ok(());
            }
            let Some(frame) = source.next_frame()? else {
                info!("End of stream");
                return Ok(());
            };

            self.process_frame(&frame, started.elapsed().as_secs_f64())?;

            if stop.should_stop()? {
                info!("Stop requested by user");
                return Ok(());
            }
        }
    }

    /// Run one cycle on `frame`, captured `timestamp` seconds into the session
    ///
    /// # Errors
    ///
    /// Returns an error on invalid frames, depth read failures, SLAM tracking
    /// failures or sink write failures
    pub fn process_frame(&mut self, frame: &Frame, timestamp: f64) -> Result<Cycle> {
        let cycle = self.cycles;
        self.cycles += 1;

        let hsv = to_hsv(&frame.image)?;
        let (ball, ball_mask) = self.ball_detector.detect_with_mask(&hsv)?;
        let (goal, goal_mask) = self.goal_detector.detect_with_mask(&hsv)?;
        debug!("Frame {cycle}: ball {ball:?}, goal {goal:?}");

        if let Some(preview) = &self.preview {
            preview.show(&frame.image, [(&ball, &ball_mask), (&goal, &goal_mask)], self.fps())?;
        }

        if cycle < self.warmup_frames {
            return Ok(Cycle::WarmingUp { ball, goal });
        }
        if cycle == self.warmup_frames {
            info!("Warm-up complete, accumulating from frame {cycle}");
        }

        let channel = frame.depth_channel();
        let ball_point = self.triangulator.triangulate(&ball, &channel, timestamp)?;
        let goal_point = self.triangulator.triangulate(&goal, &channel, timestamp)?;

        let ball_accepted = self.accumulator.record(ObjectKind::Ball, &ball_point);
        let goal_accepted = self.accumulator.record(ObjectKind::Goal, &goal_point);

        if let (Some(log), Some(point)) = (&mut self.position_log, ball_point.point()) {
            log.record(&point.position)?;
        }

        if let Some(slam) = &mut self.slam {
            let tracking_started = Instant::now();
            slam.track(frame, timestamp)?;
            self.tracking_times.push(tracking_started.elapsed());

            let latest_pose = slam.pose_at_latest();
            for (kind, accepted) in [(ObjectKind::Ball, ball_accepted), (ObjectKind::Goal, goal_accepted)] {
                if !accepted {
                    continue;
                }
                let local = self.accumulator.trajectory(kind);
                if self.fusion.fuse_latest(kind, local, latest_pose).is_none() {
                    debug!("No SLAM pose yet, {kind} not fused");
                }
            }
        }

        Ok(Cycle::Tracked {
            ball: ball_point,
            goal: goal_point,
        })
    }

    fn shutdown(&mut self) -> Result<()> {
        if let Some(log) = &mut self.position_log {
            log.flush()?;
        }

        let Some(slam) = &mut self.slam else {
            return Ok(());
        };
        let shutdown = slam.shutdown();
        let (trajectory_path, keyframe_path) = &self.slam_outputs;
        if let Some(path) = trajectory_path {
            write_trajectory(path, slam.trajectory())?;
            info!("Camera trajectory written to {}", path.display());
        }
        if let Some(path) = keyframe_path {
            write_trajectory(path, slam.keyframes())?;
            info!("Keyframes written to {}", path.display());
        }
        shutdown
    }

    fn fps(&self) -> f64 {
        self.started
            .map(|s| s.elapsed().as_secs_f64())
            .filter(|secs| *secs > 0.0)
            .map_or(0.0, |secs| self.cycles as f64 / secs)
    }

    fn report(&self, elapsed: Duration) -> SessionReport {
        let secs = elapsed.as_secs_f64();
        SessionReport {
            frames: self.cycles,
            elapsed,
            fps: if secs > 0.0 { self.cycles as f64 / secs } else { 0.0 },
            ball: self.accumulator.counts(ObjectKind::Ball),
            goal: self.accumulator.counts(ObjectKind::Goal),
            tracking_times: TrackingTimes::from_samples(&self.tracking_times),
        }
    }

    /// Depth mode of the session
    #[must_use]
    pub const fn mode(&self) -> DepthMode {
        self.triangulator.mode()
    }

    /// Camera-frame trajectory of one object
    #[must_use]
    pub const fn trajectory(&self, kind: ObjectKind) -> &Trajectory {
        self.accumulator.trajectory(kind)
    }

    /// Camera-frame ball trajectory
    #[must_use]
    pub const fn ball_trajectory(&self) -> &Trajectory {
        self.accumulator.ball()
    }

    /// Camera-frame goal trajectory
    #[must_use]
    pub const fn goal_trajectory(&self) -> &Trajectory {
        self.accumulator.goal()
    }

    /// World-frame trajectory of one object; empty without SLAM
    #[must_use]
    pub const fn global_trajectory(&self, kind: ObjectKind) -> &Trajectory {
        self.fusion.trajectory(kind)
    }

    /// Frames processed so far
    #[must_use]
    pub const fn frames_processed(&self) -> usize {
        self.cycles
    }
}
