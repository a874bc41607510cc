//! End-to-end session tests on synthetic frame sequences


use ball_goal_tracker::{
    capture::{Frame, FrameSource, ReplaySource},
    config::Config,
    depth::{DepthMode, DepthStrategy, StereoDisparityAdapter, ValidityWindow},
    export::PositionLog,
    fusion::{Pose, TimedPose},
    session::{build_depth_strategy, Cycle, NeverStop, StopFlag, StopSignal, TrackingSession},
    slam::{read_trajectory, ReplaySlam, SlamEngine},
    trajectory::ObjectKind,
    Error, Result,
};
use nalgebra::{Matrix3, Vector3};
use std::sync::atomic::Ordering;
use tempfile::TempDir;
use test_helpers::{
    ball_sequence, blank_image, center, disparity_frame, green, image_with_disks, range_frame, red, stereo_q,
};

fn active_session() -> Result<TrackingSession> {
    let config = Config::default();
    let strategy = build_depth_strategy(&config, None)?;
    TrackingSession::new(&config, strategy)
}

/// Source that fails with an acquisition error after `ok` frames
struct FailingSource {
    frames: Vec<Frame>,
    released: bool,
}

impl FrameSource for FailingSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frames.is_empty() {
            return Err(Error::Acquisition("device unplugged".to_string()));
        }
        Ok(Some(self.frames.remove(0)))
    }

    fn release(&mut self) -> Result<()> {
        self.released = true;
        Ok(())
    }
}

/// SLAM engine that rejects every frame
struct LostSlam;

impl SlamEngine for LostSlam {
    fn track(&mut self, _frame: &Frame, _timestamp: f64) -> Result<()> {
        Err(Error::Slam("tracking lost".to_string()))
    }

    fn pose_at_latest(&self) -> Option<TimedPose> {
        None
    }

    fn trajectory(&self) -> &[TimedPose] {
        &[]
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// SLAM engine that reports its current pose but keeps no history
struct LivePoseSlam {
    pose: Pose,
    latest: Option<TimedPose>,
}

impl SlamEngine for LivePoseSlam {
    fn track(&mut self, _frame: &Frame, timestamp: f64) -> Result<()> {
        self.latest = Some(TimedPose {
            timestamp,
            pose: self.pose,
        });
        Ok(())
    }

    fn pose_at_latest(&self) -> Option<TimedPose> {
        self.latest
    }

    fn trajectory(&self) -> &[TimedPose] {
        &[]
    }

    fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Stop after a fixed number of polls
struct StopAfter(usize);

impl StopSignal for StopAfter {
    fn should_stop(&mut self) -> Result<bool> {
        self.0 = self.0.saturating_sub(1);
        Ok(self.0 == 0)
    }
}

#[test]
fn test_ball_appears_after_warmup() -> Result<()> {
    let mut session = active_session()?;
    let mut source = ReplaySource::new(ball_sequence(120, 50, 1.5)?);
    let released = source.released_flag();

    let report = session.run(&mut source, &mut NeverStop)?;

    assert_eq!(report.frames, 120);
    assert_eq!(session.ball_trajectory().len(), 70);
    for point in session.ball_trajectory().points() {
        assert!((point.position.z - 1.5).abs() < 1e-9);
        assert!(point.position.x.abs() < 0.01);
        assert!(point.position.y.abs() < 0.01);
        assert!(point.timestamp.is_some());
    }
    assert!(session.goal_trajectory().is_empty());
    assert!(session.global_trajectory(ObjectKind::Ball).is_empty());
    assert_eq!(report.ball.accepted, 70);
    assert!(report.tracking_times.is_none());
    assert!(released.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_timestamps_increase() -> Result<()> {
    let mut session = active_session()?;
    let mut source = ReplaySource::new(ball_sequence(80, 50, 2.0)?);
    session.run(&mut source, &mut NeverStop)?;

    let times = session.ball_trajectory().timestamps();
    assert_eq!(times.len(), 30);
    assert!(times.windows(2).all(|w| w[1] >= w[0]));
    Ok(())
}

#[test]
fn test_warmup_cycles_are_detect_only() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 2;
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?;

    let image = image_with_disks(&[(center(), 40, red())])?;
    for index in 0..2 {
        let frame = range_frame(image.try_clone()?, 1.5, index)?;
        let cycle = session.process_frame(&frame, index as f64)?;
        match cycle {
            Cycle::WarmingUp { ball, .. } => assert!(ball.is_found()),
            Cycle::Tracked { .. } => panic!("Frame {index} should still be warming up"),
        }
    }

    let frame = range_frame(image, 1.5, 2)?;
    assert!(matches!(session.process_frame(&frame, 2.0)?, Cycle::Tracked { .. }));
    assert_eq!(session.ball_trajectory().len(), 1);
    assert_eq!(session.frames_processed(), 3);
    Ok(())
}

#[test]
fn test_ball_and_goal_tracked_together() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?;

    let frames = (0..10)
        .map(|i| {
            let image = image_with_disks(&[
                (opencv::core::Point::new(160, 240), 40, red()),
                (opencv::core::Point::new(480, 240), 50, green()),
            ])?;
            range_frame(image, 3.0, i)
        })
        .collect::<Result<Vec<_>>>()?;
    session.run(&mut ReplaySource::new(frames), &mut NeverStop)?;

    assert_eq!(session.ball_trajectory().len(), 10);
    assert_eq!(session.goal_trajectory().len(), 10);
    let ball = session.ball_trajectory().points()[0].position;
    let goal = session.goal_trajectory().points()[0].position;
    assert!(ball.x < 0.0, "ball is left of the optical axis");
    assert!(goal.x > 0.0, "goal is right of the optical axis");
    Ok(())
}

#[test]
fn test_out_of_window_depth_is_dropped() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?;

    // 0.5 m is closer than the active window allows
    let report = session.run(&mut ReplaySource::new(ball_sequence(10, 0, 0.5)?), &mut NeverStop)?;

    assert!(session.ball_trajectory().is_empty());
    assert_eq!(report.ball.processed, 10);
    assert_eq!(report.ball.rejected, 10);
    Ok(())
}

#[test]
fn test_position_log_has_one_line_per_accepted_ball() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("positions.txt");
    let mut session = active_session()?.with_position_log(PositionLog::create(&path)?);

    session.run(&mut ReplaySource::new(ball_sequence(120, 50, 1.5)?), &mut NeverStop)?;

    let content = std::fs::read_to_string(&path)?;
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 70);
    for line in lines {
        let values: Vec<f64> = line.split(',').map(|v| v.trim().parse().unwrap()).collect();
        assert_eq!(values.len(), 3);
        assert!((values[2] - 1.5).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn test_stationary_identity_slam_matches_camera_frame() -> Result<()> {
    let dir = TempDir::new()?;
    let trajectory_path = dir.path().join("CameraTrajectory.txt");
    let mut config = Config::default();
    config.slam.enabled = true;
    config.slam.trajectory_output = Some(trajectory_path.clone());
    let strategy = build_depth_strategy(&config, None)?;
    let mut session =
        TrackingSession::new(&config, strategy)?.with_slam(Box::new(ReplaySlam::stationary(Pose::identity())));

    let report = session.run(&mut ReplaySource::new(ball_sequence(120, 50, 1.5)?), &mut NeverStop)?;

    let local = session.ball_trajectory();
    let global = session.global_trajectory(ObjectKind::Ball);
    assert_eq!(global.len(), local.len());
    for (g, l) in global.points().iter().zip(local.points()) {
        assert!((g.position - l.position).norm() < 1e-12);
        assert_eq!(g.timestamp, l.timestamp);
    }

    // SLAM is only fed after warm-up
    assert!(report.tracking_times.is_some());
    assert_eq!(read_trajectory(&trajectory_path)?.len(), 70);
    Ok(())
}

#[test]
fn test_world_frame_offset_is_applied() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let pose = Pose::new(Matrix3::identity(), Vector3::new(1.0, 0.0, -0.5));
    let mut session = TrackingSession::new(&config, strategy)?.with_slam(Box::new(ReplaySlam::stationary(pose)));

    session.run(&mut ReplaySource::new(ball_sequence(5, 0, 1.5)?), &mut NeverStop)?;

    let global = session.global_trajectory(ObjectKind::Ball);
    assert_eq!(global.len(), 5);
    for point in global.points() {
        assert!((point.position.x - 1.0).abs() < 0.01);
        assert!((point.position.z - 1.0).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn test_fusion_uses_engine_latest_pose() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let slam = LivePoseSlam {
        pose: Pose::new(Matrix3::identity(), Vector3::new(0.0, 2.0, 0.0)),
        latest: None,
    };
    let mut session = TrackingSession::new(&config, strategy)?.with_slam(Box::new(slam));

    session.run(&mut ReplaySource::new(ball_sequence(4, 0, 1.5)?), &mut NeverStop)?;

    let global = session.global_trajectory(ObjectKind::Ball);
    assert_eq!(global.len(), 4);
    for point in global.points() {
        assert!((point.position.y - 2.0).abs() < 0.01);
        assert!((point.position.z - 1.5).abs() < 1e-9);
    }
    Ok(())
}

#[test]
fn test_stop_flag_ends_run() -> Result<()> {
    let mut session = active_session()?;
    let stop = StopFlag::new();
    stop.request();
    let mut source = ReplaySource::new(ball_sequence(20, 0, 1.5)?);
    let released = source.released_flag();

    let report = session.run(&mut source, &mut stop.clone())?;

    assert_eq!(report.frames, 1);
    assert!(released.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_stop_after_some_cycles() -> Result<()> {
    let mut session = active_session()?;
    let report = session.run(&mut ReplaySource::new(ball_sequence(20, 0, 1.5)?), &mut StopAfter(7))?;
    assert_eq!(report.frames, 7);
    Ok(())
}

#[test]
fn test_frame_limit() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    config.session.max_frames = Some(12);
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?;
    let mut source = ReplaySource::new(ball_sequence(30, 0, 1.5)?);

    let report = session.run(&mut source, &mut NeverStop)?;

    assert_eq!(report.frames, 12);
    assert_eq!(session.ball_trajectory().len(), 12);
    Ok(())
}

#[test]
fn test_acquisition_failure_keeps_partial_trajectory() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?;
    let mut source = FailingSource {
        frames: ball_sequence(4, 0, 1.5)?,
        released: false,
    };

    let result = session.run(&mut source, &mut NeverStop);

    match result {
        Err(e @ Error::Acquisition(_)) => assert!(e.is_fatal()),
        other => panic!("Expected acquisition failure, got {other:?}"),
    }
    assert!(source.released);
    assert_eq!(session.ball_trajectory().len(), 4);
    Ok(())
}

#[test]
fn test_slam_failure_is_fatal() -> Result<()> {
    let mut config = Config::default();
    config.session.warmup_frames = 0;
    let strategy = build_depth_strategy(&config, None)?;
    let mut session = TrackingSession::new(&config, strategy)?.with_slam(Box::new(LostSlam));
    let mut source = ReplaySource::new(ball_sequence(5, 0, 1.5)?);
    let released = source.released_flag();

    let result = session.run(&mut source, &mut NeverStop);

    assert!(matches!(result, Err(Error::Slam(_))));
    assert!(released.load(Ordering::SeqCst));
    Ok(())
}

#[test]
fn test_empty_stream() -> Result<()> {
    let mut session = active_session()?;
    let report = session.run(&mut ReplaySource::new(Vec::new()), &mut NeverStop)?;
    assert_eq!(report.frames, 0);
    assert!(session.ball_trajectory().is_empty());
    Ok(())
}

#[test]
fn test_stereo_session_with_constant_disparity() -> Result<()> {
    let mut config = Config::for_mode(DepthMode::Stereo);
    config.session.warmup_frames = 5;
    let q = stereo_q(500.0, 320.0, 240.0, 60.0);
    let strategy = DepthStrategy::Stereo(StereoDisparityAdapter::new(q, config.depth.stereo.validity));
    let mut session = TrackingSession::new(&config, strategy)?;

    let frames = (0..20)
        .map(|i| {
            let image = if i < 5 {
                blank_image()?
            } else {
                image_with_disks(&[(center(), 40, red())])?
            };
            disparity_frame(image, 20.0, i)
        })
        .collect::<Result<Vec<_>>>()?;
    session.run(&mut ReplaySource::new(frames), &mut NeverStop)?;

    assert_eq!(session.mode(), DepthMode::Stereo);
    assert_eq!(session.ball_trajectory().len(), 15);
    for point in session.ball_trajectory().points() {
        assert!((point.position.z - 1500.0).abs() < 1e-6);
    }
    Ok(())
}

#[test]
fn test_stereo_far_points_rejected() -> Result<()> {
    let mut config = Config::for_mode(DepthMode::Stereo);
    config.session.warmup_frames = 0;
    let q = stereo_q(500.0, 320.0, 240.0, 60.0);
    let strategy = DepthStrategy::Stereo(StereoDisparityAdapter::new(q, ValidityWindow::new(100.0, 2000.0)));
    let mut session = TrackingSession::new(&config, strategy)?;

    // d = 10 gives z = 3000, outside the window
    let frames = (0..5)
        .map(|i| disparity_frame(image_with_disks(&[(center(), 40, red())])?, 10.0, i))
        .collect::<Result<Vec<_>>>()?;
    session.run(&mut ReplaySource::new(frames), &mut NeverStop)?;

    assert!(session.ball_trajectory().is_empty());
    Ok(())
}

#[test]
fn test_strategy_mismatch_rejected() -> Result<()> {
    let config = Config::for_mode(DepthMode::Stereo);
    let active = build_depth_strategy(&Config::default(), None)?;
    assert!(matches!(TrackingSession::new(&config, active), Err(Error::ConfigError(_))));
    Ok(())
}
