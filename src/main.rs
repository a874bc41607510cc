//! Ball and goal tracker: 3D trajectories from an RGB-D recording or a
//! stereo camera pair.

use anyhow::{bail, Context, Result};
use ball_goal_tracker::{
    calibration::CalibrationBundle,
    capture::{FrameSource, RecordedRgbdSource, StereoCameraSource},
    config::{Config, EXAMPLE_CONFIG},
    depth::DepthMode,
    export::export_trajectory,
    filters::SmoothingFilter,
    session::{build_depth_strategy, KeyPress, NeverStop, StopSignal, TrackingSession},
    slam::ReplaySlam,
    trajectory::{ObjectKind, Trajectory},
    Error,
};
use clap::Parser;
use log::{info, warn};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<PathBuf>,

    /// Depth mode (active, stereo)
    #[arg(short, long)]
    mode: Option<DepthMode>,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<usize>,

    /// Frames detected but not accumulated at start
    #[arg(short, long)]
    warmup: Option<usize>,

    /// Show annotated frames and masks (press q to stop)
    #[arg(long)]
    display: bool,

    /// Fuse positions with poses replayed from a trajectory log
    #[arg(long)]
    slam_replay: Option<PathBuf>,

    /// Write accepted ball positions to this file
    #[arg(short, long)]
    position_log: Option<PathBuf>,

    /// Directory for per-object trajectory tables
    #[arg(short, long)]
    export_dir: Option<PathBuf>,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {}", config_path.display());
        Config::from_file(config_path)
            .with_context(|| format!("loading configuration from {}", config_path.display()))?
    } else {
        Config::for_mode(args.mode.unwrap_or_default())
    };

    if let Some(mode) = args.mode {
        config.depth.mode = mode;
    }
    if let Some(frames) = args.frames {
        config.session.max_frames = Some(frames);
    }
    if let Some(warmup) = args.warmup {
        config.session.warmup_frames = warmup;
    }
    if args.display {
        config.session.display = true;
    }
    if let Some(path) = &args.slam_replay {
        config.slam.enabled = true;
        config.slam.trajectory_replay = Some(path.clone());
    }
    if let Some(path) = &args.position_log {
        config.output.position_log = Some(path.clone());
    }
    if let Some(dir) = &args.export_dir {
        config.output.export_dir = Some(dir.clone());
    }
    Ok(config)
}

fn export_all(session: &TrackingSession, config: &Config, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let smoother = if config.output.smooth_export {
        Some(SmoothingFilter::from_config(&config.smoothing, config.depth.mode)?)
    } else {
        None
    };

    for kind in [ObjectKind::Ball, ObjectKind::Goal] {
        let tables = [
            (format!("{kind}_camera.txt"), session.trajectory(kind)),
            (format!("{kind}_world.txt"), session.global_trajectory(kind)),
        ];
        for (name, trajectory) in tables {
            if trajectory.is_empty() {
                continue;
            }
            let smoothed = smooth_or_skip(smoother.as_ref(), trajectory, &name)?;
            let path = dir.join(&name);
            export_trajectory(&path, trajectory, smoothed.as_ref())?;
            info!("Exported {} {kind} points to {}", trajectory.len(), path.display());
        }
    }
    Ok(())
}

fn smooth_or_skip(smoother: Option<&SmoothingFilter>, trajectory: &Trajectory, name: &str) -> Result<Option<Trajectory>> {
    let Some(smoother) = smoother else {
        return Ok(None);
    };
    match smoother.smooth_trajectory(trajectory) {
        Ok(smoothed) => Ok(Some(smoothed)),
        Err(e @ Error::InsufficientSamples { .. }) => {
            warn!("{name}: not smoothed, {e}");
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logger
    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    if args.print_config {
        print!("{EXAMPLE_CONFIG}");
        return Ok(());
    }

    info!("Ball and goal tracker");

    let config = load_config(&args)?;
    config.validate()?;

    let calibration = match config.depth.mode {
        DepthMode::Stereo => Some(CalibrationBundle::load(&config.depth.stereo.calibration)?),
        DepthMode::Active => None,
    };
    let strategy = build_depth_strategy(&config, calibration.as_ref())?;

    let mut session = TrackingSession::from_config(&config, strategy)?;
    if config.slam.enabled {
        let Some(replay) = &config.slam.trajectory_replay else {
            bail!("SLAM fusion enabled but no trajectory replay configured");
        };
        session = session.with_slam(Box::new(ReplaySlam::from_file(replay)?));
    }

    let mut source: Box<dyn FrameSource> = match (&config.depth.mode, &calibration) {
        (DepthMode::Stereo, Some(bundle)) => Box::new(StereoCameraSource::open(
            &config.depth.stereo,
            &config.depth.matcher,
            bundle,
        )?),
        (DepthMode::Stereo, None) => bail!("Stereo mode without calibration"),
        (DepthMode::Active, _) => Box::new(RecordedRgbdSource::open(&config.depth.active)?),
    };

    let mut stop: Box<dyn StopSignal> = if config.session.display {
        Box::new(KeyPress::new(1))
    } else {
        Box::new(NeverStop)
    };

    let outcome = session.run(source.as_mut(), stop.as_mut());

    info!(
        "Tracked {} ball and {} goal points",
        session.ball_trajectory().len(),
        session.goal_trajectory().len()
    );
    if let Some(dir) = &config.output.export_dir {
        export_all(&session, &config, dir)?;
    }

    outcome?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("ball-goal-tracker").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_unreadable_config_is_an_error() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "depth: [unclosed").unwrap();

        let args = parse(&["--config", broken.to_str().unwrap()]);
        let err = load_config(&args).unwrap_err();
        assert!(err.to_string().contains("broken.yaml"));

        let missing = dir.path().join("missing.yaml");
        let args = parse(&["--config", missing.to_str().unwrap(), "--mode", "stereo"]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn test_overrides_apply_to_loaded_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tracker.yaml");
        std::fs::write(&path, EXAMPLE_CONFIG).unwrap();

        let args = parse(&["--config", path.to_str().unwrap(), "-n", "25", "--mode", "stereo"]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.session.max_frames, Some(25));
        assert_eq!(config.depth.mode, DepthMode::Stereo);
    }

    #[test]
    fn test_defaults_without_config_file() {
        let config = load_config(&parse(&["--mode", "stereo"])).unwrap();
        assert_eq!(config.depth.mode, DepthMode::Stereo);
        assert_eq!(config.session.max_frames, None);
    }
}
