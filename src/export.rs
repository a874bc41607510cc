//! File sinks for tracked positions

use crate::{trajectory::Trajectory, Error, Result};
use nalgebra::Vector3;
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

/// Streaming `x, y, z` log of accepted samples
pub struct PositionLog {
    writer: BufWriter<File>,
    lines: usize,
}

impl PositionLog {
    /// Create (or truncate) the log at `path`
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        log::info!("Writing positions to {}", path.as_ref().display());
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            lines: 0,
        })
    }

    /// Append one position
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails
    pub fn record(&mut self, position: &Vector3<f64>) -> Result<()> {
        writeln!(self.writer, "{}, {}, {}", position.x, position.y, position.z)?;
        self.lines += 1;
        Ok(())
    }

    /// Number of positions written
    #[must_use]
    pub const fn len(&self) -> usize {
        self.lines
    }

    /// Whether nothing was written yet
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Flush buffered lines to disk
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write a trajectory as a whitespace separated table `t x y z`, with
/// `x_smooth y_smooth z_smooth` columns appended when `smoothed` is given.
///
/// # Errors
///
/// Returns an error if `smoothed` has a different length or the write fails
pub fn export_trajectory<P: AsRef<Path>>(path: P, raw: &Trajectory, smoothed: Option<&Trajectory>) -> Result<()> {
    if let Some(smoothed) = smoothed {
        if smoothed.len() != raw.len() {
            return Err(Error::InvalidInput(format!(
                "Smoothed trajectory has {} points, raw has {}",
                smoothed.len(),
                raw.len()
            )));
        }
    }

    let mut writer = BufWriter::new(File::create(path)?);
    if smoothed.is_some() {
        writeln!(writer, "# t x y z x_smooth y_smooth z_smooth")?;
    } else {
        writeln!(writer, "# t x y z")?;
    }

    for (i, point) in raw.points().iter().enumerate() {
        let p = &point.position;
        write!(writer, "{} {} {} {}", point.timestamp.unwrap_or(f64::NAN), p.x, p.y, p.z)?;
        if let Some(s) = smoothed.map(|s| &s.points()[i].position) {
            write!(writer, " {} {} {}", s.x, s.y, s.z)?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}
