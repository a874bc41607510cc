//! Pixel and matrix helpers shared by the detection and depth modules.

use crate::{Error, Result};
use nalgebra::Matrix4;
use opencv::{core::Mat, prelude::*};

/// Convert a floating point image coordinate to an integer pixel index.
///
/// Truncates toward zero, matching how OpenCV drawing and `Mat::at_2d`
/// indexing consume sub-pixel positions.
///
/// # Errors
///
/// Returns an error if the value is not finite or outside the i32 range
#[allow(clippy::cast_possible_truncation)] // Truncation after bounds check is intended
pub fn to_pixel(value: f64) -> Result<i32> {
    if value.is_finite() && value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
        Ok(value as i32)
    } else {
        Err(Error::InvalidInput(format!(
            "Value {value} cannot be used as a pixel coordinate"
        )))
    }
}

/// Whether `(x, y)` addresses a pixel inside `mat`
#[must_use]
pub fn in_bounds(mat: &Mat, x: i32, y: i32) -> bool {
    x >= 0 && y >= 0 && x < mat.cols() && y < mat.rows()
}

/// Build a 4x4 nalgebra matrix from row lists
///
/// # Errors
///
/// Returns an error if `rows` is not 4x4
pub fn matrix4_from_rows(rows: &[Vec<f64>]) -> Result<Matrix4<f64>> {
    check_shape(rows, 4, 4)?;
    Ok(Matrix4::from_fn(|r, c| rows[r][c]))
}

/// Convert row lists into a `CV_64F` OpenCV matrix
///
/// # Errors
///
/// Returns an error if the rows are ragged or OpenCV fails to allocate
pub fn rows_to_mat(rows: &[Vec<f64>]) -> Result<Mat> {
    let width = rows.first().map_or(0, Vec::len);
    if width == 0 || rows.iter().any(|r| r.len() != width) {
        return Err(Error::InvalidInput("Matrix rows must be non-empty and equally long".to_string()));
    }
    Ok(Mat::from_slice_2d(rows)?)
}

fn check_shape(rows: &[Vec<f64>], expected_rows: usize, expected_cols: usize) -> Result<()> {
    if rows.len() != expected_rows || rows.iter().any(|r| r.len() != expected_cols) {
        let cols = rows.first().map_or(0, Vec::len);
        return Err(Error::InvalidInput(format!(
            "Expected a {expected_rows}x{expected_cols} matrix, got {}x{cols}",
            rows.len()
        )));
    }
    Ok(())
}
