//! Stereo calibration bundle and rectification maps.
//!
//! The bundle is the output of an offline stereo calibration: intrinsics and
//! distortion of both cameras, rectifying rotations and projections, and the
//! disparity-to-depth matrix `Q`. It is stored as YAML with every matrix
//! written as a list of rows.

use crate::{
    utils::{matrix4_from_rows, rows_to_mat},
    Error, Result,
};
use nalgebra::Matrix4;
use opencv::{
    calib3d,
    core::{Mat, Scalar, Size, BORDER_CONSTANT, CV_32FC1},
    imgproc,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Calibration of a rectified stereo pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBundle {
    /// Left camera matrix (3x3)
    #[serde(rename = "K1")]
    pub k1: Vec<Vec<f64>>,
    /// Right camera matrix (3x3)
    #[serde(rename = "K2")]
    pub k2: Vec<Vec<f64>>,
    /// Left distortion coefficients (single row)
    #[serde(rename = "D1")]
    pub d1: Vec<Vec<f64>>,
    /// Right distortion coefficients (single row)
    #[serde(rename = "D2")]
    pub d2: Vec<Vec<f64>>,
    /// Left rectifying rotation (3x3)
    #[serde(rename = "R1")]
    pub r1: Vec<Vec<f64>>,
    /// Right rectifying rotation (3x3)
    #[serde(rename = "R2")]
    pub r2: Vec<Vec<f64>>,
    /// Left projection in the rectified frame (3x4)
    #[serde(rename = "P1")]
    pub p1: Vec<Vec<f64>>,
    /// Right projection in the rectified frame (3x4)
    #[serde(rename = "P2")]
    pub p2: Vec<Vec<f64>>,
    /// Disparity-to-depth reprojection matrix (4x4)
    #[serde(rename = "Q")]
    pub q: Vec<Vec<f64>>,
}

/// Undistort/rectify lookup tables for both cameras
#[derive(Debug)]
pub struct RectificationMaps {
    left: (Mat, Mat),
    right: (Mat, Mat),
}

impl CalibrationBundle {
    /// Load and validate a bundle
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] if the file is missing, unparsable
    /// or holds a matrix of the wrong shape
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::CalibrationLoad(format!("{}: {e}", path.display())))?;
        let bundle: Self = serde_yaml::from_str(&content)
            .map_err(|e| Error::CalibrationLoad(format!("{}: {e}", path.display())))?;
        bundle.validate()?;
        log::info!("Loaded stereo calibration from {}", path.display());
        Ok(bundle)
    }

    /// Write the bundle as YAML
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// Check every matrix has its expected shape
    ///
    /// # Errors
    ///
    /// Returns [`Error::CalibrationLoad`] naming the first malformed matrix
    pub fn validate(&self) -> Result<()> {
        let fixed = [
            ("K1", &self.k1, 3, 3),
            ("K2", &self.k2, 3, 3),
            ("R1", &self.r1, 3, 3),
            ("R2", &self.r2, 3, 3),
            ("P1", &self.p1, 3, 4),
            ("P2", &self.p2, 3, 4),
            ("Q", &self.q, 4, 4),
        ];
        for (name, rows, expected_rows, expected_cols) in fixed {
            if rows.len() != expected_rows || rows.iter().any(|r| r.len() != expected_cols) {
                return Err(Error::CalibrationLoad(format!(
                    "{name} must be {expected_rows}x{expected_cols}"
                )));
            }
        }
        for (name, rows) in [("D1", &self.d1), ("D2", &self.d2)] {
            if rows.len() != 1 || rows[0].is_empty() {
                return Err(Error::CalibrationLoad(format!("{name} must be a single non-empty row")));
            }
        }
        let all = [
            &self.k1, &self.k2, &self.d1, &self.d2, &self.r1, &self.r2, &self.p1, &self.p2, &self.q,
        ];
        if all.iter().flat_map(|m| m.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(Error::CalibrationLoad("Calibration holds non-finite values".to_string()));
        }
        Ok(())
    }

    /// Reprojection matrix as a nalgebra matrix
    ///
    /// # Errors
    ///
    /// Returns an error if `Q` is not 4x4
    pub fn q_matrix(&self) -> Result<Matrix4<f64>> {
        matrix4_from_rows(&self.q).map_err(|e| Error::CalibrationLoad(format!("Q: {e}")))
    }

    /// Compute rectification maps for frames of `size`
    ///
    /// # Errors
    ///
    /// Returns an error if a matrix cannot be converted or OpenCV fails
    pub fn rectification_maps(&self, fisheye: bool, size: Size) -> Result<RectificationMaps> {
        let left = undistort_rectify_map(&self.k1, &self.d1, &self.r1, &self.p1, fisheye, size)?;
        let right = undistort_rectify_map(&self.k2, &self.d2, &self.r2, &self.p2, fisheye, size)?;
        Ok(RectificationMaps { left, right })
    }
}

fn undistort_rectify_map(
    k: &[Vec<f64>],
    d: &[Vec<f64>],
    r: &[Vec<f64>],
    p: &[Vec<f64>],
    fisheye: bool,
    size: Size,
) -> Result<(Mat, Mat)> {
    let (k, d, r, p) = (rows_to_mat(k)?, rows_to_mat(d)?, rows_to_mat(r)?, rows_to_mat(p)?);
    let mut map1 = Mat::default();
    let mut map2 = Mat::default();
    if fisheye {
        calib3d::fisheye_init_undistort_rectify_map(&k, &d, &r, &p, size, CV_32FC1, &mut map1, &mut map2)?;
    } else {
        calib3d::init_undistort_rectify_map(&k, &d, &r, &p, size, CV_32FC1, &mut map1, &mut map2)?;
    }
    Ok((map1, map2))
}

impl RectificationMaps {
    /// Remap a raw left/right pair into the rectified frame
    ///
    /// # Errors
    ///
    /// Returns an error if OpenCV fails
    pub fn rectify(&self, left: &Mat, right: &Mat) -> Result<(Mat, Mat)> {
        Ok((remap(left, &self.left)?, remap(right, &self.right)?))
    }

    /// Map size (columns, rows)
    #[must_use]
    pub fn size(&self) -> (i32, i32) {
        (self.left.0.cols(), self.left.0.rows())
    }
}

fn remap(src: &Mat, maps: &(Mat, Mat)) -> Result<Mat> {
    let mut dst = Mat::default();
    imgproc::remap(
        src,
        &mut dst,
        &maps.0,
        &maps.1,
        imgproc::INTER_LINEAR,
        BORDER_CONSTANT,
        Scalar::default(),
    )?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_bundle() -> CalibrationBundle {
        let eye = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        let k = vec![vec![500.0, 0.0, 32.0], vec![0.0, 500.0, 24.0], vec![0.0, 0.0, 1.0]];
        let p = vec![vec![500.0, 0.0, 32.0, 0.0], vec![0.0, 500.0, 24.0, 0.0], vec![0.0, 0.0, 1.0, 0.0]];
        CalibrationBundle {
            k1: k.clone(),
            k2: k,
            d1: vec![vec![0.0; 5]],
            d2: vec![vec![0.0; 5]],
            r1: eye.clone(),
            r2: eye,
            p1: p.clone(),
            p2: p,
            q: vec![
                vec![1.0, 0.0, 0.0, -32.0],
                vec![0.0, 1.0, 0.0, -24.0],
                vec![0.0, 0.0, 0.0, 500.0],
                vec![0.0, 0.0, 10.0, 0.0],
            ],
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.yaml");
        identity_bundle().save(&path).unwrap();

        let loaded = CalibrationBundle::load(&path).unwrap();
        assert_eq!(loaded, identity_bundle());
        assert_eq!(loaded.q_matrix().unwrap()[(3, 2)], 10.0);
    }

    #[test]
    fn test_missing_file_is_calibration_error() {
        let err = CalibrationBundle::load("/nonexistent/stereo.yaml").unwrap_err();
        assert!(matches!(err, Error::CalibrationLoad(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_bad_shape_is_rejected() {
        let mut bundle = identity_bundle();
        bundle.q.pop();
        assert!(matches!(bundle.validate(), Err(Error::CalibrationLoad(_))));
    }

    #[test]
    fn test_rectification_maps() {
        let maps = identity_bundle().rectification_maps(false, Size::new(64, 48)).unwrap();
        assert_eq!(maps.size(), (64, 48));
    }
}
