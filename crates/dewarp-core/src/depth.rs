//! Disparity grids and the disparity-to-depth calibration.
//!
//! The structured-light sensor reports an 11-bit inverse-depth signal. Metric
//! depth follows the rational fit `depth = numerator / (singularity - d)`, whose
//! coefficients come from the sensor's measured depth/disparity curve. The value
//! `2047` (the largest 11-bit code) marks pixels without a measurement.

use crate::Real;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numerator of the Kinect disparity-to-depth fit (meters × disparity units).
pub const KINECT_DEPTH_NUMERATOR: Real = 348.0;
/// Disparity at which the Kinect depth fit diverges.
pub const KINECT_DISPARITY_SINGULARITY: Real = 1091.5;
/// Raw disparity code reported for pixels without a measurement.
pub const INVALID_DISPARITY: Real = 2047.0;

#[derive(Debug, Error)]
pub enum DepthError {
    #[error("disparity data has {got} values, expected {rows}x{cols}")]
    ShapeMismatch { rows: usize, cols: usize, got: usize },
    #[error("disparity grid is empty")]
    Empty,
    #[error("crop box {0:?} selects no pixels")]
    EmptyCrop(CropBox),
    #[error("subsample factor must be at least 1, got {0}")]
    InvalidSubsample(usize),
    #[error("no disparity value below the outlier sentinel {0}")]
    NoValidDisparity(Real),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// Rational inverse-depth calibration `depth = numerator / (singularity - d)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisparityModel {
    pub numerator: Real,
    pub singularity: Real,
}

impl Default for DisparityModel {
    fn default() -> Self {
        Self {
            numerator: KINECT_DEPTH_NUMERATOR,
            singularity: KINECT_DISPARITY_SINGULARITY,
        }
    }
}

impl DisparityModel {
    /// Metric depth for a raw disparity value.
    ///
    /// The result is negative past the singularity and unbounded at it; keeping
    /// `d` inside the sensor range is the caller's responsibility.
    pub fn distance(&self, d: Real) -> Real {
        self.numerator / (self.singularity - d)
    }

    /// Inverse of [`DisparityModel::distance`].
    pub fn disparity(&self, depth: Real) -> Real {
        self.singularity - self.numerator / depth
    }
}

/// Depth from disparity using the Kinect calibration.
pub fn distance_from_disparity(d: Real) -> Real {
    DisparityModel::default().distance(d)
}

/// Pixel-space crop rectangle `[x0, x1) × [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl From<[usize; 4]> for CropBox {
    fn from(b: [usize; 4]) -> Self {
        Self {
            x0: b[0],
            y0: b[1],
            x1: b[2],
            y1: b[3],
        }
    }
}

/// Row-major grid of raw disparity values (`rows` lines × `cols` columns).
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityGrid {
    rows: usize,
    cols: usize,
    data: Vec<Real>,
}

impl DisparityGrid {
    pub fn new(rows: usize, cols: usize, data: Vec<Real>) -> Result<Self, DepthError> {
        if rows == 0 || cols == 0 {
            return Err(DepthError::Empty);
        }
        if data.len() != rows * cols {
            return Err(DepthError::ShapeMismatch {
                rows,
                cols,
                got: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// Grid with `f(row, col)` at every cell; same shape checks as [`DisparityGrid::new`].
    pub fn from_fn(
        rows: usize,
        cols: usize,
        f: impl Fn(usize, usize) -> Real,
    ) -> Result<Self, DepthError> {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self::new(rows, cols, data)
    }

    /// Parse a whitespace separated text matrix, one grid line per text line.
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn from_text(text: &str) -> Result<Self, DepthError> {
        let mut cols = None;
        let mut rows = 0;
        let mut data = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let before = data.len();
            for token in line.split_whitespace() {
                let value = token.parse::<Real>().map_err(|e| DepthError::Parse {
                    line: idx + 1,
                    message: format!("invalid value {token:?}: {e}"),
                })?;
                data.push(value);
            }
            let n = data.len() - before;
            match cols {
                None => cols = Some(n),
                Some(c) if c != n => {
                    return Err(DepthError::Parse {
                        line: idx + 1,
                        message: format!("expected {c} values, got {n}"),
                    })
                }
                Some(_) => {}
            }
            rows += 1;
        }
        Self::new(rows, cols.unwrap_or(0), data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Real] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> Option<Real> {
        (row < self.rows && col < self.cols).then(|| self.data[row * self.cols + col])
    }

    /// Keep the pixels inside `bbox`, clamped to the grid.
    pub fn crop(&self, bbox: CropBox) -> Result<Self, DepthError> {
        let x1 = bbox.x1.min(self.cols);
        let y1 = bbox.y1.min(self.rows);
        if bbox.x0 >= x1 || bbox.y0 >= y1 {
            return Err(DepthError::EmptyCrop(bbox));
        }
        let cols = x1 - bbox.x0;
        let rows = y1 - bbox.y0;
        let mut data = Vec::with_capacity(rows * cols);
        for i in bbox.y0..y1 {
            let start = i * self.cols;
            data.extend_from_slice(&self.data[start + bbox.x0..start + x1]);
        }
        Ok(Self { rows, cols, data })
    }

    /// Keep every `sub`-th line and column, starting with the first.
    pub fn subsample(&self, sub: usize) -> Result<Self, DepthError> {
        if sub == 0 {
            return Err(DepthError::InvalidSubsample(sub));
        }
        let rows = self.rows.div_ceil(sub);
        let cols = self.cols.div_ceil(sub);
        let mut data = Vec::with_capacity(rows * cols);
        for i in (0..self.rows).step_by(sub) {
            for j in (0..self.cols).step_by(sub) {
                data.push(self.data[i * self.cols + j]);
            }
        }
        Ok(Self { rows, cols, data })
    }

    /// Replace every value at or above `sentinel` by the largest value below it.
    ///
    /// Returns the number of replaced pixels.
    pub fn clamp_outliers(&mut self, sentinel: Real) -> Result<usize, DepthError> {
        let outliers = self.data.iter().filter(|&&d| d >= sentinel).count();
        if outliers == 0 {
            return Ok(0);
        }
        let fill = self
            .data
            .iter()
            .copied()
            .filter(|&d| d < sentinel)
            .fold(None, |acc: Option<Real>, d| Some(acc.map_or(d, |m| m.max(d))))
            .ok_or(DepthError::NoValidDisparity(sentinel))?;
        for d in self.data.iter_mut().filter(|d| **d >= sentinel) {
            *d = fill;
        }
        Ok(outliers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_grows_toward_singularity() {
        let mut prev = distance_from_disparity(0.0);
        for d in (1..1091).map(|d| d as Real) {
            let z = distance_from_disparity(d);
            assert!(z > prev, "depth not increasing at d={d}: {z} <= {prev}");
            prev = z;
        }
        let (a, b) = (distance_from_disparity(600.0), distance_from_disparity(600.0));
        assert_eq!(a.to_bits(), b.to_bits());
        assert!(distance_from_disparity(1100.0) < 0.0);
    }

    #[test]
    fn model_inverse_roundtrip() {
        let model = DisparityModel::default();
        for d in [0.0, 300.0, 750.5, 1000.0] {
            let back = model.disparity(model.distance(d));
            assert!((back - d).abs() < 1e-9, "d={d} back={back}");
        }
    }

    #[test]
    fn parse_text_grid() {
        let grid = DisparityGrid::from_text("1 2 3\n\n4 5 6\n").unwrap();
        assert_eq!((grid.rows(), grid.cols()), (2, 3));
        assert_eq!(grid.get(1, 0), Some(4.0));
        assert_eq!(grid.get(2, 0), None);

        let err = DisparityGrid::from_text("1 2 3\n4 5\n").unwrap_err();
        assert!(matches!(err, DepthError::Parse { line: 2, .. }));
        assert!(matches!(
            DisparityGrid::from_text("1 x").unwrap_err(),
            DepthError::Parse { line: 1, .. }
        ));
        assert!(matches!(
            DisparityGrid::from_text("\n").unwrap_err(),
            DepthError::Empty
        ));
    }

    #[test]
    fn generated_grid_rejects_empty_shape() {
        assert!(matches!(
            DisparityGrid::from_fn(0, 4, |_, _| 600.0),
            Err(DepthError::Empty)
        ));
        assert!(matches!(
            DisparityGrid::from_fn(3, 0, |_, _| 600.0),
            Err(DepthError::Empty)
        ));
        let grid = DisparityGrid::from_fn(2, 3, |i, j| (i + j) as Real).unwrap();
        assert_eq!(grid.get(1, 2), Some(3.0));
    }

    #[test]
    fn crop_and_subsample_select_expected_pixels() {
        let grid = DisparityGrid::from_fn(6, 8, |i, j| (10 * i + j) as Real).unwrap();

        let cropped = grid.crop([2, 1, 7, 5].into()).unwrap();
        assert_eq!((cropped.rows(), cropped.cols()), (4, 5));
        assert_eq!(cropped.get(0, 0), Some(12.0));
        assert_eq!(cropped.get(3, 4), Some(46.0));

        let clamped = grid.crop([4, 4, 100, 100].into()).unwrap();
        assert_eq!((clamped.rows(), clamped.cols()), (2, 4));
        assert!(grid.crop([8, 0, 9, 3].into()).is_err());

        let sub = grid.subsample(3).unwrap();
        assert_eq!((sub.rows(), sub.cols()), (2, 3));
        assert_eq!(sub.as_slice(), &[0.0, 3.0, 6.0, 30.0, 33.0, 36.0]);
        assert!(grid.subsample(0).is_err());
    }

    #[test]
    fn outliers_take_largest_valid_value() {
        let mut grid =
            DisparityGrid::new(2, 3, vec![500.0, 2047.0, 610.0, 2047.0, 700.0, 650.0]).unwrap();
        let n = grid.clamp_outliers(INVALID_DISPARITY).unwrap();
        assert_eq!(n, 2);
        assert_eq!(grid.as_slice(), &[500.0, 700.0, 610.0, 700.0, 700.0, 650.0]);

        let mut all_bad = DisparityGrid::new(1, 2, vec![2047.0, 2047.0]).unwrap();
        assert!(matches!(
            all_bad.clamp_outliers(INVALID_DISPARITY),
            Err(DepthError::NoValidDisparity(_))
        ));
    }
}
