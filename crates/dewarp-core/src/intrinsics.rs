use crate::{CropBox, DisparityGrid, DisparityModel, Pt2, Pt3, Real, Vec3};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics with a single focal length (pixels) and an optical center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicParameters {
    /// Focal length in pixels.
    pub f: Real,
    /// Optical center in pixels (`x` = column, `y` = line).
    pub center: Pt2,
}

impl IntrinsicParameters {
    pub fn new(f: Real, center: Pt2) -> Self {
        Self { f, center }
    }

    /// Intrinsics with the optical center at `0.5 * (1 + (cols, rows))`.
    ///
    /// This is the convention used for rendered scenes and raw sensor dumps
    /// where no calibrated principal point is available.
    pub fn centered(f: Real, cols: usize, rows: usize) -> Self {
        Self::new(
            f,
            Pt2::new(0.5 * (1.0 + cols as Real), 0.5 * (1.0 + rows as Real)),
        )
    }

    /// Keep the intrinsics consistent with a grid subsampled by `sub`.
    pub fn subsample(&mut self, sub: usize) {
        let s = sub as Real;
        self.f /= s;
        self.center /= s;
    }

    /// Keep the intrinsics consistent with a grid cropped to `bbox`.
    pub fn crop(&mut self, bbox: CropBox) {
        self.center.x -= bbox.x0 as Real;
        self.center.y -= bbox.y0 as Real;
    }

    /// Back-project a pixel at known depth: `((col, row) - center) * z / f`, `z`.
    pub fn backproject(&self, col: Real, row: Real, z: Real) -> Pt3 {
        let scale = z / self.f;
        Pt3::new(
            (col - self.center.x) * scale,
            (row - self.center.y) * scale,
            z,
        )
    }

    /// Project a camera-frame point to pixels: `center + f * (x, y) / z`.
    ///
    /// Returns `None` for points at or behind the image plane (`z <= 0`).
    pub fn project(&self, p_c: &Vec3) -> Option<Pt2> {
        if p_c.z <= 0.0 {
            return None;
        }
        Some(Pt2::new(
            self.center.x + self.f * p_c.x / p_c.z,
            self.center.y + self.f * p_c.y / p_c.z,
        ))
    }

    /// Lift every grid cell to a 3D point, in row-major order.
    pub fn coordinates_from_disparity(
        &self,
        grid: &DisparityGrid,
        model: &DisparityModel,
    ) -> Vec<Pt3> {
        let cols = grid.cols();
        grid.as_slice()
            .iter()
            .enumerate()
            .map(|(p, &d)| {
                let (row, col) = (p / cols, p % cols);
                self.backproject(col as Real, row as Real, model.distance(d))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_matches_loader_convention() {
        let k = IntrinsicParameters::centered(640.0, 640, 480);
        assert_eq!(k.center, Pt2::new(320.5, 240.5));
    }

    #[test]
    fn crop_then_subsample_tracks_pixels() {
        let mut k = IntrinsicParameters::new(600.0, Pt2::new(320.0, 240.0));
        k.crop([20, 40, 400, 400].into());
        assert_eq!(k.center, Pt2::new(300.0, 200.0));
        k.subsample(4);
        assert_eq!(k.f, 150.0);
        assert_eq!(k.center, Pt2::new(75.0, 50.0));
    }

    #[test]
    fn backproject_project_roundtrip() {
        let k = IntrinsicParameters::new(525.0, Pt2::new(319.5, 239.5));
        let p = k.backproject(100.0, 400.0, 1.7);
        let px = k.project(&p.coords).unwrap();
        assert!((px - Pt2::new(100.0, 400.0)).norm() < 1e-9, "px={px}");
        assert!(k.project(&Vec3::new(0.1, 0.2, -1.0)).is_none());
        assert!(k.project(&Vec3::new(0.1, 0.2, 0.0)).is_none());
    }

    #[test]
    fn constant_disparity_gives_flat_lattice() {
        let model = DisparityModel::default();
        let grid = DisparityGrid::from_fn(4, 4, |_, _| 600.0).unwrap();
        let k = IntrinsicParameters::new(1.0, Pt2::new(1.5, 1.5));
        let pts = k.coordinates_from_disparity(&grid, &model);
        let z = model.distance(600.0);

        assert_eq!(pts.len(), 16);
        for (p, pt) in pts.iter().enumerate() {
            let (i, j) = ((p / 4) as Real, (p % 4) as Real);
            assert!((pt.z - z).abs() < 1e-12);
            assert!((pt.x - (j - 1.5) * z).abs() < 1e-12);
            assert!((pt.y - (i - 1.5) * z).abs() < 1e-12);
        }
    }
}
