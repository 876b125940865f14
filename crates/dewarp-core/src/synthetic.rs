//! Deterministic synthetic surfaces.
//!
//! Point clouds are produced in the same row-major order as
//! [`crate::IntrinsicParameters::coordinates_from_disparity`], so they can be
//! fed straight into [`crate::SurfaceMesh::from_points`].

use crate::{DepthError, DisparityGrid, DisparityModel, GridShape, Pt3, Real};

/// Flat lattice at constant depth `z`, centered on the optical axis.
pub fn flat_grid(shape: GridShape, spacing: Real, z: Real) -> Vec<Pt3> {
    let cx = 0.5 * (shape.cols as Real - 1.0);
    let cy = 0.5 * (shape.rows as Real - 1.0);
    let mut points = Vec::with_capacity(shape.len());
    for i in 0..shape.rows {
        for j in 0..shape.cols {
            points.push(Pt3::new(
                (j as Real - cx) * spacing,
                (i as Real - cy) * spacing,
                z,
            ));
        }
    }
    points
}

/// Sheet bent around a vertical cylinder, bulging toward the camera.
///
/// Columns are spread evenly over `arc` radians of a cylinder of `radius`
/// whose nearest line sits at depth `z0`; lines are `spacing` apart along Y.
/// Unrolled, neighbouring columns are `radius * arc / (cols - 1)` apart.
pub fn cylinder_grid(shape: GridShape, radius: Real, arc: Real, spacing: Real, z0: Real) -> Vec<Pt3> {
    let cy = 0.5 * (shape.rows as Real - 1.0);
    let steps = (shape.cols.max(2) - 1) as Real;
    let mut points = Vec::with_capacity(shape.len());
    for i in 0..shape.rows {
        for j in 0..shape.cols {
            let theta = (j as Real / steps - 0.5) * arc;
            points.push(Pt3::new(
                radius * theta.sin(),
                (i as Real - cy) * spacing,
                z0 + radius * (1.0 - theta.cos()),
            ));
        }
    }
    points
}

/// Disparity grid whose every cell decodes to depth `z` under `model`.
pub fn constant_depth_disparity(
    shape: GridShape,
    z: Real,
    model: &DisparityModel,
) -> Result<DisparityGrid, DepthError> {
    let d = model.disparity(z);
    DisparityGrid::from_fn(shape.rows, shape.cols, |_, _| d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cylinder_columns_are_evenly_spaced_on_arc() {
        let shape = GridShape::new(3, 5);
        let pts = cylinder_grid(shape, 0.3, 1.2, 0.02, 0.6);
        let chord = 2.0 * 0.3 * (0.5 * 1.2 / 4.0_f64).sin();
        for j in 0..4 {
            let d = (pts[j + 1] - pts[j]).norm();
            assert!((d - chord).abs() < 1e-12);
        }
        assert!((pts[2].z - 0.6).abs() < 1e-12);
    }

    #[test]
    fn constant_depth_decodes_back() {
        let model = DisparityModel::default();
        let grid = constant_depth_disparity(GridShape::new(2, 2), 0.8, &model).unwrap();
        for &d in grid.as_slice() {
            assert!((model.distance(d) - 0.8).abs() < 1e-12);
        }
    }
}
