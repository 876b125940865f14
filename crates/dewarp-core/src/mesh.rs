//! Regular-grid connectivity and the surface mesh lifted from a disparity grid.
//!
//! Point ids follow the grid flattening `p = row * cols + col`. Two edge sets are
//! built from the grid shape alone:
//! - the dense set (right, below, lower-left, lower-right neighbours), which
//!   triangulates every cell and drives the flattening solve,
//! - the sparse set (right and below only), the plain square mesh used for
//!   drawing and for the interpolation cells.

use crate::{
    CropBox, DepthError, DisparityGrid, DisparityModel, IntrinsicParameters, Pt3, Real,
};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("{got} points cannot fill a {rows}x{cols} grid")]
    PointCount { rows: usize, cols: usize, got: usize },
}

/// Grid dimensions: `rows` lines of `cols` points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub rows: usize,
    pub cols: usize,
}

impl GridShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Point at the geometric middle of the grid, `(rows/2) * cols + cols/2`.
    pub fn center_index(&self) -> usize {
        self.index(self.rows / 2, self.cols / 2)
    }

    /// `4 (cols-1)(rows-1) + cols + rows - 2`.
    pub fn dense_edge_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        4 * (self.cols - 1) * (self.rows - 1) + self.cols + self.rows - 2
    }

    /// `2 cols rows - rows - cols`.
    pub fn sparse_edge_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        2 * self.cols * self.rows - self.rows - self.cols
    }
}

/// Undirected connection between two point ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub a: usize,
    pub b: usize,
}

impl Edge {
    pub fn new(a: usize, b: usize) -> Self {
        Self { a, b }
    }
}

fn grid_connections(shape: GridShape, diagonals: bool) -> Vec<Edge> {
    let (rows, cols) = (shape.rows, shape.cols);
    let mut edges = Vec::with_capacity(if diagonals {
        shape.dense_edge_count()
    } else {
        shape.sparse_edge_count()
    });
    for p in 0..shape.len() {
        let first_col = p % cols == 0;
        let last_col = (p + 1) % cols == 0;
        if !last_col {
            edges.push(Edge::new(p, p + 1));
        }
        if p < cols * (rows - 1) {
            edges.push(Edge::new(p, p + cols));
            if diagonals {
                if !first_col {
                    edges.push(Edge::new(p, p + cols - 1));
                }
                if !last_col {
                    edges.push(Edge::new(p, p + cols + 1));
                }
            }
        }
    }
    edges
}

/// Dense connectivity: right, below, lower-left and lower-right neighbours.
pub fn dense_edges(shape: GridShape) -> Vec<Edge> {
    if shape.is_empty() {
        return Vec::new();
    }
    grid_connections(shape, true)
}

/// Square-mesh connectivity: right and below neighbours only.
pub fn grid_edges(shape: GridShape) -> Vec<Edge> {
    if shape.is_empty() {
        return Vec::new();
    }
    grid_connections(shape, false)
}

/// Two triangles per grid cell, split along the `p → p + cols + 1` diagonal.
pub fn cell_triangles(shape: GridShape) -> Vec<[usize; 3]> {
    let mut tris = Vec::with_capacity(2 * shape.rows.saturating_sub(1) * shape.cols.saturating_sub(1));
    for i in 0..shape.rows.saturating_sub(1) {
        for j in 0..shape.cols.saturating_sub(1) {
            let p = shape.index(i, j);
            let (right, below) = (p + 1, p + shape.cols);
            let diag = below + 1;
            tris.push([p, right, diag]);
            tris.push([p, diag, below]);
        }
    }
    tris
}

/// 3D point cloud on a regular grid, with its connectivity.
#[derive(Debug, Clone)]
pub struct SurfaceMesh {
    pub shape: GridShape,
    /// One point per grid cell, row-major.
    pub points: Vec<Pt3>,
    /// Dense connectivity (solver input).
    pub edges: Vec<Edge>,
    /// Square-mesh connectivity (rendering).
    pub grid_edges: Vec<Edge>,
}

impl SurfaceMesh {
    /// Lift `grid` to 3D and connect it.
    pub fn from_disparity(
        grid: &DisparityGrid,
        intrinsics: &IntrinsicParameters,
        model: &DisparityModel,
    ) -> Self {
        let shape = GridShape::new(grid.rows(), grid.cols());
        Self::connect(shape, intrinsics.coordinates_from_disparity(grid, model))
    }

    /// Connect an existing row-major point cloud.
    pub fn from_points(shape: GridShape, points: Vec<Pt3>) -> Result<Self, MeshError> {
        if points.len() != shape.len() {
            return Err(MeshError::PointCount {
                rows: shape.rows,
                cols: shape.cols,
                got: points.len(),
            });
        }
        Ok(Self::connect(shape, points))
    }

    fn connect(shape: GridShape, points: Vec<Pt3>) -> Self {
        let edges = dense_edges(shape);
        let grid_edges = grid_edges(shape);
        debug!(
            "surface mesh {}x{}: {} points, {} edges, {} grid edges",
            shape.rows,
            shape.cols,
            points.len(),
            edges.len(),
            grid_edges.len()
        );
        Self {
            shape,
            points,
            edges,
            grid_edges,
        }
    }

    pub fn anchor_index(&self) -> usize {
        self.shape.center_index()
    }

    /// Squared 3D length of every dense edge.
    pub fn squared_edge_lengths(&self) -> Vec<Real> {
        self.edges
            .iter()
            .map(|e| (self.points[e.a] - self.points[e.b]).norm_squared())
            .collect()
    }
}

/// Preprocessing front end: crop, subsample and clean a disparity grid while
/// keeping the intrinsics consistent, then build the [`SurfaceMesh`].
#[derive(Debug, Clone)]
pub struct MeshBuilder {
    grid: DisparityGrid,
    intrinsics: IntrinsicParameters,
    model: DisparityModel,
}

impl MeshBuilder {
    pub fn new(grid: DisparityGrid, intrinsics: IntrinsicParameters) -> Self {
        Self {
            grid,
            intrinsics,
            model: DisparityModel::default(),
        }
    }

    pub fn with_model(mut self, model: DisparityModel) -> Self {
        self.model = model;
        self
    }

    pub fn grid(&self) -> &DisparityGrid {
        &self.grid
    }

    pub fn intrinsics(&self) -> &IntrinsicParameters {
        &self.intrinsics
    }

    pub fn crop(&mut self, bbox: CropBox) -> Result<&mut Self, DepthError> {
        self.grid = self.grid.crop(bbox)?;
        self.intrinsics.crop(bbox);
        Ok(self)
    }

    pub fn subsample(&mut self, sub: usize) -> Result<&mut Self, DepthError> {
        self.grid = self.grid.subsample(sub)?;
        self.intrinsics.subsample(sub);
        Ok(self)
    }

    /// See [`DisparityGrid::clamp_outliers`].
    pub fn clamp_outliers(&mut self, sentinel: Real) -> Result<usize, DepthError> {
        let n = self.grid.clamp_outliers(sentinel)?;
        if n > 0 {
            debug!("clamped {n} outlier disparities (sentinel {sentinel})");
        }
        Ok(n)
    }

    pub fn build(&self) -> SurfaceMesh {
        SurfaceMesh::from_disparity(&self.grid, &self.intrinsics, &self.model)
    }
}
