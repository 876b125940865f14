//! Core geometry primitives for `dewarp-rs`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - the disparity-to-depth model and disparity grid preprocessing,
//! - pinhole intrinsics/extrinsics and reprojection into a second camera,
//! - regular-grid connectivity and the surface mesh built from a disparity grid.
//!
//! Point cloud pipeline:
//! `point = backproject(pixel, depth(disparity))`, indexed `p = row * cols + col`.

/// Disparity grids and the disparity-to-depth model.
pub mod depth;
/// Camera pose and the look-at construction.
pub mod extrinsics;
/// Pinhole intrinsics and back-projection.
pub mod intrinsics;
/// Linear algebra type aliases.
pub mod math;
/// Grid connectivity and surface meshes.
pub mod mesh;
/// Reprojection of point clouds into a camera image plane.
pub mod projection;
/// Deterministic synthetic surfaces used by tests and examples.
pub mod synthetic;

pub use depth::*;
pub use extrinsics::*;
pub use intrinsics::*;
pub use math::*;
pub use mesh::*;
pub use projection::*;
