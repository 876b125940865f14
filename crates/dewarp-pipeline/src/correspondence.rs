//! Quad correspondences between the photo and the flattened layout.
//!
//! The flattened coordinates are interpolated on a regular lattice laid over
//! the photo. Every lattice cell whose four corners have a value yields one
//! [`CorrespondenceQuad`]: an axis-aligned photo rectangle and the flattened
//! quadrilateral it unrolls to. The flattened side is finally shifted and
//! scaled into output pixels.

use crate::interpolate::{SampleLattice, TriangleInterpolator};
use dewarp_core::{Pt2, Real};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorrespondenceError {
    #[error("no lattice cell is fully covered by the projected mesh ({skipped} skipped)")]
    NoCoverage { skipped: usize },
    #[error("flattened quads span a degenerate extent {width} x {height}")]
    DegenerateExtent { width: Real, height: Real },
    #[error("output size must be positive, got {0}")]
    InvalidOutputSize(Real),
    #[error("{sites} projected sites but {values} flattened values")]
    LengthMismatch { sites: usize, values: usize },
    #[error("triangle {triangle} refers to site {index}, only {len} sites")]
    TriangleOutOfRange {
        triangle: usize,
        index: usize,
        len: usize,
    },
}

/// Axis-aligned bounds of a point set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds2 {
    pub min: Pt2,
    pub max: Pt2,
}

impl Bounds2 {
    pub fn from_point(p: Pt2) -> Self {
        Self { min: p, max: p }
    }

    pub fn extend(&mut self, p: &Pt2) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn width(&self) -> Real {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> Real {
        self.max.y - self.min.y
    }
}

/// Photo rectangle ↔ flattened quadrilateral, corners ordered top-left,
/// top-right, bottom-right, bottom-left (in photo orientation).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrespondenceQuad {
    pub camera_rect: [Pt2; 4],
    pub flat_quad: [Pt2; 4],
}

impl CorrespondenceQuad {
    /// The quad as two corresponding triangles `(flat, camera)` split along
    /// the top-left → bottom-right diagonal.
    pub fn triangles(&self) -> [([Pt2; 3], [Pt2; 3]); 2] {
        let (f, c) = (&self.flat_quad, &self.camera_rect);
        [
            ([f[0], f[1], f[2]], [c[0], c[1], c[2]]),
            ([f[0], f[2], f[3]], [c[0], c[2], c[3]]),
        ]
    }
}

/// Quads in unscaled flattened units, before fitting to the output image.
#[derive(Debug, Clone)]
pub struct RawCorrespondences {
    pub quads: Vec<CorrespondenceQuad>,
    /// Bounds of every emitted flattened corner.
    pub bounds: Option<Bounds2>,
    /// Lattice cells dropped for lack of coverage.
    pub skipped: usize,
}

/// Interpolate `flattened` over a lattice on the photo and collect the fully
/// covered cells.
pub fn extract_correspondences(
    projected: &[Option<Pt2>],
    flattened: &[Pt2],
    triangles: &[[usize; 3]],
    lattice: &SampleLattice,
) -> Result<RawCorrespondences, CorrespondenceError> {
    let interp = TriangleInterpolator::new(projected, flattened, triangles)?;
    let grid = interp.sample_lattice(lattice);
    let at = |row: usize, col: usize| grid[row * lattice.cols + col];

    let mut quads = Vec::new();
    let mut bounds: Option<Bounds2> = None;
    let mut skipped = 0;

    for row in 0..lattice.rows.saturating_sub(1) {
        for col in 0..lattice.cols.saturating_sub(1) {
            let corners = [
                at(row, col),
                at(row, col + 1),
                at(row + 1, col + 1),
                at(row + 1, col),
            ];
            let [Some(tl), Some(tr), Some(br), Some(bl)] = corners else {
                debug!("lattice cell ({row}, {col}) lacks coverage, skipped");
                skipped += 1;
                continue;
            };
            let flat_quad = [tl, tr, br, bl];
            for p in &flat_quad {
                bounds
                    .get_or_insert_with(|| Bounds2::from_point(*p))
                    .extend(p);
            }
            quads.push(CorrespondenceQuad {
                camera_rect: [
                    lattice.point(row, col),
                    lattice.point(row, col + 1),
                    lattice.point(row + 1, col + 1),
                    lattice.point(row + 1, col),
                ],
                flat_quad,
            });
        }
    }

    info!(
        "{} correspondence quads from a {}x{} lattice ({} cells skipped)",
        quads.len(),
        lattice.rows,
        lattice.cols,
        skipped
    );
    Ok(RawCorrespondences {
        quads,
        bounds,
        skipped,
    })
}

/// Quads with the flattened side in output pixels; input to the image warper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrespondenceTable {
    pub quads: Vec<CorrespondenceQuad>,
    /// Output pixels per flattened unit.
    pub output_scale: Real,
    /// Output image size `(width, height)` in pixels.
    pub output_size: (u32, u32),
    /// Flattened-space bounds before scaling.
    pub bounds: Bounds2,
}

impl CorrespondenceTable {
    /// Shift the flattened corners so the bounds start at 0 and scale them so
    /// the longest side spans `max_dimension` pixels.
    pub fn scaled(
        raw: RawCorrespondences,
        max_dimension: Real,
    ) -> Result<Self, CorrespondenceError> {
        if !(max_dimension > 0.0) {
            return Err(CorrespondenceError::InvalidOutputSize(max_dimension));
        }
        let bounds = raw.bounds.ok_or(CorrespondenceError::NoCoverage {
            skipped: raw.skipped,
        })?;
        let extent = bounds.width().max(bounds.height());
        if !(extent > 0.0) || !extent.is_finite() {
            return Err(CorrespondenceError::DegenerateExtent {
                width: bounds.width(),
                height: bounds.height(),
            });
        }

        let output_scale = max_dimension / extent;
        let quads = raw
            .quads
            .into_iter()
            .map(|mut q| {
                for p in q.flat_quad.iter_mut() {
                    *p = Pt2::from((*p - bounds.min) * output_scale);
                }
                q
            })
            .collect();
        let output_size = (
            (output_scale * bounds.width()).round().max(1.0) as u32,
            (output_scale * bounds.height()).round().max(1.0) as u32,
        );
        debug!("output {output_size:?} at scale {output_scale:e}");

        Ok(Self {
            quads,
            output_scale,
            output_size,
            bounds,
        })
    }
}
