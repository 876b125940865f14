//! Scattered-data interpolation over the projected mesh.
//!
//! The flattened layout is known at the (irregular) image positions of the mesh
//! vertices. Every grid cell contributes two triangles; a query point takes the
//! barycentric blend of the triangle that contains it. Queries outside the
//! projected mesh, or over triangles with an unprojectable vertex, have no value.

use crate::correspondence::CorrespondenceError;
use dewarp_core::{Pt2, Real};

const INSIDE_EPS: Real = 1e-9;

/// Regular sample lattice `(col * spacing, row * spacing)` over an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleLattice {
    pub spacing: Real,
    pub cols: usize,
    pub rows: usize,
}

impl SampleLattice {
    /// Samples at `0, spacing, 2 spacing, ...` strictly below each image dimension.
    pub fn for_image(width: u32, height: u32, spacing: Real) -> Self {
        let count = |extent: u32| {
            if spacing > 0.0 {
                (extent as Real / spacing).ceil() as usize
            } else {
                0
            }
        };
        Self {
            spacing,
            cols: count(width),
            rows: count(height),
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn point(&self, row: usize, col: usize) -> Pt2 {
        Pt2::new(col as Real * self.spacing, row as Real * self.spacing)
    }
}

/// Barycentric coordinates of `p` in triangle `(a, b, c)`; `None` if degenerate.
fn barycentric(p: &Pt2, a: &Pt2, b: &Pt2, c: &Pt2) -> Option<[Real; 3]> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let det = v0.x * v1.y - v1.x * v0.y;
    let scale = v0.norm_squared().max(v1.norm_squared());
    if det.abs() <= Real::EPSILON * scale {
        return None;
    }
    let l1 = (v2.x * v1.y - v1.x * v2.y) / det;
    let l2 = (v0.x * v2.y - v2.x * v0.y) / det;
    Some([1.0 - l1 - l2, l1, l2])
}

fn blend(w: [Real; 3], a: &Pt2, b: &Pt2, c: &Pt2) -> Pt2 {
    Pt2::from(a.coords * w[0] + b.coords * w[1] + c.coords * w[2])
}

/// Piecewise-linear interpolant of `values` given at `sites`.
#[derive(Debug, Clone)]
pub struct TriangleInterpolator<'a> {
    sites: &'a [Option<Pt2>],
    values: &'a [Pt2],
    triangles: &'a [[usize; 3]],
}

impl<'a> TriangleInterpolator<'a> {
    /// Requires one value per site and every triangle corner to name a site.
    pub fn new(
        sites: &'a [Option<Pt2>],
        values: &'a [Pt2],
        triangles: &'a [[usize; 3]],
    ) -> Result<Self, CorrespondenceError> {
        if sites.len() != values.len() {
            return Err(CorrespondenceError::LengthMismatch {
                sites: sites.len(),
                values: values.len(),
            });
        }
        for (k, t) in triangles.iter().enumerate() {
            if let Some(&index) = t.iter().find(|&&i| i >= sites.len()) {
                return Err(CorrespondenceError::TriangleOutOfRange {
                    triangle: k,
                    index,
                    len: sites.len(),
                });
            }
        }
        Ok(Self {
            sites,
            values,
            triangles,
        })
    }

    fn corners(&self, t: &[usize; 3]) -> Option<[Pt2; 3]> {
        Some([self.sites[t[0]]?, self.sites[t[1]]?, self.sites[t[2]]?])
    }

    fn value_in(&self, t: &[usize; 3], w: [Real; 3]) -> Pt2 {
        blend(w, &self.values[t[0]], &self.values[t[1]], &self.values[t[2]])
    }

    /// Interpolated value at a single point.
    pub fn sample(&self, p: &Pt2) -> Option<Pt2> {
        self.triangles.iter().find_map(|t| {
            let [a, b, c] = self.corners(t)?;
            let w = barycentric(p, &a, &b, &c)?;
            w.iter()
                .all(|&l| l >= -INSIDE_EPS)
                .then(|| self.value_in(t, w))
        })
    }

    /// Interpolated values at every lattice point, row-major.
    ///
    /// Rasterizes each triangle over the lattice points inside its bounding
    /// box; where projected triangles overlap, the first one wins.
    pub fn sample_lattice(&self, lattice: &SampleLattice) -> Vec<Option<Pt2>> {
        let mut out = vec![None; lattice.len()];
        if lattice.is_empty() || lattice.spacing <= 0.0 {
            return out;
        }
        let to_range = |lo: Real, hi: Real, n: usize| {
            let first = (lo / lattice.spacing - INSIDE_EPS).ceil().max(0.0) as usize;
            let last = (hi / lattice.spacing + INSIDE_EPS).floor();
            if last < 0.0 {
                return first..first;
            }
            first..((last as usize) + 1).min(n)
        };

        for t in self.triangles {
            let Some([a, b, c]) = self.corners(t) else {
                continue;
            };
            let cols = to_range(a.x.min(b.x).min(c.x), a.x.max(b.x).max(c.x), lattice.cols);
            let rows = to_range(a.y.min(b.y).min(c.y), a.y.max(b.y).max(c.y), lattice.rows);
            for row in rows {
                for col in cols.clone() {
                    let slot = &mut out[row * lattice.cols + col];
                    if slot.is_some() {
                        continue;
                    }
                    let p = lattice.point(row, col);
                    let Some(w) = barycentric(&p, &a, &b, &c) else {
                        continue;
                    };
                    if w.iter().all(|&l| l >= -INSIDE_EPS) {
                        *slot = Some(self.value_in(t, w));
                    }
                }
            }
        }
        out
    }
}
