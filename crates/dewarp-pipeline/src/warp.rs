//! Piecewise-affine image warping driven by a [`CorrespondenceTable`].
//!
//! Pixel `(x, y)` of either image refers to the pixel centre at integer
//! coordinates, matching the lattice points of the correspondence table.

use crate::correspondence::CorrespondenceTable;
use dewarp_core::{Pt2, Real};
use image::{Rgba, RgbaImage};
use log::debug;

const INSIDE_EPS: Real = 1e-9;

/// Produces the dewarped image from a photo and its correspondence table.
pub trait ImageWarper {
    fn warp(&self, source: &RgbaImage, table: &CorrespondenceTable) -> RgbaImage;
}

/// Maps every output triangle affinely back into the photo and samples it
/// bilinearly. Output pixels not covered by any quad keep `background`.
#[derive(Debug, Clone, Copy)]
pub struct PiecewiseAffineWarper {
    pub background: Rgba<u8>,
}

impl Default for PiecewiseAffineWarper {
    fn default() -> Self {
        Self {
            background: Rgba([0, 0, 0, 0]),
        }
    }
}

/// Affine map taking triangle `dst` onto triangle `src`.
#[derive(Debug, Clone, Copy)]
struct TriangleMap {
    origin: Pt2,
    // Inverse of the `dst` edge matrix, row-major.
    inv: [Real; 4],
    src: [Pt2; 3],
}

impl TriangleMap {
    fn new(dst: [Pt2; 3], src: [Pt2; 3]) -> Option<Self> {
        let e1 = dst[1] - dst[0];
        let e2 = dst[2] - dst[0];
        let det = e1.x * e2.y - e2.x * e1.y;
        if det.abs() <= Real::EPSILON * e1.norm_squared().max(e2.norm_squared()) {
            return None;
        }
        Some(Self {
            origin: dst[0],
            inv: [e2.y / det, -e2.x / det, -e1.y / det, e1.x / det],
            src,
        })
    }

    /// Source position of `p`, or `None` if `p` lies outside the triangle.
    fn map(&self, p: &Pt2) -> Option<Pt2> {
        let v = p - self.origin;
        let l1 = self.inv[0] * v.x + self.inv[1] * v.y;
        let l2 = self.inv[2] * v.x + self.inv[3] * v.y;
        let l0 = 1.0 - l1 - l2;
        if l0 < -INSIDE_EPS || l1 < -INSIDE_EPS || l2 < -INSIDE_EPS {
            return None;
        }
        let s = &self.src;
        Some(Pt2::from(s[0].coords * l0 + s[1].coords * l1 + s[2].coords * l2))
    }
}

/// Bilinear sample with edge clamping; `None` outside the image.
fn sample_bilinear(img: &RgbaImage, x: Real, y: Real) -> Option<Rgba<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return None;
    }
    let (max_x, max_y) = ((w - 1) as Real, (h - 1) as Real);
    if !(x > -0.5 && y > -0.5 && x < max_x + 0.5 && y < max_y + 0.5) {
        return None;
    }
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(w - 1), (y0 + 1).min(h - 1));
    let (fx, fy) = (x - x0 as Real, y - y0 as Real);

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as Real * (1.0 - fx) + p10[c] as Real * fx;
        let bottom = p01[c] as Real * (1.0 - fx) + p11[c] as Real * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgba(out))
}

impl ImageWarper for PiecewiseAffineWarper {
    fn warp(&self, source: &RgbaImage, table: &CorrespondenceTable) -> RgbaImage {
        let (width, height) = table.output_size;
        let mut out = RgbaImage::from_pixel(width, height, self.background);
        let mut degenerate = 0usize;

        for quad in &table.quads {
            for (flat, camera) in quad.triangles() {
                let Some(map) = TriangleMap::new(flat, camera) else {
                    degenerate += 1;
                    continue;
                };
                let lo = flat[0].inf(&flat[1]).inf(&flat[2]);
                let hi = flat[0].sup(&flat[1]).sup(&flat[2]);
                let x0 = lo.x.ceil().max(0.0) as u32;
                let y0 = lo.y.ceil().max(0.0) as u32;
                let x1 = (hi.x.floor().min(width as Real - 1.0)).max(-1.0);
                let y1 = (hi.y.floor().min(height as Real - 1.0)).max(-1.0);
                if x1 < 0.0 || y1 < 0.0 {
                    continue;
                }
                for y in y0..=(y1 as u32) {
                    for x in x0..=(x1 as u32) {
                        let Some(src) = map.map(&Pt2::new(x as Real, y as Real)) else {
                            continue;
                        };
                        if let Some(px) = sample_bilinear(source, src.x, src.y) {
                            out.put_pixel(x, y, px);
                        }
                    }
                }
            }
        }

        if degenerate > 0 {
            debug!("skipped {degenerate} degenerate output triangles");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correspondence::{Bounds2, CorrespondenceQuad};

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 7, 255]))
    }

    fn rect(x0: Real, y0: Real, x1: Real, y1: Real) -> [Pt2; 4] {
        [
            Pt2::new(x0, y0),
            Pt2::new(x1, y0),
            Pt2::new(x1, y1),
            Pt2::new(x0, y1),
        ]
    }

    fn table(quads: Vec<CorrespondenceQuad>, size: (u32, u32)) -> CorrespondenceTable {
        CorrespondenceTable {
            quads,
            output_scale: 1.0,
            output_size: size,
            bounds: Bounds2 {
                min: Pt2::origin(),
                max: Pt2::new(size.0 as Real, size.1 as Real),
            },
        }
    }

    #[test]
    fn identity_quad_copies_pixels() {
        let src = gradient(20, 20);
        let t = table(
            vec![CorrespondenceQuad {
                camera_rect: rect(0.0, 0.0, 19.0, 19.0),
                flat_quad: rect(0.0, 0.0, 19.0, 19.0),
            }],
            (20, 20),
        );
        let out = PiecewiseAffineWarper::default().warp(&src, &t);
        assert_eq!(out.dimensions(), (20, 20));
        for y in 0..20 {
            for x in 0..20 {
                assert_eq!(out.get_pixel(x, y), src.get_pixel(x, y), "pixel ({x}, {y})");
            }
        }
    }

    #[test]
    fn scaled_quad_interpolates_between_pixels() {
        let src = gradient(10, 10);
        // Output is twice the size of the source region.
        let t = table(
            vec![CorrespondenceQuad {
                camera_rect: rect(0.0, 0.0, 4.0, 4.0),
                flat_quad: rect(0.0, 0.0, 8.0, 8.0),
            }],
            (9, 9),
        );
        let out = PiecewiseAffineWarper::default().warp(&src, &t);
        // Output (3, 0) maps to source (1.5, 0): halfway between 10 and 20.
        assert_eq!(out.get_pixel(3, 0).0, [15, 0, 7, 255]);
        assert_eq!(out.get_pixel(8, 8).0, [40, 40, 7, 255]);
    }

    #[test]
    fn uncovered_pixels_keep_background() {
        let src = gradient(10, 10);
        let t = table(
            vec![CorrespondenceQuad {
                camera_rect: rect(0.0, 0.0, 4.0, 4.0),
                flat_quad: rect(0.0, 0.0, 4.0, 4.0),
            }],
            (10, 10),
        );
        let warper = PiecewiseAffineWarper {
            background: Rgba([1, 2, 3, 4]),
        };
        let out = warper.warp(&src, &t);
        assert_eq!(out.get_pixel(2, 2), src.get_pixel(2, 2));
        assert_eq!(out.get_pixel(7, 7).0, [1, 2, 3, 4]);
    }

    #[test]
    fn sampling_outside_source_is_rejected() {
        let src = gradient(4, 4);
        assert!(sample_bilinear(&src, -1.0, 0.0).is_none());
        assert!(sample_bilinear(&src, 3.4, 3.4).is_some());
        assert!(sample_bilinear(&src, 4.0, 0.0).is_none());
    }
}
