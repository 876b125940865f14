//! Planar relaxation of a surface mesh.
//!
//! Finds one 2D point per mesh vertex so that every edge keeps its 3D length as
//! closely as possible. The parameter vector interleaves coordinates,
//! `x = [u0, v0, u1, v1, ...]`, and the residual vector has `Ned + 3` rows:
//!
//! - `r_k = |u_a - u_b|² - |P_a - P_b|²` for every edge `k = (a, b)`
//!   ([`EdgeObjective::SquaredLength`]), or the unsquared form
//!   `|u_a - u_b| - |P_a - P_b|` ([`EdgeObjective::Length`]),
//! - `u_anchor`, `v_anchor` and `v` of the anchor's same-line neighbour.
//!
//! The edge residuals are invariant under rigid motions of the layout; the three
//! gauge rows pin the anchor to the origin and the anchor → neighbour edge to
//! the U axis, without adding any edge-length error.

use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use dewarp_core::{Edge, Pt2, Pt3, Real, SurfaceMesh};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GAUGE_ROWS: usize = 3;

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("need at least 2 points, got {0}")]
    TooFewPoints(usize),
    #[error("mesh has no edges")]
    NoEdges,
    #[error("edge {edge} references point {index}, but only {len} points exist")]
    EdgeOutOfRange { edge: usize, index: usize, len: usize },
    #[error("anchor {anchor} (neighbour {neighbour}) outside {len} points")]
    AnchorOutOfRange {
        anchor: usize,
        neighbour: usize,
        len: usize,
    },
    #[error("point {0} has a non-finite coordinate")]
    NonFinitePoint(usize),
    #[error("{residuals} residuals cannot constrain {params} parameters")]
    Underdetermined { residuals: usize, params: usize },
    #[error("initial layout has {got} points, expected {expected}")]
    InitialSize { expected: usize, got: usize },
}

/// Edge-length error measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeObjective {
    /// Compare squared lengths. Weighs long edges more and keeps the residual
    /// polynomial in the coordinates.
    #[default]
    SquaredLength,
    /// Compare lengths (strict isometry).
    Length,
}

impl EdgeObjective {
    fn target(self, a: &Pt3, b: &Pt3) -> Real {
        let d2 = (a - b).norm_squared();
        match self {
            EdgeObjective::SquaredLength => d2,
            EdgeObjective::Length => d2.sqrt(),
        }
    }

    fn measure(self, du: Real, dv: Real) -> Real {
        let d2 = du * du + dv * dv;
        match self {
            EdgeObjective::SquaredLength => d2,
            EdgeObjective::Length => d2.sqrt(),
        }
    }

    /// Partial derivatives of [`EdgeObjective::measure`] w.r.t. `(du, dv)`.
    fn gradient(self, du: Real, dv: Real) -> (Real, Real) {
        match self {
            EdgeObjective::SquaredLength => (2.0 * du, 2.0 * dv),
            EdgeObjective::Length => {
                let len = du.hypot(dv);
                if len > Real::EPSILON {
                    (du / len, dv / len)
                } else {
                    (0.0, 0.0)
                }
            }
        }
    }
}

/// Least-squares flattening of a point cloud with fixed connectivity.
#[derive(Debug, Clone)]
pub struct FlattenProblem {
    points: Vec<Pt3>,
    edges: Vec<Edge>,
    targets: Vec<Real>,
    anchor: usize,
    neighbour: usize,
    objective: EdgeObjective,
}

impl FlattenProblem {
    /// Build the problem for `points` connected by `edges`, with `anchor` held
    /// at the origin.
    ///
    /// `cols` is the grid line length, used to pick the anchor's same-line
    /// neighbour (right, or left when the anchor ends its line).
    pub fn new(
        points: Vec<Pt3>,
        edges: Vec<Edge>,
        anchor: usize,
        cols: usize,
        objective: EdgeObjective,
    ) -> Result<Self, FlattenError> {
        let n = points.len();
        if n < 2 {
            return Err(FlattenError::TooFewPoints(n));
        }
        if edges.is_empty() {
            return Err(FlattenError::NoEdges);
        }
        if let Some(i) = points.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(FlattenError::NonFinitePoint(i));
        }
        for (k, e) in edges.iter().enumerate() {
            if let Some(&index) = [e.a, e.b].iter().find(|&&i| i >= n) {
                return Err(FlattenError::EdgeOutOfRange {
                    edge: k,
                    index,
                    len: n,
                });
            }
        }
        let cols = cols.max(1);
        let neighbour = if (anchor + 1) % cols != 0 {
            anchor + 1
        } else {
            anchor.wrapping_sub(1)
        };
        if anchor >= n || neighbour >= n {
            return Err(FlattenError::AnchorOutOfRange {
                anchor,
                neighbour,
                len: n,
            });
        }
        let residuals = edges.len() + GAUGE_ROWS;
        if residuals < 2 * n {
            return Err(FlattenError::Underdetermined {
                residuals,
                params: 2 * n,
            });
        }

        let targets = edges
            .iter()
            .map(|e| objective.target(&points[e.a], &points[e.b]))
            .collect();

        Ok(Self {
            points,
            edges,
            targets,
            anchor,
            neighbour,
            objective,
        })
    }

    /// Problem for a grid mesh anchored at its center point.
    pub fn from_mesh(mesh: &SurfaceMesh, objective: EdgeObjective) -> Result<Self, FlattenError> {
        Self::new(
            mesh.points.clone(),
            mesh.edges.clone(),
            mesh.anchor_index(),
            mesh.shape.cols,
            objective,
        )
    }

    pub fn anchor(&self) -> usize {
        self.anchor
    }

    pub fn objective(&self) -> EdgeObjective {
        self.objective
    }

    /// Per-edge target (squared length or length, per objective).
    pub fn targets(&self) -> &[Real] {
        &self.targets
    }

    pub fn mean_target(&self) -> Real {
        self.targets.iter().sum::<Real>() / self.targets.len() as Real
    }

    /// Orthographic layout: drop Z and move the anchor to the origin.
    pub fn initial_guess(&self) -> Vec<Pt2> {
        let origin = self.points[self.anchor];
        self.points
            .iter()
            .map(|p| Pt2::new(p.x - origin.x, p.y - origin.y))
            .collect()
    }

    pub fn pack(layout: &[Pt2]) -> DVector<Real> {
        DVector::from_iterator(2 * layout.len(), layout.iter().flat_map(|p| [p.x, p.y]))
    }

    pub fn unpack(x: &DVector<Real>) -> Vec<Pt2> {
        x.as_slice()
            .chunks_exact(2)
            .map(|c| Pt2::new(c[0], c[1]))
            .collect()
    }
}

impl NllsProblem for FlattenProblem {
    fn num_params(&self) -> usize {
        2 * self.points.len()
    }

    fn num_residuals(&self) -> usize {
        self.edges.len() + GAUGE_ROWS
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let ned = self.edges.len();
        let mut r = DVector::zeros(self.num_residuals());
        for (k, (e, target)) in self.edges.iter().zip(&self.targets).enumerate() {
            let du = x[2 * e.a] - x[2 * e.b];
            let dv = x[2 * e.a + 1] - x[2 * e.b + 1];
            r[k] = self.objective.measure(du, dv) - target;
        }
        r[ned] = x[2 * self.anchor];
        r[ned + 1] = x[2 * self.anchor + 1];
        r[ned + 2] = x[2 * self.neighbour + 1];
        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let ned = self.edges.len();
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_params());
        for (k, e) in self.edges.iter().enumerate() {
            let du = x[2 * e.a] - x[2 * e.b];
            let dv = x[2 * e.a + 1] - x[2 * e.b + 1];
            let (gu, gv) = self.objective.gradient(du, dv);
            j[(k, 2 * e.a)] = gu;
            j[(k, 2 * e.a + 1)] = gv;
            j[(k, 2 * e.b)] = -gu;
            j[(k, 2 * e.b + 1)] = -gv;
        }
        j[(ned, 2 * self.anchor)] = 1.0;
        j[(ned + 1, 2 * self.anchor + 1)] = 1.0;
        j[(ned + 2, 2 * self.neighbour + 1)] = 1.0;
        j
    }
}

/// Outcome of a flattening solve. Non-convergence is reported, not an error.
#[derive(Debug, Clone)]
pub struct FlattenResult {
    /// Orthographic starting layout.
    pub initial: Vec<Pt2>,
    /// Relaxed layout, same indexing as the input points.
    pub solved: Vec<Pt2>,
    pub report: SolveReport,
    /// Sum of squared residuals (edge and gauge rows) at `solved`.
    pub sum_squared_residual: Real,
    /// Mean per-edge target, the natural scale of the residuals.
    pub mean_target: Real,
    pub num_residuals: usize,
}

impl FlattenResult {
    /// RMS residual divided by the mean target; scale-free solve quality.
    pub fn relative_residual(&self) -> Real {
        let rms = (self.sum_squared_residual / self.num_residuals as Real).sqrt();
        if self.mean_target > 0.0 {
            rms / self.mean_target
        } else {
            rms
        }
    }
}

/// Flatten a grid mesh starting from the orthographic layout.
pub fn flatten<B: NllsSolverBackend>(
    mesh: &SurfaceMesh,
    backend: &B,
    opts: &SolveOptions,
    objective: EdgeObjective,
) -> Result<FlattenResult, FlattenError> {
    let problem = FlattenProblem::from_mesh(mesh, objective)?;
    let initial = problem.initial_guess();
    flatten_from(&problem, initial, backend, opts)
}

/// Flatten starting from an explicit layout.
pub fn flatten_from<B: NllsSolverBackend>(
    problem: &FlattenProblem,
    initial: Vec<Pt2>,
    backend: &B,
    opts: &SolveOptions,
) -> Result<FlattenResult, FlattenError> {
    if initial.len() != problem.points.len() {
        return Err(FlattenError::InitialSize {
            expected: problem.points.len(),
            got: initial.len(),
        });
    }
    info!(
        "flattening {} points with {} edges ({:?})",
        problem.points.len(),
        problem.edges.len(),
        problem.objective
    );

    let x0 = FlattenProblem::pack(&initial);
    let (x, report) = backend.solve(problem, x0, opts);
    let sum_squared_residual = problem.residuals(&x).norm_squared();
    let mean_target = problem.mean_target();

    if report.converged {
        debug!(
            "flattening converged: {} ({} evaluations), residual {:e}",
            report.termination, report.evaluations, sum_squared_residual
        );
    } else {
        warn!(
            "flattening did not converge ({}); residual {:e}, mean target {:e}",
            report.termination, sum_squared_residual, mean_target
        );
    }

    Ok(FlattenResult {
        initial,
        solved: FlattenProblem::unpack(&x),
        report,
        sum_squared_residual,
        mean_target,
        num_residuals: problem.num_residuals(),
    })
}

/// Sum over edges of `(|u_a - u_b|² - |P_a - P_b|²)²`.
pub fn edge_distortion(layout: &[Pt2], points: &[Pt3], edges: &[Edge]) -> Real {
    edges
        .iter()
        .map(|e| {
            let flat = (layout[e.a] - layout[e.b]).norm_squared();
            let orig = (points[e.a] - points[e.b]).norm_squared();
            (flat - orig).powi(2)
        })
        .sum()
}
