//! Integration tests for planar relaxation on synthetic surfaces.
//!
//! This test validates:
//! 1. A flat surface reconstructs itself from a perturbed start
//! 2. The 4x4 constant-disparity scenario end to end through the mesh builder
//! 3. A developable (cylindrical) sheet unrolls to its true column spacing
//! 4. The solve always improves on the orthographic starting layout
//! 5. Disconnected edge sets and exhausted iteration budgets still return a layout

use dewarp_core::{
    dense_edges, synthetic, DisparityGrid, Edge, GridShape, IntrinsicParameters, MeshBuilder,
    Pt2, Real, SurfaceMesh,
};
use dewarp_optim::{
    edge_distortion, flatten, flatten_from, EdgeObjective, FlattenProblem, LmBackend,
    SolveOptions,
};

fn max_layout_error(a: &[Pt2], b: &[Pt2]) -> Real {
    a.iter()
        .zip(b)
        .map(|(p, q)| (p - q).norm())
        .fold(0.0, Real::max)
}

#[test]
fn flat_surface_reconstructs_itself() {
    let shape = GridShape::new(5, 6);
    let points = synthetic::flat_grid(shape, 0.05, 0.8);
    let mesh = SurfaceMesh::from_points(shape, points).unwrap();
    let problem = FlattenProblem::from_mesh(&mesh, EdgeObjective::SquaredLength).unwrap();
    let truth = problem.initial_guess();

    // Deterministic wobble of a few millimeters.
    let start: Vec<Pt2> = truth
        .iter()
        .enumerate()
        .map(|(k, p)| {
            let k = k as Real;
            Pt2::new(p.x + 0.003 * (1.3 * k).sin(), p.y + 0.003 * (0.7 * k).cos())
        })
        .collect();

    let result = flatten_from(&problem, start, &LmBackend, &SolveOptions::default()).unwrap();
    let err = max_layout_error(&result.solved, &truth);
    assert!(err < 1e-5, "flat layout not recovered, max error {err}");
    assert!(
        result.sum_squared_residual < 1e-14,
        "residual too high: {}",
        result.sum_squared_residual
    );
    assert!(result.solved[mesh.anchor_index()].coords.norm() < 1e-9);
}

#[test]
fn constant_disparity_4x4_scenario() {
    let grid = DisparityGrid::from_fn(4, 4, |_, _| 600.0).unwrap();
    let intrinsics = IntrinsicParameters::new(1.0, Pt2::new(1.5, 1.5));
    let mesh = MeshBuilder::new(grid, intrinsics).build();

    assert_eq!(mesh.points.len(), 16);
    assert_eq!(mesh.edges.len(), 42);
    let z = mesh.points[0].z;
    assert!(mesh.points.iter().all(|p| (p.z - z).abs() < 1e-12));

    let result = flatten(
        &mesh,
        &LmBackend,
        &SolveOptions::default(),
        EdgeObjective::SquaredLength,
    )
    .unwrap();
    assert!(
        result.sum_squared_residual < 1e-20,
        "residual {} ({})",
        result.sum_squared_residual,
        result.report.termination
    );

    let anchor = mesh.points[mesh.anchor_index()];
    for (uv, p) in result.solved.iter().zip(&mesh.points) {
        assert!((uv.x - (p.x - anchor.x)).abs() < 1e-9);
        assert!((uv.y - (p.y - anchor.y)).abs() < 1e-9);
    }
}

#[test]
fn cylinder_unrolls_to_arc_spacing() {
    let shape = GridShape::new(5, 7);
    let (radius, arc) = (0.3, 1.5);
    let mesh = SurfaceMesh::from_points(
        shape,
        synthetic::cylinder_grid(shape, radius, arc, 0.03, 0.6),
    )
    .unwrap();

    let result = flatten(
        &mesh,
        &LmBackend,
        &SolveOptions::default(),
        EdgeObjective::SquaredLength,
    )
    .unwrap();

    let before = edge_distortion(&result.initial, &mesh.points, &mesh.edges);
    let after = edge_distortion(&result.solved, &mesh.points, &mesh.edges);
    assert!(after < before, "solve did not improve: {after} >= {before}");
    assert!(
        result.relative_residual() < 1e-6,
        "relative residual {}",
        result.relative_residual()
    );

    // Unrolled width of the middle line equals six chords.
    let chord = 2.0 * radius * (0.5 * arc / 6.0).sin();
    let row = shape.rows / 2;
    let left = result.solved[shape.index(row, 0)];
    let right = result.solved[shape.index(row, shape.cols - 1)];
    let width = (right - left).norm();
    assert!((width - 6.0 * chord).abs() < 1e-5, "width {width} vs {}", 6.0 * chord);

    let ortho_width = (result.initial[shape.index(row, shape.cols - 1)]
        - result.initial[shape.index(row, 0)])
        .norm();
    assert!(ortho_width < width);
}

#[test]
fn length_objective_also_flattens_cylinder() {
    let shape = GridShape::new(4, 5);
    let mesh = SurfaceMesh::from_points(
        shape,
        synthetic::cylinder_grid(shape, 0.25, 1.2, 0.04, 0.5),
    )
    .unwrap();
    let result = flatten(&mesh, &LmBackend, &SolveOptions::default(), EdgeObjective::Length)
        .unwrap();
    let before = edge_distortion(&result.initial, &mesh.points, &mesh.edges);
    let after = edge_distortion(&result.solved, &mesh.points, &mesh.edges);
    assert!(after < 1e-3 * before, "{after} vs {before}");
}

#[test]
fn disconnected_edge_set_still_solves() {
    let shape = GridShape::new(3, 6);
    let points = synthetic::cylinder_grid(shape, 0.3, 1.2, 0.04, 0.6);
    // Drop every edge between columns 2 and 3: two separate strips.
    let left = |p: usize| p % shape.cols <= 2;
    let edges: Vec<Edge> = dense_edges(shape)
        .into_iter()
        .filter(|e| left(e.a) == left(e.b))
        .collect();
    assert!(edges.len() < shape.dense_edge_count());

    let problem = FlattenProblem::new(
        points,
        edges,
        shape.center_index(),
        shape.cols,
        EdgeObjective::SquaredLength,
    )
    .unwrap();
    let initial = problem.initial_guess();
    let result = flatten_from(&problem, initial, &LmBackend, &SolveOptions::default()).unwrap();

    assert_eq!(result.solved.len(), shape.len());
    assert!(result
        .solved
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite()));
    assert!(result.sum_squared_residual.is_finite());
}

#[test]
fn exhausted_budget_is_reported_not_fatal() {
    let shape = GridShape::new(5, 7);
    let points = synthetic::cylinder_grid(shape, 0.3, 1.5, 0.03, 0.6);
    let mesh = SurfaceMesh::from_points(shape, points).unwrap();
    let opts = SolveOptions {
        max_iters: 1,
        ftol: 0.0,
        xtol: 0.0,
        gtol: 0.0,
    };

    let result = flatten(&mesh, &LmBackend, &opts, EdgeObjective::SquaredLength)
        .expect("non-convergence must not be an error");
    assert!(!result.report.converged, "{:?}", result.report);
    assert_eq!(result.solved.len(), shape.len());
    assert!(result
        .solved
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite()));
}
