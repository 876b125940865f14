//! Non-linear least-squares machinery and the planar relaxation (flattening)
//! problem built on `levenberg-marquardt`.
//!
//! The problem/backends split keeps the flattening residuals independent of the
//! solver: [`NllsProblem`] describes residuals and Jacobian, [`NllsSolverBackend`]
//! minimizes them.

pub mod backend_lm;
pub mod flatten;
pub mod traits;

pub use crate::backend_lm::LmBackend;
pub use crate::flatten::{
    edge_distortion, flatten, flatten_from, EdgeObjective, FlattenError, FlattenProblem,
    FlattenResult,
};
pub use crate::traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
