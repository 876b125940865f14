use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};
use dewarp_core::Real;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

/// Owns the current parameter vector on behalf of a borrowed [`NllsProblem`].
///
/// Non-finite residuals or Jacobian entries are reported to the solver as a
/// failed evaluation, which ends the minimization without convergence.
struct LmAdapter<'a, P: NllsProblem> {
    problem: &'a P,
    x: DVector<Real>,
}

impl<P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmAdapter<'_, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.x.copy_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.x);
        r.iter().all(|v| v.is_finite()).then_some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        let j = self.problem.jacobian(&self.x);
        j.iter().all(|v| v.is_finite()).then_some(j)
    }
}

/// MINPACK-style Levenberg-Marquardt from the `levenberg-marquardt` crate.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        debug_assert_eq!(x0.len(), problem.num_params());
        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let (adapter, report) = lm.minimize(LmAdapter { problem, x: x0 });
        debug!(
            "lm: {:?} after {} evaluations, cost {:e}",
            report.termination, report.number_of_evaluations, report.objective_function
        );

        (
            adapter.x,
            SolveReport {
                evaluations: report.number_of_evaluations,
                final_cost: report.objective_function,
                converged: report.termination.was_successful(),
                termination: format!("{:?}", report.termination),
            },
        )
    }
}
