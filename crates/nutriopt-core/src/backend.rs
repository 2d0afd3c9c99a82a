use nutriopt_solver::{LpProblem, LpSolution, Solver};

/// A linear-program solving capability.
///
/// Implementations receive a fully built problem and report a status, and on
/// optimality the per-variable values and objective. They must not retain
/// the problem between calls.
pub trait LpBackend {
    fn solve(&self, problem: &LpProblem) -> LpSolution;
}

impl LpBackend for Solver {
    fn solve(&self, problem: &LpProblem) -> LpSolution {
        Solver::solve(self, problem)
    }
}

impl<B: LpBackend + ?Sized> LpBackend for &B {
    fn solve(&self, problem: &LpProblem) -> LpSolution {
        (**self).solve(problem)
    }
}

impl<B: LpBackend + ?Sized> LpBackend for Box<B> {
    fn solve(&self, problem: &LpProblem) -> LpSolution {
        (**self).solve(problem)
    }
}
