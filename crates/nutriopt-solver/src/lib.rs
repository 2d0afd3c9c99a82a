mod problem;
mod simplex;
mod solution;

pub use problem::{Constraint, LpProblem, Objective, ProblemError, Sense, Variable};
pub use simplex::Solver;
pub use solution::{ConstraintViolation, LpSolution, SolutionStatus};
