use tracing::{debug, trace};

use crate::problem::{LpProblem, Sense};
use crate::solution::{ConstraintViolation, LpSolution, SolutionStatus};

/// Simplex solver for linear programming problems
pub struct Solver {
    /// Maximum pivots per phase before giving up
    max_iterations: usize,
    /// Tolerance for pivot selection and zero tests
    tolerance: f64,
    /// Largest artificial residue still accepted as feasible
    feasibility_tolerance: f64,
}

impl Default for Solver {
    fn default() -> Self {
        Self {
            max_iterations: 50_000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-7,
        }
    }
}

impl Solver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    pub fn with_feasibility_tolerance(mut self, tol: f64) -> Self {
        self.feasibility_tolerance = tol;
        self
    }

    /// Solve the LP problem using the two-phase simplex method
    pub fn solve(&self, problem: &LpProblem) -> LpSolution {
        if let Err(e) = problem.check() {
            debug!(error = %e, "rejecting malformed problem");
            return LpSolution::with_status(SolutionStatus::Error, 0);
        }

        let conflicts = self.find_conflicts(problem);
        if !conflicts.is_empty() {
            return LpSolution::infeasible(conflicts, 0);
        }

        let rows = self.standard_rows(problem);
        let mut tableau = Tableau::new(problem, &rows);
        debug!(
            rows = rows.len(),
            columns = tableau.rhs_col + 1,
            artificials = tableau.rhs_col - tableau.art_start,
            "built simplex tableau"
        );

        let mut iterations = 0;

        // Phase 1: Find initial basic feasible solution
        if tableau.art_start < tableau.rhs_col {
            match self.phase1(&mut tableau, &mut iterations) {
                Phase1::Feasible => {}
                Phase1::Infeasible => {
                    let values = tableau.values();
                    let violations = self.find_violations(problem, &values);
                    debug!(iterations, violations = violations.len(), "phase 1 found no feasible point");
                    return LpSolution::infeasible(violations, iterations);
                }
                Phase1::IterationLimit => {
                    return LpSolution::with_status(SolutionStatus::IterationLimit, iterations);
                }
            }
        }

        // Phase 2: Optimize
        let limit = tableau.art_start;
        match self.run(&mut tableau, limit, &mut iterations) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => {
                return LpSolution::with_status(SolutionStatus::Unbounded, iterations);
            }
            SimplexResult::IterationLimit => {
                return LpSolution::with_status(SolutionStatus::IterationLimit, iterations);
            }
        }

        let values = tableau.values();
        let objective_value = LpProblem::row_activity(&problem.objective.coefficients, &values);
        debug!(iterations, objective_value, "simplex reached optimum");
        LpSolution::optimal(values, objective_value, iterations)
    }

    /// Range rows whose bounds contradict each other can be reported without pivoting
    fn find_conflicts(&self, problem: &LpProblem) -> Vec<ConstraintViolation> {
        problem
            .constraints
            .iter()
            .filter(|c| c.lower > c.upper + self.tolerance || c.lower == f64::INFINITY || c.upper == f64::NEG_INFINITY)
            .map(|c| ConstraintViolation {
                constraint: c.name.clone(),
                required: c.lower,
                actual: c.upper,
                violation_amount: c.lower - c.upper,
                description: format!(
                    "Conflict: {} requires >= {:.2} but also <= {:.2}",
                    c.name, c.lower, c.upper
                ),
            })
            .collect()
    }

    /// Find which range constraints are violated by a given point
    fn find_violations(&self, problem: &LpProblem, values: &[f64]) -> Vec<ConstraintViolation> {
        let mut violations = Vec::new();

        for c in &problem.constraints {
            let lhs = LpProblem::row_activity(&c.coefficients, values);
            let slack = self.feasibility_tolerance * (1.0 + lhs.abs());

            if lhs < c.lower - slack {
                let amt = c.lower - lhs;
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.lower,
                    actual: lhs,
                    violation_amount: amt,
                    description: format!("{} is below minimum of {:.2} by {:.2}", c.name, c.lower, amt),
                });
            } else if lhs > c.upper + slack {
                let amt = lhs - c.upper;
                violations.push(ConstraintViolation {
                    constraint: c.name.clone(),
                    required: c.upper,
                    actual: lhs,
                    violation_amount: amt,
                    description: format!("{} exceeds maximum of {:.2} by {:.2}", c.name, c.upper, amt),
                });
            }
        }

        // Worst first
        violations.sort_by(|a, b| b.violation_amount.total_cmp(&a.violation_amount));
        violations
    }

    /// Expand range constraints and variable bounds into single-sided rows
    /// with non-negative right-hand sides.
    fn standard_rows(&self, problem: &LpProblem) -> Vec<Row> {
        let n = problem.num_variables();
        let mut rows = Vec::new();

        for c in &problem.constraints {
            let is_equality = c.lower.is_finite() && c.upper.is_finite() && (c.upper - c.lower).abs() <= self.tolerance;
            if is_equality {
                rows.push(Row::new(c.coefficients.clone(), RowOp::Eq, c.lower));
                continue;
            }

            // A non-positive lower bound on a row with non-negative coefficients
            // can never bind since every variable is non-negative.
            let trivial_lower = c.lower <= 0.0 && c.coefficients.iter().all(|&a| a >= 0.0);
            if c.lower.is_finite() && !trivial_lower {
                rows.push(Row::new(c.coefficients.clone(), RowOp::Ge, c.lower));
            }
            if c.upper.is_finite() {
                rows.push(Row::new(c.coefficients.clone(), RowOp::Le, c.upper));
            }
        }

        for (j, v) in problem.variables.iter().enumerate() {
            if v.lower > 0.0 {
                rows.push(Row::new(unit_vector(n, j), RowOp::Ge, v.lower));
            }
            if v.upper.is_finite() {
                rows.push(Row::new(unit_vector(n, j), RowOp::Le, v.upper));
            }
        }

        rows
    }

    fn phase1(&self, tableau: &mut Tableau, iterations: &mut usize) -> Phase1 {
        let obj = tableau.obj_row();
        let n_cols = tableau.rhs_col + 1;
        let art_start = tableau.art_start;

        // Save original objective
        let orig_obj = tableau.data[obj].clone();

        // Maximize -sum(artificials), priced out against the starting basis
        tableau.data[obj] = vec![0.0; n_cols];
        for j in art_start..tableau.rhs_col {
            tableau.data[obj][j] = -1.0;
        }
        for i in 0..obj {
            if tableau.basic[i] >= art_start {
                for j in 0..n_cols {
                    tableau.data[obj][j] += tableau.data[i][j];
                }
            }
        }

        let limit = tableau.rhs_col;
        match self.run(tableau, limit, iterations) {
            SimplexResult::Optimal => {}
            SimplexResult::Unbounded => return Phase1::Infeasible,
            SimplexResult::IterationLimit => return Phase1::IterationLimit,
        }

        let rhs_col = tableau.rhs_col;
        for i in 0..obj {
            if tableau.basic[i] >= art_start && tableau.data[i][rhs_col] > self.feasibility_tolerance {
                return Phase1::Infeasible;
            }
        }

        // Drive zero-level artificials out of the basis. Rows with no usable
        // structural entry are redundant and keep their artificial.
        for i in 0..obj {
            if tableau.basic[i] < art_start {
                continue;
            }
            let entering = (0..art_start).find(|&j| tableau.data[i][j].abs() > self.tolerance);
            if let Some(j) = entering {
                trace!(row = i, column = j, "pivoting out artificial");
                self.pivot(tableau, i, j);
            }
        }

        // Restore original objective and price out the basis
        tableau.data[obj] = orig_obj;
        for i in 0..obj {
            let basic = tableau.basic[i];
            let ratio = tableau.data[obj][basic];
            if ratio.abs() > 0.0 {
                for j in 0..n_cols {
                    tableau.data[obj][j] -= ratio * tableau.data[i][j];
                }
            }
        }

        Phase1::Feasible
    }

    /// Pivot until no column below `limit` can improve the objective
    fn run(&self, tableau: &mut Tableau, limit: usize, iterations: &mut usize) -> SimplexResult {
        for _ in 0..self.max_iterations {
            let Some(pivot_col) = self.find_pivot_column(tableau, limit) else {
                return SimplexResult::Optimal;
            };
            let Some(pivot_row) = self.find_pivot_row(tableau, pivot_col) else {
                return SimplexResult::Unbounded;
            };
            self.pivot(tableau, pivot_row, pivot_col);
            *iterations += 1;
        }
        SimplexResult::IterationLimit
    }

    /// Bland's rule: lowest-index column with a positive reduced cost
    fn find_pivot_column(&self, tableau: &Tableau, limit: usize) -> Option<usize> {
        let obj = tableau.obj_row();
        (0..limit).find(|&j| tableau.data[obj][j] > self.tolerance)
    }

    /// Minimum ratio test, ties broken toward the lowest basic index
    fn find_pivot_row(&self, tableau: &Tableau, col: usize) -> Option<usize> {
        let rhs_col = tableau.rhs_col;

        let mut min_ratio = f64::INFINITY;
        let mut min_row: Option<usize> = None;

        for i in 0..tableau.obj_row() {
            let val = tableau.data[i][col];
            if val <= self.tolerance {
                continue;
            }
            let ratio = tableau.data[i][rhs_col].max(0.0) / val;
            let better = match min_row {
                None => true,
                Some(r) => {
                    ratio < min_ratio - self.tolerance
                        || ((ratio - min_ratio).abs() <= self.tolerance && tableau.basic[i] < tableau.basic[r])
                }
            };
            if better {
                min_ratio = ratio;
                min_row = Some(i);
            }
        }

        min_row
    }

    fn pivot(&self, tableau: &mut Tableau, row: usize, col: usize) {
        let n_cols = tableau.rhs_col + 1;

        tableau.basic[row] = col;

        let pivot_val = tableau.data[row][col];
        for j in 0..n_cols {
            tableau.data[row][j] /= pivot_val;
        }

        let pivot_row = tableau.data[row].clone();
        for (i, data) in tableau.data.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let factor = data[col];
            if factor == 0.0 {
                continue;
            }
            for (cell, p) in data.iter_mut().zip(&pivot_row) {
                *cell -= factor * p;
            }
        }
    }
}

fn unit_vector(n: usize, j: usize) -> Vec<f64> {
    let mut v = vec![0.0; n];
    v[j] = 1.0;
    v
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOp {
    Le,
    Ge,
    Eq,
}

struct Row {
    coefficients: Vec<f64>,
    op: RowOp,
    rhs: f64,
}

impl Row {
    fn new(mut coefficients: Vec<f64>, mut op: RowOp, mut rhs: f64) -> Self {
        if rhs < 0.0 {
            rhs = -rhs;
            for c in coefficients.iter_mut() {
                *c = -*c;
            }
            op = match op {
                RowOp::Le => RowOp::Ge,
                RowOp::Ge => RowOp::Le,
                RowOp::Eq => RowOp::Eq,
            };
        }
        Self { coefficients, op, rhs }
    }
}

/// Dense tableau. Columns are laid out as structural variables, then
/// slack/surplus, then artificials, then the right-hand side. The last row
/// holds reduced costs of the (maximization) objective.
struct Tableau {
    data: Vec<Vec<f64>>,
    basic: Vec<usize>,
    n_vars: usize,
    art_start: usize,
    rhs_col: usize,
}

impl Tableau {
    fn new(problem: &LpProblem, rows: &[Row]) -> Self {
        let n_vars = problem.num_variables();
        let n_slack = rows.iter().filter(|r| r.op != RowOp::Eq).count();
        let n_artificial = rows.iter().filter(|r| r.op != RowOp::Le).count();

        let art_start = n_vars + n_slack;
        let rhs_col = art_start + n_artificial;

        let mut data = vec![vec![0.0; rhs_col + 1]; rows.len() + 1];
        let mut basic = vec![0; rows.len()];

        let mut slack_idx = n_vars;
        let mut artificial_idx = art_start;

        for (i, row) in rows.iter().enumerate() {
            data[i][..n_vars].copy_from_slice(&row.coefficients);
            data[i][rhs_col] = row.rhs;

            match row.op {
                RowOp::Le => {
                    data[i][slack_idx] = 1.0;
                    basic[i] = slack_idx;
                    slack_idx += 1;
                }
                RowOp::Ge => {
                    data[i][slack_idx] = -1.0;
                    slack_idx += 1;
                    data[i][artificial_idx] = 1.0;
                    basic[i] = artificial_idx;
                    artificial_idx += 1;
                }
                RowOp::Eq => {
                    data[i][artificial_idx] = 1.0;
                    basic[i] = artificial_idx;
                    artificial_idx += 1;
                }
            }
        }

        // Simplex maximizes, so minimization negates the costs
        let obj = rows.len();
        for (j, &coef) in problem.objective.coefficients.iter().enumerate() {
            data[obj][j] = match problem.objective.sense {
                Sense::Minimize => -coef,
                Sense::Maximize => coef,
            };
        }

        Self {
            data,
            basic,
            n_vars,
            art_start,
            rhs_col,
        }
    }

    fn obj_row(&self) -> usize {
        self.data.len() - 1
    }

    /// Current basic solution restricted to structural variables
    fn values(&self) -> Vec<f64> {
        let mut values = vec![0.0; self.n_vars];
        for (i, &b) in self.basic.iter().enumerate() {
            if b < self.n_vars {
                values[b] = self.data[i][self.rhs_col];
            }
        }
        values
    }
}

enum SimplexResult {
    Optimal,
    Unbounded,
    IterationLimit,
}

enum Phase1 {
    Feasible,
    Infeasible,
    IterationLimit,
}
