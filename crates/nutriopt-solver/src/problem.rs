use thiserror::Error;

/// A linear programming problem with bounded variables and range rows
#[derive(Debug, Clone, Default)]
pub struct LpProblem {
    /// Decision variables
    pub variables: Vec<Variable>,
    /// Objective function
    pub objective: Objective,
    /// Range constraints
    pub constraints: Vec<Constraint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name (for diagnostics)
    pub name: String,
    pub lower: f64,
    /// May be `f64::INFINITY`
    pub upper: f64,
}

#[derive(Debug, Clone, Default)]
pub struct Objective {
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    pub sense: Sense,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Sense {
    #[default]
    Minimize,
    Maximize,
}

/// `lower <= coefficients . x <= upper`
#[derive(Debug, Clone)]
pub struct Constraint {
    /// Name/label for the constraint (for diagnostics)
    pub name: String,
    /// Coefficients for each variable
    pub coefficients: Vec<f64>,
    /// May be `f64::NEG_INFINITY`
    pub lower: f64,
    /// May be `f64::INFINITY`
    pub upper: f64,
}

/// Structural defects that prevent a problem from being solved at all.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProblemError {
    #[error("Variable {0} has a negative or non-finite lower bound")]
    InvalidLowerBound(String),
    #[error("Variable {0} has an upper bound below its lower bound")]
    InvertedVariableBounds(String),
    #[error("Constraint {name} has {found} coefficients, expected {expected}")]
    CoefficientCount {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Objective has {found} coefficients, expected {expected}")]
    ObjectiveCount { expected: usize, found: usize },
    #[error("Non-finite coefficient in {0}")]
    NonFiniteCoefficient(String),
    #[error("Constraint {0} has NaN bounds")]
    NanBound(String),
}

impl LpProblem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a continuous variable and return its column index
    pub fn add_variable(&mut self, name: impl Into<String>, lower: f64, upper: f64) -> usize {
        self.variables.push(Variable {
            name: name.into(),
            lower,
            upper,
        });
        self.objective.coefficients.push(0.0);
        self.variables.len() - 1
    }

    pub fn set_objective(&mut self, coefficients: Vec<f64>, sense: Sense) {
        self.objective = Objective { coefficients, sense };
    }

    pub fn add_constraint(&mut self, name: impl Into<String>, coefficients: Vec<f64>, lower: f64, upper: f64) {
        self.constraints.push(Constraint {
            name: name.into(),
            coefficients,
            lower,
            upper,
        });
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Check that the problem is well formed. Inverted constraint bounds are
    /// not a defect here; they simply make the problem infeasible.
    pub fn check(&self) -> Result<(), ProblemError> {
        let n = self.num_variables();

        for v in &self.variables {
            if !v.lower.is_finite() || v.lower < 0.0 {
                return Err(ProblemError::InvalidLowerBound(v.name.clone()));
            }
            if v.upper.is_nan() || v.upper < v.lower {
                return Err(ProblemError::InvertedVariableBounds(v.name.clone()));
            }
        }

        if self.objective.coefficients.len() != n {
            return Err(ProblemError::ObjectiveCount {
                expected: n,
                found: self.objective.coefficients.len(),
            });
        }
        if self.objective.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ProblemError::NonFiniteCoefficient("objective".to_string()));
        }

        for c in &self.constraints {
            if c.coefficients.len() != n {
                return Err(ProblemError::CoefficientCount {
                    name: c.name.clone(),
                    expected: n,
                    found: c.coefficients.len(),
                });
            }
            if c.coefficients.iter().any(|x| !x.is_finite()) {
                return Err(ProblemError::NonFiniteCoefficient(c.name.clone()));
            }
            if c.lower.is_nan() || c.upper.is_nan() {
                return Err(ProblemError::NanBound(c.name.clone()));
            }
        }

        Ok(())
    }

    /// Evaluate `coefficients . values` for a row
    pub fn row_activity(coefficients: &[f64], values: &[f64]) -> f64 {
        coefficients.iter().zip(values).map(|(c, x)| c * x).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_variable_extends_objective() {
        let mut problem = LpProblem::new();
        let a = problem.add_variable("a", 0.0, f64::INFINITY);
        let b = problem.add_variable("b", 0.0, 10.0);
        assert_eq!((a, b), (0, 1));
        assert_eq!(problem.objective.coefficients, vec![0.0, 0.0]);
        assert!(problem.check().is_ok());
    }

    #[test]
    fn test_check_rejects_mismatched_row() {
        let mut problem = LpProblem::new();
        problem.add_variable("a", 0.0, f64::INFINITY);
        problem.add_constraint("short", vec![], 1.0, f64::INFINITY);
        assert_eq!(
            problem.check(),
            Err(ProblemError::CoefficientCount {
                name: "short".to_string(),
                expected: 1,
                found: 0,
            })
        );
    }

    #[test]
    fn test_check_rejects_nan_coefficient() {
        let mut problem = LpProblem::new();
        problem.add_variable("a", 0.0, f64::INFINITY);
        problem.add_constraint("protein", vec![f64::NAN], 1.0, f64::INFINITY);
        assert!(matches!(problem.check(), Err(ProblemError::NonFiniteCoefficient(_))));
    }

    #[test]
    fn test_check_rejects_negative_lower_bound() {
        let mut problem = LpProblem::new();
        problem.add_variable("a", -1.0, 5.0);
        assert_eq!(problem.check(), Err(ProblemError::InvalidLowerBound("a".to_string())));
    }
}
