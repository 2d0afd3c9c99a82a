use nutriopt_solver::{ConstraintViolation, SolutionStatus};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Malformed constraint '{line}': {reason}")]
    Parse { line: String, reason: String },
    #[error("Invalid constraint: {0}")]
    Validation(String),
    #[error("Line {number} ('{line}'): {source}")]
    AtLine {
        number: usize,
        line: String,
        source: Box<Error>,
    },
    #[error("Food table is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("No nutrient constraints were given")]
    EmptyConstraints,
    #[error("No nutrients were selected for optimization")]
    EmptyObjective,
    #[error("Food table has no rows")]
    EmptyCatalog,
    #[error("No combination of foods satisfies all constraints{}", describe_violations(.violations))]
    Infeasible { violations: Vec<ConstraintViolation> },
    #[error("Solver finished with status {0}")]
    Solver(SolutionStatus),
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// The underlying error with any line context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::AtLine { source, .. } => source.root(),
            other => other,
        }
    }
}

fn describe_violations(violations: &[ConstraintViolation]) -> String {
    if violations.is_empty() {
        return String::new();
    }
    let parts: Vec<&str> = violations.iter().map(|v| v.description.as_str()).collect();
    format!(" ({})", parts.join("; "))
}
