pub mod backend;
pub mod constraint;
pub mod error;
pub mod food;
pub mod optimizer;
pub mod request;

pub use backend::LpBackend;
pub use constraint::{NutrientConstraint, NutrientConstraintSet};
pub use error::{Error, Result};
pub use food::{Food, FoodRow, FoodTable};
pub use optimizer::{DietOptimizer, OptimizerSettings, SelectedFood, SolveStatus, Solution};
pub use request::{Direction, OptimizationRequest};
