use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use nutriopt_solver::Sense;

use crate::constraint::NutrientConstraintSet;
use crate::error::{Error, Result};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Minimize,
    Maximize,
}

impl From<Direction> for Sense {
    fn from(value: Direction) -> Sense {
        match value {
            Direction::Minimize => Sense::Minimize,
            Direction::Maximize => Sense::Maximize,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "min" | "minimize" | "minimization" => Ok(Direction::Minimize),
            "max" | "maximize" | "maximization" => Ok(Direction::Maximize),
            other => Err(Error::Validation(format!(
                "unknown optimization direction '{other}', expected 'min' or 'max'"
            ))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Minimize => f.write_str("minimize"),
            Direction::Maximize => f.write_str("maximize"),
        }
    }
}

/// Everything one solve needs besides the food table.
#[derive(Debug, Clone)]
pub struct OptimizationRequest {
    pub constraints: NutrientConstraintSet,
    /// Nutrients whose weighted sum forms the objective
    pub optimize_nutrients: Vec<String>,
    /// Objective weight per nutrient; missing entries weigh 1.0
    pub weights: HashMap<String, f64>,
    /// Cap in grams applied to every food
    pub max_quantity_per_food: Option<f64>,
    /// Per-food caps in grams, keyed by food id, overriding the global cap
    pub food_caps: HashMap<String, f64>,
    pub direction: Direction,
}

impl OptimizationRequest {
    pub fn new<I, S>(constraints: NutrientConstraintSet, optimize_nutrients: I, direction: Direction) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            constraints,
            optimize_nutrients: optimize_nutrients.into_iter().map(Into::into).collect(),
            weights: HashMap::new(),
            max_quantity_per_food: None,
            food_caps: HashMap::new(),
            direction,
        }
    }

    pub fn with_max_quantity_per_food(mut self, grams: f64) -> Self {
        self.max_quantity_per_food = Some(grams);
        self
    }

    pub fn with_weight(mut self, nutrient: impl Into<String>, weight: f64) -> Self {
        self.weights.insert(nutrient.into(), weight);
        self
    }

    pub fn with_food_cap(mut self, food_id: impl Into<String>, grams: f64) -> Self {
        self.food_caps.insert(food_id.into(), grams);
        self
    }

    pub fn weight(&self, nutrient: &str) -> f64 {
        self.weights.get(nutrient).copied().unwrap_or(1.0)
    }

    /// Upper bound in grams for one food
    pub fn cap_for(&self, food_id: &str) -> f64 {
        self.food_caps
            .get(food_id)
            .copied()
            .or(self.max_quantity_per_food)
            .unwrap_or(f64::INFINITY)
    }

    /// Nutrients referenced by constraints or the objective, deduplicated, constraints first
    pub fn referenced_nutrients(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constraints.names().map(str::to_string).collect();
        for n in &self.optimize_nutrients {
            if !names.contains(n) {
                names.push(n.clone());
            }
        }
        names
    }

    /// Check caps and weights. Emptiness and column checks belong to the optimizer.
    pub fn validate(&self) -> Result<()> {
        if let Some(cap) = self.max_quantity_per_food {
            if !cap.is_finite() || cap <= 0.0 {
                return Err(Error::Validation(format!(
                    "max quantity per food must be a positive number of grams, got {cap}"
                )));
            }
        }
        for (food, &cap) in &self.food_caps {
            if !cap.is_finite() || cap < 0.0 {
                return Err(Error::Validation(format!("cap for food {food} must be non-negative, got {cap}")));
            }
        }
        for (nutrient, &weight) in &self.weights {
            if !weight.is_finite() {
                return Err(Error::Validation(format!("weight for {nutrient} must be finite")));
            }
        }
        Ok(())
    }
}
