use std::collections::BTreeMap;

use nutriopt_solver::{LpProblem, LpSolution, SolutionStatus, Solver};
use tracing::{debug, info, warn};

use crate::backend::LpBackend;
use crate::error::{Error, Result};
use crate::food::FoodTable;
use crate::request::OptimizationRequest;

/// Knobs that apply to every solve performed by one optimizer
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerSettings {
    /// Solved quantities at or below this many grams count as zero
    pub zero_tolerance: f64,
    /// Column always totalled when present in the table
    pub energy_column: String,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            zero_tolerance: 1e-9,
            energy_column: "energy_kcal".to_string(),
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
}

/// A food included in the diet
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFood {
    pub food_id: String,
    pub description: String,
    pub grams: f64,
    /// Nutrient mass contributed by this food, for every reported nutrient
    pub contributions: BTreeMap<String, f64>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Foods above the zero tolerance, in table order
    pub selected: Vec<SelectedFood>,
    /// `total_<nutrient>` for each reported nutrient, plus
    /// `num_items_chosen` and `objective_value`
    pub totals: BTreeMap<String, f64>,
    pub objective_value: f64,
    pub status: SolveStatus,
}

impl Solution {
    pub fn total(&self, nutrient: &str) -> Option<f64> {
        self.totals.get(&format!("total_{nutrient}")).copied()
    }

    pub fn num_items_chosen(&self) -> usize {
        self.selected.len()
    }
}

/// Builds a diet LP from a food table and request, solves it, and reads the answer back.
pub struct DietOptimizer<B = Solver> {
    backend: B,
    settings: OptimizerSettings,
}

impl Default for DietOptimizer<Solver> {
    fn default() -> Self {
        Self::with_backend(Solver::new())
    }
}

impl DietOptimizer<Solver> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<B: LpBackend> DietOptimizer<B> {
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            settings: OptimizerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OptimizerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    pub fn solve(&self, table: &FoodTable, request: &OptimizationRequest) -> Result<Solution> {
        if request.constraints.is_empty() {
            return Err(Error::EmptyConstraints);
        }
        if request.optimize_nutrients.is_empty() {
            return Err(Error::EmptyObjective);
        }

        let referenced = request.referenced_nutrients();
        let missing: Vec<String> = referenced.iter().filter(|n| !table.has_column(n)).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }

        if table.is_empty() {
            return Err(Error::EmptyCatalog);
        }
        request.validate()?;

        let mut reported = referenced;
        let energy = &self.settings.energy_column;
        if table.has_column(energy) && !reported.contains(energy) {
            reported.push(energy.clone());
        }

        let mut columns = Vec::with_capacity(reported.len());
        for name in reported {
            // Presence was checked above for every name except the energy column,
            // which is only added when present.
            let Some(index) = table.column_index(&name) else {
                return Err(Error::MissingColumns(vec![name]));
            };
            table.check_column_values(index)?;
            columns.push(ReportedColumn { name, index });
        }

        for food_id in request.food_caps.keys() {
            if !table.foods().iter().any(|f| &f.id == food_id) {
                warn!(food_id = %food_id, "cap given for a food that is not in the table");
            }
        }

        let problem = self.build_problem(table, request)?;
        info!(
            foods = table.len(),
            constraints = request.constraints.len(),
            direction = %request.direction,
            "solving diet model"
        );

        let lp = self.backend.solve(&problem);
        debug!(status = %lp.status, iterations = lp.iterations, "backend returned");

        match lp.status {
            SolutionStatus::Optimal => {}
            SolutionStatus::Infeasible => {
                warn!(violations = lp.violations.len(), "diet model is infeasible");
                return Err(Error::Infeasible {
                    violations: lp.violations,
                });
            }
            other => {
                warn!(status = %other, "solver did not reach an optimum");
                return Err(Error::Solver(other));
            }
        }

        if lp.values.len() != table.len() || lp.values.iter().any(|v| !v.is_finite()) || !lp.objective_value.is_finite() {
            warn!(values = lp.values.len(), foods = table.len(), "solver returned an unusable solution");
            return Err(Error::Solver(SolutionStatus::Error));
        }

        let solution = self.extract(table, &columns, &lp);
        info!(
            chosen = solution.num_items_chosen(),
            objective_value = solution.objective_value,
            "diet model solved"
        );
        Ok(solution)
    }

    /// One variable per food (grams), one range row per constraint, and a
    /// weighted nutrient sum as the objective.
    fn build_problem(&self, table: &FoodTable, request: &OptimizationRequest) -> Result<LpProblem> {
        let mut problem = LpProblem::new();

        for food in table.foods() {
            problem.add_variable(food.id.clone(), 0.0, request.cap_for(&food.id));
        }

        for constraint in request.constraints.iter() {
            let index = self.column(table, &constraint.name)?;
            problem.add_constraint(
                constraint.name.clone(),
                table.column(index).collect(),
                constraint.min_mass,
                constraint.max_mass,
            );
        }

        let mut objective = vec![0.0; table.len()];
        for nutrient in &request.optimize_nutrients {
            let index = self.column(table, nutrient)?;
            let weight = request.weight(nutrient);
            for (coef, amount) in objective.iter_mut().zip(table.column(index)) {
                *coef += weight * amount;
            }
        }
        problem.set_objective(objective, request.direction.into());

        debug!(
            variables = problem.num_variables(),
            rows = problem.num_constraints(),
            "built diet model"
        );
        Ok(problem)
    }

    fn column(&self, table: &FoodTable, name: &str) -> Result<usize> {
        table
            .column_index(name)
            .ok_or_else(|| Error::MissingColumns(vec![name.to_string()]))
    }

    fn extract(&self, table: &FoodTable, columns: &[ReportedColumn], lp: &LpSolution) -> Solution {
        let tolerance = self.settings.zero_tolerance;
        let mut totals = BTreeMap::new();

        // Totals run over every food, including those filtered out below.
        for column in columns {
            let total: f64 = table.column(column.index).zip(&lp.values).map(|(amount, grams)| amount * grams).sum();
            totals.insert(format!("total_{}", column.name), total);
        }

        let selected: Vec<SelectedFood> = table
            .foods()
            .iter()
            .zip(&lp.values)
            .filter(|(_, grams)| **grams > tolerance)
            .map(|(food, &grams)| SelectedFood {
                food_id: food.id.clone(),
                description: food.description.clone(),
                grams,
                contributions: columns
                    .iter()
                    .map(|c| (c.name.clone(), grams * food.amounts[c.index]))
                    .collect(),
            })
            .collect();

        totals.insert("num_items_chosen".to_string(), selected.len() as f64);
        totals.insert("objective_value".to_string(), lp.objective_value);

        Solution {
            selected,
            totals,
            objective_value: lp.objective_value,
            status: SolveStatus::Optimal,
        }
    }
}

struct ReportedColumn {
    name: String,
    index: usize,
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;
    use crate::constraint::NutrientConstraintSet;
    use crate::request::Direction;

    /// Returns a canned solution and counts calls
    struct FixedBackend {
        solution: LpSolution,
        calls: Cell<usize>,
    }

    impl FixedBackend {
        fn new(solution: LpSolution) -> Self {
            Self {
                solution,
                calls: Cell::new(0),
            }
        }
    }

    impl LpBackend for FixedBackend {
        fn solve(&self, _problem: &LpProblem) -> LpSolution {
            self.calls.set(self.calls.get() + 1);
            self.solution.clone()
        }
    }

    /// Keeps the last problem it was asked to solve
    #[derive(Default)]
    struct RecordingBackend {
        problem: RefCell<Option<LpProblem>>,
    }

    impl LpBackend for RecordingBackend {
        fn solve(&self, problem: &LpProblem) -> LpSolution {
            *self.problem.borrow_mut() = Some(problem.clone());
            Solver::new().solve(problem)
        }
    }

    fn two_foods() -> FoodTable {
        let mut table = FoodTable::new(["protein_g", "energy_kcal", "fat_g"]);
        table.push("A", "Food A", vec![0.20, 2.0, 0.05]).unwrap();
        table.push("B", "Food B", vec![0.10, 1.5, 0.01]).unwrap();
        table
    }

    fn min_protein(grams: f64) -> NutrientConstraintSet {
        let mut constraints = NutrientConstraintSet::new();
        constraints.upsert("protein_g", grams, f64::INFINITY).unwrap();
        constraints
    }

    fn scenario_a() -> OptimizationRequest {
        OptimizationRequest::new(min_protein(50.0), ["energy_kcal"], Direction::Minimize)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-6, "got {actual}, expected {expected}");
    }

    #[test]
    fn test_unique_optimum_picks_cheapest_protein() {
        let solution = DietOptimizer::new().solve(&two_foods(), &scenario_a()).unwrap();

        assert_eq!(solution.status, SolveStatus::Optimal);
        assert_eq!(solution.selected.len(), 1);
        assert_eq!(solution.selected[0].food_id, "A");
        assert_close(solution.selected[0].grams, 250.0);
        assert_close(solution.selected[0].contributions["protein_g"], 50.0);
        assert_close(solution.total("energy_kcal").unwrap(), 500.0);
        assert_close(solution.total("protein_g").unwrap(), 50.0);
        assert_eq!(solution.totals["num_items_chosen"], 1.0);
        assert_close(solution.totals["objective_value"], 500.0);
        assert_close(solution.objective_value, 500.0);
    }

    #[test]
    fn test_global_cap_makes_request_infeasible() {
        let request = scenario_a().with_max_quantity_per_food(100.0);
        let err = DietOptimizer::new().solve(&two_foods(), &request).unwrap_err();

        match err {
            Error::Infeasible { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].constraint, "protein_g");
                assert_close(violations[0].actual, 30.0);
            }
            other => panic!("Expected infeasible, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_column_fails_before_solver() {
        let mut constraints = min_protein(50.0);
        constraints.upsert("fiber_g", 25.0, f64::INFINITY).unwrap();
        let request = OptimizationRequest::new(constraints, ["energy_kcal", "sugar_g"], Direction::Minimize);

        let backend = FixedBackend::new(LpSolution::with_status(SolutionStatus::Error, 0));
        let err = DietOptimizer::with_backend(&backend).solve(&two_foods(), &request).unwrap_err();

        assert_eq!(err, Error::MissingColumns(vec!["fiber_g".to_string(), "sugar_g".to_string()]));
        assert_eq!(backend.calls.get(), 0);
    }

    #[test]
    fn test_preconditions_checked_in_order() {
        let empty_table = FoodTable::new(["protein_g", "energy_kcal"]);
        let optimizer = DietOptimizer::new();

        let no_constraints = OptimizationRequest::new(NutrientConstraintSet::new(), Vec::<String>::new(), Direction::Minimize);
        assert_eq!(optimizer.solve(&empty_table, &no_constraints), Err(Error::EmptyConstraints));

        let no_objective = OptimizationRequest::new(min_protein(1.0), Vec::<String>::new(), Direction::Minimize);
        assert_eq!(optimizer.solve(&empty_table, &no_objective), Err(Error::EmptyObjective));

        let missing = OptimizationRequest::new(min_protein(1.0), ["fiber_g"], Direction::Minimize);
        assert_eq!(
            optimizer.solve(&empty_table, &missing),
            Err(Error::MissingColumns(vec!["fiber_g".to_string()]))
        );

        assert_eq!(optimizer.solve(&empty_table, &scenario_a()), Err(Error::EmptyCatalog));
    }

    #[test]
    fn test_invalid_request_settings_fail_validation() {
        let request = scenario_a().with_max_quantity_per_food(-5.0);
        let err = DietOptimizer::new().solve(&two_foods(), &request).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_non_finite_amounts_fail_validation() {
        let mut table = FoodTable::new(["protein_g", "energy_kcal", "fat_g"]);
        table.push("A", "", vec![0.2, 2.0, f64::NAN]).unwrap();
        table.push("B", "", vec![0.1, f64::INFINITY, 0.01]).unwrap();

        let err = DietOptimizer::new().solve(&table, &scenario_a()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "{err:?}");

        // NaN in a column nobody references is left alone
        table = FoodTable::new(["protein_g", "energy_kcal", "fat_g"]);
        table.push("A", "", vec![0.2, 2.0, f64::NAN]).unwrap();
        assert!(DietOptimizer::new().solve(&table, &scenario_a()).is_ok());
    }

    #[test]
    fn test_model_construction() {
        let request = OptimizationRequest::new(
            {
                let mut c = min_protein(50.0);
                c.upsert("fat_g", 0.0, 40.0).unwrap();
                c
            },
            ["energy_kcal", "fat_g"],
            Direction::Maximize,
        )
        .with_weight("fat_g", 9.0)
        .with_max_quantity_per_food(300.0)
        .with_food_cap("B", 10.0);

        let backend = RecordingBackend::default();
        let _ = DietOptimizer::with_backend(&backend).solve(&two_foods(), &request);
        let problem = backend.problem.borrow().clone().unwrap();

        assert_eq!(problem.num_variables(), 2);
        assert_eq!(problem.variables[0].name, "A");
        assert_eq!((problem.variables[0].lower, problem.variables[0].upper), (0.0, 300.0));
        assert_eq!(problem.variables[1].upper, 10.0);

        // Rows follow constraint name order
        assert_eq!(problem.constraints[0].name, "fat_g");
        assert_eq!(problem.constraints[0].coefficients, vec![0.05, 0.01]);
        assert_eq!((problem.constraints[0].lower, problem.constraints[0].upper), (0.0, 40.0));
        assert_eq!(problem.constraints[1].name, "protein_g");
        assert_eq!(problem.constraints[1].upper, f64::INFINITY);

        assert_eq!(problem.objective.sense, nutriopt_solver::Sense::Maximize);
        assert_close(problem.objective.coefficients[0], 2.0 + 9.0 * 0.05);
        assert_close(problem.objective.coefficients[1], 1.5 + 9.0 * 0.01);
    }

    #[test]
    fn test_near_zero_quantities_are_filtered_but_totalled() {
        let backend = FixedBackend::new(LpSolution::optimal(vec![250.0, 1e-12], 500.0, 1));
        let solution = DietOptimizer::with_backend(&backend).solve(&two_foods(), &scenario_a()).unwrap();

        assert_eq!(solution.num_items_chosen(), 1);
        assert!(solution.selected.iter().all(|s| s.grams > 1e-9));
        let expected = 0.2 * 250.0 + 0.1 * 1e-12;
        assert!((solution.total("protein_g").unwrap() - expected).abs() < 1e-12);
        assert_eq!(solution.totals["num_items_chosen"], 1.0);
    }

    #[test]
    fn test_non_optimal_statuses_map_to_solver_error() {
        for status in [SolutionStatus::Unbounded, SolutionStatus::IterationLimit, SolutionStatus::Error] {
            let backend = FixedBackend::new(LpSolution::with_status(status, 0));
            let err = DietOptimizer::with_backend(&backend).solve(&two_foods(), &scenario_a()).unwrap_err();
            assert_eq!(err, Error::Solver(status));
        }
    }

    #[test]
    fn test_malformed_backend_answer_is_rejected() {
        let backend = FixedBackend::new(LpSolution::optimal(vec![250.0], 500.0, 1));
        let err = DietOptimizer::with_backend(&backend).solve(&two_foods(), &scenario_a()).unwrap_err();
        assert_eq!(err, Error::Solver(SolutionStatus::Error));
    }

    #[test]
    fn test_maximize_under_energy_ceiling() {
        let mut constraints = NutrientConstraintSet::new();
        constraints.upsert("energy_kcal", 0.0, 300.0).unwrap();
        let request = OptimizationRequest::new(constraints, ["protein_g"], Direction::Maximize).with_max_quantity_per_food(100.0);

        let solution = DietOptimizer::new().solve(&two_foods(), &request).unwrap();

        assert_close(solution.objective_value, 80.0 / 3.0);
        assert_close(solution.total("energy_kcal").unwrap(), 300.0);
        assert_eq!(solution.num_items_chosen(), 2);
        assert_close(solution.selected[0].grams, 100.0);
        assert_close(solution.selected[1].grams, 200.0 / 3.0);
    }

    #[test]
    fn test_weights_change_the_choice() {
        let mut table = FoodTable::new(["protein_g", "energy_kcal", "sodium_mg"]);
        table.push("A", "", vec![0.2, 2.0, 0.0]).unwrap();
        table.push("B", "", vec![0.1, 0.8, 0.05]).unwrap();
        let request = OptimizationRequest::new(min_protein(50.0), ["energy_kcal", "sodium_mg"], Direction::Minimize);

        let equal = DietOptimizer::new().solve(&table, &request).unwrap();
        assert_eq!(equal.selected[0].food_id, "B");
        assert_close(equal.selected[0].grams, 500.0);

        let weighted = DietOptimizer::new().solve(&table, &request.with_weight("sodium_mg", 10.0)).unwrap();
        assert_eq!(weighted.selected[0].food_id, "A");
        assert_close(weighted.selected[0].grams, 250.0);
        assert_close(weighted.objective_value, 500.0);
    }

    #[test]
    fn test_per_food_cap_overrides_global() {
        let request = scenario_a().with_food_cap("A", 100.0);
        let solution = DietOptimizer::new().solve(&two_foods(), &request).unwrap();

        assert_eq!(solution.num_items_chosen(), 2);
        assert_close(solution.selected[0].grams, 100.0);
        assert_close(solution.selected[1].grams, 300.0);
        assert_close(solution.total("energy_kcal").unwrap(), 650.0);
    }

    #[test]
    fn test_energy_total_reported_when_not_referenced() {
        let request = OptimizationRequest::new(min_protein(50.0), ["fat_g"], Direction::Minimize);
        let solution = DietOptimizer::new().solve(&two_foods(), &request).unwrap();

        assert_eq!(solution.selected[0].food_id, "B");
        assert_close(solution.total("energy_kcal").unwrap(), 750.0);
        assert!(solution.selected[0].contributions.contains_key("energy_kcal"));
    }

    #[test]
    fn test_totals_match_every_food() {
        let request = scenario_a().with_food_cap("A", 60.0);
        let solution = DietOptimizer::new().solve(&two_foods(), &request).unwrap();
        let table = two_foods();

        for name in ["protein_g", "energy_kcal"] {
            let column = table.column_index(name).unwrap();
            let expected: f64 = table
                .foods()
                .iter()
                .map(|f| {
                    let grams = solution.selected.iter().find(|s| s.food_id == f.id).map_or(0.0, |s| s.grams);
                    grams * f.amounts[column]
                })
                .sum();
            assert!((solution.total(name).unwrap() - expected).abs() < 1e-6, "{name}");
        }
    }

    #[test]
    fn test_resolve_is_reproducible() {
        let optimizer = DietOptimizer::new();
        let first = optimizer.solve(&two_foods(), &scenario_a()).unwrap();
        let second = optimizer.solve(&two_foods(), &scenario_a()).unwrap();
        assert!((first.objective_value - second.objective_value).abs() < 1e-9);
    }

    #[test]
    fn test_loosening_bounds_restores_feasibility() {
        let optimizer = DietOptimizer::new();
        let tight = scenario_a().with_max_quantity_per_food(100.0);
        assert!(matches!(optimizer.solve(&two_foods(), &tight), Err(Error::Infeasible { .. })));

        let loose = scenario_a().with_max_quantity_per_food(250.0);
        assert!(optimizer.solve(&two_foods(), &loose).is_ok());

        let mut narrowed = min_protein(50.0);
        narrowed.upsert("protein_g", 50.0, 49.0).unwrap_err();
        narrowed.upsert("energy_kcal", 0.0, 400.0).unwrap();
        let request = OptimizationRequest::new(narrowed, ["energy_kcal"], Direction::Minimize);
        assert!(matches!(optimizer.solve(&two_foods(), &request), Err(Error::Infeasible { .. })));
    }

    #[test]
    fn test_custom_energy_column_and_tolerance() {
        let settings = OptimizerSettings {
            zero_tolerance: 1.0,
            energy_column: "fat_g".to_string(),
        };
        let backend = FixedBackend::new(LpSolution::optimal(vec![250.0, 0.5], 500.75, 1));
        let optimizer = DietOptimizer::with_backend(&backend).with_settings(settings);
        let solution = optimizer.solve(&two_foods(), &scenario_a()).unwrap();

        assert_eq!(solution.num_items_chosen(), 1);
        assert_close(solution.total("fat_g").unwrap(), 250.0 * 0.05 + 0.5 * 0.01);
    }
}
