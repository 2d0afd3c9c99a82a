use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use nutriopt_core::{
    DietOptimizer, Direction, Error, FoodRow, FoodTable, NutrientConstraintSet, OptimizationRequest, OptimizerSettings,
    Solution,
};
use nutriopt_solver::ConstraintViolation;
use tracing::info;

#[derive(Parser)]
#[command(name = "nutriopt")]
#[command(about = "Pick food quantities that meet nutrient targets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the nutrient columns of a food table
    Columns {
        /// Food table as a JSON array of rows (amounts per gram)
        #[arg(long)]
        foods: PathBuf,
    },
    /// Check a constraint file for errors
    Check {
        /// The constraint file (name,min,max lines or a JSON object)
        file: PathBuf,
        /// Only accept nutrients present in this food table
        #[arg(long)]
        foods: Option<PathBuf>,
    },
    /// Solve for the optimal diet
    Solve {
        /// Food table as a JSON array of rows (amounts per gram)
        #[arg(long)]
        foods: PathBuf,
        /// The constraint file (name,min,max lines or a JSON object)
        #[arg(short, long)]
        constraints: PathBuf,
        /// Nutrient to optimize; repeat for a weighted sum
        #[arg(short, long = "optimize", required = true)]
        optimize: Vec<String>,
        /// min or max
        #[arg(short, long, default_value = "min")]
        direction: String,
        /// Most grams of any single food
        #[arg(long)]
        max_per_food: Option<f64>,
        /// Objective weight as nutrient=weight
        #[arg(long = "weight", value_parser = parse_key_value)]
        weights: Vec<(String, f64)>,
        /// Cap for one food as food_id=grams
        #[arg(long = "food-cap", value_parser = parse_key_value)]
        food_caps: Vec<(String, f64)>,
        /// Optimizer settings (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Output format (json, pretty)
        #[arg(short, long, default_value = "pretty")]
        format: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Columns { foods } => {
            let table = load_foods(&foods);
            for name in table.nutrient_columns() {
                println!("{}", name);
            }
        }
        Commands::Check { file, foods } => {
            let valid: Option<HashSet<String>> =
                foods.map(|path| load_foods(&path).nutrient_columns().iter().cloned().collect());

            match load_constraints(&file, valid.as_ref()) {
                Ok(set) => {
                    let bounded = set.iter().filter(|c| c.is_upper_bounded()).count();
                    println!("✓ {} is valid", file.display());
                    println!("  {} constraints", set.len());
                    println!("  {} with a maximum", bounded);
                    for c in set.iter() {
                        println!("  {}", c);
                    }
                }
                Err(e) => {
                    eprintln!("✗ {} has errors:", file.display());
                    eprintln!("  {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Solve {
            foods,
            constraints,
            optimize,
            direction,
            max_per_food,
            weights,
            food_caps,
            config,
            format,
        } => {
            let table = load_foods(&foods);
            let valid: HashSet<String> = table.nutrient_columns().iter().cloned().collect();

            let set = match load_constraints(&constraints, Some(&valid)) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Constraint error: {}", e);
                    std::process::exit(1);
                }
            };

            let direction: Direction = match direction.parse() {
                Ok(d) => d,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };

            let mut request = OptimizationRequest::new(set, optimize, direction);
            if let Some(cap) = max_per_food {
                request = request.with_max_quantity_per_food(cap);
            }
            for (nutrient, weight) in weights {
                request = request.with_weight(nutrient, weight);
            }
            for (food_id, cap) in food_caps {
                request = request.with_food_cap(food_id, cap);
            }

            let settings = match config {
                Some(path) => read_json::<OptimizerSettings>(&path),
                None => OptimizerSettings::default(),
            };

            let optimizer = DietOptimizer::new().with_settings(settings);
            info!(foods = table.len(), "loaded food table");

            match optimizer.solve(&table, &request) {
                Ok(solution) => {
                    if format == "json" {
                        match serde_json::to_string_pretty(&solution) {
                            Ok(s) => println!("{}", s),
                            Err(e) => {
                                eprintln!("Error writing JSON: {}", e);
                                std::process::exit(1);
                            }
                        }
                    } else {
                        print_solution(&solution, &request);
                    }
                }
                Err(Error::Infeasible { violations }) => {
                    eprint!("{}", infeasible_report(&violations));
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn print_solution(solution: &Solution, request: &OptimizationRequest) {
    println!("Status: OPTIMAL");
    println!(
        "Objective ({} {}): {:.2}",
        request.direction,
        request.optimize_nutrients.join(" + "),
        solution.objective_value
    );
    println!();

    println!("Foods:");
    for food in &solution.selected {
        let label = if food.description.is_empty() {
            &food.food_id
        } else {
            &food.description
        };
        println!("  {:40} {:10.2} g", label, food.grams);
        for nutrient in &request.optimize_nutrients {
            if let Some(amount) = food.contributions.get(nutrient) {
                println!("    {:36} {:10.2}", nutrient, amount);
            }
        }
    }
    println!();

    println!("Totals:");
    for (name, value) in &solution.totals {
        println!("  {:30} {:12.2}", name, value);
    }
}

fn infeasible_report(violations: &[ConstraintViolation]) -> String {
    let mut report = String::from("Status: INFEASIBLE\nNo combination of foods satisfies all constraints.\n");
    for v in violations {
        report.push_str(&format!("  - {}\n", v.description));
    }
    report
}

fn load_foods(path: &Path) -> FoodTable {
    let rows: Vec<FoodRow> = read_json(path);
    match FoodTable::from_rows(rows) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("Error in food table {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

/// JSON files hold `{"nutrient": [min, max]}` with `null` for no maximum;
/// anything else is read as constraint lines.
fn load_constraints(path: &Path, valid: Option<&HashSet<String>>) -> Result<NutrientConstraintSet, Error> {
    if path.extension().is_some_and(|ext| ext == "json") {
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let pairs: BTreeMap<String, (f64, Option<f64>)> = serde_json::from_str(&text).map_err(|e| Error::Parse {
            line: path.display().to_string(),
            reason: e.to_string(),
        })?;
        NutrientConstraintSet::load_from_pairs(pairs, valid)
    } else {
        NutrientConstraintSet::load_from_file(path, valid)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> T {
    let source = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading file {}: {}", path.display(), e);
            std::process::exit(1);
        }
    };
    match serde_json::from_str(&source) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error parsing {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn parse_key_value(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((key.trim().to_string(), value))
}
