use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{Error, Result};

/// Admissible total mass range for one nutrient, in the food table's units.
#[derive(Debug, Clone, PartialEq)]
pub struct NutrientConstraint {
    pub name: String,
    pub min_mass: f64,
    /// `f64::INFINITY` when unbounded
    pub max_mass: f64,
}

impl NutrientConstraint {
    pub fn new(name: impl Into<String>, min_mass: f64, max_mass: f64) -> Self {
        Self {
            name: name.into(),
            min_mass,
            max_mass,
        }
    }

    /// Parse `name,min,max`. A `-` bound means 0 for min and unbounded for max.
    ///
    /// ```
    /// use nutriopt_core::NutrientConstraint;
    ///
    /// let c = NutrientConstraint::parse("sodium_mg, 0, -", None).unwrap();
    /// assert_eq!(c.max_mass, f64::INFINITY);
    /// ```
    pub fn parse(line: &str, valid_names: Option<&HashSet<String>>) -> Result<Self> {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 3 {
            return Err(Error::Parse {
                line: line.to_string(),
                reason: format!("expected 3 fields in the form name,min,max but found {}", fields.len()),
            });
        }

        let min_mass = parse_bound(line, fields[1], 0.0)?;
        let max_mass = parse_bound(line, fields[2], f64::INFINITY)?;

        let constraint = Self::new(fields[0], min_mass, max_mass);
        constraint.validate(valid_names)?;
        Ok(constraint)
    }

    pub fn validate(&self, valid_names: Option<&HashSet<String>>) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Validation("nutrient name must be non-empty".to_string()));
        }
        if let Some(names) = valid_names {
            if !names.contains(&self.name) {
                return Err(Error::Validation(format!("'{}' is not a known nutrient", self.name)));
            }
        }
        if self.min_mass.is_nan() || self.max_mass.is_nan() {
            return Err(Error::Validation(format!("{}: bounds must be numbers", self.name)));
        }
        if self.min_mass < 0.0 || self.max_mass < 0.0 {
            return Err(Error::Validation(format!("{}: min and max must be non-negative", self.name)));
        }
        if !self.min_mass.is_finite() {
            return Err(Error::Validation(format!("{}: min must be finite", self.name)));
        }
        if self.max_mass < self.min_mass {
            return Err(Error::Validation(format!(
                "{}: max {} is below min {}",
                self.name, self.max_mass, self.min_mass
            )));
        }
        Ok(())
    }

    pub fn is_upper_bounded(&self) -> bool {
        self.max_mass.is_finite()
    }
}

fn parse_bound(line: &str, field: &str, dash: f64) -> Result<f64> {
    if field == "-" {
        return Ok(dash);
    }
    field.parse::<f64>().map_err(|_| Error::Parse {
        line: line.to_string(),
        reason: format!("'{field}' is not a number"),
    })
}

impl fmt::Display for NutrientConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.max_mass.is_finite() {
            write!(f, "{},{},{}", self.name, self.min_mass, self.max_mass)
        } else {
            write!(f, "{},{},-", self.name, self.min_mass)
        }
    }
}

impl FromStr for NutrientConstraint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s, None)
    }
}

/// Constraints keyed by nutrient name, optionally restricted to an allow-list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NutrientConstraintSet {
    allowed: Option<HashSet<String>>,
    entries: BTreeMap<String, NutrientConstraint>,
}

impl NutrientConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty set that only accepts the given nutrient names
    pub fn with_allowed<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(names.into_iter().map(Into::into).collect()),
            entries: BTreeMap::new(),
        }
    }

    pub fn allowed(&self) -> Option<&HashSet<String>> {
        self.allowed.as_ref()
    }

    /// Insert or replace the constraint for `name`. Pass `f64::INFINITY` for no maximum.
    pub fn upsert(&mut self, name: impl Into<String>, min_mass: f64, max_mass: f64) -> Result<()> {
        let constraint = NutrientConstraint::new(name, min_mass, max_mass);
        constraint.validate(self.allowed.as_ref())?;
        self.entries.insert(constraint.name.clone(), constraint);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) {
        self.entries.remove(name);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, name: &str) -> Option<&NutrientConstraint> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Constraints in name order
    pub fn iter(&self) -> impl Iterator<Item = &NutrientConstraint> {
        self.entries.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Build a set from constraint lines. Blank lines and `#` comments are skipped.
    ///
    /// A bad line comes back as [`Error::AtLine`] carrying its 1-based number;
    /// call [`Error::root`] to get the underlying `Parse` or `Validation` error.
    pub fn load_from_lines<I, S>(lines: I, valid_names: Option<&HashSet<String>>) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self {
            allowed: valid_names.cloned(),
            entries: BTreeMap::new(),
        };

        for (idx, raw) in lines.into_iter().enumerate() {
            let line = raw.as_ref().trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let constraint = NutrientConstraint::parse(line, valid_names).map_err(|e| Error::AtLine {
                number: idx + 1,
                line: line.to_string(),
                source: Box::new(e),
            })?;
            set.entries.insert(constraint.name.clone(), constraint);
        }

        debug!(constraints = set.len(), "loaded nutrient constraints");
        Ok(set)
    }

    pub fn load_from_str(text: &str, valid_names: Option<&HashSet<String>>) -> Result<Self> {
        Self::load_from_lines(text.lines(), valid_names)
    }

    pub fn load_from_file(path: impl AsRef<Path>, valid_names: Option<&HashSet<String>>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        Self::load_from_str(&text, valid_names)
    }

    /// Bulk upsert from `name -> (min, max)`; a `None` max is unbounded.
    pub fn load_from_pairs<I, S>(pairs: I, valid_names: Option<&HashSet<String>>) -> Result<Self>
    where
        I: IntoIterator<Item = (S, (f64, Option<f64>))>,
        S: Into<String>,
    {
        let mut set = Self {
            allowed: valid_names.cloned(),
            entries: BTreeMap::new(),
        };
        for (name, (min_mass, max_mass)) in pairs {
            set.upsert(name, min_mass, max_mass.unwrap_or(f64::INFINITY))?;
        }
        Ok(set)
    }

    pub fn to_pairs(&self) -> BTreeMap<String, (f64, Option<f64>)> {
        self.entries
            .iter()
            .map(|(name, c)| {
                let max = c.is_upper_bounded().then_some(c.max_mass);
                (name.clone(), (c.min_mass, max))
            })
            .collect()
    }

    /// Fail with every constrained nutrient that is not among `columns`
    pub fn check_against_columns<I, S>(&self, columns: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let available: HashSet<String> = columns.into_iter().map(|c| c.as_ref().to_string()).collect();
        let missing: Vec<String> = self
            .entries
            .keys()
            .filter(|name| !available.contains(*name))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingColumns(missing))
        }
    }
}
