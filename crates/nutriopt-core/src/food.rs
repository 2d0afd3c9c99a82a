use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};

/// One food as handed over by the data-preparation step.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FoodRow {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub description: String,
    /// Nutrient amounts per gram of food
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub nutrients: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Food {
    pub id: String,
    pub description: String,
    /// Aligned with `FoodTable::nutrient_columns`
    pub amounts: Vec<f64>,
}

/// Foods by nutrient matrix, amounts expressed per gram of food.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodTable {
    columns: Vec<String>,
    foods: Vec<Food>,
}

impl FoodTable {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            foods: Vec::new(),
        }
    }

    /// Build a table whose columns are the union of every row's nutrients.
    /// A row lacking one of those nutrients is rejected.
    pub fn from_rows(rows: impl IntoIterator<Item = FoodRow>) -> Result<Self> {
        let rows: Vec<FoodRow> = rows.into_iter().collect();
        let columns: BTreeSet<&String> = rows.iter().flat_map(|r| r.nutrients.keys()).collect();
        let mut table = Self::new(columns.into_iter().cloned());

        for row in rows {
            table.check_new_id(&row.id)?;
            let mut amounts = Vec::with_capacity(table.columns.len());
            for column in &table.columns {
                let value = row.nutrients.get(column).ok_or_else(|| {
                    Error::Validation(format!("food {} has no value for {}", row.id, column))
                })?;
                amounts.push(*value);
            }
            table.foods.push(Food {
                id: row.id,
                description: row.description,
                amounts,
            });
        }

        Ok(table)
    }

    pub fn push(&mut self, id: impl Into<String>, description: impl Into<String>, amounts: Vec<f64>) -> Result<()> {
        let id = id.into();
        self.check_new_id(&id)?;
        if amounts.len() != self.columns.len() {
            return Err(Error::Validation(format!(
                "food {} has {} amounts but the table has {} nutrient columns",
                id,
                amounts.len(),
                self.columns.len()
            )));
        }
        self.foods.push(Food {
            id,
            description: description.into(),
            amounts,
        });
        Ok(())
    }

    fn check_new_id(&self, id: &str) -> Result<()> {
        if self.foods.iter().any(|f| f.id == id) {
            return Err(Error::Validation(format!("duplicate food id {}", id)));
        }
        Ok(())
    }

    /// Valid nutrient names for constraint files and objectives
    pub fn nutrient_columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn foods(&self) -> &[Food] {
        &self.foods
    }

    pub fn len(&self) -> usize {
        self.foods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.foods.is_empty()
    }

    /// One nutrient's per-gram amounts across all foods, in row order
    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.foods.iter().map(move |f| f.amounts[index])
    }

    /// Reject non-finite or negative amounts in the given column
    pub(crate) fn check_column_values(&self, index: usize) -> Result<()> {
        let column = &self.columns[index];
        for food in &self.foods {
            let value = food.amounts[index];
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Validation(format!(
                    "food {} has invalid {} amount {}",
                    food.id, column, value
                )));
            }
        }
        Ok(())
    }
}
