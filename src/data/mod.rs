//! Tabular input data.
//!
//! [`Table`] is the row-oriented container the preprocessor reads from.
//! [`DataRepository`] abstracts where training and prediction rows come from,
//! with a local CSV variant and an in-memory variant.

pub mod csv;

use std::collections::HashMap;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::AutoembedError;

pub use self::csv::CsvDataRepository;

/// A single cell of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Number(n) => n.is_nan(),
            Cell::Text(_) => false,
        }
    }

    /// Read the cell as a number. Nulls and NaN become `None`.
    ///
    /// Text is parsed; text that is not a number is an error carrying the raw value.
    pub fn to_number(&self) -> Result<Option<f64>, String> {
        match self {
            Cell::Null => Ok(None),
            Cell::Number(n) if n.is_nan() => Ok(None),
            Cell::Number(n) => Ok(Some(*n)),
            Cell::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Ok(None);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_nan() => Ok(None),
                    Ok(n) => Ok(Some(n)),
                    Err(_) => Err(s.clone()),
                }
            }
        }
    }

    /// Read the cell as text. Integral numbers print without a decimal part.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Number(n) if n.is_nan() => None,
            Cell::Number(n) => Some(format_number(*n)),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Cell::Text(s) => Value::String(s.clone()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Number(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Row-oriented table with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// Create an empty table with the given header.
    pub fn new(columns: Vec<String>) -> Result<Self, AutoembedError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (position, name) in columns.iter().enumerate() {
            if index.insert(name.clone(), position).is_some() {
                return Err(AutoembedError::InvalidSchema(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }
        Ok(Self {
            columns,
            index,
            rows: Vec::new(),
        })
    }

    /// Build a table from named columns of equal length.
    pub fn from_columns(columns: Vec<(String, Vec<Cell>)>) -> Result<Self, AutoembedError> {
        let names: Vec<String> = columns.iter().map(|(name, _)| name.clone()).collect();
        let mut table = Self::new(names)?;

        let len = columns.first().map(|(_, cells)| cells.len()).unwrap_or(0);
        if let Some((name, cells)) = columns.iter().find(|(_, cells)| cells.len() != len) {
            return Err(AutoembedError::InvalidSchema(format!(
                "column '{}' has {} values, expected {}",
                name,
                cells.len(),
                len
            )));
        }

        let mut iters: Vec<_> = columns.into_iter().map(|(_, c)| c.into_iter()).collect();
        for _ in 0..len {
            let row = iters.iter_mut().filter_map(|it| it.next()).collect();
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn push_row(&mut self, row: Vec<Cell>) -> Result<(), AutoembedError> {
        if row.len() != self.columns.len() {
            return Err(AutoembedError::InvalidSchema(format!(
                "row {} has {} cells, expected {}",
                self.rows.len(),
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn column_index(&self, name: &str) -> Result<usize, AutoembedError> {
        self.index.get(name).copied().ok_or_else(|| {
            AutoembedError::InvalidSchema(format!("column '{}' is absent from the input data", name))
        })
    }

    /// Fail with `InvalidSchema` naming every declared column the table lacks.
    pub fn require_columns(&self, names: &[String]) -> Result<(), AutoembedError> {
        let missing: Vec<&str> = names
            .iter()
            .filter(|n| !self.has_column(n))
            .map(|n| n.as_str())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AutoembedError::InvalidSchema(format!(
                "declared columns absent from the input data: {}",
                missing.join(", ")
            )))
        }
    }

    pub fn cell(&self, row: usize, column: &str) -> Result<&Cell, AutoembedError> {
        let position = self.column_index(column)?;
        self.rows
            .get(row)
            .map(|r| &r[position])
            .ok_or_else(|| AutoembedError::Validation(format!("row {} out of range", row)))
    }

    /// All values of a column read as numbers.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<Option<f64>>, AutoembedError> {
        let position = self.column_index(name)?;
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row[position].to_number().map_err(|raw| {
                    AutoembedError::InvalidSchema(format!(
                        "column '{}' row {}: '{}' is not numeric",
                        name, i, raw
                    ))
                })
            })
            .collect()
    }

    /// All values of a column read as text.
    pub fn text_column(&self, name: &str) -> Result<Vec<Option<String>>, AutoembedError> {
        let position = self.column_index(name)?;
        Ok(self.rows.iter().map(|row| row[position].to_text()).collect())
    }

    /// Project one row onto the given columns as a JSON object.
    pub fn row_json(&self, row: usize, columns: &[String]) -> Result<Map<String, Value>, AutoembedError> {
        let mut out = Map::with_capacity(columns.len());
        for column in columns {
            out.insert(column.clone(), self.cell(row, column)?.to_json());
        }
        Ok(out)
    }

    /// Random subset of rows without replacement, reproducible for a given seed.
    ///
    /// Returns a copy of the whole table when `n >= len`.
    pub fn sample(&self, n: usize, seed: u64) -> Table {
        if n >= self.rows.len() {
            return self.clone();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picked = rand::seq::index::sample(&mut rng, self.rows.len(), n).into_vec();
        picked.sort_unstable();
        Table {
            columns: self.columns.clone(),
            index: self.index.clone(),
            rows: picked.into_iter().map(|i| self.rows[i].clone()).collect(),
        }
    }
}

/// Source of training and prediction rows.
#[async_trait]
pub trait DataRepository: Send + Sync {
    async fn get_training_data(&self, path: &str) -> Result<Table, AutoembedError>;
    async fn get_prediction_data(&self, path: &str) -> Result<Table, AutoembedError>;
}

/// Data repository serving tables registered under a path key.
#[derive(Default)]
pub struct InMemoryDataRepository {
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryDataRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<String>, table: Table) {
        self.tables.write().await.insert(path.into(), table);
    }

    async fn get(&self, path: &str) -> Result<Table, AutoembedError> {
        self.tables
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| AutoembedError::not_found("dataset", path))
    }
}

#[async_trait]
impl DataRepository for InMemoryDataRepository {
    async fn get_training_data(&self, path: &str) -> Result<Table, AutoembedError> {
        self.get(path).await
    }

    async fn get_prediction_data(&self, path: &str) -> Result<Table, AutoembedError> {
        self.get(path).await
    }
}
