//! Test data builders for tables and embeddings.

use autoembed::data::{Cell, Table};
use autoembed::models::Embedding;

/// Builder for column-oriented test tables.
#[derive(Default)]
pub struct TableBuilder {
    columns: Vec<(String, Vec<Cell>)>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a numerical column; `None` becomes a null cell.
    pub fn numbers(mut self, name: &str, values: &[Option<f64>]) -> Self {
        let cells = values
            .iter()
            .map(|v| v.map(Cell::Number).unwrap_or(Cell::Null))
            .collect();
        self.columns.push((name.to_string(), cells));
        self
    }

    /// Add a text column; `None` becomes a null cell.
    pub fn texts(mut self, name: &str, values: &[Option<&str>]) -> Self {
        let cells = values
            .iter()
            .map(|v| v.map(|s| Cell::Text(s.to_string())).unwrap_or(Cell::Null))
            .collect();
        self.columns.push((name.to_string(), cells));
        self
    }

    pub fn build(self) -> Table {
        Table::from_columns(self.columns).expect("Failed to build test table")
    }
}

const MAKES: [&str; 4] = ["peugeot", "renault", "citroen", "tesla"];
const ENERGIES: [&str; 3] = ["diesel", "petrol", "electric"];

/// Deterministic car listings: `listing_id`, `make`, `energy`, `price`, `mileage`.
///
/// Every tenth price and every seventh energy are missing.
pub fn listings_table(rows: usize) -> Table {
    let ids: Vec<String> = (0..rows).map(|i| format!("L{i:04}")).collect();
    let id_refs: Vec<Option<&str>> = ids.iter().map(|s| Some(s.as_str())).collect();
    let makes: Vec<Option<&str>> = (0..rows).map(|i| Some(MAKES[i % MAKES.len()])).collect();
    let energies: Vec<Option<&str>> = (0..rows)
        .map(|i| (i % 7 != 0).then_some(ENERGIES[i % ENERGIES.len()]))
        .collect();
    let prices: Vec<Option<f64>> = (0..rows)
        .map(|i| (i % 10 != 3).then_some(5_000.0 + (i as f64 * 731.0) % 30_000.0))
        .collect();
    let mileages: Vec<Option<f64>> = (0..rows)
        .map(|i| Some(1_000.0 + (i as f64 * 4_217.0) % 200_000.0))
        .collect();

    TableBuilder::new()
        .texts("listing_id", &id_refs)
        .texts("make", &makes)
        .texts("energy", &energies)
        .numbers("price", &prices)
        .numbers("mileage", &mileages)
        .build()
}

pub fn embedding(id: &str, vector: &[f32]) -> Embedding {
    Embedding::new(id, vector.to_vec())
}
