//! Column encoders fit once on reference data and replayed at inference.
//!
//! Encoders only exist in fitted form: construction goes through `fit` (or
//! through deserialized parameters), so a transform never runs on missing
//! statistics.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::Table;
use crate::AutoembedError;

/// Sentinel used for missing categorical values.
pub const DEFAULT_UNKNOWN_TOKEN: &str = "UNK";

const SMALL_VOCABULARY_THRESHOLD: usize = 30;
const SMALL_VOCABULARY_EMBEDDING_DIM: usize = 20;
const LARGE_VOCABULARY_EMBEDDING_DIM: usize = 64;

/// What to do with categorical values missing from the training vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfVocabulary {
    /// Map the value to the unknown-token index.
    #[default]
    MapToUnknown,
    /// Reject the batch with `UnknownCategory`.
    Fail,
}

/// Z-score encoder for a numerical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericalColumn {
    pub name: String,
    pub value_used_to_fill_na: f64,
    pub mean: f64,
    pub std: f64,
}

impl NumericalColumn {
    /// Fit mean and sample standard deviation.
    ///
    /// The mean ignores nulls; the std is taken after nulls are filled with
    /// the mean. A zero or undefined std is stored as 1.0.
    pub fn fit(name: &str, values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        let mean = if present.is_empty() {
            0.0
        } else {
            present.iter().sum::<f64>() / present.len() as f64
        };

        let std = if values.len() < 2 {
            f64::NAN
        } else {
            let sum_sq: f64 = values
                .iter()
                .map(|v| {
                    let d = v.unwrap_or(mean) - mean;
                    d * d
                })
                .sum();
            (sum_sq / (values.len() - 1) as f64).sqrt()
        };
        let std = if std.is_finite() && std > 0.0 { std } else { 1.0 };

        Self {
            name: name.to_string(),
            value_used_to_fill_na: mean,
            mean,
            std,
        }
    }

    pub fn transform_value(&self, value: Option<f64>) -> f64 {
        let filled = match value {
            Some(v) if !v.is_nan() => v,
            _ => self.value_used_to_fill_na,
        };
        (filled - self.mean) / self.std
    }

    pub fn transform(&self, values: &[Option<f64>]) -> Vec<f32> {
        values
            .iter()
            .map(|v| self.transform_value(*v) as f32)
            .collect()
    }
}

/// Vocabulary encoder for a categorical column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub vocabulary: BTreeMap<String, u32>,
    pub value_used_to_fill_na: String,
    pub embedding_dim: usize,
}

/// Lower-case and trim a raw categorical value.
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

impl CategoricalColumn {
    /// Build the vocabulary in first-seen order.
    ///
    /// The unknown token is always appended last, whether or not the column
    /// contained nulls.
    pub fn fit(name: &str, values: &[Option<String>], unknown_token: &str) -> Self {
        let unknown_key = normalize(unknown_token);
        let mut vocabulary = BTreeMap::new();
        let mut next_index = 0u32;

        for value in values.iter().flatten() {
            let key = normalize(value);
            if key == unknown_key || vocabulary.contains_key(&key) {
                continue;
            }
            vocabulary.insert(key, next_index);
            next_index += 1;
        }
        vocabulary.insert(unknown_key, next_index);

        let embedding_dim = Self::infer_embedding_dim(vocabulary.len());
        Self {
            name: name.to_string(),
            vocabulary,
            value_used_to_fill_na: unknown_token.to_string(),
            embedding_dim,
        }
    }

    /// Rebuild from persisted parameters, checking the vocabulary invariants.
    pub fn from_parts(
        name: String,
        vocabulary: BTreeMap<String, u32>,
        value_used_to_fill_na: String,
        embedding_dim: usize,
    ) -> Result<Self, AutoembedError> {
        let column = Self {
            name,
            vocabulary,
            value_used_to_fill_na,
            embedding_dim,
        };
        column.validate()?;
        Ok(column)
    }

    /// Indices must be dense `0..len` and the unknown token must hold the last one.
    pub fn validate(&self) -> Result<(), AutoembedError> {
        let size = self.vocabulary.len();
        let mut seen = vec![false; size];
        for (key, &index) in &self.vocabulary {
            let slot = seen.get_mut(index as usize).ok_or_else(|| {
                AutoembedError::InvalidSchema(format!(
                    "column '{}': index {} of '{}' is outside 0..{}",
                    self.name, index, key, size
                ))
            })?;
            if *slot {
                return Err(AutoembedError::InvalidSchema(format!(
                    "column '{}': index {} is used twice",
                    self.name, index
                )));
            }
            *slot = true;
        }
        if self.vocabulary.get(&self.unknown_key()) != Some(&(size as u32).saturating_sub(1)) {
            return Err(AutoembedError::InvalidSchema(format!(
                "column '{}': unknown token '{}' must hold the last index",
                self.name, self.value_used_to_fill_na
            )));
        }
        Ok(())
    }

    pub fn infer_embedding_dim(vocabulary_size: usize) -> usize {
        if vocabulary_size < SMALL_VOCABULARY_THRESHOLD {
            SMALL_VOCABULARY_EMBEDDING_DIM
        } else {
            LARGE_VOCABULARY_EMBEDDING_DIM
        }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    fn unknown_key(&self) -> String {
        normalize(&self.value_used_to_fill_na)
    }

    pub fn unknown_index(&self) -> u32 {
        (self.vocabulary.len() as u32).saturating_sub(1)
    }

    /// Vocabulary index of a raw value; nulls map to the unknown token,
    /// out-of-vocabulary values to `None`.
    pub fn lookup(&self, value: Option<&str>) -> Option<u32> {
        match value {
            None => Some(self.unknown_index()),
            Some(raw) => self.vocabulary.get(&normalize(raw)).copied(),
        }
    }

    pub fn transform(
        &self,
        values: &[Option<String>],
        policy: OutOfVocabulary,
    ) -> Result<Vec<u32>, AutoembedError> {
        let mut unseen = 0usize;
        let mut out = Vec::with_capacity(values.len());

        for value in values {
            match self.lookup(value.as_deref()) {
                Some(index) => out.push(index),
                None => match policy {
                    OutOfVocabulary::MapToUnknown => {
                        unseen += 1;
                        out.push(self.unknown_index());
                    }
                    OutOfVocabulary::Fail => {
                        return Err(AutoembedError::UnknownCategory {
                            column: self.name.clone(),
                            value: value.clone().unwrap_or_default(),
                        });
                    }
                },
            }
        }

        if unseen > 0 {
            debug!(
                "Column {}: mapped {} out-of-vocabulary values to the unknown token",
                self.name, unseen
            );
        }
        Ok(out)
    }
}

/// Numerical encoders in declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericalColumns {
    columns: Vec<NumericalColumn>,
}

impl NumericalColumns {
    pub fn fit(table: &Table, names: &[String]) -> Result<Self, AutoembedError> {
        let columns = names
            .iter()
            .map(|name| Ok(NumericalColumn::fit(name, &table.numeric_column(name)?)))
            .collect::<Result<Vec<_>, AutoembedError>>()?;
        Ok(Self { columns })
    }

    pub fn from_columns(columns: Vec<NumericalColumn>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&NumericalColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NumericalColumn> {
        self.columns.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Categorical encoders in declared order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumns {
    columns: Vec<CategoricalColumn>,
}

impl CategoricalColumns {
    pub fn fit(table: &Table, names: &[String], unknown_token: &str) -> Result<Self, AutoembedError> {
        let columns = names
            .iter()
            .map(|name| {
                Ok(CategoricalColumn::fit(
                    name,
                    &table.text_column(name)?,
                    unknown_token,
                ))
            })
            .collect::<Result<Vec<_>, AutoembedError>>()?;
        Ok(Self { columns })
    }

    pub fn from_columns(columns: Vec<CategoricalColumn>) -> Self {
        Self { columns }
    }

    pub fn get(&self, name: &str) -> Option<&CategoricalColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoricalColumn> {
        self.columns.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn text(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(String::from)).collect()
    }

    #[test]
    fn test_numerical_fit_mean_fill_and_sample_std() {
        let column = NumericalColumn::fit("mileage", &[Some(10.0), Some(20.0), None, Some(40.0)]);
        assert!((column.mean - 23.3333).abs() < 1e-3);
        assert_eq!(column.value_used_to_fill_na, column.mean);
        assert!((column.std - 12.4722).abs() < 1e-3, "std was {}", column.std);

        let out = column.transform(&[Some(10.0), None]);
        assert!((out[0] - (-1.0690)).abs() < 1e-3, "got {}", out[0]);
        assert_eq!(out[1], 0.0);
    }

    #[test]
    fn test_numerical_constant_column_guards_division() {
        let column = NumericalColumn::fit("doors", &[Some(5.0), Some(5.0), Some(5.0)]);
        assert_eq!(column.std, 1.0);
        assert_eq!(column.transform(&[Some(5.0)]), vec![0.0]);
    }

    #[test]
    fn test_numerical_all_null_column() {
        let column = NumericalColumn::fit("co2", &[None, None]);
        assert_eq!(column.mean, 0.0);
        assert_eq!(column.std, 1.0);
        assert_eq!(column.transform(&[None, Some(2.0)]), vec![0.0, 2.0]);
    }

    #[test]
    fn test_categorical_vocabulary_first_seen_with_unknown_last() {
        let column = CategoricalColumn::fit(
            "make",
            &text(&[Some("a"), Some("B"), Some(" a"), None]),
            DEFAULT_UNKNOWN_TOKEN,
        );
        assert_eq!(column.vocabulary.get("a"), Some(&0));
        assert_eq!(column.vocabulary.get("b"), Some(&1));
        assert_eq!(column.vocabulary.get("unk"), Some(&2));
        assert_eq!(column.vocabulary_size(), 3);
        assert_eq!(column.embedding_dim, 20);
        assert!(column.validate().is_ok());
    }

    #[test]
    fn test_categorical_unknown_last_even_when_null_comes_first() {
        let column = CategoricalColumn::fit(
            "energy",
            &text(&[None, Some("diesel"), Some("UNK"), Some("petrol")]),
            DEFAULT_UNKNOWN_TOKEN,
        );
        assert_eq!(column.vocabulary.get("diesel"), Some(&0));
        assert_eq!(column.vocabulary.get("petrol"), Some(&1));
        assert_eq!(column.unknown_index(), 2);
        assert_eq!(column.vocabulary_size(), 3);
    }

    #[test]
    fn test_categorical_transform_out_of_vocabulary_policies() {
        let column = CategoricalColumn::fit(
            "make",
            &text(&[Some("a"), Some("B"), Some(" a"), None]),
            DEFAULT_UNKNOWN_TOKEN,
        );

        let mapped = column
            .transform(&text(&[Some("A"), Some("c"), None]), OutOfVocabulary::MapToUnknown)
            .unwrap();
        assert_eq!(mapped, vec![0, 2, 2]);

        let err = column
            .transform(&text(&[Some("A"), Some("c")]), OutOfVocabulary::Fail)
            .unwrap_err();
        match err {
            AutoembedError::UnknownCategory { column, value } => {
                assert_eq!(column, "make");
                assert_eq!(value, "c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_embedding_dim_step_function() {
        assert_eq!(CategoricalColumn::infer_embedding_dim(29), 20);
        assert_eq!(CategoricalColumn::infer_embedding_dim(30), 64);
    }

    #[test]
    fn test_from_parts_rejects_unknown_not_last() {
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert("unk".to_string(), 0);
        vocabulary.insert("a".to_string(), 1);
        let err = CategoricalColumn::from_parts("make".into(), vocabulary, "UNK".into(), 20);
        assert!(err.is_err());
    }

    #[test]
    fn test_from_parts_rejects_sparse_indices() {
        let mut vocabulary = BTreeMap::new();
        vocabulary.insert("a".to_string(), 0);
        vocabulary.insert("unk".to_string(), 5);
        assert!(CategoricalColumn::from_parts("make".into(), vocabulary, "UNK".into(), 20).is_err());
    }

    proptest! {
        #[test]
        fn prop_numerical_transform_is_idempotent(
            reference in prop::collection::vec(prop::option::of(-1e6f64..1e6), 1..40),
            input in prop::collection::vec(prop::option::of(-1e6f64..1e6), 0..40),
        ) {
            let column = NumericalColumn::fit("x", &reference);
            prop_assert_eq!(column.transform(&input), column.transform(&input));
        }

        #[test]
        fn prop_vocabulary_indices_stable_and_unknown_last(
            values in prop::collection::vec(prop::option::of("[a-eA-E ]{0,3}"), 1..40),
        ) {
            let column = CategoricalColumn::fit("c", &values, DEFAULT_UNKNOWN_TOKEN);
            let size = column.vocabulary_size() as u32;
            prop_assert!(column.validate().is_ok());
            prop_assert_eq!(column.unknown_index(), size - 1);

            let first = column.transform(&values, OutOfVocabulary::Fail).unwrap();
            let second = column.transform(&values, OutOfVocabulary::Fail).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(first.iter().all(|&i| i < size));
        }
    }
}
