//! Dataset preprocessor: owns the column encoders and turns rows into tensors.

use std::collections::BTreeMap;

use ndarray::{Array1, Array2};
use tracing::info;

use super::columns::{
    CategoricalColumns, NumericalColumns, OutOfVocabulary, DEFAULT_UNKNOWN_TOKEN,
};
use crate::data::Table;
use crate::AutoembedError;

pub const NUMERICAL_INPUTS_FEATURES_KEY: &str = "numerical_inputs_features";
pub const NUMERICAL_OUTPUTS_KEY: &str = "numerical_outputs";

/// Upper bound on a categorical feature's reconstruction loss weight.
pub const MAX_LOSS_WEIGHT: f64 = 5.0;

/// Key of a categorical reconstruction target.
pub fn outputs_key(feature: &str) -> String {
    format!("{}_outputs", feature)
}

/// One named model input or target.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureArray {
    /// rows × numerical columns, declared column order.
    Numerical(Array2<f32>),
    /// One vocabulary index per row.
    Categorical(Array1<u32>),
}

/// Named arrays fed to (or expected from) the embedding model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTensors {
    arrays: BTreeMap<String, FeatureArray>,
    rows: usize,
}

impl FeatureTensors {
    pub fn new(rows: usize) -> Self {
        Self {
            arrays: BTreeMap::new(),
            rows,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, array: FeatureArray) {
        self.arrays.insert(key.into(), array);
    }

    pub fn get(&self, key: &str) -> Option<&FeatureArray> {
        self.arrays.get(key)
    }

    pub fn numerical(&self, key: &str) -> Result<&Array2<f32>, AutoembedError> {
        match self.arrays.get(key) {
            Some(FeatureArray::Numerical(array)) => Ok(array),
            Some(FeatureArray::Categorical(_)) => Err(AutoembedError::InvalidSchema(format!(
                "'{}' holds categorical indices, expected a numerical block",
                key
            ))),
            None => Err(AutoembedError::InvalidSchema(format!(
                "missing model input '{}'",
                key
            ))),
        }
    }

    pub fn categorical(&self, key: &str) -> Result<&Array1<u32>, AutoembedError> {
        match self.arrays.get(key) {
            Some(FeatureArray::Categorical(array)) => Ok(array),
            Some(FeatureArray::Numerical(_)) => Err(AutoembedError::InvalidSchema(format!(
                "'{}' holds a numerical block, expected categorical indices",
                key
            ))),
            None => Err(AutoembedError::InvalidSchema(format!(
                "missing model input '{}'",
                key
            ))),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(|k| k.as_str())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

/// Snapshot of the fitted encoders, consumed by the model builder.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetAnalysis {
    pub numerical_columns: NumericalColumns,
    pub categorical_columns: CategoricalColumns,
    pub categorical_features_loss_weights: Option<BTreeMap<String, f64>>,
}

impl DatasetAnalysis {
    /// Loss weight of a categorical feature, 1.0 when none was computed.
    pub fn loss_weight(&self, feature: &str) -> f64 {
        self.categorical_features_loss_weights
            .as_ref()
            .and_then(|w| w.get(feature))
            .copied()
            .unwrap_or(1.0)
    }
}

/// Relative weight of each categorical feature in the reconstruction loss.
///
/// With `m` the smallest vocabulary size: `ln(s)/ln(m)` when `m > 1`,
/// otherwise `ln(s+1)` for `s > 1` and 1.0 for `s == 1`. Capped at `max_weight`.
pub fn compute_categorical_loss_weights(
    categorical_columns: &CategoricalColumns,
    max_weight: f64,
) -> BTreeMap<String, f64> {
    let sizes: Vec<(String, usize)> = categorical_columns
        .iter()
        .map(|c| (c.name.clone(), c.vocabulary_size()))
        .collect();

    let Some(min_size) = sizes.iter().map(|(_, s)| *s).min() else {
        return BTreeMap::new();
    };

    sizes
        .into_iter()
        .map(|(name, size)| {
            let raw = if min_size > 1 {
                (size as f64).ln() / (min_size as f64).ln()
            } else if size > 1 {
                ((size + 1) as f64).ln()
            } else {
                1.0
            };
            (name, raw.min(max_weight))
        })
        .collect()
}

/// Owns the column encoders for one model.
#[derive(Debug, Clone)]
pub struct DatasetPreprocessor {
    numerical_columns_names: Vec<String>,
    categorical_columns_names: Vec<String>,
    numerical_columns: Option<NumericalColumns>,
    categorical_columns: Option<CategoricalColumns>,
    categorical_features_loss_weights: Option<BTreeMap<String, f64>>,
    unknown_token: String,
    out_of_vocabulary: OutOfVocabulary,
}

impl DatasetPreprocessor {
    pub fn new(numerical_columns_names: Vec<String>, categorical_columns_names: Vec<String>) -> Self {
        Self {
            numerical_columns_names,
            categorical_columns_names,
            numerical_columns: None,
            categorical_columns: None,
            categorical_features_loss_weights: None,
            unknown_token: DEFAULT_UNKNOWN_TOKEN.to_string(),
            out_of_vocabulary: OutOfVocabulary::default(),
        }
    }

    /// Rebuild an already-fitted preprocessor from its encoders.
    pub fn from_columns(
        numerical_columns: NumericalColumns,
        categorical_columns: CategoricalColumns,
        categorical_features_loss_weights: Option<BTreeMap<String, f64>>,
    ) -> Self {
        Self {
            numerical_columns_names: numerical_columns.names(),
            categorical_columns_names: categorical_columns.names(),
            numerical_columns: Some(numerical_columns),
            categorical_columns: Some(categorical_columns),
            categorical_features_loss_weights,
            unknown_token: DEFAULT_UNKNOWN_TOKEN.to_string(),
            out_of_vocabulary: OutOfVocabulary::default(),
        }
    }

    pub fn with_unknown_token(mut self, token: impl Into<String>) -> Self {
        self.unknown_token = token.into();
        self
    }

    pub fn with_out_of_vocabulary(mut self, policy: OutOfVocabulary) -> Self {
        self.out_of_vocabulary = policy;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.numerical_columns.is_some() && self.categorical_columns.is_some()
    }

    pub fn numerical_columns_names(&self) -> &[String] {
        &self.numerical_columns_names
    }

    pub fn categorical_columns_names(&self) -> &[String] {
        &self.categorical_columns_names
    }

    pub fn numerical_columns(&self) -> Option<&NumericalColumns> {
        self.numerical_columns.as_ref()
    }

    pub fn categorical_columns(&self) -> Option<&CategoricalColumns> {
        self.categorical_columns.as_ref()
    }

    pub fn categorical_features_loss_weights(&self) -> Option<&BTreeMap<String, f64>> {
        self.categorical_features_loss_weights.as_ref()
    }

    pub fn out_of_vocabulary(&self) -> OutOfVocabulary {
        self.out_of_vocabulary
    }

    pub fn unknown_token(&self) -> &str {
        &self.unknown_token
    }

    /// Fit every declared column on the reference rows and compute loss weights.
    pub fn fit(&mut self, table: &Table) -> Result<(), AutoembedError> {
        info!(
            "Fitting dataset preprocessor on {} rows ({} numerical, {} categorical columns)",
            table.len(),
            self.numerical_columns_names.len(),
            self.categorical_columns_names.len()
        );
        self.require_columns(table)?;

        let numerical = NumericalColumns::fit(table, &self.numerical_columns_names)?;
        let categorical =
            CategoricalColumns::fit(table, &self.categorical_columns_names, &self.unknown_token)?;
        let weights = compute_categorical_loss_weights(&categorical, MAX_LOSS_WEIGHT);

        self.numerical_columns = Some(numerical);
        self.categorical_columns = Some(categorical);
        self.categorical_features_loss_weights = Some(weights);
        Ok(())
    }

    pub fn get_analysis(&self) -> Result<DatasetAnalysis, AutoembedError> {
        let (numerical, categorical) = self.fitted()?;
        Ok(DatasetAnalysis {
            numerical_columns: numerical.clone(),
            categorical_columns: categorical.clone(),
            categorical_features_loss_weights: self.categorical_features_loss_weights.clone(),
        })
    }

    /// Model inputs: the numerical block plus one index array per categorical column.
    pub fn preprocess(&self, table: &Table) -> Result<FeatureTensors, AutoembedError> {
        self.transform(table, NUMERICAL_INPUTS_FEATURES_KEY, |name| name.to_string())
    }

    /// Reconstruction targets, encoded exactly like the inputs.
    pub fn preprocess_target(&self, table: &Table) -> Result<FeatureTensors, AutoembedError> {
        self.transform(table, NUMERICAL_OUTPUTS_KEY, outputs_key)
    }

    fn fitted(&self) -> Result<(&NumericalColumns, &CategoricalColumns), AutoembedError> {
        match (&self.numerical_columns, &self.categorical_columns) {
            (Some(n), Some(c)) => Ok((n, c)),
            _ => Err(AutoembedError::not_fitted("DatasetPreprocessor")),
        }
    }

    fn require_columns(&self, table: &Table) -> Result<(), AutoembedError> {
        let declared: Vec<String> = self
            .numerical_columns_names
            .iter()
            .chain(self.categorical_columns_names.iter())
            .cloned()
            .collect();
        table.require_columns(&declared)
    }

    fn transform(
        &self,
        table: &Table,
        numerical_key: &str,
        categorical_key: impl Fn(&str) -> String,
    ) -> Result<FeatureTensors, AutoembedError> {
        let (numerical, categorical) = self.fitted()?;
        self.require_columns(table)?;

        let rows = table.len();
        let width = self.numerical_columns_names.len();
        let mut block = vec![0f32; rows * width];

        for (c, name) in self.numerical_columns_names.iter().enumerate() {
            let column = numerical
                .get(name)
                .ok_or_else(|| AutoembedError::not_fitted(format!("numerical column '{}'", name)))?;
            let values = column.transform(&table.numeric_column(name)?);
            for (r, value) in values.into_iter().enumerate() {
                block[r * width + c] = value;
            }
        }

        let mut tensors = FeatureTensors::new(rows);
        tensors.insert(
            numerical_key,
            FeatureArray::Numerical(Array2::from_shape_vec((rows, width), block)?),
        );

        for name in &self.categorical_columns_names {
            let column = categorical.get(name).ok_or_else(|| {
                AutoembedError::not_fitted(format!("categorical column '{}'", name))
            })?;
            let indices = column.transform(&table.text_column(name)?, self.out_of_vocabulary)?;
            tensors.insert(
                categorical_key(name),
                FeatureArray::Categorical(Array1::from_vec(indices)),
            );
        }

        Ok(tensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;
    use crate::features::columns::CategoricalColumn;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn listings() -> Table {
        Table::from_columns(vec![
            (
                "price".to_string(),
                vec![10.0.into(), 20.0.into(), Cell::Null, 40.0.into()],
            ),
            (
                "mileage".to_string(),
                vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()],
            ),
            (
                "make".to_string(),
                vec!["a".into(), "B".into(), " a".into(), Cell::Null],
            ),
            (
                "energy".to_string(),
                vec!["diesel".into(), "diesel".into(), "petrol".into(), "electric".into()],
            ),
        ])
        .unwrap()
    }

    fn preprocessor() -> DatasetPreprocessor {
        DatasetPreprocessor::new(
            vec!["price".into(), "mileage".into()],
            vec!["make".into(), "energy".into()],
        )
    }

    #[test]
    fn test_preprocess_before_fit_fails() {
        let err = preprocessor().preprocess(&listings()).unwrap_err();
        assert!(matches!(err, AutoembedError::NotFitted { .. }));
        let err = preprocessor().preprocess_target(&listings()).unwrap_err();
        assert!(matches!(err, AutoembedError::NotFitted { .. }));
        assert!(preprocessor().get_analysis().is_err());
    }

    #[test]
    fn test_fit_rejects_absent_column() {
        let mut p = DatasetPreprocessor::new(vec!["doors".into()], vec![]);
        let err = p.fit(&listings()).unwrap_err();
        assert!(matches!(err, AutoembedError::InvalidSchema(_)));
        assert!(!p.is_fitted());
    }

    #[test]
    fn test_preprocess_shapes_and_keys() {
        let mut p = preprocessor();
        p.fit(&listings()).unwrap();

        let inputs = p.preprocess(&listings()).unwrap();
        assert_eq!(
            inputs.keys().collect::<Vec<_>>(),
            vec!["energy", "make", NUMERICAL_INPUTS_FEATURES_KEY]
        );
        let block = inputs.numerical(NUMERICAL_INPUTS_FEATURES_KEY).unwrap();
        assert_eq!(block.dim(), (4, 2));
        assert_eq!(block[[2, 0]], 0.0);
        assert_eq!(inputs.categorical("make").unwrap().to_vec(), vec![0, 1, 0, 2]);
        assert_eq!(inputs.categorical("energy").unwrap().to_vec(), vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_preprocess_target_mirrors_inputs() {
        let mut p = preprocessor();
        p.fit(&listings()).unwrap();

        let inputs = p.preprocess(&listings()).unwrap();
        let targets = p.preprocess_target(&listings()).unwrap();
        assert_eq!(
            inputs.numerical(NUMERICAL_INPUTS_FEATURES_KEY).unwrap(),
            targets.numerical(NUMERICAL_OUTPUTS_KEY).unwrap()
        );
        assert_eq!(
            inputs.categorical("make").unwrap(),
            targets.categorical("make_outputs").unwrap()
        );
    }

    #[test]
    fn test_strict_policy_rejects_unseen_category() {
        let mut p = preprocessor().with_out_of_vocabulary(OutOfVocabulary::Fail);
        p.fit(&listings()).unwrap();

        let unseen = Table::from_columns(vec![
            ("price".to_string(), vec![1.0.into()]),
            ("mileage".to_string(), vec![1.0.into()]),
            ("make".to_string(), vec!["c".into()]),
            ("energy".to_string(), vec!["diesel".into()]),
        ])
        .unwrap();
        let err = p.preprocess(&unseen).unwrap_err();
        assert!(matches!(err, AutoembedError::UnknownCategory { .. }));
    }

    #[test]
    fn test_loss_weights_normalized_to_smallest_vocabulary() {
        let mut p = preprocessor();
        p.fit(&listings()).unwrap();
        let analysis = p.get_analysis().unwrap();

        // make: {a, b, unk} = 3, energy: {diesel, petrol, electric, unk} = 4
        assert_eq!(analysis.loss_weight("make"), 1.0);
        let expected = 4f64.ln() / 3f64.ln();
        assert!((analysis.loss_weight("energy") - expected).abs() < 1e-12);
        assert_eq!(analysis.loss_weight("unknown_feature"), 1.0);
    }

    #[test]
    fn test_loss_weights_single_entry_vocabulary() {
        let columns = CategoricalColumns::from_columns(vec![
            CategoricalColumn::fit("empty", &[None], "UNK"),
            CategoricalColumn::fit(
                "model",
                &[Some("clio".into()), Some("megane".into())],
                "UNK",
            ),
        ]);
        let weights = compute_categorical_loss_weights(&columns, MAX_LOSS_WEIGHT);
        assert_eq!(weights["empty"], 1.0);
        assert!((weights["model"] - 4f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_loss_weights_capped() {
        let big: Vec<Option<String>> = (0..100_000).map(|i| Some(format!("v{i}"))).collect();
        let columns = CategoricalColumns::from_columns(vec![
            CategoricalColumn::fit("small", &[Some("x".into())], "UNK"),
            CategoricalColumn::fit("big", &big, "UNK"),
        ]);
        let weights = compute_categorical_loss_weights(&columns, MAX_LOSS_WEIGHT);
        assert_eq!(weights["big"], MAX_LOSS_WEIGHT);
    }

    #[test]
    fn test_from_columns_is_fitted() {
        let mut p = preprocessor();
        p.fit(&listings()).unwrap();
        let restored = DatasetPreprocessor::from_columns(
            p.numerical_columns().unwrap().clone(),
            p.categorical_columns().unwrap().clone(),
            p.categorical_features_loss_weights().cloned(),
        );
        assert!(restored.is_fitted());
        assert_eq!(
            restored.preprocess(&listings()).unwrap(),
            p.preprocess(&listings()).unwrap()
        );
    }

    proptest! {
        #[test]
        fn prop_loss_weights_bounded(sizes in prop::collection::vec(1usize..200, 1..8)) {
            let columns = CategoricalColumns::from_columns(
                sizes
                    .iter()
                    .enumerate()
                    .map(|(i, &size)| {
                        let values: Vec<Option<String>> =
                            (0..size - 1).map(|v| Some(format!("v{v}"))).collect();
                        CategoricalColumn::fit(&format!("f{i}"), &values, "UNK")
                    })
                    .collect(),
            );
            let weights = compute_categorical_loss_weights(&columns, MAX_LOSS_WEIGHT);
            let min_weight = weights.values().cloned().fold(f64::INFINITY, f64::min);
            let min_size = columns.iter().map(|c| c.vocabulary_size()).min().unwrap();

            for column in columns.iter() {
                let w = weights[&column.name];
                prop_assert!(w >= min_weight && w <= MAX_LOSS_WEIGHT);
                if min_size > 1 && column.vocabulary_size() == min_size {
                    prop_assert!((w - 1.0).abs() < 1e-12);
                }
            }
        }
    }
}
