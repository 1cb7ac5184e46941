//! Candle autoencoder for mixed numerical/categorical rows.
//!
//! Encoder: per-feature embedding tables concatenated with the numeric block,
//! then `LayerNorm -> Dense(relu) -> LayerNorm -> Dropout` per hidden layer and
//! a `tanh` bottleneck. Decoder: a first decoding layer, the hidden layers in
//! reverse, a linear numeric head and one softmax head per categorical feature.
//!
//! Variables live in a single [`VarMap`] under the `encoder.` and `decoder.`
//! prefixes so the encoder half can be exported on its own.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{
    embedding, layer_norm, linear, loss, AdamW, Dropout, Embedding, LayerNorm, Linear, Module,
    ModuleT, Optimizer, ParamsAdamW, VarBuilder, VarMap,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use super::architecture::{AutoencoderSpec, NUMERICAL_LOSS_WEIGHT};
use super::candle_backend::{array1_to_tensor, array2_to_tensor, select_device, LAYER_NORM_EPS};
use super::{EmbeddingModel, EpochMetrics, FitOptions, TrainingHistory};
use crate::features::{
    outputs_key, DatasetAnalysis, FeatureTensors, NUMERICAL_INPUTS_FEATURES_KEY,
    NUMERICAL_OUTPUTS_KEY,
};
use crate::AutoembedError;

pub const ARCHITECTURE_FILE: &str = "architecture.json";
pub const AUTOENCODER_WEIGHTS_FILE: &str = "autoencoder.safetensors";
pub const ENCODER_WEIGHTS_FILE: &str = "encoder.safetensors";

const ENCODER_PREFIX: &str = "encoder";
const DECODER_PREFIX: &str = "decoder";
const EMBED_BATCH_SIZE: usize = 1024;

/// Model inputs or targets already on the device, in the architecture's feature order.
struct Batch {
    numerical: Option<Tensor>,
    categorical: Vec<Tensor>,
}

impl Batch {
    fn select(&self, indices: &Tensor) -> candle_core::Result<Self> {
        Ok(Self {
            numerical: self
                .numerical
                .as_ref()
                .map(|t| t.index_select(indices, 0))
                .transpose()?,
            categorical: self
                .categorical
                .iter()
                .map(|t| t.index_select(indices, 0))
                .collect::<candle_core::Result<Vec<_>>>()?,
        })
    }
}

struct HiddenBlock {
    norm_in: LayerNorm,
    dense: Linear,
    norm_out: LayerNorm,
}

struct Encoder {
    embeddings: Vec<Embedding>,
    blocks: Vec<HiddenBlock>,
    bottleneck: Linear,
    dropout: Dropout,
}

impl Encoder {
    fn new(spec: &AutoencoderSpec, vb: VarBuilder) -> candle_core::Result<Self> {
        let embeddings = spec
            .categorical_features
            .iter()
            .map(|f| {
                embedding(
                    f.table_size(),
                    f.embedding_dim,
                    vb.pp(format!("{}_embedding", f.name)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let mut blocks = Vec::with_capacity(spec.hidden_layer_dims.len());
        let mut width = spec.input_width();
        for (i, &units) in spec.hidden_layer_dims.iter().enumerate() {
            blocks.push(HiddenBlock {
                norm_in: layer_norm(width, LAYER_NORM_EPS, vb.pp(format!("hidden_{i}_norm_in")))?,
                dense: linear(width, units, vb.pp(format!("hidden_{i}")))?,
                norm_out: layer_norm(units, LAYER_NORM_EPS, vb.pp(format!("hidden_{i}_norm_out")))?,
            });
            width = units;
        }
        let bottleneck = linear(width, spec.bottleneck_dim, vb.pp("bottleneck"))?;

        Ok(Self {
            embeddings,
            blocks,
            bottleneck,
            dropout: Dropout::new(spec.dropout),
        })
    }

    fn forward(&self, inputs: &Batch, train: bool) -> candle_core::Result<Tensor> {
        let mut parts = Vec::with_capacity(self.embeddings.len() + 1);
        if let Some(numerical) = &inputs.numerical {
            parts.push(numerical.clone());
        }
        for (table, indices) in self.embeddings.iter().zip(&inputs.categorical) {
            parts.push(table.forward(indices)?);
        }

        let mut x = Tensor::cat(&parts, 1)?;
        for block in &self.blocks {
            x = block.norm_in.forward(&x)?;
            x = block.dense.forward(&x)?.relu()?;
            x = block.norm_out.forward(&x)?;
            x = self.dropout.forward_t(&x, train)?;
        }
        self.bottleneck.forward(&x)?.tanh()
    }
}

struct DecoderOutput {
    numerical: Option<Tensor>,
    /// Unnormalized scores per categorical feature; softmax is folded into the loss.
    logits: Vec<Tensor>,
}

struct Decoder {
    first: Linear,
    layers: Vec<Linear>,
    numerical_head: Option<Linear>,
    categorical_heads: Vec<Linear>,
    dropout: Dropout,
}

impl Decoder {
    fn new(spec: &AutoencoderSpec, vb: VarBuilder) -> candle_core::Result<Self> {
        let first = linear(spec.bottleneck_dim, spec.bottleneck_dim, vb.pp("first_decoding_layer"))?;

        let mut layers = Vec::with_capacity(spec.hidden_layer_dims.len());
        let mut width = spec.bottleneck_dim;
        for (i, &units) in spec.hidden_layer_dims.iter().rev().enumerate() {
            layers.push(linear(width, units, vb.pp(format!("decoding_{i}")))?);
            width = units;
        }

        let numerical_head = if spec.numerical_features > 0 {
            Some(linear(width, spec.numerical_features, vb.pp(NUMERICAL_OUTPUTS_KEY))?)
        } else {
            None
        };
        let categorical_heads = spec
            .categorical_features
            .iter()
            .map(|f| linear(width, f.table_size(), vb.pp(outputs_key(&f.name))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        Ok(Self {
            first,
            layers,
            numerical_head,
            categorical_heads,
            dropout: Dropout::new(spec.dropout),
        })
    }

    fn forward(&self, code: &Tensor, train: bool) -> candle_core::Result<DecoderOutput> {
        let mut x = self.first.forward(code)?.relu()?;
        for layer in &self.layers {
            x = layer.forward(&x)?.relu()?;
            x = self.dropout.forward_t(&x, train)?;
        }
        Ok(DecoderOutput {
            numerical: self.numerical_head.as_ref().map(|h| h.forward(&x)).transpose()?,
            logits: self
                .categorical_heads
                .iter()
                .map(|h| h.forward(&x))
                .collect::<candle_core::Result<Vec<_>>>()?,
        })
    }
}

/// Tabular autoencoder trained with AdamW on weighted reconstruction loss.
pub struct CandleAutoencoder {
    spec: AutoencoderSpec,
    varmap: VarMap,
    encoder: Encoder,
    decoder: Decoder,
    device: Device,
}

impl CandleAutoencoder {
    pub fn new(spec: AutoencoderSpec, device: Device) -> Result<Self, AutoembedError> {
        spec.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let encoder = Encoder::new(&spec, vb.pp(ENCODER_PREFIX))?;
        let decoder = Decoder::new(&spec, vb.pp(DECODER_PREFIX))?;
        debug!(
            "Built autoencoder: input width {}, hidden {:?}, bottleneck {}",
            spec.input_width(),
            spec.hidden_layer_dims,
            spec.bottleneck_dim
        );
        Ok(Self {
            spec,
            varmap,
            encoder,
            decoder,
            device,
        })
    }

    pub fn spec(&self) -> &AutoencoderSpec {
        &self.spec
    }

    /// Restore only the encoder weights from `encoder.safetensors`.
    ///
    /// The decoder stays at its initial values, so the result is meant for
    /// [`embed`](EmbeddingModel::embed) and not for further training.
    pub fn load_encoder(path: &Path) -> Result<Self, AutoembedError> {
        let model = Self::new(read_spec(path)?, select_device())?;
        let tensors = candle_core::safetensors::load(path.join(ENCODER_WEIGHTS_FILE), &model.device)?;
        {
            let vars = model.vars()?;
            for (name, var) in vars.iter().filter(|(name, _)| is_encoder_var(name)) {
                let tensor = tensors.get(name).ok_or_else(|| {
                    AutoembedError::Model(format!("encoder weights are missing '{}'", name))
                })?;
                var.set(tensor)?;
            }
        }
        Ok(model)
    }

    fn vars(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, candle_core::Var>>, AutoembedError> {
        self.varmap
            .data()
            .lock()
            .map_err(|e| AutoembedError::Model(format!("weight store lock poisoned: {}", e)))
    }

    fn batch(
        &self,
        tensors: &FeatureTensors,
        numerical_key: &str,
        categorical_key: impl Fn(&str) -> String,
    ) -> Result<Batch, AutoembedError> {
        let rows = tensors.rows();

        let numerical = if self.spec.numerical_features > 0 {
            let block = tensors.numerical(numerical_key)?;
            let (block_rows, width) = block.dim();
            if width != self.spec.numerical_features {
                return Err(AutoembedError::ShapeMismatch {
                    expected: self.spec.numerical_features,
                    actual: width,
                });
            }
            if block_rows != rows {
                return Err(AutoembedError::ShapeMismatch {
                    expected: rows,
                    actual: block_rows,
                });
            }
            Some(array2_to_tensor(block, &self.device)?)
        } else {
            None
        };

        let categorical = self
            .spec
            .categorical_features
            .iter()
            .map(|feature| {
                let key = categorical_key(&feature.name);
                let indices = tensors.categorical(&key)?;
                if indices.len() != rows {
                    return Err(AutoembedError::ShapeMismatch {
                        expected: rows,
                        actual: indices.len(),
                    });
                }
                if let Some(&bad) = indices.iter().find(|&&i| i as usize >= feature.table_size()) {
                    return Err(AutoembedError::InvalidSchema(format!(
                        "'{}' index {} exceeds the embedding table size {}",
                        key,
                        bad,
                        feature.table_size()
                    )));
                }
                Ok(array1_to_tensor(indices, &self.device)?)
            })
            .collect::<Result<Vec<_>, AutoembedError>>()?;

        Ok(Batch {
            numerical,
            categorical,
        })
    }

    /// Weighted sum of the numeric MSE and the per-feature cross-entropies.
    fn loss(&self, inputs: &Batch, targets: &Batch, train: bool) -> candle_core::Result<Tensor> {
        let code = self.encoder.forward(inputs, train)?;
        let output = self.decoder.forward(&code, train)?;

        let mut terms = Vec::with_capacity(output.logits.len() + 1);
        if let (Some(predicted), Some(expected)) = (&output.numerical, &targets.numerical) {
            terms.push(loss::mse(predicted, expected)?.affine(NUMERICAL_LOSS_WEIGHT, 0.0)?);
        }
        for ((logits, expected), feature) in output
            .logits
            .iter()
            .zip(&targets.categorical)
            .zip(&self.spec.categorical_features)
        {
            terms.push(loss::cross_entropy(logits, expected)?.affine(feature.loss_weight, 0.0)?);
        }

        let mut total = Tensor::zeros((), DType::F32, &self.device)?;
        for term in &terms {
            total = total.add(term)?;
        }
        Ok(total)
    }

    /// Row-weighted mean loss over `rows` with dropout disabled.
    fn evaluate(
        &self,
        inputs: &Batch,
        targets: &Batch,
        rows: Range<usize>,
        batch_size: usize,
    ) -> Result<f64, AutoembedError> {
        let mut total = 0.0;
        let mut seen = 0usize;
        let indices: Vec<u32> = rows.map(|r| r as u32).collect();
        for chunk in indices.chunks(batch_size) {
            let idx = Tensor::from_slice(chunk, chunk.len(), &self.device)?;
            let loss = self.loss(&inputs.select(&idx)?, &targets.select(&idx)?, false)?;
            total += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            seen += chunk.len();
        }
        Ok(if seen == 0 { 0.0 } else { total / seen as f64 })
    }
}

fn is_encoder_var(name: &str) -> bool {
    name.starts_with(ENCODER_PREFIX) && name[ENCODER_PREFIX.len()..].starts_with('.')
}

fn read_spec(path: &Path) -> Result<AutoencoderSpec, AutoembedError> {
    let raw = std::fs::read_to_string(path.join(ARCHITECTURE_FILE))?;
    Ok(serde_json::from_str(&raw)?)
}

impl EmbeddingModel for CandleAutoencoder {
    fn from_dataset_analysis(
        analysis: &DatasetAnalysis,
        bottleneck_dim: usize,
        hidden_layer_dims: &[usize],
    ) -> Result<Self, AutoembedError> {
        let spec = AutoencoderSpec::from_dataset_analysis(analysis, bottleneck_dim, hidden_layer_dims)?;
        Self::new(spec, select_device())
    }

    fn fit(
        &mut self,
        x: &FeatureTensors,
        y: &FeatureTensors,
        options: &FitOptions,
    ) -> Result<TrainingHistory, AutoembedError> {
        let rows = x.rows();
        if rows == 0 {
            return Err(AutoembedError::Validation(
                "cannot train on an empty dataset".to_string(),
            ));
        }
        if y.rows() != rows {
            return Err(AutoembedError::ShapeMismatch {
                expected: rows,
                actual: y.rows(),
            });
        }
        if options.batch_size == 0 {
            return Err(AutoembedError::Validation(
                "batch size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&options.validation_split) {
            return Err(AutoembedError::Validation(format!(
                "validation split {} must be in [0, 1)",
                options.validation_split
            )));
        }

        let inputs = self.batch(x, NUMERICAL_INPUTS_FEATURES_KEY, |name| name.to_string())?;
        let targets = self.batch(y, NUMERICAL_OUTPUTS_KEY, outputs_key)?;

        let train_rows = ((rows as f64) * (1.0 - options.validation_split)).floor() as usize;
        let train_rows = train_rows.clamp(1, rows);
        info!(
            "Training autoencoder on {} rows ({} held out for validation), {} epochs, batch size {}",
            train_rows,
            rows - train_rows,
            options.epochs,
            options.batch_size
        );

        let params = ParamsAdamW {
            lr: self.spec.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(self.varmap.all_vars(), params)?;
        let mut rng = StdRng::seed_from_u64(options.seed);
        let mut order: Vec<u32> = (0..train_rows as u32).collect();
        let mut history = TrainingHistory::default();

        for epoch in 1..=options.epochs {
            if options.shuffle {
                order.shuffle(&mut rng);
            }

            let mut total = 0.0;
            for chunk in order.chunks(options.batch_size) {
                let idx = Tensor::from_slice(chunk, chunk.len(), &self.device)?;
                let loss = self.loss(&inputs.select(&idx)?, &targets.select(&idx)?, true)?;
                optimizer.backward_step(&loss)?;
                total += loss.to_scalar::<f32>()? as f64 * chunk.len() as f64;
            }
            let train_loss = total / train_rows as f64;

            let val_loss = if train_rows < rows {
                Some(self.evaluate(&inputs, &targets, train_rows..rows, options.batch_size)?)
            } else {
                None
            };

            match val_loss {
                Some(v) => info!(
                    "Epoch {}/{}: loss={:.5} val_loss={:.5}",
                    epoch, options.epochs, train_loss, v
                ),
                None => info!("Epoch {}/{}: loss={:.5}", epoch, options.epochs, train_loss),
            }
            history.epochs.push(EpochMetrics {
                epoch,
                loss: train_loss,
                val_loss,
            });
        }

        Ok(history)
    }

    fn embed(&self, x: &FeatureTensors) -> Result<Array2<f32>, AutoembedError> {
        let rows = x.rows();
        let dim = self.spec.bottleneck_dim;
        let inputs = self.batch(x, NUMERICAL_INPUTS_FEATURES_KEY, |name| name.to_string())?;

        let mut values = Vec::with_capacity(rows * dim);
        for start in (0..rows).step_by(EMBED_BATCH_SIZE) {
            let end = (start + EMBED_BATCH_SIZE).min(rows);
            let idx = Tensor::arange(start as u32, end as u32, &self.device)?;
            let code = self.encoder.forward(&inputs.select(&idx)?, false)?;
            values.extend(code.flatten_all()?.to_vec1::<f32>()?);
        }
        Ok(Array2::from_shape_vec((rows, dim), values)?)
    }

    fn embedding_dim(&self) -> usize {
        self.spec.bottleneck_dim
    }

    fn save(&self, path: &Path) -> Result<(), AutoembedError> {
        std::fs::create_dir_all(path)?;
        std::fs::write(
            path.join(ARCHITECTURE_FILE),
            serde_json::to_string_pretty(&self.spec)?,
        )?;
        self.varmap.save(path.join(AUTOENCODER_WEIGHTS_FILE))?;

        let encoder: HashMap<String, Tensor> = self
            .vars()?
            .iter()
            .filter(|(name, _)| is_encoder_var(name))
            .map(|(name, var)| (name.clone(), var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&encoder, path.join(ENCODER_WEIGHTS_FILE))?;

        info!("Saved autoencoder to {}", path.display());
        Ok(())
    }

    fn load(path: &Path) -> Result<Self, AutoembedError> {
        let mut model = Self::new(read_spec(path)?, select_device())?;
        model.varmap.load(path.join(AUTOENCODER_WEIGHTS_FILE))?;
        debug!("Loaded autoencoder from {}", path.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Cell, Table};
    use crate::features::DatasetPreprocessor;

    fn listings(rows: usize) -> Table {
        let makes = ["renault", "peugeot", "citroen"];
        let energies = ["diesel", "petrol"];
        Table::from_columns(vec![
            (
                "price".to_string(),
                (0..rows).map(|i| Cell::from(1000.0 + 250.0 * i as f64)).collect(),
            ),
            (
                "mileage".to_string(),
                (0..rows)
                    .map(|i| if i % 7 == 0 { Cell::Null } else { Cell::from(i as f64 * 3.5) })
                    .collect(),
            ),
            (
                "make".to_string(),
                (0..rows).map(|i| Cell::from(makes[i % makes.len()])).collect(),
            ),
            (
                "energy".to_string(),
                (0..rows).map(|i| Cell::from(energies[i % energies.len()])).collect(),
            ),
        ])
        .unwrap()
    }

    fn fitted(rows: usize) -> (DatasetPreprocessor, Table) {
        let table = listings(rows);
        let mut p = DatasetPreprocessor::new(
            vec!["price".into(), "mileage".into()],
            vec!["make".into(), "energy".into()],
        );
        p.fit(&table).unwrap();
        (p, table)
    }

    fn model(p: &DatasetPreprocessor) -> CandleAutoencoder {
        let spec = AutoencoderSpec::from_dataset_analysis(&p.get_analysis().unwrap(), 4, &[16, 8])
            .unwrap();
        CandleAutoencoder::new(spec, Device::Cpu).unwrap()
    }

    #[test]
    fn test_fit_records_history_with_validation() {
        let (p, table) = fitted(40);
        let mut m = model(&p);
        let x = p.preprocess(&table).unwrap();
        let y = p.preprocess_target(&table).unwrap();

        let history = m.fit(&x, &y, &FitOptions::new(3, 8)).unwrap();
        assert_eq!(history.epochs.len(), 3);
        assert!(history.epochs.iter().all(|e| e.loss.is_finite()));
        assert!(history.epochs.iter().all(|e| e.val_loss.is_some()));
        assert!(history.final_loss().is_some());
    }

    #[test]
    fn test_fit_rejects_empty_and_zero_batch() {
        let (p, table) = fitted(10);
        let mut m = model(&p);
        let x = p.preprocess(&table).unwrap();
        let y = p.preprocess_target(&table).unwrap();
        assert!(m.fit(&x, &y, &FitOptions::new(1, 0)).is_err());

        let empty = FeatureTensors::new(0);
        assert!(m.fit(&empty, &empty, &FitOptions::new(1, 4)).is_err());
    }

    #[test]
    fn test_embed_shape_and_bounds() {
        let (p, table) = fitted(25);
        let m = model(&p);
        let out = m.embed(&p.preprocess(&table).unwrap()).unwrap();
        assert_eq!(out.dim(), (25, 4));
        assert_eq!(m.embedding_dim(), 4);
        // tanh bottleneck
        assert!(out.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn test_embed_is_deterministic_without_dropout() {
        let (p, table) = fitted(12);
        let m = model(&p);
        let x = p.preprocess(&table).unwrap();
        assert_eq!(m.embed(&x).unwrap(), m.embed(&x).unwrap());
    }

    #[test]
    fn test_embed_rejects_wrong_numeric_width() {
        let (p, table) = fitted(5);
        let m = model(&p);
        let mut x = p.preprocess(&table).unwrap();
        x.insert(
            NUMERICAL_INPUTS_FEATURES_KEY,
            crate::features::FeatureArray::Numerical(Array2::zeros((5, 3))),
        );
        let err = m.embed(&x).unwrap_err();
        assert!(matches!(
            err,
            AutoembedError::ShapeMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn test_save_and_load_reproduce_embeddings() {
        let (p, table) = fitted(20);
        let mut m = model(&p);
        let x = p.preprocess(&table).unwrap();
        let y = p.preprocess_target(&table).unwrap();
        m.fit(&x, &y, &FitOptions::new(2, 5)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        m.save(dir.path()).unwrap();
        assert!(dir.path().join(ARCHITECTURE_FILE).exists());
        assert!(dir.path().join(AUTOENCODER_WEIGHTS_FILE).exists());
        assert!(dir.path().join(ENCODER_WEIGHTS_FILE).exists());

        let expected = m.embed(&x).unwrap();
        let restored = CandleAutoencoder::load(dir.path()).unwrap();
        assert_eq!(restored.spec(), m.spec());
        let actual = restored.embed(&x).unwrap();
        for (a, b) in expected.iter().zip(actual.iter()) {
            assert!((a - b).abs() < 1e-5);
        }

        let encoder_only = CandleAutoencoder::load_encoder(dir.path()).unwrap();
        let actual = encoder_only.embed(&x).unwrap();
        for (a, b) in expected.iter().zip(actual.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_categorical_only_schema() {
        let table = listings(10);
        let mut p = DatasetPreprocessor::new(vec![], vec!["make".into()]);
        p.fit(&table).unwrap();
        let m = CandleAutoencoder::from_dataset_analysis(&p.get_analysis().unwrap(), 3, &[8])
            .unwrap();
        let out = m.embed(&p.preprocess(&table).unwrap()).unwrap();
        assert_eq!(out.dim(), (10, 3));
    }

    #[test]
    fn test_encoder_var_prefix() {
        assert!(is_encoder_var("encoder.bottleneck.weight"));
        assert!(!is_encoder_var("encoderx.weight"));
        assert!(!is_encoder_var("decoder.first_decoding_layer.bias"));
    }
}
