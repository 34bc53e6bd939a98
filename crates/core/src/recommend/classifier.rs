//! Plan-category classifier: preprocessing plus multinomial logistic regression
//!
//! Everything here is deterministic. Weights start at zero and are fitted by
//! batch gradient descent, so the same rows always produce the same artifact.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::{FeatureSchema, FeatureVector, RawFeatures};
use crate::domain::plan::PlanCategory;

/// Bumped whenever the serialized artifact layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Fill value for a categorical column with no observed values
pub const UNKNOWN_CATEGORY: &str = "unknown";

#[derive(Clone, Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("artifact format version {found} is not supported (expected {expected})")]
    FormatVersion { found: u32, expected: u32 },
    #[error("artifact was fitted against a different feature schema")]
    SchemaMismatch,
    #[error("expected {expected} {kind} features, got {actual}")]
    Shape { kind: &'static str, expected: usize, actual: usize },
    #[error("classifier weights do not match the {expected}-column input")]
    Dimension { expected: usize },
    #[error("classifier has no classes")]
    NoClasses,
    #[error("classifier produced a non-finite score")]
    NonFinite,
}

/// Median/mode imputation, standard scaling and one-hot encoding, fitted on
/// the training rows and replayed verbatim at inference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeaturePreprocessor {
    pub schema: FeatureSchema,
    pub numeric_fill: Vec<f64>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub categorical_fill: Vec<String>,
    /// Sorted vocabulary per categorical column
    pub vocabularies: Vec<Vec<String>>,
}

impl FeaturePreprocessor {
    pub fn fit(schema: FeatureSchema, rows: &[RawFeatures]) -> Result<Self, InferenceError> {
        for row in rows {
            check_shape(&schema, row)?;
        }

        let numeric_fill: Vec<f64> = (0..schema.numeric.len())
            .map(|column| median(rows.iter().filter_map(|row| row.numeric[column])))
            .collect();
        let categorical_fill: Vec<String> = (0..schema.categorical.len())
            .map(|column| mode(rows.iter().filter_map(|row| row.categorical[column].as_deref())))
            .collect();

        let mut means = Vec::with_capacity(numeric_fill.len());
        let mut scales = Vec::with_capacity(numeric_fill.len());
        for (column, fill) in numeric_fill.iter().enumerate() {
            let values: Vec<f64> =
                rows.iter().map(|row| impute(row.numeric[column], *fill)).collect();
            let (mean, std) = mean_and_population_std(&values);
            means.push(mean);
            scales.push(if std > 0.0 { std } else { 1.0 });
        }

        let vocabularies = categorical_fill
            .iter()
            .enumerate()
            .map(|(column, fill)| {
                rows.iter()
                    .map(|row| row.categorical[column].clone().unwrap_or_else(|| fill.clone()))
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .collect();

        Ok(Self { schema, numeric_fill, means, scales, categorical_fill, vocabularies })
    }

    /// Width of the encoded input vector.
    pub fn dimension(&self) -> usize {
        self.numeric_fill.len() + self.vocabularies.iter().map(Vec::len).sum::<usize>()
    }

    /// Encode one row. Categories not seen during fitting encode as all zeros.
    pub fn transform(&self, row: &RawFeatures) -> Result<Vec<f64>, InferenceError> {
        check_shape(&self.schema, row)?;

        let mut encoded = Vec::with_capacity(self.dimension());
        for (column, value) in row.numeric.iter().enumerate() {
            let value = impute(*value, self.numeric_fill[column]);
            encoded.push((value - self.means[column]) / self.scales[column]);
        }

        for (column, vocabulary) in self.vocabularies.iter().enumerate() {
            let value = row.categorical[column].as_deref().unwrap_or(self.categorical_fill[column].as_str());
            encoded.extend(vocabulary.iter().map(|known| if known == value { 1.0 } else { 0.0 }));
        }

        Ok(encoded)
    }
}

fn check_shape(schema: &FeatureSchema, row: &RawFeatures) -> Result<(), InferenceError> {
    if row.numeric.len() != schema.numeric.len() {
        return Err(InferenceError::Shape {
            kind: "numeric",
            expected: schema.numeric.len(),
            actual: row.numeric.len(),
        });
    }
    if row.categorical.len() != schema.categorical.len() {
        return Err(InferenceError::Shape {
            kind: "categorical",
            expected: schema.categorical.len(),
            actual: row.categorical.len(),
        });
    }
    Ok(())
}

fn impute(value: Option<f64>, fill: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(fill)
}

/// Median of finite values, 0 when there are none.
fn median(values: impl Iterator<Item = f64>) -> f64 {
    let mut values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Most frequent value; ties go to the lexicographically smallest.
fn mode<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string()).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string())
}

fn mean_and_population_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Batch gradient descent hyperparameters
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GradientDescent {
    pub epochs: usize,
    pub learning_rate: f64,
    /// L2 penalty on weights; biases are not regularized
    pub l2: f64,
}

/// Multinomial logistic regression over encoded inputs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    pub classes: Vec<PlanCategory>,
    /// One row per class
    pub weights: Vec<Vec<f64>>,
    pub biases: Vec<f64>,
}

impl SoftmaxClassifier {
    /// Fit on encoded rows `x` with labels `y` indexing into `classes`.
    pub fn fit(
        x: &[Vec<f64>],
        y: &[usize],
        classes: Vec<PlanCategory>,
        descent: GradientDescent,
    ) -> Self {
        let dimension = x.first().map_or(0, Vec::len);
        let class_count = classes.len();
        let mut model = Self {
            classes,
            weights: vec![vec![0.0; dimension]; class_count],
            biases: vec![0.0; class_count],
        };
        if x.is_empty() || class_count == 0 {
            return model;
        }

        let n = x.len() as f64;
        for _ in 0..descent.epochs {
            let mut weight_grads = vec![vec![0.0; dimension]; class_count];
            let mut bias_grads = vec![0.0; class_count];

            for (row, label) in x.iter().zip(y) {
                let probabilities = model.softmax(row);
                for (class, probability) in probabilities.iter().enumerate() {
                    let error = probability - if class == *label { 1.0 } else { 0.0 };
                    bias_grads[class] += error;
                    for (grad, xi) in weight_grads[class].iter_mut().zip(row) {
                        *grad += error * xi;
                    }
                }
            }

            for class in 0..class_count {
                model.biases[class] -= descent.learning_rate * bias_grads[class] / n;
                for (weight, grad) in model.weights[class].iter_mut().zip(&weight_grads[class]) {
                    *weight -= descent.learning_rate * (grad / n + descent.l2 * *weight);
                }
            }
        }

        model
    }

    fn softmax(&self, x: &[f64]) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(weights, bias)| bias + weights.iter().zip(x).map(|(w, xi)| w * xi).sum::<f64>())
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exps: Vec<f64> = logits.iter().map(|logit| (logit - max).exp()).collect();
        let total: f64 = exps.iter().sum();
        exps.into_iter().map(|e| e / total).collect()
    }

    /// Class probabilities in `classes` order.
    pub fn probabilities(&self, x: &[f64]) -> Result<Vec<f64>, InferenceError> {
        if self.classes.is_empty() {
            return Err(InferenceError::NoClasses);
        }
        if self.weights.iter().any(|row| row.len() != x.len()) {
            return Err(InferenceError::Dimension { expected: x.len() });
        }
        let probabilities = self.softmax(x);
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::NonFinite);
        }
        Ok(probabilities)
    }

    /// Index of the most probable class; the lowest index wins ties.
    pub fn predict_index(&self, x: &[f64]) -> Result<usize, InferenceError> {
        let probabilities = self.probabilities(x)?;
        let mut best = 0;
        for (index, probability) in probabilities.iter().enumerate() {
            if *probability > probabilities[best] {
                best = index;
            }
        }
        Ok(best)
    }

    pub fn accuracy(&self, x: &[Vec<f64>], y: &[usize]) -> Result<f64, InferenceError> {
        if x.is_empty() {
            return Ok(0.0);
        }
        let mut correct = 0;
        for (row, label) in x.iter().zip(y) {
            if self.predict_index(row)? == *label {
                correct += 1;
            }
        }
        Ok(correct as f64 / x.len() as f64)
    }
}

/// A trained, immutable classifier bundle. Persisted through an
/// [`ArtifactStore`](super::artifact::ArtifactStore).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    /// Holdout accuracy
    pub accuracy: f64,
    pub training_rows: usize,
    pub holdout_rows: usize,
    pub preprocessor: FeaturePreprocessor,
    pub classifier: SoftmaxClassifier,
}

impl ModelArtifact {
    /// Rejects artifacts this build cannot interpret.
    pub fn check_compatible(&self) -> Result<(), InferenceError> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(InferenceError::FormatVersion {
                found: self.format_version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        if self.preprocessor.schema != FeatureSchema::current() {
            return Err(InferenceError::SchemaMismatch);
        }
        Ok(())
    }

    pub fn predict_category(&self, features: &FeatureVector) -> Result<PlanCategory, InferenceError> {
        self.check_compatible()?;
        let encoded = self.preprocessor.transform(&features.raw_features())?;
        let index = self.classifier.predict_index(&encoded)?;
        self.classifier.classes.get(index).copied().ok_or(InferenceError::NoClasses)
    }
}
