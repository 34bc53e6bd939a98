//! Fits a [`ModelArtifact`] from historical subscriptions

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classifier::{
    FeaturePreprocessor, GradientDescent, InferenceError, ModelArtifact, SoftmaxClassifier,
    ARTIFACT_FORMAT_VERSION,
};
use super::features::{FeatureEngineer, FeatureSchema, FeatureVector};
use super::stats::UsageStatistics;
use crate::domain::plan::PlanCategory;
use crate::domain::subscriber::SubscriberId;
use crate::domain::subscription::TrainingRow;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    /// Share of valid rows held out for accuracy (default: 0.2)
    pub holdout_fraction: f64,
    /// Seed for the holdout shuffle (default: 42)
    pub seed: u64,
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
    /// Fewer valid rows than this fails training (never below 2)
    pub min_rows: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            holdout_fraction: 0.2,
            seed: 42,
            epochs: 500,
            learning_rate: 0.1,
            l2: 0.01,
            min_rows: 2,
        }
    }
}

impl TrainingSettings {
    fn descent(&self) -> GradientDescent {
        GradientDescent { epochs: self.epochs, learning_rate: self.learning_rate, l2: self.l2 }
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum TrainingError {
    #[error("no training rows were available")]
    NoExamples,
    #[error("only {valid} valid training rows, need at least {required}")]
    InsufficientRows { valid: usize, required: usize },
    #[error("no usable features: every input column is constant")]
    NoUsableFeatures,
    #[error("preprocessing failed: {0}")]
    Preprocessing(#[from] InferenceError),
    #[error("artifact store failure: {0}")]
    Store(String),
}

/// Labelled feature vectors plus how many source rows were discarded.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingSet {
    pub examples: Vec<FeatureVector>,
    pub dropped: usize,
}

impl TrainingSet {
    /// Build labelled vectors from joined subscription rows. Rows whose plan
    /// cannot be resolved or whose status is not training evidence are
    /// dropped.
    pub fn build(
        rows: &[TrainingRow],
        usage: &HashMap<SubscriberId, UsageStatistics>,
        engineer: &FeatureEngineer,
    ) -> Self {
        let mut set = Self::default();
        for row in rows {
            if row.plan.is_none() || !row.subscription.status.counts_as_outcome() {
                set.dropped += 1;
                continue;
            }
            let stats = usage.get(&row.subscriber.id).copied().unwrap_or_default();
            set.examples.push(engineer.for_training(row, &stats));
        }
        set
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    Succeeded,
    Failed,
}

/// Outcome of a training run. A failed run never touches the active
/// artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub status: TrainingStatus,
    pub accuracy: Option<f64>,
    pub reason: Option<String>,
    pub version: Option<String>,
    pub training_rows: usize,
    pub holdout_rows: usize,
    pub dropped_rows: usize,
    pub trained_at: DateTime<Utc>,
}

impl TrainingReport {
    pub fn succeeded(artifact: &ModelArtifact, dropped_rows: usize) -> Self {
        Self {
            status: TrainingStatus::Succeeded,
            accuracy: Some(artifact.accuracy),
            reason: None,
            version: Some(artifact.version.clone()),
            training_rows: artifact.training_rows,
            holdout_rows: artifact.holdout_rows,
            dropped_rows,
            trained_at: artifact.trained_at,
        }
    }

    pub fn failed(reason: impl Into<String>, dropped_rows: usize, at: DateTime<Utc>) -> Self {
        Self {
            status: TrainingStatus::Failed,
            accuracy: None,
            reason: Some(reason.into()),
            version: None,
            training_rows: 0,
            holdout_rows: 0,
            dropped_rows,
            trained_at: at,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TrainingStatus::Succeeded
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelTrainer {
    settings: TrainingSettings,
}

impl ModelTrainer {
    pub fn new(settings: TrainingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TrainingSettings {
        &self.settings
    }

    /// Fit a new artifact. Unlabelled examples are ignored.
    pub fn train(
        &self,
        examples: &[FeatureVector],
        version: impl Into<String>,
        trained_at: DateTime<Utc>,
    ) -> Result<ModelArtifact, TrainingError> {
        if examples.is_empty() {
            return Err(TrainingError::NoExamples);
        }

        let labelled: Vec<(&FeatureVector, PlanCategory)> = examples
            .iter()
            .filter_map(|example| example.label.map(|label| (example, label)))
            .collect();
        let required = self.settings.min_rows.max(2);
        if labelled.len() < required {
            return Err(TrainingError::InsufficientRows { valid: labelled.len(), required });
        }

        let (train, holdout) = self.split(labelled.len());

        let train_raw: Vec<_> = train.iter().map(|&i| labelled[i].0.raw_features()).collect();
        let preprocessor = FeaturePreprocessor::fit(FeatureSchema::current(), &train_raw)?;

        let classes: Vec<PlanCategory> =
            train.iter().map(|&i| labelled[i].1).collect::<BTreeSet<_>>().into_iter().collect();
        let class_index = |label: PlanCategory| {
            classes.iter().position(|class| *class == label).unwrap_or(usize::MAX)
        };

        let x_train = train_raw
            .iter()
            .map(|row| preprocessor.transform(row))
            .collect::<Result<Vec<_>, _>>()?;
        if !has_signal(&x_train) {
            return Err(TrainingError::NoUsableFeatures);
        }
        let y_train: Vec<usize> = train.iter().map(|&i| class_index(labelled[i].1)).collect();

        let x_holdout = holdout
            .iter()
            .map(|&i| preprocessor.transform(&labelled[i].0.raw_features()))
            .collect::<Result<Vec<_>, _>>()?;
        let y_holdout: Vec<usize> = holdout.iter().map(|&i| class_index(labelled[i].1)).collect();

        let classifier =
            SoftmaxClassifier::fit(&x_train, &y_train, classes.clone(), self.settings.descent());
        let accuracy = classifier.accuracy(&x_holdout, &y_holdout)?;

        Ok(ModelArtifact {
            version: version.into(),
            format_version: ARTIFACT_FORMAT_VERSION,
            trained_at,
            accuracy,
            training_rows: train.len(),
            holdout_rows: holdout.len(),
            preprocessor,
            classifier,
        })
    }

    /// Deterministic shuffle then split. The holdout has at least one row and
    /// leaves at least one for training. Expects `n >= 2`.
    fn split(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.settings.seed);
        indices.shuffle(&mut rng);

        let fraction = self.settings.holdout_fraction.clamp(0.0, 1.0);
        let holdout_len = ((n as f64 * fraction).round() as usize).clamp(1, n - 1);
        let holdout = indices.split_off(n - holdout_len);
        (indices, holdout)
    }
}

/// True when at least one encoded column varies across rows.
fn has_signal(x: &[Vec<f64>]) -> bool {
    let Some(first) = x.first() else {
        return false;
    };
    x.iter().skip(1).any(|row| row.iter().zip(first).any(|(a, b)| a != b))
}
