#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Surge classifier adapter.
//!
//! [`SurgeModel`] owns the loaded classifier for the lifetime of the
//! process and turns a [`FeatureRow`] into a probability in `[0, 1]`. The
//! shipped classifier is a LightGBM ensemble ([`lightgbm::GbdtModel`]);
//! anything implementing [`SurgeClassifier`] can stand in for it.

pub mod lightgbm;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use surge_models::{FEATURE_COUNT, FeatureRow};
use thiserror::Error;

pub use lightgbm::GbdtModel;

/// Errors loading the model. Every variant means the model is unavailable
/// and the service must not start.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The artifact could not be read.
    #[error("model unavailable: failed to read {}: {source}", path.display())]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The artifact is not valid JSON for a model dump.
    #[error("model unavailable: invalid model JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The model was trained on different columns.
    #[error("model unavailable: feature names {found:?} do not match {expected:?}")]
    SchemaMismatch {
        /// Columns the service produces.
        expected: Vec<String>,
        /// Columns the model declares.
        found: Vec<String>,
    },

    /// The objective is not a single-output binary objective.
    #[error("model unavailable: unsupported objective '{0}'")]
    UnsupportedObjective(String),

    /// A tree references a missing feature or has an unsupported split.
    #[error("model unavailable: {message}")]
    InvalidTree {
        /// Description.
        message: String,
    },
}

/// A binary classifier over the eight feature columns.
pub trait SurgeClassifier: Send + Sync {
    /// Positive-class probability for `features` (model input order).
    fn predict_proba(&self, features: &[f64; FEATURE_COUNT]) -> f64;

    /// Short description for logs and `inspect-model`.
    fn describe(&self) -> String {
        "custom classifier".to_string()
    }
}

/// Load-once wrapper around a [`SurgeClassifier`].
#[derive(Clone)]
pub struct SurgeModel {
    classifier: Arc<dyn SurgeClassifier>,
}

impl std::fmt::Debug for SurgeModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurgeModel")
            .field("classifier", &self.classifier.describe())
            .finish()
    }
}

impl SurgeModel {
    /// Wraps an already-loaded classifier.
    #[must_use]
    pub fn new(classifier: Arc<dyn SurgeClassifier>) -> Self {
        Self { classifier }
    }

    /// Loads the LightGBM model dump at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the file is missing, malformed, uses an
    /// unsupported objective or was trained on different features.
    pub fn load(path: &Path) -> Result<Self, ModelError> {
        let model = GbdtModel::load(path)?;
        log::info!(
            "Loaded surge model from {}: {}",
            path.display(),
            model.describe()
        );
        Ok(Self::new(Arc::new(model)))
    }

    /// Surge probability for `row`, clamped to `[0, 1]`.
    #[must_use]
    pub fn predict(&self, row: &FeatureRow) -> f64 {
        let probability = self.classifier.predict_proba(&row.to_array());
        if probability.is_nan() {
            log::warn!("Classifier returned NaN for {row:?}; reporting 0");
            return 0.0;
        }
        probability.clamp(0.0, 1.0)
    }

    /// Description of the wrapped classifier.
    #[must_use]
    pub fn describe(&self) -> String {
        self.classifier.describe()
    }
}
