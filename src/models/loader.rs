//! Model and scaler artifact loader

use crate::config::ModelsConfig;
use crate::feature_extractor::{STAGE_A_COLUMNS, STAGE_B_COLUMNS};
use crate::models::classifier::{Classifier, OnnxClassifier};
use crate::models::scaler::{FeatureScaler, StandardScaler};
use anyhow::{Context, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

/// The four artifacts backing the pipeline. A handle is `None` when it
/// failed to load in lenient mode.
#[derive(Default)]
pub struct ModelHandles {
    pub scaler_a: Option<Arc<dyn FeatureScaler>>,
    pub model_a: Option<Arc<dyn Classifier>>,
    pub scaler_b: Option<Arc<dyn FeatureScaler>>,
    pub model_b: Option<Arc<dyn Classifier>>,
}

impl ModelHandles {
    /// Names of the handles that are loaded
    pub fn loaded(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.scaler_a.is_some() {
            names.push("scaler_a");
        }
        if self.model_a.is_some() {
            names.push("model_a");
        }
        if self.scaler_b.is_some() {
            names.push("scaler_b");
        }
        if self.model_b.is_some() {
            names.push("model_b");
        }
        names
    }
}

/// Loader for ONNX classifiers and JSON scalers
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with default settings (1 thread)
    pub fn new() -> Result<Self> {
        Self::with_threads(1)
    }

    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Result<Self> {
        ort::init().commit()?;
        info!(onnx_threads = onnx_threads, "ONNX Runtime initialized");
        Ok(Self { onnx_threads })
    }

    /// Load a single ONNX classifier from file
    pub fn load_classifier<P: AsRef<Path>>(
        &self,
        path: P,
        name: &str,
    ) -> Result<OnnxClassifier> {
        let path = path.as_ref();

        if !path.exists() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        info!(
            model = %name,
            path = %path.display(),
            threads = self.onnx_threads,
            "Loading ONNX model"
        );

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());

        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        let label_output = output_names
            .iter()
            .find(|name| name.contains("label"))
            .or_else(|| output_names.first())
            .cloned()
            .with_context(|| format!("Model {} declares no outputs", name))?;

        let probability_output = output_names
            .iter()
            .find(|name| name.contains("prob"))
            .or_else(|| output_names.iter().find(|name| **name != label_output))
            .cloned();

        info!(
            model = %name,
            input = %input_name,
            label = %label_output,
            probabilities = ?probability_output,
            "Model loaded successfully"
        );

        Ok(OnnxClassifier::new(
            name,
            session,
            input_name,
            label_output,
            probability_output,
        ))
    }

    /// Load all four pipeline artifacts.
    ///
    /// In strict mode the first failure is returned. Otherwise failures are
    /// logged and the corresponding handle is left empty, so requests that
    /// need it fail with `ModelUnavailable`.
    pub fn load_all(&self, config: &ModelsConfig) -> Result<ModelHandles> {
        let dir = Path::new(&config.models_dir);
        let mut handles = ModelHandles::default();

        handles.scaler_a = self.keep(
            config.strict,
            "scaler_a",
            StandardScaler::load(dir.join(&config.scaler_a), &STAGE_A_COLUMNS)
                .map(|s| Arc::new(s) as Arc<dyn FeatureScaler>),
        )?;
        handles.model_a = self.keep(
            config.strict,
            "model_a",
            self.load_classifier(dir.join(&config.model_a), "model_a")
                .map(|m| Arc::new(m) as Arc<dyn Classifier>),
        )?;
        handles.scaler_b = self.keep(
            config.strict,
            "scaler_b",
            StandardScaler::load(dir.join(&config.scaler_b), &STAGE_B_COLUMNS)
                .map(|s| Arc::new(s) as Arc<dyn FeatureScaler>),
        )?;
        handles.model_b = self.keep(
            config.strict,
            "model_b",
            self.load_classifier(dir.join(&config.model_b), "model_b")
                .map(|m| Arc::new(m) as Arc<dyn Classifier>),
        )?;

        info!(
            loaded = ?handles.loaded(),
            "Loaded model artifacts from {}",
            dir.display()
        );

        Ok(handles)
    }

    fn keep<T>(&self, strict: bool, name: &str, loaded: Result<T>) -> Result<Option<T>> {
        match loaded {
            Ok(handle) => Ok(Some(handle)),
            Err(e) if strict => Err(e.context(format!("Failed to load {}", name))),
            Err(e) => {
                error!(
                    handle = %name,
                    error = %format!("{:#}", e),
                    "Failed to load artifact, continuing without it"
                );
                Ok(None)
            }
        }
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}
