//! Scalers, classifiers and the two-stage pipeline built on them

pub mod classifier;
pub mod loader;
pub mod pipeline;
pub mod scaler;

pub use classifier::{Classifier, OnnxClassifier};
pub use loader::{ModelHandles, ModelLoader};
pub use pipeline::PipelineContext;
pub use scaler::{FeatureScaler, StandardScaler};
