//! Maternal Risk Assessment Service Library
//!
//! Serves a two-stage classification pipeline: pregnancy risk level for
//! every record, then disease status for records classified as high risk.
//! Generated advice and WhatsApp alerts are layered on top through
//! external providers.

pub mod advice;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod messaging;
pub mod metrics;
pub mod models;
pub mod server;
pub mod types;

pub use advice::{AdviceGenerator, AdviceService};
pub use config::AppConfig;
pub use error::PipelineError;
pub use feature_extractor::FeatureExtractor;
pub use messaging::AlertSender;
pub use models::pipeline::PipelineContext;
pub use types::{assessment::RiskAssessment, record::ClinicalRecord};
