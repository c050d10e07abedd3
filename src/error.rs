//! Error types for the classification pipeline

use std::fmt;
use thiserror::Error;

/// Classification stage a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Pregnancy risk level (always executed)
    A,
    /// Disease status (only on escalation)
    B,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::A => write!(f, "stage A"),
            Stage::B => write!(f, "stage B"),
        }
    }
}

/// Model or scaler handle held by the pipeline context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    ScalerA,
    ModelA,
    ScalerB,
    ModelB,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Handle::ScalerA => "scaler_a",
            Handle::ModelA => "model_a",
            Handle::ScalerB => "scaler_b",
            Handle::ModelB => "model_b",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Model handle {handle} is not loaded")]
    ModelUnavailable { handle: Handle },

    #[error("Missing required field {field} for {stage}")]
    InputShape { stage: Stage, field: &'static str },

    #[error("Inference failed: {0}")]
    Inference(#[from] anyhow::Error),
}
