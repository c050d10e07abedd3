//! Classifier capability and its ONNX Runtime implementation

use anyhow::{bail, Context, Result};
use ort::memory::Allocator;
use ort::session::{Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::sync::Mutex;
use tracing::debug;

/// Upper bound on class ids accepted from a probability map
const MAX_CLASSES: usize = 1024;

/// Discrete classifier over a scaled feature vector.
pub trait Classifier: Send + Sync {
    /// Predicted class id
    fn predict(&self, features: &[f32]) -> Result<i64>;

    /// Class probabilities indexed by class id
    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>>;

    /// Class id and probabilities from a single evaluation
    fn predict_with_proba(&self, features: &[f32]) -> Result<(i64, Vec<f32>)> {
        Ok((self.predict(features)?, self.predict_proba(features)?))
    }
}

/// Classifier backed by an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so concurrent requests are
/// serialised on the session lock.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    label_output: String,
    probability_output: Option<String>,
}

impl OnnxClassifier {
    pub fn new(
        name: &str,
        session: Session,
        input_name: String,
        label_output: String,
        probability_output: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            label_output,
            probability_output,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, features: &[f32], with_proba: bool) -> Result<(i64, Option<Vec<f32>>)> {
        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor = Tensor::from_array((shape, features.to_vec()))
            .context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let outputs = session.run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        let label = self.extract_label(&outputs)?;
        let probabilities = if with_proba {
            Some(self.extract_probabilities(&outputs)?)
        } else {
            None
        };

        debug!(model = %self.name, label = label, "Classifier evaluated");

        Ok((label, probabilities))
    }

    fn extract_label(&self, outputs: &SessionOutputs) -> Result<i64> {
        let output = outputs
            .get(self.label_output.as_str())
            .ok_or_else(|| {
                anyhow::anyhow!("Model {} has no output {}", self.name, self.label_output)
            })?;

        let (_, data) = output
            .try_extract_tensor::<i64>()
            .context("Label output is not an int64 tensor")?;

        data.first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model {} returned an empty label", self.name))
    }

    /// Probabilities come either as a `[1, n_classes]` float tensor or as
    /// `seq(map(int64, float))`, depending on how the model was exported.
    fn extract_probabilities(&self, outputs: &SessionOutputs) -> Result<Vec<f32>> {
        let output_name = self
            .probability_output
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Model {} has no probability output", self.name))?;

        let output = outputs
            .get(output_name)
            .ok_or_else(|| anyhow::anyhow!("Model {} has no output {}", self.name, output_name))?;

        if let Ok((_, data)) = output.try_extract_tensor::<f32>() {
            return Ok(data.to_vec());
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return probabilities_from_sequence_map(output);
        }

        Err(anyhow::anyhow!(
            "Unsupported probability output format for model {}",
            self.name
        ))
    }
}

/// Collect `seq(map(int64, float))` into a vector indexed by class id
fn probabilities_from_sequence_map(output: &DynValue) -> Result<Vec<f32>> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;

    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps
        .first()
        .ok_or_else(|| anyhow::anyhow!("Empty probability sequence"))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;
    probabilities_from_pairs(&pairs)
}

pub(crate) fn probabilities_from_pairs(pairs: &[(i64, f32)]) -> Result<Vec<f32>> {
    let mut len = 0;
    for &(class_id, _) in pairs {
        if class_id >= MAX_CLASSES as i64 {
            bail!("Class id {} exceeds the supported {} classes", class_id, MAX_CLASSES);
        }
        if class_id >= 0 {
            len = len.max(class_id as usize + 1);
        }
    }

    let mut probabilities = vec![0.0; len];
    for &(class_id, prob) in pairs {
        if class_id >= 0 {
            probabilities[class_id as usize] = prob;
        }
    }
    Ok(probabilities)
}

impl Classifier for OnnxClassifier {
    fn predict(&self, features: &[f32]) -> Result<i64> {
        self.run(features, false).map(|(label, _)| label)
    }

    fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>> {
        let (_, probabilities) = self.run(features, true)?;
        probabilities.ok_or_else(|| anyhow::anyhow!("No probabilities returned"))
    }

    fn predict_with_proba(&self, features: &[f32]) -> Result<(i64, Vec<f32>)> {
        let (label, probabilities) = self.run(features, true)?;
        let probabilities =
            probabilities.ok_or_else(|| anyhow::anyhow!("No probabilities returned"))?;
        Ok((label, probabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probabilities_from_unordered_pairs() {
        let pairs = vec![(2, 0.6), (0, 0.1), (1, 0.3)];
        assert_eq!(probabilities_from_pairs(&pairs).unwrap(), vec![0.1, 0.3, 0.6]);
    }

    #[test]
    fn test_probabilities_with_gaps() {
        let pairs = vec![(0, 0.4), (2, 0.6), (-1, 0.9)];
        assert_eq!(probabilities_from_pairs(&pairs).unwrap(), vec![0.4, 0.0, 0.6]);
        assert!(probabilities_from_pairs(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_class_id_is_rejected() {
        assert!(probabilities_from_pairs(&[(0, 0.5), (i64::MAX, 0.5)]).is_err());
        assert!(probabilities_from_pairs(&[(MAX_CLASSES as i64, 1.0)]).is_err());
        assert_eq!(
            probabilities_from_pairs(&[(MAX_CLASSES as i64 - 1, 1.0)]).unwrap().len(),
            MAX_CLASSES
        );
    }
}
