//! Feature scaling applied before classification

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Learned transform applied to a feature vector before it reaches a
/// classifier.
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, features: &[f32]) -> Result<Vec<f32>>;
}

/// Standardising scaler persisted as JSON: `(x - mean) / scale`.
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    /// Column names the scaler was fitted on, when exported
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn new(mean: Vec<f64>, scale: Vec<f64>) -> Result<Self> {
        let scaler = Self {
            feature_names: None,
            mean,
            scale,
        };
        scaler.validate(None)?;
        Ok(scaler)
    }

    /// Parse a scaler document and check it against the expected columns
    pub fn from_json_str(json: &str, expected_columns: &[&str]) -> Result<Self> {
        let scaler: Self = serde_json::from_str(json).context("Invalid scaler document")?;
        scaler.validate(Some(expected_columns))?;
        Ok(scaler)
    }

    /// Load a scaler from file
    pub fn load<P: AsRef<Path>>(path: P, expected_columns: &[&str]) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scaler from {:?}", path))?;
        Self::from_json_str(&json, expected_columns)
    }

    pub fn feature_count(&self) -> usize {
        self.mean.len()
    }

    fn validate(&self, expected_columns: Option<&[&str]>) -> Result<()> {
        if self.mean.len() != self.scale.len() {
            bail!(
                "Scaler mean has {} entries but scale has {}",
                self.mean.len(),
                self.scale.len()
            );
        }

        if let Some(expected) = expected_columns {
            if self.mean.len() != expected.len() {
                bail!(
                    "Scaler expects {} features, pipeline provides {}",
                    self.mean.len(),
                    expected.len()
                );
            }
            // Column names are compared byte for byte
            if let Some(names) = &self.feature_names {
                if names.len() != expected.len()
                    || names.iter().zip(expected).any(|(a, b)| a != b)
                {
                    bail!(
                        "Scaler columns {:?} do not match expected {:?}",
                        names,
                        expected
                    );
                }
            }
        }

        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &[f32]) -> Result<Vec<f32>> {
        if features.len() != self.mean.len() {
            bail!(
                "Expected {} features, got {}",
                self.mean.len(),
                features.len()
            );
        }

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(&x, (&mean, &scale))| {
                let scale = if scale == 0.0 { 1.0 } else { scale };
                ((x as f64 - mean) / scale) as f32
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_scaling() {
        let scaler = StandardScaler::new(vec![10.0, 0.0], vec![2.0, 0.5]).unwrap();
        let scaled = scaler.transform(&[14.0, 1.0]).unwrap();

        assert_eq!(scaled, vec![2.0, 2.0]);
    }

    #[test]
    fn test_zero_scale_is_identity_spread() {
        let scaler = StandardScaler::new(vec![5.0], vec![0.0]).unwrap();
        assert_eq!(scaler.transform(&[7.0]).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_length_mismatch() {
        let scaler = StandardScaler::new(vec![0.0, 0.0], vec![1.0, 1.0]).unwrap();
        assert!(scaler.transform(&[1.0]).is_err());
        assert!(StandardScaler::new(vec![0.0], vec![1.0, 1.0]).is_err());
    }

    #[test]
    fn test_feature_names_must_match_exactly() {
        let json = r#"{"feature_names": ["BMI [kg/m²]"], "mean": [25.0], "scale": [4.0]}"#;
        assert!(StandardScaler::from_json_str(json, &["BMI  [kg/m²]"]).is_err());

        let json = r#"{"feature_names": ["BMI  [kg/m²]"], "mean": [25.0], "scale": [4.0]}"#;
        let scaler = StandardScaler::from_json_str(json, &["BMI  [kg/m²]"]).unwrap();
        assert_eq!(scaler.feature_count(), 1);
    }

    #[test]
    fn test_document_without_names() {
        let json = r#"{"mean": [1.0, 2.0], "scale": [1.0, 1.0]}"#;
        assert!(StandardScaler::from_json_str(json, &["a", "b"]).is_ok());
        assert!(StandardScaler::from_json_str(json, &["a"]).is_err());
    }
}
