//! Feature extraction for the two classification stages.
//!
//! Builds the ordered feature vectors the persisted scalers and models
//! were trained on. Column order and column names are part of the
//! artifact contract and must not change.

use crate::error::{PipelineError, Stage};
use crate::types::record::ClinicalRecord;
use serde::Deserialize;

/// Trained column names for stage A, in order
pub const STAGE_A_COLUMNS: [&str; 7] = [
    "Age",
    "SystolicBP",
    "DiastolicBP",
    "BS",
    "BodyTemp",
    "HeartRate",
    "PulsePressure",
];

/// Trained column names for stage B, in order.
///
/// "BMI  [kg/m²]" carries two spaces in the training data.
pub const STAGE_B_COLUMNS: [&str; 13] = [
    "gravida",
    "parity",
    "gestational age (weeks)",
    "Age (yrs)",
    "BMI  [kg/m²]",
    "diabetes",
    "History of hypertension (y/n)",
    "Systolic BP",
    "Diastolic BP",
    "HB",
    "fetal weight(kgs)",
    "Protien Uria",
    "amniotic fluid levels(cm)",
];

/// Which record field feeds the stage B "Age (yrs)" column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgeSource {
    /// Dedicated `Age_yrs` field
    #[default]
    AgeYrs,
    /// Reuse the stage A `Age` field
    Age,
}

/// Convert a Celsius reading to Fahrenheit
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

fn require<T: Copy>(
    value: Option<T>,
    stage: Stage,
    field: &'static str,
) -> Result<T, PipelineError> {
    value.ok_or(PipelineError::InputShape { stage, field })
}

fn flag(value: Option<i64>, field: &'static str) -> Result<f32, PipelineError> {
    require(value, Stage::B, field).map(|v| v as f32)
}

/// Feature extractor that transforms clinical records into model input.
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    age_source: AgeSource,
}

impl FeatureExtractor {
    /// Create a feature extractor with an explicit stage B age source.
    pub fn new(age_source: AgeSource) -> Self {
        Self { age_source }
    }

    pub fn age_source(&self) -> AgeSource {
        self.age_source
    }

    /// Build the stage A vector. Body temperature is converted to
    /// Fahrenheit, the unit the model was trained on.
    pub fn stage_a(&self, record: &ClinicalRecord) -> Result<Vec<f32>, PipelineError> {
        let stage = Stage::A;
        let body_temp = require(record.body_temp_celsius, stage, "BodyTemp")?;

        Ok(vec![
            require(record.age, stage, "Age")? as f32,
            require(record.systolic_bp, stage, "SystolicBP")? as f32,
            require(record.diastolic_bp, stage, "DiastolicBP")? as f32,
            require(record.blood_sugar, stage, "BS")? as f32,
            celsius_to_fahrenheit(body_temp) as f32,
            require(record.heart_rate, stage, "HeartRate")? as f32,
            require(record.pulse_pressure, stage, "PulsePressure")? as f32,
        ])
    }

    /// Build the stage B vector in `STAGE_B_COLUMNS` order.
    pub fn stage_b(&self, record: &ClinicalRecord) -> Result<Vec<f32>, PipelineError> {
        let stage = Stage::B;
        let age = match self.age_source {
            AgeSource::AgeYrs => require(record.age_yrs, stage, "Age_yrs")?,
            AgeSource::Age => require(record.age, stage, "Age")?,
        };

        Ok(vec![
            require(record.gravida, stage, "gravida")? as f32,
            require(record.parity, stage, "parity")? as f32,
            require(record.gestational_age_weeks, stage, "gestational_age_weeks")? as f32,
            age as f32,
            require(record.bmi, stage, "BMI")? as f32,
            flag(record.diabetes, "diabetes")?,
            flag(record.hypertension, "hypertension")?,
            require(record.systolic_bp, stage, "SystolicBP")? as f32,
            require(record.diastolic_bp, stage, "DiastolicBP")? as f32,
            require(record.hemoglobin, stage, "HB")? as f32,
            require(record.fetal_weight, stage, "fetal_weight")? as f32,
            flag(record.proteinuria, "Protien_Uria")?,
            require(record.amniotic_fluid_levels, stage, "amniotic_fluid_levels")? as f32,
        ])
    }

    /// Get the number of features per stage.
    pub fn feature_count(&self, stage: Stage) -> usize {
        match stage {
            Stage::A => STAGE_A_COLUMNS.len(),
            Stage::B => STAGE_B_COLUMNS.len(),
        }
    }
}
