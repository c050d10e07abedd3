//! Clinical measurement record submitted for risk assessment

use serde::{Deserialize, Serialize};

/// Flat set of clinical measurements for one patient visit.
///
/// Field names on the wire match the request schema used by the web
/// front end. Every field is optional at the schema level: which fields
/// are required depends on the classification stage being executed, and
/// the pipeline reports the first missing one. Values are not range
/// checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalRecord {
    /// Age in years (stage A)
    #[serde(rename = "Age")]
    pub age: Option<f64>,

    /// Systolic blood pressure, mmHg (stage A and B)
    #[serde(rename = "SystolicBP")]
    pub systolic_bp: Option<f64>,

    /// Diastolic blood pressure, mmHg (stage A and B)
    #[serde(rename = "DiastolicBP")]
    pub diastolic_bp: Option<f64>,

    /// Blood sugar (stage A)
    #[serde(rename = "BS")]
    pub blood_sugar: Option<f64>,

    /// Body temperature in degrees Celsius (stage A)
    #[serde(rename = "BodyTemp")]
    pub body_temp_celsius: Option<f64>,

    /// Heart rate, bpm (stage A)
    #[serde(rename = "HeartRate")]
    pub heart_rate: Option<f64>,

    /// Pulse pressure, mmHg (stage A)
    #[serde(rename = "PulsePressure")]
    pub pulse_pressure: Option<f64>,

    #[serde(rename = "gravida")]
    pub gravida: Option<f64>,

    #[serde(rename = "parity")]
    pub parity: Option<f64>,

    #[serde(rename = "gestational_age_weeks")]
    pub gestational_age_weeks: Option<f64>,

    /// Dedicated stage B age input
    #[serde(rename = "Age_yrs")]
    pub age_yrs: Option<f64>,

    #[serde(rename = "BMI")]
    pub bmi: Option<f64>,

    /// Diabetes flag (0/1)
    #[serde(rename = "diabetes")]
    pub diabetes: Option<i64>,

    /// History of hypertension flag (0/1)
    #[serde(rename = "hypertension")]
    pub hypertension: Option<i64>,

    /// Hemoglobin
    #[serde(rename = "HB")]
    pub hemoglobin: Option<f64>,

    /// Fetal weight in kg
    #[serde(rename = "fetal_weight")]
    pub fetal_weight: Option<f64>,

    /// Proteinuria flag (0/1)
    #[serde(rename = "Protien_Uria")]
    pub proteinuria: Option<i64>,

    /// Amniotic fluid level in cm
    #[serde(rename = "amniotic_fluid_levels")]
    pub amniotic_fluid_levels: Option<f64>,
}

impl ClinicalRecord {
    /// Create a record holding only the stage A vitals
    pub fn with_vitals(
        age: f64,
        systolic_bp: f64,
        diastolic_bp: f64,
        blood_sugar: f64,
        body_temp_celsius: f64,
        heart_rate: f64,
        pulse_pressure: f64,
    ) -> Self {
        Self {
            age: Some(age),
            systolic_bp: Some(systolic_bp),
            diastolic_bp: Some(diastolic_bp),
            blood_sugar: Some(blood_sugar),
            body_temp_celsius: Some(body_temp_celsius),
            heart_rate: Some(heart_rate),
            pulse_pressure: Some(pulse_pressure),
            ..Self::default()
        }
    }
}
