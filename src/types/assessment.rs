//! Risk assessment result types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pregnancy risk level produced by stage A
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "low risk")]
    Low,
    #[serde(rename = "mid risk")]
    Mid,
    #[serde(rename = "high risk")]
    High,
    #[serde(rename = "unknown")]
    Unknown,
}

impl RiskLevel {
    /// Map a stage A class id to its label.
    ///
    /// The trained model encodes high risk as class 0, so the table is
    /// not ordinal.
    pub fn from_class_id(class_id: i64) -> Self {
        match class_id {
            1 => RiskLevel::Low,
            2 => RiskLevel::Mid,
            0 => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }

    /// Parse a label as it appears on the wire
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "low risk" => Some(RiskLevel::Low),
            "mid risk" => Some(RiskLevel::Mid),
            "high risk" => Some(RiskLevel::High),
            "unknown" => Some(RiskLevel::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low risk",
            RiskLevel::Mid => "mid risk",
            RiskLevel::High => "high risk",
            RiskLevel::Unknown => "unknown",
        }
    }

    /// Whether this label triggers the disease status stage
    pub fn escalates(&self) -> bool {
        *self == RiskLevel::High
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disease status produced by stage B
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiseaseStatus {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "mid")]
    Mid,
    #[serde(rename = "high")]
    High,
    #[serde(rename = "unknown")]
    Unknown,
    /// Stage B was not run
    #[serde(rename = "N/A")]
    NotApplicable,
}

impl DiseaseStatus {
    /// Map a stage B class id to its label (same inversion as stage A)
    pub fn from_class_id(class_id: i64) -> Self {
        match class_id {
            1 => DiseaseStatus::Low,
            2 => DiseaseStatus::Mid,
            0 => DiseaseStatus::High,
            _ => DiseaseStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DiseaseStatus::Low => "low",
            DiseaseStatus::Mid => "mid",
            DiseaseStatus::High => "high",
            DiseaseStatus::Unknown => "unknown",
            DiseaseStatus::NotApplicable => "N/A",
        }
    }
}

impl fmt::Display for DiseaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Probability reported when stage B did not run
pub const NOT_ESCALATED_PROBABILITY: &str = "0%";

/// Format a class probability as a percentage with one decimal place
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Outcome of classifying one clinical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(rename = "Risk_Level")]
    pub risk_level: RiskLevel,

    #[serde(rename = "Disease_Status")]
    pub disease_status: DiseaseStatus,

    #[serde(rename = "Disease_Probability")]
    pub disease_probability: String,
}

impl RiskAssessment {
    /// Assessment for a record that did not escalate to stage B
    pub fn stage_a_only(risk_level: RiskLevel) -> Self {
        Self {
            risk_level,
            disease_status: DiseaseStatus::NotApplicable,
            disease_probability: NOT_ESCALATED_PROBABILITY.to_string(),
        }
    }

    /// Whether stage B contributed to this assessment
    pub fn escalated(&self) -> bool {
        self.disease_status != DiseaseStatus::NotApplicable
    }
}
