//! Type definitions for the risk assessment service

pub mod alert;
pub mod assessment;
pub mod record;

pub use alert::{AlertReceipt, AlertRequest, Audience};
pub use assessment::{DiseaseStatus, RiskAssessment, RiskLevel};
pub use record::ClinicalRecord;
