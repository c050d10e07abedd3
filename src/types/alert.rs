//! Alert request data structures

use serde::{Deserialize, Serialize};

/// Who an alert message is written for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    #[default]
    Patient,
    Doctor,
}

/// Request to send a risk alert over the messaging channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRequest {
    /// Previously computed risk label, e.g. "high risk"
    #[serde(rename = "Risk_Level")]
    pub risk_level: String,

    /// Recipient phone number; the configured default is used when absent
    #[serde(default)]
    pub phone_number: Option<String>,

    #[serde(default)]
    pub audience: Audience,
}

/// Response returned after an alert was handed to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertReceipt {
    pub message: String,
    /// Provider message id, absent when alerts are disabled
    pub sid: Option<String>,
}
