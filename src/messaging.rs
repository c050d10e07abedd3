//! WhatsApp risk alerts via the Twilio messaging API

use crate::config::MessagingConfig;
use crate::types::alert::Audience;
use crate::types::assessment::RiskLevel;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Outbound notification channel
#[async_trait]
pub trait AlertSender: Send + Sync {
    /// Send an alert for a risk label, returning the provider message id
    async fn send(&self, risk_label: &str, recipient: &str, audience: Audience) -> Result<String>;
}

/// Message text for a risk label. Labels other than high or mid risk get
/// the reassurance message.
pub fn message_body(risk_label: &str, audience: Audience) -> &'static str {
    let level = RiskLevel::from_label(risk_label);

    match (audience, level) {
        (Audience::Patient, Some(RiskLevel::High)) => {
            "🚨 *High Risk Alert!* Please contact your doctor immediately for a detailed checkup."
        }
        (Audience::Patient, Some(RiskLevel::Mid)) => {
            "⚠ *Warning:* Your pregnancy shows moderate risk. \
             Take care and schedule a medical check soon."
        }
        (Audience::Patient, _) => {
            "✅ *Safe:* Your pregnancy risk is low. Keep following a healthy lifestyle!"
        }
        (Audience::Doctor, Some(RiskLevel::High)) => {
            "🚨 *High Risk Patient:* A recent assessment was classified as high risk. \
             Please arrange an urgent review."
        }
        (Audience::Doctor, Some(RiskLevel::Mid)) => {
            "⚠ *Moderate Risk Patient:* A recent assessment was classified as mid risk. \
             Please schedule a follow-up."
        }
        (Audience::Doctor, _) => {
            "✅ *Low Risk Patient:* A recent assessment was classified as low risk. \
             Routine care applies."
        }
    }
}

/// Normalise a phone number into a WhatsApp address.
///
/// Whitespace is removed; an empty number selects the default recipient;
/// an existing `whatsapp:` prefix is kept.
pub fn normalize_recipient(phone_number: Option<&str>, default_recipient: &str) -> String {
    let compact: String = phone_number
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if compact.is_empty() {
        default_recipient.to_string()
    } else if compact.starts_with(WHATSAPP_PREFIX) {
        compact
    } else {
        format!("{WHATSAPP_PREFIX}{compact}")
    }
}

#[derive(Deserialize)]
struct MessageResponse {
    sid: String,
}

/// Sender backed by the Twilio Messages API
pub struct TwilioSender {
    client: reqwest::Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSender {
    /// Build the client; `None` when credentials are missing
    pub fn from_config(config: &MessagingConfig) -> Result<Option<Self>> {
        let (Some(account_sid), Some(auth_token)) = (
            config.account_sid.as_deref().filter(|s| !s.is_empty()),
            config.auth_token.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build messaging HTTP client")?;

        Ok(Some(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            account_sid: account_sid.to_string(),
            auth_token: auth_token.to_string(),
            from: config.from.clone(),
        }))
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.api_base, self.account_sid
        )
    }
}

#[async_trait]
impl AlertSender for TwilioSender {
    async fn send(
        &self,
        risk_label: &str,
        recipient: &str,
        audience: Audience,
    ) -> Result<String> {
        let body = message_body(risk_label, audience);

        info!(
            risk_level = %risk_label,
            to = %recipient,
            audience = ?audience,
            "Sending WhatsApp alert"
        );

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from.as_str()), ("To", recipient), ("Body", body)])
            .send()
            .await
            .context("Messaging API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Messaging API error (HTTP {status}): {body}");
        }

        let message: MessageResponse = resp
            .json()
            .await
            .context("Failed to parse messaging response")?;
        debug!(sid = %message.sid, "WhatsApp alert accepted");
        Ok(message.sid)
    }
}
