//! Configuration management for the risk assessment service

use crate::feature_extractor::AgeSource;
use anyhow::{Context, Result};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that points at an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "MRS_CONFIG";

/// Prefix for environment overrides, e.g. `MRS_SERVER__PORT=9000`
const ENV_PREFIX: &str = "MRS";

/// How the advice generator responds
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdviceMode {
    /// Short free-text advice
    #[default]
    Text,
    /// Structured diet / rest / checkup plan
    Plan,
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Text,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub advice: AdviceConfig,
    pub messaging: MessagingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins; empty allows any origin
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_allowed_origins: Vec::new(),
        }
    }
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory containing the persisted artifacts
    pub models_dir: String,
    pub scaler_a: String,
    pub model_a: String,
    pub scaler_b: String,
    pub model_b: String,
    /// Number of threads for ONNX inference per model
    pub onnx_threads: usize,
    /// Abort startup when any artifact fails to load
    pub strict: bool,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: "save_models".to_string(),
            scaler_a: "scaler_model_a.json".to_string(),
            model_a: "model_a.onnx".to_string(),
            scaler_b: "scaler_model_b.json".to_string(),
            model_b: "model_b.onnx".to_string(),
            onnx_threads: 1,
            strict: true,
        }
    }
}

/// Classification pipeline configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Record field feeding the stage B "Age (yrs)" column
    pub stage_b_age_source: AgeSource,
}

/// Advice generator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdviceConfig {
    pub enabled: bool,
    pub mode: AdviceMode,
    /// OpenAI-compatible chat completions endpoint
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    /// Token limit for text advice
    pub max_tokens: u32,
    /// Token limit for structured plans
    pub plan_max_tokens: u32,
    pub timeout_ms: u64,
}

impl Default for AdviceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: AdviceMode::Text,
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            api_key: None,
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 0.7,
            max_tokens: 120,
            plan_max_tokens: 400,
            timeout_ms: 10_000,
        }
    }
}

/// Messaging provider configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    pub api_base: String,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    /// Sender address
    pub from: String,
    /// Recipient used when a request carries no phone number
    pub default_recipient: String,
    pub timeout_ms: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.twilio.com".to_string(),
            account_sid: None,
            auth_token: None,
            from: "whatsapp:+14155238886".to_string(),
            default_recipient: "whatsapp:+923000976116".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between logged summaries, 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from `MRS_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path. A missing file is not an
    /// error; environment variables are layered on top either way.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let builder = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .separator("__")
                    .prefix_separator("_"),
            );

        Self::from_builder(with_vendor_env(builder)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Whether both messaging credentials are present
    pub fn messaging_enabled(&self) -> bool {
        self.messaging.account_sid.is_some() && self.messaging.auth_token.is_some()
    }
}

/// Conventional provider variables take precedence over file values
fn with_vendor_env(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    let env = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    Ok(builder
        .set_override_option("messaging.account_sid", env("TWILIO_SID"))?
        .set_override_option("messaging.auth_token", env("TWILIO_AUTH_TOKEN"))?
        .set_override_option("messaging.from", env("TWILIO_WHATSAPP_FROM"))?
        .set_override_option("messaging.default_recipient", env("TO_NUMBER"))?
        .set_override_option("advice.api_key", env("GROQ_API_KEY"))?)
}
