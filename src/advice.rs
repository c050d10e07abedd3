//! AI advice and health plan generation.
//!
//! Advice is produced by an external chat completion service after
//! classification has succeeded. Generator failures never fail the
//! request: `AdviceService` substitutes fixed safe defaults instead.

use crate::config::{AdviceConfig, AdviceMode};
use crate::metrics::ServiceMetrics;
use crate::types::assessment::{DiseaseStatus, RiskAssessment, RiskLevel};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Advice served when the generator is unavailable
pub const FALLBACK_ADVICE: &str = "Keep attending your regular prenatal checkups and contact \
your doctor if you notice any unusual symptoms such as headaches, swelling or bleeding.";

/// Structured health plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPlan {
    #[serde(default)]
    pub diet: Vec<String>,
    #[serde(default)]
    pub rest: Vec<String>,
    #[serde(default)]
    pub checkups: Vec<String>,
}

impl HealthPlan {
    /// Fixed plan for a risk level
    pub fn fallback(risk_level: RiskLevel) -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();

        match risk_level {
            RiskLevel::High => Self {
                diet: strings(&[
                    "Eat small, balanced meals with plenty of vegetables and protein",
                    "Limit salt and sugary foods",
                    "Drink water regularly through the day",
                ]),
                rest: strings(&[
                    "Rest as much as possible and avoid heavy lifting",
                    "Sleep on your side with your feet raised when you can",
                ]),
                checkups: strings(&[
                    "Contact your doctor as soon as possible for a detailed checkup",
                    "Check your blood pressure daily if you can",
                ]),
            },
            RiskLevel::Mid => Self {
                diet: strings(&[
                    "Eat balanced meals with fruit, vegetables and whole grains",
                    "Keep salt and sugar intake moderate",
                ]),
                rest: strings(&[
                    "Take short breaks during the day and aim for 8 hours of sleep",
                ]),
                checkups: strings(&[
                    "Schedule a medical check soon and keep all prenatal visits",
                ]),
            },
            RiskLevel::Low | RiskLevel::Unknown => Self {
                diet: strings(&["Keep a varied diet with fruit, vegetables and protein"]),
                rest: strings(&["Keep a regular sleep routine and stay gently active"]),
                checkups: strings(&["Attend your regular prenatal checkups"]),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.diet.is_empty() && self.rest.is_empty() && self.checkups.is_empty()
    }
}

/// External advice/plan generator
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn generate_advice(
        &self,
        risk_level: RiskLevel,
        disease_status: DiseaseStatus,
    ) -> Result<String>;

    async fn generate_plan(
        &self,
        risk_level: RiskLevel,
        disease_status: DiseaseStatus,
    ) -> Result<HealthPlan>;
}

fn advice_prompt(risk_level: RiskLevel, disease_status: DiseaseStatus) -> String {
    format!(
        "You are a professional pregnancy health assistant.\n\
         Based on these conditions:\n\
         - Pregnancy Risk Level: {risk_level}\n\
         - Disease Status: {disease_status}\n\n\
         Give a short, clear, and empathetic medical advice (2-4 sentences) for the patient, \
         including recommendations or precautions. Avoid technical words. Example tone: \
         'You are doing great! Keep up healthy habits and attend regular checkups.'"
    )
}

fn plan_prompt(risk_level: RiskLevel, disease_status: DiseaseStatus) -> String {
    format!(
        "You are a professional pregnancy health assistant.\n\
         Based on these conditions:\n\
         - Pregnancy Risk Level: {risk_level}\n\
         - Disease Status: {disease_status}\n\n\
         Create a simple health plan for the patient. Respond with only a JSON object of the form \
         {{\"diet\": [..], \"rest\": [..], \"checkups\": [..]}} where every list holds 2-4 short, \
         plain-language recommendations."
    )
}

/// Parse a generated plan, tolerating a Markdown code fence around it
pub fn parse_plan(content: &str) -> Result<HealthPlan> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let plan: HealthPlan =
        serde_json::from_str(body).context("Generated plan is not valid JSON")?;
    if plan.is_empty() {
        bail!("Generated plan has no recommendations");
    }
    Ok(plan)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by Groq's OpenAI-compatible chat completions API
pub struct GroqAdvisor {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    plan_max_tokens: u32,
}

impl GroqAdvisor {
    /// Build the client; `None` when no API key is configured
    pub fn from_config(config: &AdviceConfig) -> Result<Option<Self>> {
        let api_key = match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => key.to_string(),
            None => return Ok(None),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build advice HTTP client")?;

        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            plan_max_tokens: config.plan_max_tokens,
        }))
    }

    async fn complete(&self, prompt: &str, max_tokens: u32, json: bool) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens,
            response_format: json.then_some(ResponseFormat { kind: "json_object" }),
        };

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("Advice API request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Advice API error (HTTP {status}): {body}");
        }

        let response: ChatResponse = resp
            .json()
            .await
            .context("Failed to parse advice response")?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            bail!("Advice API returned an empty reply");
        }
        Ok(content)
    }
}

#[async_trait]
impl AdviceGenerator for GroqAdvisor {
    async fn generate_advice(
        &self,
        risk_level: RiskLevel,
        disease_status: DiseaseStatus,
    ) -> Result<String> {
        let prompt = advice_prompt(risk_level, disease_status);
        self.complete(&prompt, self.max_tokens, false).await
    }

    async fn generate_plan(
        &self,
        risk_level: RiskLevel,
        disease_status: DiseaseStatus,
    ) -> Result<HealthPlan> {
        let prompt = plan_prompt(risk_level, disease_status);
        let content = self.complete(&prompt, self.plan_max_tokens, true).await?;
        parse_plan(&content)
    }
}

/// Advice attached to a prediction response
#[derive(Debug, Clone, PartialEq)]
pub enum Advice {
    Text(String),
    Plan(HealthPlan),
}

/// Calls the generator and substitutes safe defaults on failure
pub struct AdviceService {
    generator: Option<Arc<dyn AdviceGenerator>>,
    mode: AdviceMode,
    metrics: Arc<ServiceMetrics>,
}

impl AdviceService {
    pub fn new(
        generator: Option<Arc<dyn AdviceGenerator>>,
        mode: AdviceMode,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            generator,
            mode,
            metrics,
        }
    }

    /// Build the service from configuration
    pub fn from_config(config: &AdviceConfig, metrics: Arc<ServiceMetrics>) -> Result<Self> {
        let generator = GroqAdvisor::from_config(config)?
            .map(|g| Arc::new(g) as Arc<dyn AdviceGenerator>);

        match &generator {
            Some(_) => info!(
                mode = ?config.mode,
                model = %config.model,
                "Advice generator configured"
            ),
            None => warn!("Advice API key not configured, serving default advice"),
        }

        Ok(Self::new(generator, config.mode, metrics))
    }

    pub fn mode(&self) -> AdviceMode {
        self.mode
    }

    /// Produce advice for an assessment. Never fails.
    pub async fn advise(&self, assessment: &RiskAssessment) -> Advice {
        let risk_level = assessment.risk_level;
        let disease_status = assessment.disease_status;

        let Some(generator) = &self.generator else {
            self.metrics.record_advice_fallback();
            return self.fallback(risk_level);
        };

        let generated = match self.mode {
            AdviceMode::Text => generator
                .generate_advice(risk_level, disease_status)
                .await
                .map(Advice::Text),
            AdviceMode::Plan => generator
                .generate_plan(risk_level, disease_status)
                .await
                .map(Advice::Plan),
        };

        match generated {
            Ok(advice) => {
                debug!(risk_level = %risk_level, "Advice generated");
                advice
            }
            Err(e) => {
                warn!(
                    risk_level = %risk_level,
                    error = %format!("{:#}", e),
                    "Advice generation failed, using default"
                );
                self.metrics.record_advice_fallback();
                self.fallback(risk_level)
            }
        }
    }

    fn fallback(&self, risk_level: RiskLevel) -> Advice {
        match self.mode {
            AdviceMode::Text => Advice::Text(FALLBACK_ADVICE.to_string()),
            AdviceMode::Plan => Advice::Plan(HealthPlan::fallback(risk_level)),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    /// Generator that always fails
    pub(crate) struct FailingGenerator;

    #[async_trait]
    impl AdviceGenerator for FailingGenerator {
        async fn generate_advice(&self, _: RiskLevel, _: DiseaseStatus) -> Result<String> {
            bail!("service unavailable")
        }

        async fn generate_plan(&self, _: RiskLevel, _: DiseaseStatus) -> Result<HealthPlan> {
            bail!("service unavailable")
        }
    }

    /// Generator echoing its inputs
    pub(crate) struct EchoGenerator;

    #[async_trait]
    impl AdviceGenerator for EchoGenerator {
        async fn generate_advice(
            &self,
            risk_level: RiskLevel,
            disease_status: DiseaseStatus,
        ) -> Result<String> {
            Ok(format!("{risk_level} / {disease_status}"))
        }

        async fn generate_plan(
            &self,
            risk_level: RiskLevel,
            _: DiseaseStatus,
        ) -> Result<HealthPlan> {
            Ok(HealthPlan {
                diet: vec![format!("diet for {risk_level}")],
                rest: vec![],
                checkups: vec![],
            })
        }
    }

    fn service(
        generator: Option<Arc<dyn AdviceGenerator>>,
        mode: AdviceMode,
    ) -> (AdviceService, Arc<ServiceMetrics>) {
        let metrics = Arc::new(ServiceMetrics::new());
        (AdviceService::new(generator, mode, metrics.clone()), metrics)
    }

    #[tokio::test]
    async fn test_generated_advice_is_returned() {
        let (service, metrics) = service(Some(Arc::new(EchoGenerator)), AdviceMode::Text);
        let assessment = RiskAssessment::stage_a_only(RiskLevel::Mid);

        let advice = service.advise(&assessment).await;

        assert_eq!(advice, Advice::Text("mid risk / N/A".to_string()));
        assert_eq!(metrics.advice_fallbacks.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_default_text() {
        let (service, metrics) = service(Some(Arc::new(FailingGenerator)), AdviceMode::Text);
        let assessment = RiskAssessment::stage_a_only(RiskLevel::Low);

        let advice = service.advise(&assessment).await;

        assert_eq!(advice, Advice::Text(FALLBACK_ADVICE.to_string()));
        assert_eq!(metrics.advice_fallbacks.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_default_plan() {
        let (service, _) = service(Some(Arc::new(FailingGenerator)), AdviceMode::Plan);
        let assessment = RiskAssessment::stage_a_only(RiskLevel::High);

        let advice = service.advise(&assessment).await;

        assert_eq!(advice, Advice::Plan(HealthPlan::fallback(RiskLevel::High)));
    }

    #[tokio::test]
    async fn test_missing_generator_serves_defaults() {
        let (service, metrics) = service(None, AdviceMode::Plan);
        let advice = service.advise(&RiskAssessment::stage_a_only(RiskLevel::Mid)).await;

        assert_eq!(advice, Advice::Plan(HealthPlan::fallback(RiskLevel::Mid)));
        assert_eq!(metrics.advice_fallbacks.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_parse_plan() {
        let plan = parse_plan(r#"{"diet": ["a"], "rest": ["b"], "checkups": ["c"]}"#).unwrap();
        assert_eq!(plan.diet, vec!["a"]);

        let fenced = "```json\n{\"diet\": [\"a\"], \"rest\": [], \"checkups\": []}\n```";
        assert_eq!(parse_plan(fenced).unwrap().diet, vec!["a"]);

        assert!(parse_plan("Eat well and rest").is_err());
        assert!(parse_plan(r#"{"diet": [], "rest": [], "checkups": []}"#).is_err());
    }

    #[test]
    fn test_fallback_plans_are_populated() {
        for level in [RiskLevel::Low, RiskLevel::Mid, RiskLevel::High, RiskLevel::Unknown] {
            let plan = HealthPlan::fallback(level);
            assert!(!plan.diet.is_empty());
            assert!(!plan.rest.is_empty());
            assert!(!plan.checkups.is_empty());
        }
    }

    #[test]
    fn test_prompts_mention_labels() {
        let prompt = advice_prompt(RiskLevel::High, DiseaseStatus::Mid);
        assert!(prompt.contains("Pregnancy Risk Level: high risk"));
        assert!(prompt.contains("Disease Status: mid"));

        let prompt = plan_prompt(RiskLevel::Low, DiseaseStatus::NotApplicable);
        assert!(prompt.contains("\"checkups\""));
        assert!(prompt.contains("Disease Status: N/A"));
    }

    #[test]
    fn test_no_key_disables_remote_generator() {
        let config = AdviceConfig {
            api_key: None,
            ..AdviceConfig::default()
        };
        assert!(GroqAdvisor::from_config(&config).unwrap().is_none());

        let config = AdviceConfig {
            api_key: Some(String::new()),
            ..AdviceConfig::default()
        };
        assert!(GroqAdvisor::from_config(&config).unwrap().is_none());
    }

    #[derive(Default)]
    struct Captured {
        authorization: Vec<String>,
        bodies: Vec<Value>,
    }

    type ProviderState = (Arc<Mutex<Captured>>, StatusCode);

    /// Replies with padded text, or a fenced plan when JSON output is requested
    async fn complete_chat(
        State((captured, status)): State<ProviderState>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let content = if body.get("response_format").is_some() {
            "```json\n{\"diet\": [\"x\"], \"rest\": [], \"checkups\": []}\n```"
        } else {
            "  Stay hydrated.  "
        };

        let mut captured = captured.lock().unwrap();
        if let Some(auth) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            captured.authorization.push(auth.to_string());
        }
        captured.bodies.push(body);

        if status.is_success() {
            let reply = json!({
                "choices": [{"message": {"role": "assistant", "content": content}}]
            });
            (status, Json(reply))
        } else {
            (status, Json(json!({"error": {"message": "rate limited"}})))
        }
    }

    /// Local stand-in for the chat completions API answering with `status`
    async fn spawn_provider(status: StatusCode) -> (GroqAdvisor, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let app = Router::new()
            .route("/v1/chat/completions", post(complete_chat))
            .with_state((captured.clone(), status));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let config = AdviceConfig {
            api_url: format!("http://{addr}/v1/chat/completions"),
            api_key: Some("k".to_string()),
            ..AdviceConfig::default()
        };
        let advisor = GroqAdvisor::from_config(&config).unwrap().unwrap();
        (advisor, captured)
    }

    #[tokio::test]
    async fn test_text_advice_request_and_reply() {
        let (advisor, captured) = spawn_provider(StatusCode::OK).await;

        let advice = advisor
            .generate_advice(RiskLevel::High, DiseaseStatus::Mid)
            .await
            .unwrap();
        assert_eq!(advice, "Stay hydrated.");

        let captured = captured.lock().unwrap();
        assert_eq!(captured.authorization, vec!["Bearer k"]);

        let body = &captured.bodies[0];
        assert_eq!(body["max_tokens"], 120);
        assert_eq!(body["model"], AdviceConfig::default().model);
        assert!(body.get("response_format").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        let prompt = body["messages"][0]["content"].as_str().unwrap();
        assert!(prompt.contains("Pregnancy Risk Level: high risk"));
    }

    #[tokio::test]
    async fn test_plan_request_asks_for_json() {
        let (advisor, captured) = spawn_provider(StatusCode::OK).await;

        let plan = advisor
            .generate_plan(RiskLevel::Mid, DiseaseStatus::NotApplicable)
            .await
            .unwrap();
        assert_eq!(plan.diet, vec!["x"]);
        assert!(plan.rest.is_empty());

        let captured = captured.lock().unwrap();
        assert_eq!(captured.authorization, vec!["Bearer k"]);

        let body = &captured.bodies[0];
        assert_eq!(body["max_tokens"], 400);
        assert_eq!(body["response_format"], json!({"type": "json_object"}));
    }

    #[tokio::test]
    async fn test_provider_error_falls_back() {
        let (advisor, captured) = spawn_provider(StatusCode::TOO_MANY_REQUESTS).await;

        let err = advisor
            .generate_advice(RiskLevel::Low, DiseaseStatus::NotApplicable)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 429"));

        let (service, metrics) = service(Some(Arc::new(advisor)), AdviceMode::Text);
        let advice = service.advise(&RiskAssessment::stage_a_only(RiskLevel::Low)).await;
        assert_eq!(advice, Advice::Text(FALLBACK_ADVICE.to_string()));
        assert_eq!(metrics.advice_fallbacks.load(Ordering::Relaxed), 1);
        assert_eq!(captured.lock().unwrap().bodies.len(), 2);
    }
}
