//! Load Generator
//!
//! Posts synthetic clinical records to a running service for smoke and
//! load testing.

use maternal_risk_service::ClinicalRecord;
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Synthetic record generator
struct RecordGenerator {
    rng: rand::rngs::ThreadRng,
}

impl RecordGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Vitals in normal ranges
    fn generate_routine(&mut self) -> ClinicalRecord {
        let systolic = self.rng.gen_range(100.0..125.0_f64).round();
        let diastolic = self.rng.gen_range(60.0..82.0_f64).round();
        let age = self.rng.gen_range(19.0..34.0_f64).round();

        ClinicalRecord {
            age: Some(age),
            systolic_bp: Some(systolic),
            diastolic_bp: Some(diastolic),
            blood_sugar: Some(self.rng.gen_range(6.0..7.5_f64)),
            body_temp_celsius: Some(self.rng.gen_range(36.4..37.2_f64)),
            heart_rate: Some(self.rng.gen_range(65.0..85.0_f64).round()),
            pulse_pressure: Some(systolic - diastolic),
            ..self.obstetric_history(age)
        }
    }

    /// Elevated blood pressure, sugar and temperature
    fn generate_at_risk(&mut self) -> ClinicalRecord {
        let systolic = self.rng.gen_range(140.0..170.0_f64).round();
        let diastolic = self.rng.gen_range(90.0..110.0_f64).round();
        let age = self.rng.gen_range(35.0..48.0_f64).round();

        ClinicalRecord {
            age: Some(age),
            systolic_bp: Some(systolic),
            diastolic_bp: Some(diastolic),
            blood_sugar: Some(self.rng.gen_range(10.0..18.0_f64)),
            body_temp_celsius: Some(self.rng.gen_range(37.5..39.0_f64)),
            heart_rate: Some(self.rng.gen_range(88.0..110.0_f64).round()),
            pulse_pressure: Some(systolic - diastolic),
            diabetes: Some(self.rng.gen_range(0..2)),
            hypertension: Some(1),
            proteinuria: Some(self.rng.gen_range(0..2)),
            ..self.obstetric_history(age)
        }
    }

    /// Stage B fields, always present so escalated records classify fully
    fn obstetric_history(&mut self, age: f64) -> ClinicalRecord {
        let gravida = self.rng.gen_range(1..6) as f64;

        ClinicalRecord {
            gravida: Some(gravida),
            parity: Some(self.rng.gen_range(0.0..gravida).floor()),
            gestational_age_weeks: Some(self.rng.gen_range(12..40) as f64),
            age_yrs: Some(age),
            bmi: Some(self.rng.gen_range(18.5..34.0_f64)),
            diabetes: Some(0),
            hypertension: Some(0),
            hemoglobin: Some(self.rng.gen_range(9.0..13.5_f64)),
            fetal_weight: Some(self.rng.gen_range(0.5..3.5_f64)),
            proteinuria: Some(0),
            amniotic_fluid_levels: Some(self.rng.gen_range(5.0..20.0_f64)),
            ..ClinicalRecord::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("load_generator=info".parse()?),
        )
        .init();

    info!("Starting Load Generator");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let base_url = args.get(1).map(|s| s.as_str()).unwrap_or("http://localhost:8000");
    let count: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let at_risk_rate: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0.2);
    let delay_ms: u64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        base_url = %base_url,
        count = count,
        at_risk_rate = at_risk_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let healthy = client
        .get(format!("{base_url}/healthz"))
        .send()
        .await
        .map(|r| r.status().is_success())
        .unwrap_or(false);

    if !healthy {
        warn!("Service is not reachable. Running in dry-run mode.");
        return run_dry_mode(count, at_risk_rate, delay_ms).await;
    }

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();
    let predict_url = format!("{base_url}/api/predict");

    let mut by_level: HashMap<String, u64> = HashMap::new();
    let mut failures = 0u64;
    let mut latencies_ms: Vec<u128> = Vec::with_capacity(count as usize);

    for i in 0..count {
        let record = if rng.gen_bool(at_risk_rate) {
            generator.generate_at_risk()
        } else {
            generator.generate_routine()
        };

        let start = Instant::now();
        let response = client.post(&predict_url).json(&record).send().await;
        latencies_ms.push(start.elapsed().as_millis());

        match response {
            Ok(resp) if resp.status().is_success() => {
                let body: serde_json::Value = resp.json().await?;
                let level = body["Risk_Level"].as_str().unwrap_or("missing").to_string();
                *by_level.entry(level).or_insert(0) += 1;
            }
            Ok(resp) => {
                failures += 1;
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(status = %status, body = %body, "Prediction rejected");
            }
            Err(e) => {
                failures += 1;
                warn!(error = %e, "Prediction request failed");
            }
        }

        if (i + 1) % 10 == 0 {
            info!("Sent {}/{} records ({} failures)", i + 1, count, failures);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    latencies_ms.sort_unstable();
    let p50 = latencies_ms.get(latencies_ms.len() / 2).copied().unwrap_or(0);
    let max = latencies_ms.last().copied().unwrap_or(0);

    info!(
        failures = failures,
        p50_ms = p50 as u64,
        max_ms = max as u64,
        "Completed! Sent {} records",
        count
    );
    for (level, n) in &by_level {
        info!("  {}: {}", level, n);
    }

    Ok(())
}

async fn run_dry_mode(count: u64, at_risk_rate: f64, delay_ms: u64) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no service connection)");

    let mut generator = RecordGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..count {
        let record = if rng.gen_bool(at_risk_rate) {
            generator.generate_at_risk()
        } else {
            generator.generate_routine()
        };

        let json = serde_json::to_string_pretty(&record)?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample record {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
