//! Service metrics and periodic summaries for the risk assessment service.

use crate::types::assessment::RiskAssessment;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector shared by request handlers
pub struct ServiceMetrics {
    /// Total records classified
    pub assessments_processed: AtomicU64,
    /// Records that escalated to stage B
    pub escalations: AtomicU64,
    /// Classification requests rejected with an error
    pub assessment_errors: AtomicU64,
    /// Advice replaced by the fixed default
    pub advice_fallbacks: AtomicU64,
    pub alerts_sent: AtomicU64,
    pub alerts_failed: AtomicU64,
    /// Assessments by risk level
    by_risk_level: RwLock<HashMap<String, u64>>,
    /// Classification times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl ServiceMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            assessments_processed: AtomicU64::new(0),
            escalations: AtomicU64::new(0),
            assessment_errors: AtomicU64::new(0),
            advice_fallbacks: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_failed: AtomicU64::new(0),
            by_risk_level: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            start_time: Instant::now(),
        }
    }

    /// Record a successful classification
    pub fn record_assessment(&self, processing_time: Duration, assessment: &RiskAssessment) {
        self.assessments_processed.fetch_add(1, Ordering::Relaxed);
        if assessment.escalated() {
            self.escalations.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut by_level) = self.by_risk_level.write() {
            *by_level
                .entry(assessment.risk_level.to_string())
                .or_insert(0) += 1;
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }
    }

    pub fn record_assessment_error(&self) {
        self.assessment_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_advice_fallback(&self) {
        self.advice_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_alert(&self, delivered: bool) {
        if delivered {
            self.alerts_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.alerts_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: *sorted.last().unwrap_or(&0),
        }
    }

    /// Get current throughput (assessments per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.assessments_processed.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get assessments by risk level
    pub fn get_by_risk_level(&self) -> HashMap<String, u64> {
        self.by_risk_level
            .read()
            .map(|by_level| by_level.clone())
            .unwrap_or_default()
    }

    /// Fraction of assessments that ran stage B, in percent
    pub fn escalation_rate(&self) -> f64 {
        let total = self.assessments_processed.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.escalations.load(Ordering::Relaxed) as f64 / total as f64 * 100.0
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let total = self.assessments_processed.load(Ordering::Relaxed);
        let processing = self.get_processing_stats();
        let mut by_level: Vec<(String, u64)> = self.get_by_risk_level().into_iter().collect();
        by_level.sort();

        info!(
            assessments = total,
            errors = self.assessment_errors.load(Ordering::Relaxed),
            escalation_rate = format!("{:.1}%", self.escalation_rate()),
            throughput = format!("{:.2} req/s", self.get_throughput()),
            "Assessment summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Classification latency"
        );
        for (level, count) in &by_level {
            let pct = if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            info!(
                risk_level = %level,
                count = count,
                share = format!("{:.1}%", pct),
                "Risk level distribution"
            );
        }
        info!(
            advice_fallbacks = self.advice_fallbacks.load(Ordering::Relaxed),
            alerts_sent = self.alerts_sent.load(Ordering::Relaxed),
            alerts_failed = self.alerts_failed.load(Ordering::Relaxed),
            "External services"
        );
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Periodic metrics reporter
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
