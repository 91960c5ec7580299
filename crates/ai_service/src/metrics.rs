//! Request counters exposed on `/metrics`

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a `/predict` call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    /// Caller error; answered with 400
    Rejected,
    /// Inference failure; answered with 500
    Failed,
    /// No model loaded; answered with 503
    Unavailable,
}

/// Metrics collector shared by every handler
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    pub total_requests: Arc<AtomicU64>,
    pub successful_requests: Arc<AtomicU64>,
    pub rejected_requests: Arc<AtomicU64>,
    pub failed_requests: Arc<AtomicU64>,
    pub unavailable_requests: Arc<AtomicU64>,
    pub request_duration_us: Arc<AtomicU64>,
    model_loaded: Arc<AtomicBool>,
    // fixed at startup from the class labels
    species: Arc<Vec<(String, AtomicU64)>>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MetricsCollector {
    pub fn new(species: Vec<String>) -> Self {
        Self {
            total_requests: Arc::new(AtomicU64::new(0)),
            successful_requests: Arc::new(AtomicU64::new(0)),
            rejected_requests: Arc::new(AtomicU64::new(0)),
            failed_requests: Arc::new(AtomicU64::new(0)),
            unavailable_requests: Arc::new(AtomicU64::new(0)),
            request_duration_us: Arc::new(AtomicU64::new(0)),
            model_loaded: Arc::new(AtomicBool::new(false)),
            species: Arc::new(
                species
                    .into_iter()
                    .map(|label| (label, AtomicU64::new(0)))
                    .collect(),
            ),
            start_time: Instant::now(),
        }
    }

    /// Record a finished request
    pub fn record_request(&self, outcome: RequestOutcome, duration: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RequestOutcome::Success => &self.successful_requests,
            RequestOutcome::Rejected => &self.rejected_requests,
            RequestOutcome::Failed => &self.failed_requests,
            RequestOutcome::Unavailable => &self.unavailable_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.request_duration_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Count a prediction for `species`; labels unknown at startup are ignored
    pub fn record_prediction(&self, species: &str) {
        if let Some((_, counter)) = self.species.iter().find(|(label, _)| label == species) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn set_model_loaded(&self, loaded: bool) {
        self.model_loaded.store(loaded, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let duration_us = self.request_duration_us.load(Ordering::Relaxed);
        let avg_request_duration_ms = if total_requests > 0 {
            duration_us as f64 / total_requests as f64 / 1000.0
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            unavailable_requests: self.unavailable_requests.load(Ordering::Relaxed),
            avg_request_duration_ms,
            predictions_by_species: self
                .species
                .iter()
                .map(|(label, counter)| (label.clone(), counter.load(Ordering::Relaxed)))
                .collect(),
            model_loaded: self.model_loaded.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub rejected_requests: u64,
    pub failed_requests: u64,
    pub unavailable_requests: u64,
    pub avg_request_duration_ms: f64,
    pub predictions_by_species: Vec<(String, u64)>,
    pub model_loaded: bool,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Render in the Prometheus text exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        let counters = [
            (
                "penguin_requests_total",
                "Prediction requests received",
                self.total_requests,
            ),
            (
                "penguin_requests_successful_total",
                "Prediction requests answered with a species",
                self.successful_requests,
            ),
            (
                "penguin_requests_rejected_total",
                "Prediction requests rejected for invalid input",
                self.rejected_requests,
            ),
            (
                "penguin_requests_failed_total",
                "Prediction requests that failed during inference",
                self.failed_requests,
            ),
            (
                "penguin_requests_unavailable_total",
                "Prediction requests received without a loaded model",
                self.unavailable_requests,
            ),
        ];
        for (name, help, value) in counters {
            let _ = writeln!(out, "# HELP {name} {help}");
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }

        let _ = writeln!(
            out,
            "# HELP penguin_predictions_total Predictions returned per species"
        );
        let _ = writeln!(out, "# TYPE penguin_predictions_total counter");
        for (species, count) in &self.predictions_by_species {
            let _ = writeln!(
                out,
                "penguin_predictions_total{{species=\"{}\"}} {count}",
                escape_label(species)
            );
        }

        let _ = writeln!(
            out,
            "# HELP penguin_request_duration_ms_avg Mean request handling time"
        );
        let _ = writeln!(out, "# TYPE penguin_request_duration_ms_avg gauge");
        let _ = writeln!(
            out,
            "penguin_request_duration_ms_avg {}",
            self.avg_request_duration_ms
        );

        let _ = writeln!(out, "# HELP penguin_model_loaded Whether a model is being served");
        let _ = writeln!(out, "# TYPE penguin_model_loaded gauge");
        let _ = writeln!(out, "penguin_model_loaded {}", u8::from(self.model_loaded));

        let _ = writeln!(out, "# HELP penguin_uptime_seconds Seconds since start");
        let _ = writeln!(out, "# TYPE penguin_uptime_seconds gauge");
        let _ = writeln!(out, "penguin_uptime_seconds {}", self.uptime_seconds);
        out
    }
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
