use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::alerts::models::AlertType;

const LATENCY_WINDOW_SIZE: usize = 100;

/// Tracks alert counts, SMS outcomes, and per-API latency for the
/// `/metrics` operational surface. Cheap to clone-share via `Arc`.
pub struct MetricsService {
    alerts: DashMap<AlertType, AtomicU64>,
    sms_sent: AtomicU64,
    sms_failed: AtomicU64,
    openmeteo_latency: Mutex<VecDeque<u64>>,
    backend_latency: Mutex<VecDeque<u64>>,
    start: Instant,
    last_reset: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy)]
pub enum ApiTag {
    OpenMeteo,
    Backend,
}

impl Default for MetricsService {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsService {
    pub fn new() -> Self {
        Self {
            alerts: DashMap::new(),
            sms_sent: AtomicU64::new(0),
            sms_failed: AtomicU64::new(0),
            openmeteo_latency: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            backend_latency: Mutex::new(VecDeque::with_capacity(LATENCY_WINDOW_SIZE)),
            start: Instant::now(),
            last_reset: chrono::Utc::now(),
        }
    }

    pub fn record_alert(&self, alert_type: AlertType) {
        self.alerts
            .entry(alert_type)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sms_sent(&self) {
        self.sms_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sms_failed(&self) {
        self.sms_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_latency(&self, api: ApiTag, millis: u64) {
        let window = match api {
            ApiTag::OpenMeteo => &self.openmeteo_latency,
            ApiTag::Backend => &self.backend_latency,
        };
        let mut window = window.lock().await;
        if window.len() == LATENCY_WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(millis);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let alerts = self
            .alerts
            .iter()
            .map(|entry| (entry.key().as_str().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect();

        let sent = self.sms_sent.load(Ordering::Relaxed);
        let failed = self.sms_failed.load(Ordering::Relaxed);
        let total = sent + failed;
        let success_rate = if total > 0 {
            round_two_decimals(sent as f64 / total as f64)
        } else {
            0.0
        };

        let openmeteo = LatencyStats::from_window(&*self.openmeteo_latency.lock().await);
        let backend = LatencyStats::from_window(&*self.backend_latency.lock().await);

        MetricsSnapshot {
            alerts,
            sms: SmsStats {
                sent,
                failed,
                success_rate,
            },
            api_latency: ApiLatencyStats { openmeteo, backend },
            uptime: self.uptime_seconds(),
            last_reset: self.last_reset.to_rfc3339(),
        }
    }
}

fn round_two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub alerts: std::collections::HashMap<String, u64>,
    pub sms: SmsStats,
    #[serde(rename = "apiLatency")]
    pub api_latency: ApiLatencyStats,
    pub uptime: u64,
    #[serde(rename = "lastReset")]
    pub last_reset: String,
}

#[derive(Debug, Serialize)]
pub struct SmsStats {
    pub sent: u64,
    pub failed: u64,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct ApiLatencyStats {
    pub openmeteo: LatencyStats,
    pub backend: LatencyStats,
}

#[derive(Debug, Serialize)]
pub struct LatencyStats {
    pub count: usize,
    #[serde(rename = "totalLatency")]
    pub total_latency: u64,
    #[serde(rename = "averageLatency")]
    pub average_latency: f64,
    #[serde(rename = "minLatency")]
    pub min_latency: u64,
    #[serde(rename = "maxLatency")]
    pub max_latency: u64,
}

impl LatencyStats {
    fn from_window(window: &VecDeque<u64>) -> Self {
        let count = window.len();
        if count == 0 {
            return Self {
                count: 0,
                total_latency: 0,
                average_latency: 0.0,
                min_latency: 0,
                max_latency: 0,
            };
        }

        let total: u64 = window.iter().sum();
        let min = *window.iter().min().unwrap();
        let max = *window.iter().max().unwrap();

        Self {
            count,
            total_latency: total,
            average_latency: total as f64 / count as f64,
            min_latency: min,
            max_latency: max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_success_rate_zero_when_no_attempts() {
        let metrics = MetricsService::new();
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.sms.success_rate, 0.0);
    }

    #[tokio::test]
    async fn test_success_rate_computed_from_sent_and_failed() {
        let metrics = MetricsService::new();
        metrics.record_sms_sent();
        metrics.record_sms_sent();
        metrics.record_sms_failed();
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.sms.sent, 2);
        assert_eq!(snapshot.sms.failed, 1);
        assert_eq!(snapshot.sms.success_rate, 0.67);
    }

    #[tokio::test]
    async fn test_latency_window_caps_at_100_samples() {
        let metrics = MetricsService::new();
        for i in 0..150u64 {
            metrics.record_latency(ApiTag::OpenMeteo, i).await;
        }
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.api_latency.openmeteo.count, 100);
        // the oldest 50 samples (0..50) should have been evicted
        assert_eq!(snapshot.api_latency.openmeteo.min_latency, 50);
        assert_eq!(snapshot.api_latency.openmeteo.max_latency, 149);
    }

    #[tokio::test]
    async fn test_alert_counters_grouped_by_type() {
        let metrics = MetricsService::new();
        metrics.record_alert(AlertType::HighTemperature);
        metrics.record_alert(AlertType::HighTemperature);
        metrics.record_alert(AlertType::HeavyRain);
        let snapshot = metrics.snapshot().await;
        assert_eq!(snapshot.alerts.get("HIGH_TEMPERATURE"), Some(&2));
        assert_eq!(snapshot.alerts.get("HEAVY_RAIN"), Some(&1));
    }
}
