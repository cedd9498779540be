use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::metrics::{ApiTag, MetricsService};

use super::models::{Plant, User};

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 1;

#[derive(Error, Debug)]
pub enum PlantsError {
    #[error("backend unavailable after {attempts} attempts: {reason}")]
    BackendUnavailable { attempts: u32, reason: String },
}

/// Seam `PlantCache`/`SMSChannel` depend on, so tests can supply an
/// in-memory fake instead of hitting a real backend.
#[async_trait]
pub trait PlantsSource: Send + Sync {
    async fn fetch_user_plants(&self, user_id: i64) -> Result<Vec<Plant>, PlantsError>;
    async fn fetch_user(&self, user_id: i64) -> Result<User, PlantsError>;
}

/// Thin client over the plants/users backend. Every operation retries up to
/// `MAX_ATTEMPTS` times with exponential backoff (1s, 2s, 4s...) before
/// raising `BackendUnavailable`.
pub struct PlantsClient {
    client: Client,
    base_url: String,
    metrics: Option<Arc<MetricsService>>,
}

impl PlantsClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metrics: None,
        }
    }

    pub fn with_metrics(
        client: Client,
        base_url: impl Into<String>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metrics: Some(metrics),
        }
    }

    /// Runs `attempt` up to `MAX_ATTEMPTS` times, sleeping `1s, 2s, 4s, ...`
    /// between failures, and records the total elapsed time of the chain.
    async fn with_retries<T, F, Fut>(&self, api: ApiTag, mut attempt: F) -> Result<T, PlantsError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, String>>,
    {
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt_no in 0..MAX_ATTEMPTS {
            match attempt().await {
                Ok(value) => {
                    self.record_latency(api, started.elapsed()).await;
                    return Ok(value);
                }
                Err(e) => {
                    last_error = e;
                    if attempt_no + 1 < MAX_ATTEMPTS {
                        let delay = Duration::from_secs(BACKOFF_BASE_SECS << attempt_no);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.record_latency(api, started.elapsed()).await;
        Err(PlantsError::BackendUnavailable {
            attempts: MAX_ATTEMPTS,
            reason: last_error,
        })
    }

    async fn record_latency(&self, api: ApiTag, elapsed: Duration) {
        if let Some(metrics) = &self.metrics {
            metrics.record_latency(api, elapsed.as_millis() as u64).await;
        }
    }
}

#[async_trait]
impl PlantsSource for PlantsClient {
    async fn fetch_user_plants(&self, user_id: i64) -> Result<Vec<Plant>, PlantsError> {
        let url = format!("{}/api/plants", self.base_url);

        self.with_retries(ApiTag::Backend, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client
                    .get(&url)
                    .query(&[("userId", user_id.to_string())])
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;

                let status = response.status();
                if !status.is_success() {
                    return Err(format!("HTTP {}", status));
                }

                response.json::<Vec<Plant>>().await.map_err(|e| e.to_string())
            }
        })
        .await
    }

    async fn fetch_user(&self, user_id: i64) -> Result<User, PlantsError> {
        let url = format!("{}/api/users/{}", self.base_url, user_id);

        self.with_retries(ApiTag::Backend, || {
            let client = self.client.clone();
            let url = url.clone();
            async move {
                let response = client.get(&url).send().await.map_err(|e| e.to_string())?;

                let status = response.status();
                if !status.is_success() {
                    return Err(format!("HTTP {}", status));
                }

                response.json::<User>().await.map_err(|e| e.to_string())
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_with_retries_succeeds_without_retry() {
        let plants = PlantsClient::new(Client::new(), "http://localhost:1");
        let calls = AtomicU32::new(0);

        let result: Result<u32, PlantsError> = plants
            .with_retries(ApiTag::Backend, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(42) }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retries_gives_up_after_three_attempts() {
        let plants = PlantsClient::new(Client::new(), "http://localhost:1");
        let calls = AtomicU32::new(0);

        let result: Result<u32, PlantsError> = plants
            .with_retries(ApiTag::Backend, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("boom".to_string()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_with_retries_recovers_after_transient_failure() {
        let plants = PlantsClient::new(Client::new(), "http://localhost:1");
        let calls = AtomicU32::new(0);

        let result: Result<u32, PlantsError> = plants
            .with_retries(ApiTag::Backend, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err("transient".to_string())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
