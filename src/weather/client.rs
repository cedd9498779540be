use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::metrics::{ApiTag, MetricsService};

use super::models::WeatherSnapshot;

const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("failed to reach weather provider: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("weather provider returned status {0}")]
    ApiError(reqwest::StatusCode),
}

#[derive(Debug, Deserialize)]
struct OpenMeteoResponse {
    #[serde(default)]
    current: Option<CurrentBlock>,
    #[serde(default)]
    daily: Option<DailyBlock>,
}

#[derive(Debug, Deserialize, Default)]
struct CurrentBlock {
    #[serde(default)]
    temperature_2m: Option<f64>,
    #[serde(default)]
    precipitation: Option<f64>,
    #[serde(default)]
    wind_speed_10m: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct DailyBlock {
    #[serde(default)]
    temperature_2m_max: Option<Vec<f64>>,
    #[serde(default)]
    temperature_2m_min: Option<Vec<f64>>,
}

fn normalize(data: OpenMeteoResponse) -> WeatherSnapshot {
    let current = data.current.unwrap_or_default();
    let daily = data.daily.unwrap_or_default();

    WeatherSnapshot {
        temperature: current.temperature_2m.unwrap_or(0.0),
        temperature_max: daily
            .temperature_2m_max
            .and_then(|v| v.first().copied())
            .unwrap_or(0.0),
        temperature_min: daily
            .temperature_2m_min
            .and_then(|v| v.first().copied())
            .unwrap_or(0.0),
        precipitation: current.precipitation.unwrap_or(0.0),
        wind_speed: current.wind_speed_10m.unwrap_or(0.0),
        observed_at: chrono::Utc::now(),
    }
}

/// Seam `AlertEngine` depends on, so tests can supply an in-memory fake
/// instead of hitting the real provider.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> Option<WeatherSnapshot>;
}

/// Thin client over Open-Meteo's forecast endpoint. Never surfaces a typed
/// error to callers — `fetch_weather` swallows every failure into `None`,
/// matching the provider's non-critical role in the pipeline (a missed poll
/// simply skips evaluation this tick).
pub struct WeatherClient {
    client: Client,
    metrics: Option<Arc<MetricsService>>,
}

impl WeatherClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            metrics: None,
        }
    }

    pub fn with_metrics(client: Client, metrics: Arc<MetricsService>) -> Self {
        Self {
            client,
            metrics: Some(metrics),
        }
    }

    async fn fetch(&self, lat: f64, lon: f64) -> Result<WeatherSnapshot, WeatherError> {
        let response = self
            .client
            .get(OPEN_METEO_URL)
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                (
                    "current",
                    "temperature_2m,precipitation,wind_speed_10m".to_string(),
                ),
                (
                    "daily",
                    "temperature_2m_max,temperature_2m_min".to_string(),
                ),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(WeatherError::ApiError(status));
        }

        let data: OpenMeteoResponse = response.json().await?;
        Ok(normalize(data))
    }
}

#[async_trait]
impl WeatherSource for WeatherClient {
    async fn fetch_weather(&self, lat: f64, lon: f64) -> Option<WeatherSnapshot> {
        tracing::debug!(lat = %lat, lon = %lon, "Fetching weather data");

        let started = Instant::now();
        let result = self.fetch(lat, lon).await;

        if let Some(metrics) = &self.metrics {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            metrics.record_latency(ApiTag::OpenMeteo, elapsed_ms).await;
        }

        match result {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(lat = %lat, lon = %lon, error = %e, "Weather fetch failed, skipping this tick");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_defaults_missing_fields_to_zero() {
        let snapshot = normalize(OpenMeteoResponse {
            current: None,
            daily: None,
        });
        assert_eq!(snapshot.temperature, 0.0);
        assert_eq!(snapshot.precipitation, 0.0);
        assert_eq!(snapshot.wind_speed, 0.0);
        assert_eq!(snapshot.temperature_max, 0.0);
        assert_eq!(snapshot.temperature_min, 0.0);
    }

    #[test]
    fn test_normalize_reads_present_fields() {
        let snapshot = normalize(OpenMeteoResponse {
            current: Some(CurrentBlock {
                temperature_2m: Some(21.5),
                precipitation: Some(1.2),
                wind_speed_10m: Some(15.0),
            }),
            daily: Some(DailyBlock {
                temperature_2m_max: Some(vec![27.0]),
                temperature_2m_min: Some(vec![12.0]),
            }),
        });
        assert_eq!(snapshot.temperature, 21.5);
        assert_eq!(snapshot.precipitation, 1.2);
        assert_eq!(snapshot.wind_speed, 15.0);
        assert_eq!(snapshot.temperature_max, 27.0);
        assert_eq!(snapshot.temperature_min, 12.0);
    }
}
