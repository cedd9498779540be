use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;

use crate::alerts::Alert;
use crate::metrics::MetricsService;
use crate::plants::User;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Seam `Scheduler` depends on, so tests can inject an always-failing (or
/// call-recording) sink per Testable Property 6 / Scenario S6.
#[async_trait]
pub trait SmsSink: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn send_alert(&self, alert: &Alert, user: &User) -> bool;
}

/// Thin client over Twilio's Messages REST API, following the same
/// shared-`reqwest::Client`-plus-Basic-auth shape as every other external
/// client in this codebase.
pub struct SMSChannel {
    client: Client,
    account_sid: Option<String>,
    auth_token: Option<String>,
    from_number: Option<String>,
    metrics: Option<Arc<MetricsService>>,
}

impl SMSChannel {
    pub fn new(
        client: Client,
        account_sid: Option<String>,
        auth_token: Option<String>,
        from_number: Option<String>,
    ) -> Self {
        Self {
            client,
            account_sid,
            auth_token,
            from_number,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsService>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn credentials(&self) -> Option<(&str, &str, &str)> {
        let sid = self.account_sid.as_deref()?;
        let token = self.auth_token.as_deref()?;
        let from = self.from_number.as_deref()?;
        if sid.is_empty() || token.is_empty() || from.is_empty() {
            return None;
        }
        Some((sid, token, from))
    }

    fn format_message(alert: &Alert) -> String {
        let names = if alert.affected_plant_names.is_empty() {
            alert.affected_plant_types.join(", ")
        } else {
            alert.affected_plant_names.join(", ")
        };

        format!(
            "{}\n{}\n{}: {:.1}{} (threshold {:.1}{})\nPlants: {}",
            alert.garden_name,
            alert.alert_type.label(),
            alert.metric.label(),
            alert.current_value,
            alert.metric.unit(),
            alert.threshold,
            alert.metric.unit(),
            names,
        )
    }

    async fn submit(&self, sid: &str, token: &str, from: &str, to: &str, body: &str) -> Result<(), String> {
        let url = format!("https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json", sid);
        let credentials = STANDARD.encode(format!("{}:{}", sid, token));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Basic {}", credentials))
            .form(&[("Body", body), ("From", from), ("To", to)])
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("Twilio returned {}", response.status()))
        }
    }
}

#[async_trait]
impl SmsSink for SMSChannel {
    fn is_enabled(&self) -> bool {
        self.credentials().is_some()
    }

    async fn send_alert(&self, alert: &Alert, user: &User) -> bool {
        let Some((sid, token, from)) = self.credentials() else {
            return false;
        };

        let Some(to) = user.phone_number.as_deref().filter(|p| !p.is_empty()) else {
            return false;
        };

        let body = Self::format_message(alert);

        for attempt in 0..MAX_ATTEMPTS {
            match self.submit(sid, token, from, to, &body).await {
                Ok(()) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_sms_sent();
                    }
                    return true;
                }
                Err(e) => {
                    tracing::warn!(alert_id = %alert.alert_id, attempt = attempt + 1, error = %e, "SMS send attempt failed");
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_sms_failed();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertType, Metric};

    fn user(phone: Option<&str>) -> User {
        User {
            id: 1,
            name: "Alice".to_string(),
            phone_number: phone.map(|s| s.to_string()),
        }
    }

    fn alert() -> Alert {
        Alert {
            alert_id: "1".to_string(),
            garden_id: "g1".to_string(),
            user_id: 1,
            garden_name: "Backyard".to_string(),
            timestamp: chrono::Utc::now(),
            alert_type: AlertType::HighTemperature,
            metric: Metric::Temperature,
            current_value: 36.2,
            threshold: 35.0,
            affected_plant_types: vec!["tomato".to_string()],
            affected_plant_names: vec!["T1".to_string()],
        }
    }

    #[test]
    fn test_is_enabled_requires_all_three_credentials() {
        let channel = SMSChannel::new(Client::new(), None, None, None);
        assert!(!channel.is_enabled());

        let channel = SMSChannel::new(
            Client::new(),
            Some("AC1".to_string()),
            Some("token".to_string()),
            Some("+15550000".to_string()),
        );
        assert!(channel.is_enabled());
    }

    #[tokio::test]
    async fn test_send_alert_skips_when_not_enabled() {
        let channel = SMSChannel::new(Client::new(), None, None, None);
        let sent = channel.send_alert(&alert(), &user(Some("+15551234"))).await;
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_send_alert_skips_when_phone_missing() {
        let channel = SMSChannel::new(
            Client::new(),
            Some("AC1".to_string()),
            Some("token".to_string()),
            Some("+15550000".to_string()),
        );
        assert!(!channel.send_alert(&alert(), &user(None)).await);
        assert!(!channel.send_alert(&alert(), &user(Some(""))).await);
    }

    #[test]
    fn test_format_message_falls_back_to_plant_types_when_names_empty() {
        let mut a = alert();
        a.affected_plant_names.clear();
        let message = SMSChannel::format_message(&a);
        assert!(message.contains("tomato"));
        assert!(message.contains("36.2"));
        assert!(message.contains("35.0"));
    }
}
