use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::alerts::Alert;

#[derive(Debug, Serialize)]
struct BroadcastMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    data: &'a Alert,
}

/// Manages the set of live subscriber handles and fans an alert out to all
/// of them independently. A per-subscriber send failure drops that
/// subscriber without aborting the broadcast; an empty subscriber set is a
/// no-op success, since the system must function with zero subscribers.
pub struct BroadcastChannel {
    subscribers: DashMap<Uuid, UnboundedSender<String>>,
}

impl BroadcastChannel {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    pub fn on_connect(&self, id: Uuid, handle: UnboundedSender<String>) {
        self.subscribers.insert(id, handle);
    }

    pub fn on_disconnect(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Serializes `alert` into the `{type: "WEATHER_ALERT", data: alert}`
    /// envelope and pushes it to every connected subscriber. Subscribers
    /// whose send fails (the receiving end has gone away) are dropped from
    /// the set.
    pub fn broadcast(&self, alert: &Alert) -> bool {
        let message = match serde_json::to_string(&BroadcastMessage {
            kind: "WEATHER_ALERT",
            data: alert,
        }) {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(alert_id = %alert.alert_id, error = %e, "Failed to serialize alert for broadcast");
                return false;
            }
        };

        let dead: Vec<Uuid> = self
            .subscribers
            .iter()
            .filter_map(|entry| {
                if entry.value().send(message.clone()).is_err() {
                    Some(*entry.key())
                } else {
                    None
                }
            })
            .collect();

        for id in dead {
            self.subscribers.remove(&id);
        }

        true
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertType, Metric};
    use tokio::sync::mpsc;

    fn alert() -> Alert {
        Alert {
            alert_id: "1".to_string(),
            garden_id: "g1".to_string(),
            user_id: 1,
            garden_name: "Backyard".to_string(),
            timestamp: chrono::Utc::now(),
            alert_type: AlertType::HighTemperature,
            metric: Metric::Temperature,
            current_value: 36.0,
            threshold: 35.0,
            affected_plant_types: vec!["tomato".to_string()],
            affected_plant_names: vec!["T1".to_string()],
        }
    }

    #[test]
    fn test_broadcast_with_no_subscribers_succeeds() {
        let channel = BroadcastChannel::new();
        assert!(channel.broadcast(&alert()));
    }

    #[test]
    fn test_broadcast_delivers_to_all_subscribers() {
        let channel = BroadcastChannel::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        channel.on_connect(Uuid::new_v4(), tx1);
        channel.on_connect(Uuid::new_v4(), tx2);

        assert!(channel.broadcast(&alert()));
        assert!(rx1.try_recv().unwrap().contains("WEATHER_ALERT"));
        assert!(rx2.try_recv().unwrap().contains("WEATHER_ALERT"));
    }

    #[test]
    fn test_broadcast_drops_failing_subscriber_without_affecting_others() {
        let channel = BroadcastChannel::new();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        drop(rx_dead); // receiver gone, send will fail

        let (tx_alive, mut rx_alive) = mpsc::unbounded_channel();

        let dead_id = Uuid::new_v4();
        channel.on_connect(dead_id, tx_dead);
        channel.on_connect(Uuid::new_v4(), tx_alive);

        assert_eq!(channel.subscriber_count(), 2);
        assert!(channel.broadcast(&alert()));
        assert_eq!(channel.subscriber_count(), 1);
        assert!(rx_alive.try_recv().is_ok());
    }

    #[test]
    fn test_on_disconnect_removes_subscriber() {
        let channel = BroadcastChannel::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        channel.on_connect(id, tx);
        assert_eq!(channel.subscriber_count(), 1);
        channel.on_disconnect(id);
        assert_eq!(channel.subscriber_count(), 0);
    }
}
