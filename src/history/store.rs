use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};

use crate::alerts::Alert;

use super::models::AlertHistoryFilters;

const DB_NAME: &str = "weather_alerts_db";
const COLLECTION_NAME: &str = "weather_alerts";
const DEFAULT_LIMIT: i64 = 100;

/// Seam `Scheduler` depends on, so tests can inject a recording fake
/// instead of a real document database.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn save_alert(&self, alert: &Alert) -> bool;
    async fn get_alert_history(&self, filters: &AlertHistoryFilters, limit: i64) -> Vec<Alert>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAlert {
    #[serde(flatten)]
    alert: Alert,
    #[serde(rename = "createdAt")]
    created_at: chrono::DateTime<Utc>,
}

/// Append-only alert history backed by a document database. Connects
/// best-effort at `initialize`; every subsequent operation degrades to a
/// no-op (logged once) when the store never became ready, matching the
/// "degraded dependency" error class rather than raising.
pub struct HistoryStore {
    collection: OnceLock<Collection<StoredAlert>>,
    ready: AtomicBool,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self {
            collection: OnceLock::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Best-effort connect. Never raises: a missing or unreachable
    /// `mongo_url` simply leaves the store degraded.
    pub async fn initialize(&self, mongo_url: Option<&str>) {
        let Some(url) = mongo_url.filter(|u| !u.trim().is_empty()) else {
            tracing::warn!("MONGO_URL not configured; alert history is degraded to no-op");
            return;
        };

        let client = match Client::with_uri_str(url).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to connect to history store; alert history is degraded to no-op");
                return;
            }
        };

        let database = client.database(DB_NAME);
        if let Err(e) = database.run_command(doc! { "ping": 1 }).await {
            tracing::warn!(error = %e, "History store did not respond to ping; alert history is degraded to no-op");
            return;
        }

        let collection: Collection<StoredAlert> = database.collection(COLLECTION_NAME);

        if let Err(e) = Self::ensure_indexes(&collection).await {
            tracing::warn!(error = %e, "Failed to create history indexes, continuing without them");
        }

        if self.collection.set(collection).is_err() {
            tracing::warn!("History store initialize called more than once, ignoring");
            return;
        }

        self.ready.store(true, Ordering::SeqCst);
        tracing::info!("Alert history store connected");
    }

    async fn ensure_indexes(collection: &Collection<StoredAlert>) -> mongodb::error::Result<()> {
        let models = vec![
            IndexModel::builder()
                .keys(doc! { "gardenId": 1, "timestamp": -1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "userId": 1, "timestamp": -1 })
                .build(),
            IndexModel::builder()
                .keys(doc! { "timestamp": -1 })
                .build(),
        ];
        collection.create_indexes(models).await?;
        Ok(())
    }

    fn filters_to_query(filters: &AlertHistoryFilters) -> Document {
        let mut query = Document::new();
        if let Some(garden_id) = &filters.garden_id {
            query.insert("gardenId", garden_id);
        }
        if let Some(user_id) = filters.user_id {
            query.insert("userId", user_id);
        }
        if let Some(alert_type) = filters.alert_type {
            query.insert("alertType", alert_type.as_str());
        }
        if filters.start_date.is_some() || filters.end_date.is_some() {
            let mut range = Document::new();
            if let Some(start) = filters.start_date {
                range.insert("$gte", start.to_rfc3339());
            }
            if let Some(end) = filters.end_date {
                range.insert("$lte", end.to_rfc3339());
            }
            query.insert("timestamp", range);
        }
        query
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistorySink for HistoryStore {
    async fn save_alert(&self, alert: &Alert) -> bool {
        let Some(collection) = self.collection.get() else {
            tracing::debug!(alert_id = %alert.alert_id, "History store not ready, skipping persist");
            return false;
        };

        let document = StoredAlert {
            alert: alert.clone(),
            created_at: Utc::now(),
        };

        match collection.insert_one(document).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(alert_id = %alert.alert_id, error = %e, "Failed to persist alert");
                false
            }
        }
    }

    async fn get_alert_history(&self, filters: &AlertHistoryFilters, limit: i64) -> Vec<Alert> {
        let Some(collection) = self.collection.get() else {
            return vec![];
        };

        let limit = if limit > 0 { limit } else { DEFAULT_LIMIT };
        let query = Self::filters_to_query(filters);

        let cursor = match collection
            .find(query)
            .sort(doc! { "timestamp": -1 })
            .limit(limit)
            .await
        {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query alert history");
                return vec![];
            }
        };

        match cursor.try_collect::<Vec<StoredAlert>>().await {
            Ok(records) => records.into_iter().map(|r| r.alert).collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read alert history cursor");
                vec![]
            }
        }
    }
}
