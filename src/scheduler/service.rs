use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::alerts::{Alert, AlertEngine};
use crate::broadcast::BroadcastChannel;
use crate::config::GardenConfig;
use crate::history::HistorySink;
use crate::metrics::MetricsService;
use crate::plants::{PlantCache, PlantsSource};
use crate::sms::SmsSink;

/// Fires at the top of every 5th minute. `tokio-cron-scheduler` uses
/// 6-field (seconds-first) cron expressions.
const EVAL_CRON: &str = "0 */5 * * * *";
const REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Drives the alert pipeline: startup warm-up, the recurring 5-minute
/// evaluation tick, per-garden parallel dispatch with per-garden
/// serialization, and the sequential SMS -> broadcast -> history fan-out
/// for every emitted alert.
pub struct SchedulerService {
    scheduler: JobScheduler,
    gardens: Vec<GardenConfig>,
    alert_engine: Arc<AlertEngine>,
    plants_client: Arc<dyn PlantsSource>,
    plant_cache: Arc<PlantCache>,
    sms: Arc<dyn SmsSink>,
    broadcast: Arc<BroadcastChannel>,
    history: Arc<dyn HistorySink>,
    metrics: Arc<MetricsService>,
    garden_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SchedulerService {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        gardens: Vec<GardenConfig>,
        alert_engine: Arc<AlertEngine>,
        plants_client: Arc<dyn PlantsSource>,
        plant_cache: Arc<PlantCache>,
        sms: Arc<dyn SmsSink>,
        broadcast: Arc<BroadcastChannel>,
        history: Arc<dyn HistorySink>,
        metrics: Arc<MetricsService>,
    ) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler,
            gardens,
            alert_engine,
            plants_client,
            plant_cache,
            sms,
            broadcast,
            history,
            metrics,
            garden_locks: DashMap::new(),
        })
    }

    /// Runs the full startup sequence (warm-up, periodic refresh, an
    /// immediate evaluation round) and starts the recurring 5-minute tick.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let user_ids = self.distinct_user_ids();

        tracing::info!(user_count = user_ids.len(), "Warming up plant cache");
        self.plant_cache
            .warm_up(&user_ids, self.plants_client.as_ref())
            .await;

        self.plant_cache
            .start_periodic_refresh(user_ids, REFRESH_INTERVAL, Arc::clone(&self.plants_client))
            .await;

        tracing::info!("Running initial evaluation round");
        self.run_round().await;

        let scheduler_ref = Arc::clone(self);
        let job = Job::new_async(EVAL_CRON, move |_uuid, _lock| {
            let scheduler_ref = Arc::clone(&scheduler_ref);
            Box::pin(async move {
                scheduler_ref.run_round().await;
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;
        tracing::info!("Evaluation scheduler started, ticking every 5 minutes");
        Ok(())
    }

    /// Stops both recurring timers. In-flight sink operations are left to
    /// run to completion.
    pub async fn stop(&self) -> Result<()> {
        self.plant_cache.stop().await;
        self.scheduler.shutdown().await?;
        Ok(())
    }

    fn distinct_user_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.gardens.iter().map(|g| g.user_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    /// One evaluation round over every configured garden, dispatched in
    /// parallel. Waits for all gardens to settle before returning.
    pub async fn run_round(&self) {
        let outcomes = join_all(
            self.gardens
                .iter()
                .map(|garden| self.process_garden_guarded(garden)),
        )
        .await;

        let successes = outcomes.iter().filter(|ok| **ok).count();
        tracing::info!(
            successes,
            failures = outcomes.len() - successes,
            total = outcomes.len(),
            "Evaluation round complete"
        );
    }

    fn garden_lock(&self, garden_id: &str) -> Arc<Mutex<()>> {
        self.garden_locks
            .entry(garden_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wraps `process_garden` so a panic for one garden can never abort the
    /// round or affect any other garden's dispatch.
    async fn process_garden_guarded(&self, garden: &GardenConfig) -> bool {
        match std::panic::AssertUnwindSafe(self.process_garden(garden))
            .catch_unwind()
            .await
        {
            Ok(()) => true,
            Err(_) => {
                tracing::error!(garden_id = %garden.garden_id, "Panic while processing garden");
                false
            }
        }
    }

    /// Evaluates one garden and fans its alerts out to the three sinks.
    /// Serialized per garden-id so an overrunning tick never interleaves
    /// with the next one for the same garden.
    async fn process_garden(&self, garden: &GardenConfig) {
        let lock = self.garden_lock(&garden.garden_id);
        let _guard = lock.lock().await;

        let alerts = self.alert_engine.evaluate_garden(garden).await;

        for alert in alerts {
            self.metrics.record_alert(alert.alert_type);
            self.dispatch_alert(garden, alert).await;
        }
    }

    /// SMS, then broadcast, then history — strictly sequential so SMS
    /// submission always precedes the broadcast, which always precedes the
    /// history write. Each sink is independent: a failure in one never
    /// skips the next.
    async fn dispatch_alert(&self, garden: &GardenConfig, alert: Alert) {
        self.dispatch_sms(garden, &alert).await;
        self.broadcast.broadcast(&alert);
        let persisted = self.history.save_alert(&alert).await;
        tracing::debug!(alert_id = %alert.alert_id, persisted, "History dispatch complete");
    }

    async fn dispatch_sms(&self, garden: &GardenConfig, alert: &Alert) {
        if !self.sms.is_enabled() {
            tracing::debug!(alert_id = %alert.alert_id, "SMS channel disabled, skipping");
            return;
        }

        match self.plants_client.fetch_user(garden.user_id).await {
            Ok(user) => {
                let sent = self.sms.send_alert(alert, &user).await;
                tracing::info!(alert_id = %alert.alert_id, sent, "SMS dispatch complete");
            }
            Err(e) => {
                tracing::warn!(
                    alert_id = %alert.alert_id,
                    user_id = garden.user_id,
                    error = %e,
                    "Could not look up recipient for SMS, skipping"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertType, Metric};
    use crate::config::ProfileConfig;
    use crate::plants::{Plant, PlantsError, User};
    use crate::sensitivity::SensitivityRegistry;
    use crate::weather::{WeatherSnapshot, WeatherSource};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeWeather;
    #[async_trait]
    impl WeatherSource for FakeWeather {
        async fn fetch_weather(&self, _lat: f64, _lon: f64) -> Option<WeatherSnapshot> {
            Some(WeatherSnapshot {
                temperature: 40.0,
                temperature_max: 40.0,
                temperature_min: 40.0,
                precipitation: 0.0,
                wind_speed: 0.0,
                observed_at: chrono::Utc::now(),
            })
        }
    }

    struct FakePlants;
    #[async_trait]
    impl PlantsSource for FakePlants {
        async fn fetch_user_plants(&self, _user_id: i64) -> Result<Vec<Plant>, PlantsError> {
            Ok(vec![])
        }
        async fn fetch_user(&self, user_id: i64) -> Result<User, PlantsError> {
            Ok(User {
                id: user_id,
                name: "Alice".to_string(),
                phone_number: Some("+15550000".to_string()),
            })
        }
    }

    struct RecordingSms {
        calls: AtomicU32,
    }
    #[async_trait]
    impl SmsSink for RecordingSms {
        fn is_enabled(&self) -> bool {
            true
        }
        async fn send_alert(&self, _alert: &Alert, _user: &User) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    struct RecordingHistory {
        calls: AtomicU32,
    }
    #[async_trait]
    impl HistorySink for RecordingHistory {
        async fn save_alert(&self, _alert: &Alert) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            true
        }
        async fn get_alert_history(
            &self,
            _filters: &crate::history::AlertHistoryFilters,
            _limit: i64,
        ) -> Vec<Alert> {
            vec![]
        }
    }

    fn garden() -> GardenConfig {
        GardenConfig {
            garden_id: "g1".to_string(),
            user_id: 1,
            name: "G1".to_string(),
            latitude: 40.0,
            longitude: -3.0,
        }
    }

    fn registry() -> Arc<SensitivityRegistry> {
        let mut profiles = HashMap::new();
        profiles.insert(
            "default".to_string(),
            ProfileConfig {
                plant_type: "default".to_string(),
                max_temperature: 35.0,
                min_temperature: 0.0,
                max_precipitation: 10.0,
                max_wind_speed: 40.0,
            },
        );
        Arc::new(SensitivityRegistry::new(profiles))
    }

    #[tokio::test]
    async fn test_sink_isolation_sms_failure_does_not_block_other_sinks() {
        let cache = Arc::new(PlantCache::new());
        cache.set(1, vec![Plant {
            id: 1,
            user_id: 1,
            name: "T1".to_string(),
            type_: "tomato".to_string(),
            metadata: Default::default(),
        }]);

        let engine = Arc::new(AlertEngine::new(Arc::new(FakeWeather), Arc::clone(&cache), registry()));
        let sms = Arc::new(RecordingSms { calls: AtomicU32::new(0) });
        let history = Arc::new(RecordingHistory { calls: AtomicU32::new(0) });
        let broadcast = Arc::new(BroadcastChannel::new());
        let metrics = Arc::new(MetricsService::new());

        let scheduler = Arc::new(
            SchedulerService::new(
                vec![garden()],
                engine,
                Arc::new(FakePlants),
                cache,
                Arc::clone(&sms) as Arc<dyn SmsSink>,
                Arc::clone(&broadcast),
                Arc::clone(&history) as Arc<dyn HistorySink>,
                metrics,
            )
            .await
            .unwrap(),
        );

        scheduler.run_round().await;

        assert_eq!(sms.calls.load(Ordering::SeqCst), 1);
        assert_eq!(history.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_user_ids_deduplicates() {
        let cache = Arc::new(PlantCache::new());
        let engine = Arc::new(AlertEngine::new(Arc::new(FakeWeather), Arc::clone(&cache), registry()));
        let scheduler = SchedulerService::new(
            vec![
                GardenConfig { garden_id: "g1".to_string(), user_id: 1, name: "G1".to_string(), latitude: 1.0, longitude: 1.0 },
                GardenConfig { garden_id: "g2".to_string(), user_id: 1, name: "G2".to_string(), latitude: 2.0, longitude: 2.0 },
                GardenConfig { garden_id: "g3".to_string(), user_id: 2, name: "G3".to_string(), latitude: 3.0, longitude: 3.0 },
            ],
            engine,
            Arc::new(FakePlants),
            cache,
            Arc::new(RecordingSms { calls: AtomicU32::new(0) }) as Arc<dyn SmsSink>,
            Arc::new(BroadcastChannel::new()),
            Arc::new(RecordingHistory { calls: AtomicU32::new(0) }) as Arc<dyn HistorySink>,
            Arc::new(MetricsService::new()),
        )
        .await
        .unwrap();

        assert_eq!(scheduler.distinct_user_ids(), vec![1, 2]);
    }
}
