use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{oneshot, Mutex};

use super::client::PlantsSource;
use super::models::Plant;

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

struct PlantCacheEntry {
    plants: Vec<Plant>,
    last_refreshed: Instant,
}

/// Mapping `userId -> (plants, lastRefreshed)` with a TTL-based staleness
/// rule. Exposes two distinct accessors per the fresh/stale split: `get`
/// (used only by `AlertEngine`) never returns an expired entry; `get_stale`
/// ignores the TTL entirely and backs the refresh/warm-up fallback path.
pub struct PlantCache {
    entries: DashMap<i64, PlantCacheEntry>,
    ttl: Duration,
    stop_handle: Mutex<Option<oneshot::Sender<()>>>,
}

impl PlantCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            stop_handle: Mutex::new(None),
        }
    }

    /// Fresh-only read. `AlertEngine` is the only caller of this accessor.
    pub fn get(&self, user_id: i64) -> Option<Vec<Plant>> {
        let entry = self.entries.get(&user_id)?;
        if entry.last_refreshed.elapsed() <= self.ttl {
            Some(entry.plants.clone())
        } else {
            None
        }
    }

    /// TTL-ignoring read, used internally by the stale-fallback path only.
    pub fn get_stale(&self, user_id: i64) -> Option<Vec<Plant>> {
        self.entries.get(&user_id).map(|e| e.plants.clone())
    }

    pub fn set(&self, user_id: i64, plants: Vec<Plant>) {
        self.entries.insert(
            user_id,
            PlantCacheEntry {
                plants,
                last_refreshed: Instant::now(),
            },
        );
    }

    /// Fetches fresh plants for `user_id`. On success, replaces the entry
    /// and returns the fresh plants. On fetch failure, falls back to
    /// whatever is cached (even if stale) without touching
    /// `last_refreshed`; only propagates an error when there is no cached
    /// entry at all to fall back on. This is the "fetchUserPlants path"
    /// Testable Property 7 describes.
    async fn refresh_or_stale(
        &self,
        user_id: i64,
        source: &dyn PlantsSource,
    ) -> Result<Vec<Plant>, super::client::PlantsError> {
        match source.fetch_user_plants(user_id).await {
            Ok(plants) => {
                self.set(user_id, plants.clone());
                Ok(plants)
            }
            Err(e) => {
                if let Some(stale) = self.get_stale(user_id) {
                    tracing::warn!(
                        user_id = user_id,
                        error = %e,
                        "Plants fetch failed, falling back to stale cache entry"
                    );
                    Ok(stale)
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Refreshes one user's entry. Failures (including ones with no
    /// fallback available) are logged and swallowed: the existing entry, if
    /// any, is left intact.
    pub async fn refresh(&self, user_id: i64, source: &dyn PlantsSource) {
        if let Err(e) = self.refresh_or_stale(user_id, source).await {
            tracing::error!(user_id = user_id, error = %e, "Plant cache refresh failed, keeping existing entry");
        }
    }

    /// Parallel `refresh` across all ids; individual failures are logged
    /// only so the rest of the warm-up proceeds.
    pub async fn warm_up(&self, user_ids: &[i64], source: &dyn PlantsSource) {
        let futures = user_ids.iter().map(|&user_id| self.refresh(user_id, source));
        futures::future::join_all(futures).await;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlantCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PlantCache {
    /// Starts a recurring background warm-up on `interval`. At most one
    /// schedule is active at a time: calling this again stops the prior
    /// task first. Grounded on the teacher's
    /// `cache::start_cache_cleanup_task` spawn-loop-with-stop-signal shape.
    pub async fn start_periodic_refresh(
        self: &Arc<Self>,
        user_ids: Vec<i64>,
        interval: Duration,
        source: Arc<dyn PlantsSource>,
    ) {
        self.stop().await;

        let (tx, mut rx) = oneshot::channel();
        *self.stop_handle.lock().await = Some(tx);

        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // first tick fires immediately; skip it here
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        cache.warm_up(&user_ids, source.as_ref()).await;
                    }
                    _ = &mut rx => {
                        tracing::info!("Plant cache periodic refresh stopped");
                        break;
                    }
                }
            }
        });
    }

    pub async fn stop(&self) {
        if let Some(tx) = self.stop_handle.lock().await.take() {
            let _ = tx.send(());
        }
    }
}
