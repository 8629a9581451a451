use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::TryStreamExt;
use moka::future::Cache;
use serde::Serialize;
use sqlx::MySqlPool;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use utoipa::ToSchema;

use crate::api::response::ApiResult;
use crate::staffing::store::{ShiftDetail, load_shift_detail};

/// Time-boxed cache of shift details keyed by shift id.
///
/// Entries expire after the configured TTL and are invalidated by every
/// handler that mutates a shift, its assignments or its timesheet.
///
/// `generation` moves on every invalidation. A detail loaded before an
/// invalidation is dropped instead of being cached for a full TTL.
#[derive(Clone)]
pub struct ShiftCache {
    inner: Cache<u64, Arc<ShiftDetail>>,
    generation: Arc<AtomicU64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CacheStats {
    pub entries: u64,
    pub ttl_secs: u64,
}

impl ShiftCache {
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Take before reading the database; pass to [`ShiftCache::insert`].
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Returns the cached detail or loads and caches it.
    pub async fn get_or_load(&self, pool: &MySqlPool, shift_id: u64) -> ApiResult<Arc<ShiftDetail>> {
        if let Some(hit) = self.get(shift_id).await {
            return Ok(hit);
        }
        let loaded_at = self.generation();
        let detail = Arc::new(load_shift_detail(pool, shift_id).await?);
        self.store(shift_id, loaded_at, detail.clone()).await;
        Ok(detail)
    }

    pub async fn get(&self, shift_id: u64) -> Option<Arc<ShiftDetail>> {
        self.inner.get(&shift_id).await
    }

    /// Caches a detail read from the database after `loaded_at` was taken.
    pub async fn insert(&self, shift_id: u64, loaded_at: u64, detail: ShiftDetail) {
        self.store(shift_id, loaded_at, Arc::new(detail)).await;
    }

    async fn store(&self, shift_id: u64, loaded_at: u64, detail: Arc<ShiftDetail>) {
        if self.generation() != loaded_at {
            return;
        }
        self.inner.insert(shift_id, detail).await;
        // an invalidation may have landed between the check and the insert
        if self.generation() != loaded_at {
            self.inner.invalidate(&shift_id).await;
        }
    }

    pub async fn invalidate(&self, shift_id: u64) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate(&shift_id).await;
    }

    pub fn clear(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.inner.run_pending_tasks().await;
        CacheStats {
            entries: self.inner.entry_count(),
            ttl_secs: self.inner.policy().time_to_live().map_or(0, |d| d.as_secs()),
        }
    }
}

/// Preloads today's shifts so the first dashboard hits are warm.
pub async fn warmup_shift_cache(pool: &MySqlPool, cache: &ShiftCache) -> Result<()> {
    let today = Utc::now().date_naive();
    let ids: Vec<(u64,)> = sqlx::query_as::<_, (u64,)>("SELECT id FROM shifts WHERE date = ? ORDER BY start_time")
        .bind(today)
        .fetch(pool)
        .try_collect()
        .await?;

    let total = ids.len();
    for (shift_id,) in ids {
        let loaded_at = cache.generation();
        let detail = load_shift_detail(pool, shift_id)
            .await
            .with_context(|| format!("loading shift {shift_id}"))?;
        cache.insert(shift_id, loaded_at, detail).await;
    }

    tracing::info!(shifts = total, date = %today, "Shift cache warmup complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staffing::fulfillment::{Fulfillment, tests::sample_shift};

    fn detail() -> ShiftDetail {
        let shift = sample_shift();
        let fulfillment = Fulfillment::compute(&shift, &[]);
        ShiftDetail {
            fully_staffed: fulfillment.is_fully_staffed(),
            fulfillment,
            shift,
            job_name: "Arena Load-In".into(),
            company_id: 3,
            company_name: "Acme Events".into(),
            workers: vec![],
            timesheet_id: None,
            timesheet_status: None,
        }
    }

    #[actix_web::test]
    async fn fresh_load_is_cached() {
        let cache = ShiftCache::new(10, Duration::from_secs(30));
        let loaded_at = cache.generation();
        cache.insert(1, loaded_at, detail()).await;
        assert!(cache.get(1).await.is_some());

        cache.invalidate(1).await;
        assert!(cache.get(1).await.is_none());
    }

    #[actix_web::test]
    async fn load_overtaken_by_invalidation_is_dropped() {
        let cache = ShiftCache::new(10, Duration::from_secs(30));
        let loaded_at = cache.generation();
        // a mutation commits while the slow read is still in flight
        cache.invalidate(1).await;
        cache.insert(1, loaded_at, detail()).await;
        assert!(cache.get(1).await.is_none());

        let loaded_at = cache.generation();
        cache.clear();
        cache.insert(2, loaded_at, detail()).await;
        assert!(cache.get(2).await.is_none());
    }

    #[actix_web::test]
    async fn stats_report_configured_ttl() {
        let cache = ShiftCache::new(10, Duration::from_secs(45));
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.ttl_secs, 45);
        assert!(cache.get(1).await.is_none());
    }
}
