use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use ::moka::sync::Cache;

use crate::{
    config::CacheConfig,
    ports::cache::{CachePort, KeyPattern, QueryKey, ReadModel},
};

/// Bounded in-process cache with a time-to-live
#[derive(Clone)]
pub struct MokaCache {
    cache: Cache<QueryKey, ReadModel>,
    /// Held while checking a generation and inserting, and while invalidating
    generation: Arc<Mutex<u64>>,
}

impl MokaCache {
    pub fn new(max_capacity: u64, time_to_live: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(time_to_live)
                .support_invalidation_closures()
                .build(),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        // The counter stays valid even if a holder panicked
        self.generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_capacity, config.time_to_live)
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

impl CachePort for MokaCache {
    fn get(&self, key: &QueryKey) -> Option<ReadModel> {
        let value = self.cache.get(key);
        tracing::debug!(?key, hit = value.is_some(), "read model cache lookup");
        value
    }

    fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    fn insert(&self, key: QueryKey, value: ReadModel, generation: u64) -> bool {
        let current = self.lock_generation();
        if *current != generation {
            tracing::debug!(
                ?key,
                read_at = generation,
                current = *current,
                "dropping read model invalidated during its fetch"
            );
            return false;
        }
        self.cache.insert(key, value);
        true
    }

    fn invalidate(&self, pattern: KeyPattern) {
        tracing::debug!(?pattern, "invalidating read models");
        let mut generation = self.lock_generation();
        *generation += 1;
        match pattern {
            KeyPattern::Exact(key) => self.cache.invalidate(&key),
            pattern => {
                if let Err(err) = self
                    .cache
                    .invalidate_entries_if(move |key, _| pattern.matches(key))
                {
                    tracing::warn!(%err, "predicate invalidation failed, clearing the cache");
                    self.cache.invalidate_all();
                }
            }
        }
    }
}
