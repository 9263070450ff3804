use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use shared_database::{RecordStore, StoreError};
use shared_models::{Availability, Role, User, UserFilter};

use crate::models::{
    doctor_availability_key, CacheStats, DOCTORS_LIST_KEY, DOCTORS_LIST_TTL_SECONDS,
    DOCTOR_AVAILABILITY_TTL_SECONDS,
};
use crate::services::backend::CacheBackend;

/// Read-through cache for the doctor roster and per-doctor weekly
/// availability.
///
/// A miss, an expired or undecodable entry and a backend failure all fall
/// back to the record store. Invalidation never fails the caller. Admission
/// decisions (double-booking checks) must not read from here.
///
/// Each key carries a generation bumped on invalidation. A load that started
/// before an invalidation is returned to its caller but never written back.
pub struct DirectoryCache {
    backend: Arc<dyn CacheBackend>,
    store: Arc<dyn RecordStore>,
    stats: Arc<RwLock<CacheStats>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl DirectoryCache {
    pub fn new(backend: Arc<dyn CacheBackend>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            backend,
            store,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            generations: Mutex::new(HashMap::new()),
        }
    }

    /// Every doctor account, ordered by name.
    pub async fn doctors_list(&self) -> Result<Vec<User>, StoreError> {
        let store = Arc::clone(&self.store);
        self.read_through(DOCTORS_LIST_KEY, DOCTORS_LIST_TTL_SECONDS, async move {
            let filter = UserFilter {
                role: Some(Role::Doctor),
                ..Default::default()
            };
            store.list_users(filter, None).await
        })
        .await
    }

    /// The doctor's stored weekly windows, ordered by day of week.
    pub async fn doctor_availability(&self, doctor_id: i64) -> Result<Vec<Availability>, StoreError> {
        let store = Arc::clone(&self.store);
        self.read_through(
            &doctor_availability_key(doctor_id),
            DOCTOR_AVAILABILITY_TTL_SECONDS,
            async move { store.list_availability(doctor_id).await },
        )
        .await
    }

    pub async fn invalidate_doctors_list(&self) {
        self.invalidate(DOCTORS_LIST_KEY).await;
    }

    pub async fn invalidate_doctor_availability(&self, doctor_id: i64) {
        self.invalidate(&doctor_availability_key(doctor_id)).await;
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }

    async fn read_through<T, F>(&self, key: &str, ttl_seconds: u64, load: F) -> Result<T, StoreError>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = Result<T, StoreError>>,
    {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    self.stats.write().await.hits += 1;
                    debug!("Cache hit for {}", key);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    self.stats.write().await.errors += 1;
                }
            },
            Ok(None) => debug!("Cache miss for {}", key),
            Err(e) => {
                warn!("Cache read failed for {}, falling back to store: {}", key, e);
                self.stats.write().await.errors += 1;
            }
        }
        self.stats.write().await.misses += 1;

        let observed = self.generation(key).await;
        let value = load.await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                // held across the write so an invalidation cannot slip in between
                let generations = self.generations.lock().await;
                if generations.get(key).copied().unwrap_or_default() != observed {
                    debug!("Skipping cache fill for {}, invalidated during load", key);
                } else if let Err(e) = self.backend.set_with_ttl(key, &raw, ttl_seconds).await {
                    warn!("Cache write failed for {}: {}", key, e);
                    self.stats.write().await.errors += 1;
                }
            }
            Err(e) => warn!("Could not encode {} for caching: {}", key, e),
        }

        Ok(value)
    }

    async fn generation(&self, key: &str) -> u64 {
        self.generations.lock().await.get(key).copied().unwrap_or_default()
    }

    async fn invalidate(&self, key: &str) {
        let mut generations = self.generations.lock().await;
        *generations.entry(key.to_string()).or_default() += 1;
        drop(generations);

        match self.backend.delete(key).await {
            Ok(()) => {
                self.stats.write().await.invalidations += 1;
                debug!("Invalidated cache key {}", key);
            }
            Err(e) => {
                warn!("Cache invalidation failed for {}: {}", key, e);
                self.stats.write().await.errors += 1;
            }
        }
    }
}
