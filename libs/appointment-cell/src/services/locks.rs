// libs/appointment-cell/src/services/locks.rs
use chrono::{NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub doctor_id: i64,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl SlotKey {
    pub fn new(doctor_id: i64, date: NaiveDate, time: NaiveTime) -> Self {
        Self { doctor_id, date, time }
    }
}

/// Held for the duration of a check-then-write on one slot.
pub struct SlotGuard {
    key: SlotKey,
    _guard: OwnedMutexGuard<()>,
}

impl SlotGuard {
    pub fn key(&self) -> SlotKey {
        self.key
    }
}

/// Serializes booking writes per (doctor, date, time) inside this process.
///
/// Entries are weak so a slot nobody is waiting on costs nothing once its
/// guard is dropped. Cross-process exclusion comes from the booked-slot unique
/// index in the database.
#[derive(Default)]
pub struct SlotLockRegistry {
    slots: Mutex<HashMap<SlotKey, Weak<AsyncMutex<()>>>>,
}

impl SlotLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: SlotKey) -> SlotGuard {
        let lock = {
            let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.retain(|_, weak| weak.strong_count() > 0);

            match slots.get(&key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(AsyncMutex::new(()));
                    slots.insert(key, Arc::downgrade(&lock));
                    lock
                }
            }
        };

        debug!("Waiting for slot lock {:?}", key);
        SlotGuard {
            key,
            _guard: lock.lock_owned().await,
        }
    }

    /// Slots with a live holder or waiter.
    pub fn active_slots(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.values().filter(|weak| weak.strong_count() > 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn key(hour: u32) -> SlotKey {
        SlotKey::new(
            7,
            NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date"),
            NaiveTime::from_hms_opt(hour, 0, 0).expect("valid time"),
        )
    }

    #[tokio::test]
    async fn same_slot_is_exclusive() {
        let registry = Arc::new(SlotLockRegistry::new());
        let guard = registry.acquire(key(10)).await;

        let contender = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.acquire(key(10)).await.key() })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished(), "Second holder must wait");

        drop(guard);
        let acquired = contender.await.expect("Failed to join contender");
        assert_eq!(acquired, key(10));
    }

    #[tokio::test]
    async fn different_slots_do_not_block() {
        let registry = SlotLockRegistry::new();
        let _ten = registry.acquire(key(10)).await;
        let eleven = tokio::time::timeout(Duration::from_millis(100), registry.acquire(key(11))).await;
        assert!(eleven.is_ok());
        assert_eq!(registry.active_slots(), 2);
    }

    #[tokio::test]
    async fn released_slots_are_forgotten() {
        let registry = SlotLockRegistry::new();
        drop(registry.acquire(key(10)).await);
        assert_eq!(registry.active_slots(), 0);
    }
}
