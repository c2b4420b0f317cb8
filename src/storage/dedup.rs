//! Dedup store implementations.
//!
//! Both stores share [`DedupState`] for the bookkeeping rules; they differ
//! only in whether a mutation is persisted.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::DedupRecord;
use crate::storage::{DedupStore, LocalStorage};

const STATE_KEY: &str = "state/dedup.json";

/// In-memory fingerprint table plus the cooldown rule.
#[derive(Debug, Clone, Default)]
struct DedupState {
    records: BTreeMap<String, DedupRecord>,
    cooldown: Option<Duration>,
}

impl DedupState {
    fn record_seen(&mut self, fingerprint: &str, seen_at: DateTime<Utc>) -> DedupRecord {
        let record = self
            .records
            .entry(fingerprint.to_string())
            .or_insert_with(|| DedupRecord::first_seen(fingerprint, seen_at));
        if seen_at > record.last_seen_at {
            record.last_seen_at = seen_at;
        }
        record.clone()
    }

    /// Returns whether the record changed.
    fn mark_notified(&mut self, fingerprint: &str, notified_at: DateTime<Utc>) -> bool {
        let cooldown = self.cooldown;
        let record = self
            .records
            .entry(fingerprint.to_string())
            .or_insert_with(|| DedupRecord::first_seen(fingerprint, notified_at));
        if !record.is_notifiable(notified_at, cooldown) {
            return false;
        }
        record.last_notified_at = Some(notified_at);
        record.notify_count += 1;
        true
    }

    fn is_eligible(&self, fingerprint: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(fingerprint)
            .is_none_or(|record| record.is_notifiable(now, self.cooldown))
    }
}

/// Dedup store persisted as a JSON map under the storage root.
///
/// A missing file is an empty store. A file that exists but cannot be read
/// or parsed is never reset; opening fails with `StateStoreUnavailable`.
#[derive(Debug, Clone)]
pub struct FileDedupStore {
    storage: LocalStorage,
    state: Arc<Mutex<DedupState>>,
}

impl FileDedupStore {
    /// Load existing state from `state/dedup.json`.
    pub async fn open(storage: LocalStorage, cooldown: Option<Duration>) -> Result<Self> {
        let records: BTreeMap<String, DedupRecord> = storage
            .read_json(STATE_KEY)
            .await
            .map_err(|e| {
                AppError::store(format!(
                    "cannot load {}: {}",
                    storage.path(STATE_KEY).display(),
                    e
                ))
            })?
            .unwrap_or_default();

        log::info!("Dedup store loaded: {} fingerprints", records.len());

        Ok(Self {
            storage,
            state: Arc::new(Mutex::new(DedupState { records, cooldown })),
        })
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn persist(&self, state: &DedupState) -> Result<()> {
        self.storage
            .write_json(STATE_KEY, &state.records)
            .await
            .map_err(|e| AppError::store(format!("cannot write {STATE_KEY}: {e}")))
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<DedupRecord>> {
        Ok(self.state.lock().await.records.get(fingerprint).cloned())
    }

    async fn record_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<DedupRecord> {
        let mut state = self.state.lock().await;
        let record = state.record_seen(fingerprint, seen_at);
        self.persist(&state).await?;
        Ok(record)
    }

    async fn mark_notified(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        let changed = state.mark_notified(fingerprint, notified_at);
        if changed {
            self.persist(&state).await?;
        }
        Ok(changed)
    }

    async fn is_eligible_for_notification(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.state.lock().await.is_eligible(fingerprint, now))
    }
}

/// Non-persistent dedup store.
#[derive(Debug, Clone, Default)]
pub struct MemoryDedupStore {
    state: Arc<Mutex<DedupState>>,
}

impl MemoryDedupStore {
    pub fn new(cooldown: Option<Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(DedupState {
                records: BTreeMap::new(),
                cooldown,
            })),
        }
    }

    pub async fn records(&self) -> Vec<DedupRecord> {
        self.state.lock().await.records.values().cloned().collect()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<DedupRecord>> {
        Ok(self.state.lock().await.records.get(fingerprint).cloned())
    }

    async fn record_seen(&self, fingerprint: &str, seen_at: DateTime<Utc>) -> Result<DedupRecord> {
        Ok(self.state.lock().await.record_seen(fingerprint, seen_at))
    }

    async fn mark_notified(&self, fingerprint: &str, notified_at: DateTime<Utc>) -> Result<bool> {
        Ok(self.state.lock().await.mark_notified(fingerprint, notified_at))
    }

    async fn is_eligible_for_notification(
        &self,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.state.lock().await.is_eligible(fingerprint, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_record_seen_creates_then_updates() {
        let store = MemoryDedupStore::new(None);
        let first = store.record_seen("fp", t(1)).await.unwrap();
        assert_eq!(first.first_seen_at, t(1));
        assert_eq!(first.notify_count, 0);

        let second = store.record_seen("fp", t(4)).await.unwrap();
        assert_eq!(second.first_seen_at, t(1));
        assert_eq!(second.last_seen_at, t(4));
    }

    #[tokio::test]
    async fn test_mark_notified_is_idempotent_without_cooldown() {
        let store = MemoryDedupStore::new(None);
        store.record_seen("fp", t(1)).await.unwrap();

        assert!(store.is_eligible_for_notification("fp", t(1)).await.unwrap());
        assert!(store.mark_notified("fp", t(2)).await.unwrap());
        assert!(!store.mark_notified("fp", t(3)).await.unwrap());
        assert!(!store.mark_notified("fp", t(20)).await.unwrap());

        let record = store.lookup("fp").await.unwrap().unwrap();
        assert_eq!(record.notify_count, 1);
        assert_eq!(record.last_notified_at, Some(t(2)));
        assert!(!store.is_eligible_for_notification("fp", t(23)).await.unwrap());
    }

    #[tokio::test]
    async fn test_cooldown_allows_renotify() {
        let store = MemoryDedupStore::new(Some(Duration::hours(6)));
        store.mark_notified("fp", t(0)).await.unwrap();

        assert!(!store.is_eligible_for_notification("fp", t(5)).await.unwrap());
        assert!(!store.mark_notified("fp", t(5)).await.unwrap());
        assert!(store.is_eligible_for_notification("fp", t(6)).await.unwrap());
        assert!(store.mark_notified("fp", t(6)).await.unwrap());

        let record = store.lookup("fp").await.unwrap().unwrap();
        assert_eq!(record.notify_count, 2);
    }

    #[tokio::test]
    async fn test_file_store_persists_across_open() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let store = FileDedupStore::open(storage.clone(), None).await.unwrap();
        assert!(store.is_empty().await);
        store.record_seen("fp", t(1)).await.unwrap();
        store.mark_notified("fp", t(2)).await.unwrap();
        drop(store);

        let reopened = FileDedupStore::open(storage, None).await.unwrap();
        let record = reopened.lookup("fp").await.unwrap().unwrap();
        assert_eq!(record.notify_count, 1);
        assert!(!reopened.is_eligible_for_notification("fp", t(9)).await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.write_bytes(STATE_KEY, b"{ not json").await.unwrap();

        let err = FileDedupStore::open(storage.clone(), None).await.unwrap_err();
        assert!(matches!(err, AppError::StateStoreUnavailable(_)));
        assert!(err.is_fatal());

        // The corrupt file is left in place for inspection.
        let bytes = storage.read_bytes(STATE_KEY).await.unwrap().unwrap();
        assert_eq!(bytes, b"{ not json");
    }
}
