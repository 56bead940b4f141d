//! Key-value state
//!
//! Components that need persisted state (recent-action history) receive a
//! `KeyValueStore` explicitly. Entries may carry a TTL; expired entries are
//! never returned. The in-memory store evicts its oldest entry when full.

use crate::models::{ActionKind, ExecutionResult, ProgressStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Trait for key-value persistence
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    /// Drop expired entries, returning how many were removed
    async fn purge_expired(&self) -> Result<usize>;
}

struct StoredValue {
    value: Value,
    inserted_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// In-memory store with lazy TTL expiry and oldest-first eviction
pub struct InMemoryKvStore {
    entries: Arc<RwLock<HashMap<String, StoredValue>>>,
    capacity: usize,
}

impl InMemoryKvStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it on the way out
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let now = Utc::now();
        let expires_at = ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| now + ttl);

        let mut entries = self.entries.write().await;
        entries.retain(|_, stored| !stored.is_expired(now));

        if !entries.contains_key(key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, stored)| stored.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!(key = %oldest, "Evicting oldest entry");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            StoredValue {
                value,
                inserted_at: now,
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, stored| !stored.is_expired(now));
        Ok(before - entries.len())
    }
}

//
// ================= Recent-Action History =================
//

const HISTORY_KEY: &str = "recent_actions";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub raw: String,
    pub kind: ActionKind,
    pub status: ProgressStatus,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded list of recent directive outcomes kept under a single key
pub struct ActionHistory {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
    ttl: Duration,
}

impl ActionHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize, ttl: Duration) -> Self {
        Self { store, limit, ttl }
    }

    /// Most recent last
    pub async fn recent(&self) -> Result<Vec<HistoryEntry>> {
        match self.store.get(HISTORY_KEY).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn record(&self, result: &ExecutionResult) -> Result<()> {
        let mut entries = self.recent().await?;
        entries.push(HistoryEntry {
            raw: result.directive.raw.clone(),
            kind: result.directive.kind,
            status: result.status,
            error: result.error.clone(),
            recorded_at: Utc::now(),
        });

        if entries.len() > self.limit {
            let excess = entries.len() - self.limit;
            entries.drain(..excess);
        }

        self.store
            .set(HISTORY_KEY, serde_json::to_value(&entries)?, Some(self.ttl))
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(HISTORY_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Directive;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = InMemoryKvStore::default();
        store.set("a", json!(1), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(json!(1)));

        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_hidden() {
        let store = InMemoryKvStore::default();
        store.set("short", json!("x"), Some(Duration::from_millis(1))).await.unwrap();
        store.set("long", json!("y"), Some(Duration::from_secs(60))).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("long").await.unwrap(), Some(json!("y")));
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let store = InMemoryKvStore::new(2);
        store.set("first", json!(1), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.set("second", json!(2), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        store.set("third", json!(3), None).await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get("first").await.unwrap(), None);
        assert_eq!(store.get("third").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let store = Arc::new(InMemoryKvStore::default());
        let history = ActionHistory::new(store, 2, Duration::from_secs(60));

        for i in 0..3 {
            let result = ExecutionResult {
                directive: Directive::from_inner(i, &format!("SEARCH query {}", i)),
                status: ProgressStatus::Completed,
                success: true,
                error: None,
                retryable: false,
                attempts: 1,
                output: None,
            };
            history.record(&result).await.unwrap();
        }

        let recent = history.recent().await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].raw, "[SEARCH query 1]");
        assert_eq!(recent[1].raw, "[SEARCH query 2]");

        history.clear().await.unwrap();
        assert!(history.recent().await.unwrap().is_empty());
    }
}
