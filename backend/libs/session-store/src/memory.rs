//! Process-local store backend

use crate::{Condition, ItemKey, RawItem, StoreAdapter, StoreError, StoreResult, Table, Versioned};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

type Partition = BTreeMap<String, (u64, Value)>;

/// In-memory implementation of [`StoreAdapter`]
///
/// Conditional writes are checked and applied under one write lock, which
/// gives the same compare-and-swap guarantee a remote backend provides.
#[derive(Default)]
pub struct InMemoryStore {
    partitions: RwLock<HashMap<(Table, String), Partition>>,
    sequence: AtomicU64,
    latency: Option<Duration>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call, for exercising caller timeouts
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Make every call fail with `Unavailable` until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    async fn simulate(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }

    fn next_version(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait::async_trait]
impl StoreAdapter for InMemoryStore {
    async fn get(&self, table: Table, key: &ItemKey) -> StoreResult<Option<Versioned<Value>>> {
        self.simulate().await?;
        let partitions = self.partitions.read().await;
        let item = partitions
            .get(&(table, key.partition.clone()))
            .and_then(|p| p.get(key.sort_key()))
            .map(|(version, value)| Versioned {
                version: *version,
                value: value.clone(),
            });
        Ok(item)
    }

    async fn put(
        &self,
        table: Table,
        key: &ItemKey,
        value: Value,
        condition: Condition,
    ) -> StoreResult<u64> {
        self.simulate().await?;
        let mut partitions = self.partitions.write().await;
        let partition = partitions
            .entry((table, key.partition.clone()))
            .or_default();

        let current = partition.get(key.sort_key()).map(|(v, _)| *v);
        if !condition.holds(current) {
            debug!(table = %table, key = %key, ?condition, ?current, "Conditional put rejected");
            return Err(StoreError::ConditionFailed);
        }

        let version = self.next_version();
        partition.insert(key.sort_key().to_string(), (version, value));
        Ok(version)
    }

    async fn delete(&self, table: Table, key: &ItemKey, condition: Condition) -> StoreResult<()> {
        self.simulate().await?;
        let mut partitions = self.partitions.write().await;
        let partition_key = (table, key.partition.clone());

        let current = partitions
            .get(&partition_key)
            .and_then(|p| p.get(key.sort_key()))
            .map(|(v, _)| *v);
        if !condition.holds(current) {
            return Err(StoreError::ConditionFailed);
        }

        if let Some(partition) = partitions.get_mut(&partition_key) {
            partition.remove(key.sort_key());
            if partition.is_empty() {
                partitions.remove(&partition_key);
            }
        }
        Ok(())
    }

    async fn scan(
        &self,
        table: Table,
        partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<RawItem>> {
        self.simulate().await?;
        let partitions = self.partitions.read().await;
        let Some(items) = partitions.get(&(table, partition.to_string())) else {
            return Ok(Vec::new());
        };

        let lower = match after {
            Some(after) => Bound::Excluded(after.to_string()),
            None => Bound::Unbounded,
        };

        let page = items
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(sort, (version, value))| RawItem {
                key: if sort.is_empty() {
                    ItemKey::new(partition)
                } else {
                    ItemKey::with_sort(partition, sort.clone())
                },
                version: *version,
                value: value.clone(),
            })
            .collect();
        Ok(page)
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.simulate().await
    }
}
