//! Typed store wrapper
//!
//! Adds JSON (de)serialisation, a caller-supplied timeout on every backend
//! call, and [`Store::update_with`], the read-decide-write loop every
//! aggregate mutation goes through.

use crate::{Condition, ItemKey, StoreAdapter, StoreError, StoreResult, Table, Versioned};
use resilience::retry::{with_retry_if, RetryConfig, RetryError};
use resilience::timeout::{with_timeout, TimeoutError};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Page size used when draining a whole partition
const SCAN_PAGE_SIZE: usize = 100;

/// Typed item returned by a scan
#[derive(Debug, Clone)]
pub struct Record<T> {
    pub key: ItemKey,
    pub version: u64,
    pub value: T,
}

/// Outcome of one decide step inside [`Store::update_with`]
pub enum Decision<T, O, E> {
    /// Write `value` conditioned on the version that was read, then return `output`
    Write { value: T, output: O },
    /// Leave the item untouched and return `output`
    Keep(O),
    /// Stop without writing; never retried
    Abort(E),
}

/// Failure of [`Store::update_with`]
#[derive(Debug, thiserror::Error)]
pub enum UpdateError<E> {
    /// The decide step rejected the current state
    #[error("update aborted")]
    Aborted(E),
    /// Every attempt lost the compare-and-swap race
    #[error("version conflict after {attempts} attempts")]
    Conflict { attempts: u32 },
    #[error(transparent)]
    Store(StoreError),
}

enum Attempt<E> {
    Store(StoreError),
    Aborted(E),
}

impl<E> fmt::Display for Attempt<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attempt::Store(e) => write!(f, "{}", e),
            Attempt::Aborted(_) => f.write_str("aborted"),
        }
    }
}

/// Store handle shared by every service component
#[derive(Clone)]
pub struct Store {
    adapter: Arc<dyn StoreAdapter>,
    timeout: Duration,
    retry: RetryConfig,
}

impl Store {
    pub fn new(adapter: Arc<dyn StoreAdapter>, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            adapter,
            timeout,
            retry,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    async fn timed<T, F>(&self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        match with_timeout(self.timeout, fut).await {
            Ok(value) => Ok(value),
            Err(TimeoutError::OperationFailed(e)) => Err(e),
            Err(TimeoutError::Elapsed(after)) => Err(StoreError::Unavailable(format!(
                "store call timed out after {:?}",
                after
            ))),
        }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        table: Table,
        key: &ItemKey,
    ) -> StoreResult<Option<Versioned<T>>> {
        let raw = self.timed(self.adapter.get(table, key)).await?;
        raw.map(|item| {
            Ok(Versioned {
                version: item.version,
                value: serde_json::from_value(item.value)?,
            })
        })
        .transpose()
    }

    pub async fn put<T: Serialize>(
        &self,
        table: Table,
        key: &ItemKey,
        value: &T,
        condition: Condition,
    ) -> StoreResult<u64> {
        let value = serde_json::to_value(value)?;
        self.timed(self.adapter.put(table, key, value, condition))
            .await
    }

    /// Create an item that must not exist yet, retrying transient failures
    ///
    /// An earlier attempt may have landed before its reply was lost, so a
    /// `ConditionFailed` over an identical stored value counts as success.
    pub async fn insert<T: Serialize>(&self, table: Table, key: &ItemKey, value: &T) -> StoreResult<u64> {
        let value = serde_json::to_value(value)?;
        let written = self
            .retry_transient(|| {
                self.timed(
                    self.adapter
                        .put(table, key, value.clone(), Condition::NotExists),
                )
            })
            .await;

        match written {
            Err(StoreError::ConditionFailed) => {
                let existing = self
                    .retry_transient(|| self.timed(self.adapter.get(table, key)))
                    .await?;
                match existing {
                    Some(item) if item.value == value => {
                        debug!(table = %table, key = %key, "Insert already applied");
                        Ok(item.version)
                    }
                    _ => Err(StoreError::ConditionFailed),
                }
            }
            other => other,
        }
    }

    pub async fn delete(&self, table: Table, key: &ItemKey, condition: Condition) -> StoreResult<()> {
        self.timed(self.adapter.delete(table, key, condition)).await
    }

    /// One page of a partition, ascending by sort key
    pub async fn scan<T: DeserializeOwned>(
        &self,
        table: Table,
        partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Record<T>>> {
        let raw = self
            .timed(self.adapter.scan(table, partition, after, limit))
            .await?;
        raw.into_iter()
            .map(|item| {
                Ok(Record {
                    key: item.key,
                    version: item.version,
                    value: serde_json::from_value(item.value)?,
                })
            })
            .collect()
    }

    /// Every item of a partition, ascending by sort key
    pub async fn scan_all<T: DeserializeOwned>(
        &self,
        table: Table,
        partition: &str,
    ) -> StoreResult<Vec<Record<T>>> {
        let mut all = Vec::new();
        let mut after: Option<String> = None;
        loop {
            let page: Vec<Record<T>> = self
                .scan(table, partition, after.as_deref(), SCAN_PAGE_SIZE)
                .await?;
            let done = page.len() < SCAN_PAGE_SIZE;
            after = page.last().map(|r| r.key.sort_key().to_string());
            all.extend(page);
            if done {
                return Ok(all);
            }
        }
    }

    pub async fn health_check(&self) -> StoreResult<()> {
        self.timed(self.adapter.health_check()).await
    }

    /// Re-run `f` while it fails with `Unavailable`, within the retry budget
    ///
    /// Only for reads and idempotent writes; condition failures are returned
    /// immediately.
    pub async fn retry_transient<T, F, Fut>(&self, f: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        with_retry_if(
            self.retry.clone(),
            |e: &StoreError| matches!(e, StoreError::Unavailable(_)),
            f,
        )
        .await
        .map_err(RetryError::into_inner)
    }

    /// Optimistic read-modify-write of one item
    ///
    /// Reads the item with its version, hands it to `decide`, and writes the
    /// decided value only if the version is unchanged. A lost race or a
    /// transient backend failure re-runs the whole cycle, bounded by the
    /// store's retry budget.
    pub async fn update_with<T, O, E, F>(
        &self,
        table: Table,
        key: &ItemKey,
        decide: F,
    ) -> Result<O, UpdateError<E>>
    where
        T: Serialize + DeserializeOwned,
        F: Fn(Option<&T>) -> Decision<T, O, E>,
    {
        let decide = &decide;
        let result = with_retry_if(
            self.retry.clone(),
            |e: &Attempt<E>| matches!(e, Attempt::Store(se) if se.is_transient()),
            || async move {
                let current: Option<Versioned<T>> = match self.get(table, key).await {
                    Ok(current) => current,
                    Err(e) => return Err(Attempt::Store(e)),
                };
                let version = current.as_ref().map(|c| c.version);

                match decide(current.as_ref().map(|c| &c.value)) {
                    Decision::Keep(output) => Ok(output),
                    Decision::Abort(e) => Err(Attempt::Aborted(e)),
                    Decision::Write { value, output } => {
                        match self
                            .put(table, key, &value, Condition::expecting(version))
                            .await
                        {
                            Ok(_) => Ok(output),
                            Err(e) => {
                                debug!(table = %table, key = %key, error = %e, "CAS attempt failed");
                                Err(Attempt::Store(e))
                            }
                        }
                    }
                }
            },
        )
        .await;

        match result {
            Ok(output) => Ok(output),
            Err(RetryError::OperationFailed(Attempt::Aborted(e))) => Err(UpdateError::Aborted(e)),
            Err(RetryError::OperationFailed(Attempt::Store(e))) => Err(UpdateError::Store(e)),
            Err(RetryError::MaxAttemptsExceeded {
                attempts,
                last_error,
            }) => match last_error {
                Attempt::Store(StoreError::ConditionFailed) => {
                    warn!(table = %table, key = %key, attempts, "CAS retries exhausted");
                    Err(UpdateError::Conflict { attempts })
                }
                Attempt::Store(e) => Err(UpdateError::Store(e)),
                Attempt::Aborted(e) => Err(UpdateError::Aborted(e)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        value: u32,
    }

    fn store_with(adapter: Arc<dyn StoreAdapter>) -> Store {
        Store::new(
            adapter,
            Duration::from_millis(200),
            RetryConfig {
                max_attempts: 50,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                ..Default::default()
            },
        )
    }

    fn increment(current: Option<&Counter>) -> Decision<Counter, u32, ()> {
        let next = current.map_or(0, |c| c.value) + 1;
        Decision::Write {
            value: Counter { value: next },
            output: next,
        }
    }

    #[tokio::test]
    async fn test_update_creates_then_updates() {
        let store = store_with(Arc::new(InMemoryStore::new()));
        let key = ItemKey::new("c");

        assert_eq!(store.update_with(Table::AggregateStats, &key, increment).await.unwrap(), 1);
        assert_eq!(store.update_with(Table::AggregateStats, &key, increment).await.unwrap(), 2);

        let stored: Versioned<Counter> = store
            .get(Table::AggregateStats, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, Counter { value: 2 });
    }

    #[tokio::test]
    async fn test_abort_is_not_retried() {
        let store = store_with(Arc::new(InMemoryStore::new()));
        let calls = std::sync::atomic::AtomicU32::new(0);

        let result = store
            .update_with(Table::AggregateStats, &ItemKey::new("c"), |_: Option<&Counter>| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Decision::<Counter, (), &str>::Abort("denied")
            })
            .await;

        assert!(matches!(result, Err(UpdateError::Aborted("denied"))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = store_with(Arc::new(InMemoryStore::new()));
        let key = ItemKey::new("c");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store.update_with(Table::AggregateStats, &key, increment).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let stored: Versioned<Counter> = store
            .get(Table::AggregateStats, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value.value, 20);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let adapter = Arc::new(InMemoryStore::with_latency(Duration::from_millis(500)));
        let store = Store::new(adapter, Duration::from_millis(20), RetryConfig::default());

        let err = store
            .get::<Counter>(Table::Resources, &ItemKey::new("r"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_unavailable_surfaces_after_budget() {
        let adapter = Arc::new(InMemoryStore::new());
        adapter.set_offline(true);
        let store = Store::new(
            adapter,
            Duration::from_millis(100),
            RetryConfig {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            },
        );

        let result = store
            .update_with(Table::AggregateStats, &ItemKey::new("c"), increment)
            .await;
        assert!(matches!(
            result,
            Err(UpdateError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_retry_transient_recovers() {
        let adapter = Arc::new(InMemoryStore::new());
        let store = store_with(adapter.clone());
        adapter.set_offline(true);

        let key = ItemKey::new("r");
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = store
            .retry_transient(|| {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 1 {
                    adapter.set_offline(false);
                }
                store.get::<Counter>(Table::Resources, &key)
            })
            .await;

        assert!(result.unwrap().is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_insert_retries_through_outage() {
        let adapter = Arc::new(InMemoryStore::new());
        let store = store_with(adapter.clone());
        adapter.set_offline(true);

        let key = ItemKey::with_sort("p1", "e1");
        let flip = {
            let adapter = adapter.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                adapter.set_offline(false);
            })
        };
        store
            .insert(Table::MembershipEvents, &key, &Counter { value: 1 })
            .await
            .unwrap();
        flip.await.unwrap();

        let stored: Versioned<Counter> = store
            .get(Table::MembershipEvents, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, Counter { value: 1 });
    }

    #[tokio::test]
    async fn test_insert_accepts_identical_existing_item() {
        let store = store_with(Arc::new(InMemoryStore::new()));
        let key = ItemKey::with_sort("p1", "e1");

        let first = store
            .insert(Table::MembershipEvents, &key, &Counter { value: 1 })
            .await
            .unwrap();
        let again = store
            .insert(Table::MembershipEvents, &key, &Counter { value: 1 })
            .await
            .unwrap();
        assert_eq!(first, again);

        let clash = store
            .insert(Table::MembershipEvents, &key, &Counter { value: 2 })
            .await;
        assert!(matches!(clash, Err(StoreError::ConditionFailed)));
    }

    #[tokio::test]
    async fn test_scan_all_crosses_pages() {
        let store = store_with(Arc::new(InMemoryStore::new()));
        for i in 0..(SCAN_PAGE_SIZE + 5) {
            store
                .put(
                    Table::LedgerEntries,
                    &ItemKey::with_sort("r", format!("{:05}", i)),
                    &Counter { value: i as u32 },
                    Condition::None,
                )
                .await
                .unwrap();
        }

        let all: Vec<Record<Counter>> = store.scan_all(Table::LedgerEntries, "r").await.unwrap();
        assert_eq!(all.len(), SCAN_PAGE_SIZE + 5);
        assert_eq!(all.last().unwrap().value.value, (SCAN_PAGE_SIZE + 4) as u32);
    }
}
