//! Session store adapter
//!
//! Typed get/put/delete/scan against a partition-keyed, optionally sort-keyed
//! item store. Every item carries a version; writes may be conditioned on it,
//! which is what makes read-modify-write sequences safe under concurrency.
//!
//! - [`StoreAdapter`]: the raw backend contract (JSON values)
//! - [`InMemoryStore`]: process-local backend for tests and single-node runs
//! - [`RedisStore`]: Redis backend, conditional writes via Lua
//! - [`Store`]: typed wrapper adding per-call timeouts and the CAS loop

mod error;
mod memory;
mod redis_store;
mod typed;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use redis_store::{RedisStore, SharedRedis};
pub use typed::{Decision, Record, Store, UpdateError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Logical tables of the session backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Resources,
    Memberships,
    MembershipEvents,
    LedgerEntries,
    AggregateStats,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Resources => "resources",
            Table::Memberships => "memberships",
            Table::MembershipEvents => "membership_events",
            Table::LedgerEntries => "ledger_entries",
            Table::AggregateStats => "aggregate_stats",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primary key: partition key plus optional sort key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl ItemKey {
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: None,
        }
    }

    pub fn with_sort(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            sort: Some(sort.into()),
        }
    }

    /// Sort key as stored; items without one sort first
    pub fn sort_key(&self) -> &str {
        self.sort.as_deref().unwrap_or("")
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sort {
            Some(sort) => write!(f, "{}/{}", self.partition, sort),
            None => f.write_str(&self.partition),
        }
    }
}

/// A value together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Precondition for a write or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Unconditional
    None,
    /// Succeeds only if no item exists under the key
    NotExists,
    /// Succeeds only if the stored version equals this one
    Version(u64),
}

impl Condition {
    /// Condition that protects a value read at `current`
    pub fn expecting(current: Option<u64>) -> Self {
        match current {
            Some(version) => Condition::Version(version),
            None => Condition::NotExists,
        }
    }

    pub fn holds(&self, current: Option<u64>) -> bool {
        match self {
            Condition::None => true,
            Condition::NotExists => current.is_none(),
            Condition::Version(expected) => current == Some(*expected),
        }
    }
}

/// Raw item as returned by a scan
#[derive(Debug, Clone)]
pub struct RawItem {
    pub key: ItemKey,
    pub version: u64,
    pub value: Value,
}

/// Backend contract shared by every store implementation
///
/// Versions are drawn from a store-wide sequence, so they strictly increase on
/// every write and a re-created item never reuses an old version.
#[async_trait::async_trait]
pub trait StoreAdapter: Send + Sync {
    /// Fetch one item
    async fn get(&self, table: Table, key: &ItemKey) -> StoreResult<Option<Versioned<Value>>>;

    /// Write one item if `condition` holds; returns the new version
    async fn put(
        &self,
        table: Table,
        key: &ItemKey,
        value: Value,
        condition: Condition,
    ) -> StoreResult<u64>;

    /// Delete one item if `condition` holds; deleting a missing item
    /// unconditionally succeeds
    async fn delete(&self, table: Table, key: &ItemKey, condition: Condition) -> StoreResult<()>;

    /// Items of one partition with sort key strictly greater than `after`,
    /// ascending by sort key, at most `limit` of them
    async fn scan(
        &self,
        table: Table,
        partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<RawItem>>;

    /// Health check (optional)
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
