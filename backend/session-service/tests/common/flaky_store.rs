//! Store adapter that fails chosen writes on demand

use async_trait::async_trait;
use serde_json::Value;
use session_store::{
    Condition, InMemoryStore, ItemKey, RawItem, StoreAdapter, StoreError, StoreResult, Table,
    Versioned,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutFault {
    /// Reject the write before it reaches the store
    Refuse,
    /// Apply the write, then report it as failed
    LoseReply,
}

#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    faults: Mutex<HashMap<Table, (PutFault, u32)>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` puts on `table`
    pub fn fail_puts(&self, table: Table, fault: PutFault, times: u32) {
        self.faults.lock().unwrap().insert(table, (fault, times));
    }

    pub fn pending_faults(&self, table: Table) -> u32 {
        self.faults
            .lock()
            .unwrap()
            .get(&table)
            .map_or(0, |(_, left)| *left)
    }

    fn take_fault(&self, table: Table) -> Option<PutFault> {
        let mut faults = self.faults.lock().unwrap();
        match faults.get_mut(&table) {
            Some((fault, left)) if *left > 0 => {
                *left -= 1;
                Some(*fault)
            }
            _ => None,
        }
    }
}

#[async_trait]
impl StoreAdapter for FlakyStore {
    async fn get(&self, table: Table, key: &ItemKey) -> StoreResult<Option<Versioned<Value>>> {
        self.inner.get(table, key).await
    }

    async fn put(
        &self,
        table: Table,
        key: &ItemKey,
        value: Value,
        condition: Condition,
    ) -> StoreResult<u64> {
        match self.take_fault(table) {
            Some(PutFault::Refuse) => Err(StoreError::Unavailable("put refused".to_string())),
            Some(PutFault::LoseReply) => {
                self.inner.put(table, key, value, condition).await?;
                Err(StoreError::Unavailable("reply lost".to_string()))
            }
            None => self.inner.put(table, key, value, condition).await,
        }
    }

    async fn delete(&self, table: Table, key: &ItemKey, condition: Condition) -> StoreResult<()> {
        self.inner.delete(table, key, condition).await
    }

    async fn scan(
        &self,
        table: Table,
        partition: &str,
        after: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<RawItem>> {
        self.inner.scan(table, partition, after, limit).await
    }
}
