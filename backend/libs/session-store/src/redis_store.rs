//! Redis store backend
//!
//! Layout per partition:
//! - `{prefix}:{table}:{partition}` hash: sort key -> JSON value
//! - `{prefix}:{table}:{partition}:ver` hash: sort key -> version
//! - `{prefix}:seq` counter: store-wide version sequence
//!
//! Conditional writes run as Lua scripts so the version check and the write
//! are one atomic step on the server.

use crate::{Condition, ItemKey, RawItem, StoreAdapter, StoreError, StoreResult, Table, Versioned};
use redis::aio::ConnectionManager;
use redis::Script;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Shared Redis connection manager
pub type SharedRedis = Arc<Mutex<ConnectionManager>>;

const GET_SCRIPT: &str = r#"
local data = redis.call('HGET', KEYS[1], ARGV[1])
if not data then return {} end
local ver = redis.call('HGET', KEYS[2], ARGV[1])
return {data, ver}
"#;

const PUT_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[2], ARGV[1])
if ARGV[2] == 'not_exists' and cur then return -1 end
if ARGV[2] == 'version' and cur ~= ARGV[3] then return -1 end
local v = redis.call('INCR', KEYS[3])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[4])
redis.call('HSET', KEYS[2], ARGV[1], v)
return v
"#;

const DELETE_SCRIPT: &str = r#"
local cur = redis.call('HGET', KEYS[2], ARGV[1])
if ARGV[2] == 'not_exists' and cur then return -1 end
if ARGV[2] == 'version' and cur ~= ARGV[3] then return -1 end
redis.call('HDEL', KEYS[1], ARGV[1])
redis.call('HDEL', KEYS[2], ARGV[1])
return 1
"#;

/// Redis implementation of [`StoreAdapter`]
pub struct RedisStore {
    redis: SharedRedis,
    prefix: String,
    get_script: Script,
    put_script: Script,
    delete_script: Script,
}

impl RedisStore {
    pub fn new(redis: SharedRedis, prefix: impl Into<String>) -> Self {
        Self {
            redis,
            prefix: prefix.into(),
            get_script: Script::new(GET_SCRIPT),
            put_script: Script::new(PUT_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        }
    }

    /// Connect to `redis_url` and build a store on a fresh connection manager
    pub async fn connect(redis_url: &str, prefix: impl Into<String>) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(Arc::new(Mutex::new(manager)), prefix))
    }

    fn data_key(&self, table: Table, partition: &str) -> String {
        format!("{}:{}:{}", self.prefix, table, partition)
    }

    fn version_key(&self, table: Table, partition: &str) -> String {
        format!("{}:{}:{}:ver", self.prefix, table, partition)
    }

    fn sequence_key(&self) -> String {
        format!("{}:seq", self.prefix)
    }
}

/// Mode and expected version passed to the Lua scripts
fn condition_args(condition: Condition) -> (&'static str, String) {
    match condition {
        Condition::None => ("none", String::new()),
        Condition::NotExists => ("not_exists", String::new()),
        Condition::Version(v) => ("version", v.to_string()),
    }
}

fn parse_version(raw: &str) -> StoreResult<u64> {
    raw.parse::<u64>()
        .map_err(|_| StoreError::Backend(format!("corrupt version value: {}", raw)))
}

#[async_trait::async_trait]
impl StoreAdapter for RedisStore {
    async fn get(&self, table: Table, key: &ItemKey) -> StoreResult<Option<Versioned<Value>>> {
        let mut conn = self.redis.lock().await;
        let reply: Vec<String> = self
            .get_script
            .key(self.data_key(table, &key.partition))
            .key(self.version_key(table, &key.partition))
            .arg(key.sort_key())
            .invoke_async(&mut *conn)
            .await?;

        match reply.as_slice() {
            [] => Ok(None),
            [data, version] => Ok(Some(Versioned {
                version: parse_version(version)?,
                value: serde_json::from_str(data)?,
            })),
            _ => Err(StoreError::Backend(format!(
                "unexpected reply length {} for {}",
                reply.len(),
                key
            ))),
        }
    }

    async fn put(
        &self,
        table: Table,
        key: &ItemKey,
        value: Value,
        condition: Condition,
    ) -> StoreResult<u64> {
        let payload = serde_json::to_string(&value)?;
        let (mode, expected) = condition_args(condition);

        let mut conn = self.redis.lock().await;
        let version: i64 = self
            .put_script
            .key(self.data_key(table, &key.partition))
            .key(self.version_key(table, &key.partition))
            .key(self.sequence_key())
            .arg(key.sort_key())
            .arg(mode)
            .arg(expected)
            .arg(payload)
            .invoke_async(&mut *conn)
            .await?;

        if version < 0 {
            debug!(table = %table, key = %key, ?condition, "Conditional put rejected");
            return Err(StoreError::ConditionFailed);
        }
        Ok(version as u64)
    }

    async fn delete(&self, table: Table, key: &ItemKey, condition: Condition) -> StoreResult<()> {
        let (mode, expected) = condition_args(condition);

        let mut conn = self.redis.lock().await;
        let result: i64 = self
            .delete_script
            .key(self.data_key(table, &key.partition))
            .key(self.version_key(table, &key.partition))
            .arg(key.sort_key())
            .arg(mode)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;

        if result < 0 {
            return Err(StoreError::ConditionFailed);
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
        let mut conn = self.redis.lock().await;
        let (data, versions): (HashMap<String, String>, HashMap<String, String>) = redis::pipe()
            .atomic()
            .hgetall(self.data_key(table, partition))
            .hgetall(self.version_key(table, partition))
            .query_async(&mut *conn)
            .await?;
        drop(conn);

        let mut sorts: Vec<&String> = data
            .keys()
            .filter(|sort| after.map_or(true, |after| sort.as_str() > after))
            .collect();
        sorts.sort();

        let mut items = Vec::with_capacity(limit.min(sorts.len()));
        for sort in sorts.into_iter().take(limit) {
            let version = versions
                .get(sort)
                .ok_or_else(|| StoreError::Backend(format!("missing version for {}", sort)))?;
            items.push(RawItem {
                key: if sort.is_empty() {
                    ItemKey::new(partition)
                } else {
                    ItemKey::with_sort(partition, sort.clone())
                },
                version: parse_version(version)?,
                value: serde_json::from_str(&data[sort])?,
            });
        }
        Ok(items)
    }

    async fn health_check(&self) -> StoreResult<()> {
        let mut conn = self.redis.lock().await;
        redis::cmd("PING")
            .query_async::<_, String>(&mut *conn)
            .await?;
        Ok(())
    }
}
