use crate::domain::validation::{validate_capacity, validate_id};
use crate::domain::{ResourceInstance, ResourceKind};
use crate::error::{ServiceError, ServiceResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use session_cache::{CacheKey, SessionCache};
use session_store::{Condition, Decision, ItemKey, Store, Table};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Request to create a meeting or stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResource {
    pub kind: ResourceKind,
    pub owner_id: String,
    pub capacity: Option<u32>,
    #[serde(default = "default_open")]
    pub is_open: bool,
    /// Session id handed back by the conferencing provider
    pub provider_session_id: Option<String>,
}

fn default_open() -> bool {
    true
}

/// Resource lifecycle: create, read, capacity changes, teardown
#[derive(Clone)]
pub struct ResourceService {
    store: Store,
    cache: SessionCache,
    default_capacity: u32,
    cache_ttl_secs: u64,
}

impl ResourceService {
    pub fn new(store: Store, cache: SessionCache, default_capacity: u32, cache_ttl_secs: u64) -> Self {
        Self {
            store,
            cache,
            default_capacity,
            cache_ttl_secs,
        }
    }

    pub(crate) fn key(resource_id: &str) -> ItemKey {
        ItemKey::new(resource_id)
    }

    #[tracing::instrument(skip(self, request), fields(owner_id = %request.owner_id))]
    pub async fn create(&self, request: CreateResource) -> ServiceResult<ResourceInstance> {
        validate_id("owner_id", &request.owner_id)?;
        let capacity = request.capacity.unwrap_or(self.default_capacity);
        validate_capacity(capacity)?;
        if let Some(provider_id) = &request.provider_session_id {
            validate_id("provider_session_id", provider_id)?;
        }

        let resource = ResourceInstance {
            id: Uuid::new_v4().to_string(),
            kind: request.kind,
            owner_id: request.owner_id,
            capacity,
            is_open: request.is_open,
            block_list: BTreeSet::new(),
            provider_session_id: request.provider_session_id,
            created_at: Utc::now(),
            active: BTreeMap::new(),
        };

        self.store
            .put(
                Table::Resources,
                &Self::key(&resource.id),
                &resource,
                Condition::NotExists,
            )
            .await?;
        self.cache
            .write(&CacheKey::resource(&resource.id), &resource, self.cache_ttl_secs)
            .await;

        info!(resource_id = %resource.id, kind = ?resource.kind, capacity, "Resource created");
        Ok(resource)
    }

    /// Cache-aside read of a resource
    pub async fn get(&self, resource_id: &str) -> ServiceResult<ResourceInstance> {
        validate_id("resource_id", resource_id)?;
        let key = Self::key(resource_id);

        self.cache
            .read_through(&CacheKey::resource(resource_id), self.cache_ttl_secs, || async {
                let stored = self
                    .store
                    .retry_transient(|| self.store.get::<ResourceInstance>(Table::Resources, &key))
                    .await?;
                Ok::<_, ServiceError>(stored.map(|v| v.value))
            })
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("resource {}", resource_id)))
    }

    /// Change capacity; members beyond a lowered capacity stay admitted
    #[tracing::instrument(skip(self))]
    pub async fn set_capacity(&self, resource_id: &str, capacity: u32) -> ServiceResult<ResourceInstance> {
        validate_id("resource_id", resource_id)?;
        validate_capacity(capacity)?;

        let updated = self
            .store
            .update_with(Table::Resources, &Self::key(resource_id), |current: Option<&ResourceInstance>| {
                let Some(resource) = current else {
                    return Decision::Abort(ServiceError::NotFound(format!("resource {}", resource_id)));
                };
                if resource.capacity == capacity {
                    return Decision::Keep(resource.clone());
                }
                let mut next = resource.clone();
                next.capacity = capacity;
                Decision::Write {
                    output: next.clone(),
                    value: next,
                }
            })
            .await?;

        self.cache.invalidate(&CacheKey::resource(resource_id)).await;
        info!(resource_id = %resource_id, capacity, active = updated.active_count(), "Capacity updated");
        Ok(updated)
    }

    /// Delete the resource record; memberships, events and ledger rows stay for audit
    #[tracing::instrument(skip(self))]
    pub async fn teardown(&self, resource_id: &str) -> ServiceResult<()> {
        validate_id("resource_id", resource_id)?;
        let key = Self::key(resource_id);

        let existing = self
            .store
            .get::<ResourceInstance>(Table::Resources, &key)
            .await?;
        let Some(existing) = existing else {
            return Err(ServiceError::NotFound(format!("resource {}", resource_id)));
        };

        self.store
            .delete(Table::Resources, &key, Condition::None)
            .await?;

        self.cache.invalidate(&CacheKey::resource(resource_id)).await;
        self.cache.invalidate(&CacheKey::active_count(resource_id)).await;
        self.cache.invalidate(&CacheKey::leaderboard(resource_id)).await;

        debug!(resource_id = %resource_id, version = existing.version, "Resource record deleted");
        info!(resource_id = %resource_id, "Resource torn down");
        Ok(())
    }
}
