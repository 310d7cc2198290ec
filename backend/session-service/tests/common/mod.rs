//! Shared fixtures for session-service integration tests
#![allow(dead_code)]

pub mod fake_ledger;
pub mod flaky_store;

use resilience::RetryConfig;
use session_cache::SessionCache;
use session_service::config::SessionConfig;
use session_service::domain::{ResourceInstance, ResourceKind};
use session_service::services::{CreateResource, MembershipLedger, Services};
use session_store::{InMemoryStore, Store, StoreAdapter};
use std::sync::Arc;
use std::time::Duration;

/// Store with a retry budget large enough for heavy contention in tests
pub fn contended_store() -> Store {
    Store::new(
        Arc::new(InMemoryStore::new()),
        Duration::from_secs(2),
        RetryConfig {
            max_attempts: 200,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            ..Default::default()
        },
    )
}

/// Services over `adapter` with a retry budget of three attempts
pub fn services_over(adapter: Arc<dyn StoreAdapter>) -> Services {
    let store = Store::new(
        adapter,
        Duration::from_secs(2),
        RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..Default::default()
        },
    );
    Services::new(store, SessionCache::local_only(), &SessionConfig::default())
}

pub fn services() -> Services {
    Services::new(contended_store(), SessionCache::local_only(), &SessionConfig::default())
}

pub fn services_with_ledger(ledger: Arc<dyn MembershipLedger>) -> Services {
    Services::with_ledger(
        contended_store(),
        SessionCache::local_only(),
        &SessionConfig::default(),
        ledger,
    )
}

pub fn services_with_ledger_and_cache(
    ledger: Arc<dyn MembershipLedger>,
    cache: SessionCache,
) -> Services {
    Services::with_ledger(contended_store(), cache, &SessionConfig::default(), ledger)
}

pub async fn create_resource(services: &Services, capacity: u32) -> ResourceInstance {
    services
        .resources
        .create(CreateResource {
            kind: ResourceKind::Meeting,
            owner_id: "owner-1".to_string(),
            capacity: Some(capacity),
            is_open: true,
            provider_session_id: Some("provider-session-1".to_string()),
        })
        .await
        .expect("create resource")
}
