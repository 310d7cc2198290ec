//! In-memory membership ledger with failure injection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use session_service::domain::{
    ActiveMember, HistoryPage, LeaveOutcome, MembershipEvent, MembershipEventType,
    MembershipRecord,
};
use session_service::services::MembershipLedger;
use session_cache::{CacheKey, SessionCache};
use session_service::{ServiceError, ServiceResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct State {
    records: HashMap<String, MembershipRecord>,
    events: Vec<MembershipEvent>,
}

#[derive(Default)]
pub struct FakeLedger {
    state: Mutex<State>,
    fail_joins: AtomicBool,
    watched: Mutex<Option<SessionCache>>,
    cached_at_join: Mutex<Vec<bool>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_joins(&self, fail: bool) {
        self.fail_joins.store(fail, Ordering::SeqCst);
    }

    /// Note, on every join, whether `cache` still holds the resource snapshot
    pub fn watch_cache(&self, cache: SessionCache) {
        *self.watched.lock().unwrap() = Some(cache);
    }

    pub fn cached_at_join(&self) -> Vec<bool> {
        self.cached_at_join.lock().unwrap().clone()
    }

    pub fn events_for(&self, membership_id: &str) -> Vec<MembershipEventType> {
        self.state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.membership_id == membership_id)
            .map(|e| e.event_type)
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    fn push_event(state: &mut State, record: &MembershipRecord, event_type: MembershipEventType, at: DateTime<Utc>) {
        let event_id = format!("e{}", state.events.len());
        state.events.push(MembershipEvent {
            event_id,
            participant_id: record.participant_id.clone(),
            resource_id: record.resource_id.clone(),
            membership_id: record.membership_id.clone(),
            timestamp: at,
            event_type,
        });
    }
}

#[async_trait]
impl MembershipLedger for FakeLedger {
    async fn record_join(&self, membership: &MembershipRecord) -> ServiceResult<()> {
        let watched = self.watched.lock().unwrap().clone();
        if let Some(cache) = watched {
            let key = CacheKey::resource(&membership.resource_id);
            self.cached_at_join
                .lock()
                .unwrap()
                .push(cache.local().get(&key).is_some());
        }
        if self.fail_joins.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable("ledger offline".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state
            .records
            .insert(membership.membership_id.clone(), membership.clone());
        Self::push_event(&mut state, membership, MembershipEventType::Join, membership.joined_at);
        Ok(())
    }

    async fn discard(&self, membership: &MembershipRecord) -> ServiceResult<()> {
        self.state
            .lock()
            .unwrap()
            .records
            .remove(&membership.membership_id);
        Ok(())
    }

    async fn mark_left(
        &self,
        _resource_id: &str,
        membership_id: &str,
        left_at: DateTime<Utc>,
    ) -> ServiceResult<LeaveOutcome> {
        let mut state = self.state.lock().unwrap();
        let record = state
            .records
            .get_mut(membership_id)
            .ok_or_else(|| ServiceError::NotFound(format!("membership {}", membership_id)))?;
        if record.left_at.is_some() {
            return Ok(LeaveOutcome::AlreadyLeft {
                membership: record.clone(),
            });
        }
        record.left_at = Some(left_at);
        let record = record.clone();
        Self::push_event(&mut state, &record, MembershipEventType::Leave, left_at);
        Ok(LeaveOutcome::Left { membership: record })
    }

    async fn membership(
        &self,
        _resource_id: &str,
        membership_id: &str,
    ) -> ServiceResult<Option<MembershipRecord>> {
        Ok(self.state.lock().unwrap().records.get(membership_id).cloned())
    }

    async fn active_count(&self, resource_id: &str) -> ServiceResult<usize> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| r.resource_id == resource_id && r.is_active())
            .count())
    }

    async fn is_active(&self, resource_id: &str, participant_id: &str) -> ServiceResult<bool> {
        Ok(self.state.lock().unwrap().records.values().any(|r| {
            r.resource_id == resource_id && r.participant_id == participant_id && r.is_active()
        }))
    }

    async fn active_members(&self, resource_id: &str) -> ServiceResult<Vec<ActiveMember>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .records
            .values()
            .filter(|r| r.resource_id == resource_id && r.is_active())
            .map(|r| ActiveMember {
                participant_id: r.participant_id.clone(),
                membership_id: r.membership_id.clone(),
                joined_at: r.joined_at,
                role: r.role,
            })
            .collect())
    }

    async fn history_page(
        &self,
        participant_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ServiceResult<HistoryPage> {
        let start: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let events: Vec<MembershipEvent> = self
            .state
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.participant_id == participant_id)
            .cloned()
            .collect();
        let end = (start + limit).min(events.len());
        Ok(HistoryPage {
            events: events[start.min(end)..end].to_vec(),
            next_cursor: (end < events.len()).then(|| end.to_string()),
        })
    }
}
