//! Membership ledger
//!
//! Data access over membership records and the append-only join/leave log.
//! Current-state questions (who is active, how many) are answered from the
//! roster kept on the resource record, which is the same record admission
//! compare-and-swaps, so the answers never disagree with admission.

use crate::domain::validation::validate_id;
use crate::domain::{
    time_sort_key, ActiveMember, HistoryPage, LeaveOutcome, MembershipEvent, MembershipEventType,
    MembershipRecord, ResourceInstance,
};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use session_cache::{ttl, CacheKey, SessionCache};
use session_store::{Condition, Decision, ItemKey, Store, Table};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Largest history page served in one call
pub const MAX_HISTORY_PAGE: usize = 500;

#[async_trait]
pub trait MembershipLedger: Send + Sync {
    /// Persist a freshly admitted membership and log the join
    async fn record_join(&self, membership: &MembershipRecord) -> ServiceResult<()>;

    /// Drop a membership record that was never acknowledged to the caller
    async fn discard(&self, membership: &MembershipRecord) -> ServiceResult<()>;

    /// Stamp `left_at` once and log the leave; repeated calls report `AlreadyLeft`
    async fn mark_left(
        &self,
        resource_id: &str,
        membership_id: &str,
        left_at: DateTime<Utc>,
    ) -> ServiceResult<LeaveOutcome>;

    async fn membership(
        &self,
        resource_id: &str,
        membership_id: &str,
    ) -> ServiceResult<Option<MembershipRecord>>;

    async fn active_count(&self, resource_id: &str) -> ServiceResult<usize>;

    async fn is_active(&self, resource_id: &str, participant_id: &str) -> ServiceResult<bool>;

    async fn active_members(&self, resource_id: &str) -> ServiceResult<Vec<ActiveMember>>;

    /// Events of a participant ascending by time, starting after `cursor`
    async fn history_page(
        &self,
        participant_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ServiceResult<HistoryPage>;
}

/// Lazy, restartable history of a participant, fetched page by page
pub fn history(
    ledger: Arc<dyn MembershipLedger>,
    participant_id: String,
    page_size: usize,
) -> BoxStream<'static, ServiceResult<MembershipEvent>> {
    stream::try_unfold(
        (ledger, participant_id, None::<String>, false),
        move |(ledger, participant_id, cursor, done)| async move {
            if done {
                return Ok(None);
            }
            let page = ledger
                .history_page(&participant_id, cursor.as_deref(), page_size)
                .await?;
            let done = page.next_cursor.is_none();
            let next = (ledger, participant_id, page.next_cursor, done);
            let events = stream::iter(page.events.into_iter().map(Ok::<_, ServiceError>));
            Ok::<_, ServiceError>(Some((events, next)))
        },
    )
    .try_flatten()
    .boxed()
}

/// Ledger backed by the session store
#[derive(Clone)]
pub struct StoreMembershipLedger {
    store: Store,
    cache: SessionCache,
}

impl StoreMembershipLedger {
    pub fn new(store: Store, cache: SessionCache) -> Self {
        Self { store, cache }
    }

    fn record_key(resource_id: &str, membership_id: &str) -> ItemKey {
        ItemKey::with_sort(resource_id, membership_id)
    }

    /// Event ids derive from the membership, so re-logging an event lands on
    /// the same row instead of appending a duplicate
    fn event_id(membership_id: &str, event_type: MembershipEventType) -> String {
        let kind = match event_type {
            MembershipEventType::Join => "join",
            MembershipEventType::Leave => "leave",
        };
        Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{}:{}", membership_id, kind).as_bytes())
            .to_string()
    }

    async fn append_event(
        &self,
        record: &MembershipRecord,
        event_type: MembershipEventType,
        at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let event = MembershipEvent {
            event_id: Self::event_id(&record.membership_id, event_type),
            participant_id: record.participant_id.clone(),
            resource_id: record.resource_id.clone(),
            membership_id: record.membership_id.clone(),
            timestamp: at,
            event_type,
        };
        let key = ItemKey::with_sort(&event.participant_id, time_sort_key(at, &event.event_id));
        self.store
            .insert(Table::MembershipEvents, &key, &event)
            .await?;
        Ok(())
    }

    async fn resource(&self, resource_id: &str) -> ServiceResult<ResourceInstance> {
        let key = ItemKey::new(resource_id);
        self.store
            .retry_transient(|| self.store.get::<ResourceInstance>(Table::Resources, &key))
            .await?
            .map(|v| v.value)
            .ok_or_else(|| ServiceError::NotFound(format!("resource {}", resource_id)))
    }
}

#[async_trait]
impl MembershipLedger for StoreMembershipLedger {
    async fn record_join(&self, membership: &MembershipRecord) -> ServiceResult<()> {
        let key = Self::record_key(&membership.resource_id, &membership.membership_id);
        self.store.insert(Table::Memberships, &key, membership).await?;
        self.append_event(membership, MembershipEventType::Join, membership.joined_at)
            .await
    }

    async fn discard(&self, membership: &MembershipRecord) -> ServiceResult<()> {
        let key = Self::record_key(&membership.resource_id, &membership.membership_id);
        self.store
            .retry_transient(|| self.store.delete(Table::Memberships, &key, Condition::None))
            .await?;
        Ok(())
    }

    async fn mark_left(
        &self,
        resource_id: &str,
        membership_id: &str,
        left_at: DateTime<Utc>,
    ) -> ServiceResult<LeaveOutcome> {
        let key = Self::record_key(resource_id, membership_id);
        let outcome = self
            .store
            .update_with(Table::Memberships, &key, |current: Option<&MembershipRecord>| {
                let Some(record) = current else {
                    return Decision::Abort(ServiceError::NotFound(format!(
                        "membership {}",
                        membership_id
                    )));
                };
                if record.left_at.is_some() {
                    return Decision::Keep(LeaveOutcome::AlreadyLeft {
                        membership: record.clone(),
                    });
                }
                let mut next = record.clone();
                next.left_at = Some(left_at);
                Decision::Write {
                    output: LeaveOutcome::Left {
                        membership: next.clone(),
                    },
                    value: next,
                }
            })
            .await?;

        // Re-logged on AlreadyLeft too, in case an earlier call stopped after the stamp
        let membership = outcome.membership();
        let stamped = membership.left_at.unwrap_or(left_at);
        self.append_event(membership, MembershipEventType::Leave, stamped)
            .await?;
        Ok(outcome)
    }

    async fn membership(
        &self,
        resource_id: &str,
        membership_id: &str,
    ) -> ServiceResult<Option<MembershipRecord>> {
        validate_id("resource_id", resource_id)?;
        validate_id("membership_id", membership_id)?;
        let key = Self::record_key(resource_id, membership_id);
        let record = self
            .store
            .retry_transient(|| self.store.get::<MembershipRecord>(Table::Memberships, &key))
            .await?;
        Ok(record.map(|v| v.value))
    }

    async fn active_count(&self, resource_id: &str) -> ServiceResult<usize> {
        validate_id("resource_id", resource_id)?;
        let count = self
            .cache
            .read_through(&CacheKey::active_count(resource_id), ttl::ACTIVE_COUNT, || async {
                let resource = self.resource(resource_id).await?;
                Ok::<_, ServiceError>(Some(resource.active_count()))
            })
            .await?;
        Ok(count.unwrap_or_default())
    }

    async fn is_active(&self, resource_id: &str, participant_id: &str) -> ServiceResult<bool> {
        validate_id("resource_id", resource_id)?;
        validate_id("participant_id", participant_id)?;
        Ok(self.resource(resource_id).await?.is_active(participant_id))
    }

    async fn active_members(&self, resource_id: &str) -> ServiceResult<Vec<ActiveMember>> {
        validate_id("resource_id", resource_id)?;
        let resource = self.resource(resource_id).await?;
        let mut members: Vec<ActiveMember> = resource
            .active
            .into_iter()
            .map(|(participant_id, slot)| ActiveMember {
                participant_id,
                membership_id: slot.membership_id,
                joined_at: slot.joined_at,
                role: slot.role,
            })
            .collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.participant_id.cmp(&b.participant_id))
        });
        Ok(members)
    }

    async fn history_page(
        &self,
        participant_id: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> ServiceResult<HistoryPage> {
        validate_id("participant_id", participant_id)?;
        if limit == 0 || limit > MAX_HISTORY_PAGE {
            return Err(ServiceError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_PAGE
            )));
        }

        // One extra row tells whether another page follows
        let mut rows = self
            .store
            .retry_transient(|| {
                self.store.scan::<MembershipEvent>(
                    Table::MembershipEvents,
                    participant_id,
                    cursor,
                    limit + 1,
                )
            })
            .await?;

        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = if has_more {
            rows.last().map(|r| r.key.sort_key().to_string())
        } else {
            None
        };
        debug!(participant_id = %participant_id, events = rows.len(), has_more, "History page");

        Ok(HistoryPage {
            events: rows.into_iter().map(|r| r.value).collect(),
            next_cursor,
        })
    }
}
