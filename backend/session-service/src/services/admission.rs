//! Admission controller
//!
//! The admit decision is one compare-and-swap on the resource record: the
//! block-list, the active roster and the capacity are read from a single
//! version, and the new roster slot is written conditioned on it. Two
//! concurrent joins can therefore never both take the last slot, and a
//! participant blocked by a concurrent writer is never admitted.

use crate::domain::validation::validate_id;
use crate::domain::{
    ActiveSlot, Admission, DenialReason, LeaveOutcome, MembershipRecord, ResourceInstance, Role,
};
use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::services::membership::MembershipLedger;
use crate::services::resources::ResourceService;
use chrono::Utc;
use session_cache::{CacheKey, SessionCache};
use session_store::{Decision, Store, Table};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AdmissionController {
    store: Store,
    cache: SessionCache,
    ledger: Arc<dyn MembershipLedger>,
}

/// Why a participant may not join, checked in priority order
pub fn denial_reason(resource: &ResourceInstance, participant_id: &str) -> Option<DenialReason> {
    if resource.is_blocked(participant_id) {
        Some(DenialReason::Blocked)
    } else if resource.is_active(participant_id) {
        Some(DenialReason::AlreadyActive)
    } else if !resource.has_room() {
        Some(DenialReason::CapacityExceeded)
    } else {
        None
    }
}

impl AdmissionController {
    pub fn new(store: Store, cache: SessionCache, ledger: Arc<dyn MembershipLedger>) -> Self {
        Self {
            store,
            cache,
            ledger,
        }
    }

    pub async fn try_admit(&self, resource_id: &str, participant_id: &str) -> ServiceResult<Admission> {
        self.try_admit_as(resource_id, participant_id, Role::Participant)
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn try_admit_as(
        &self,
        resource_id: &str,
        participant_id: &str,
        role: Role,
    ) -> ServiceResult<Admission> {
        validate_id("resource_id", resource_id)?;
        validate_id("participant_id", participant_id)?;

        // Block-lists only grow, so a cached snapshot can deny but never admit
        if let Some(snapshot) = self
            .cache
            .read::<ResourceInstance>(&CacheKey::resource(resource_id))
            .await
        {
            if snapshot.is_blocked(participant_id) {
                info!(resource_id = %resource_id, participant_id = %participant_id, "Admission denied: blocked");
                metrics::record_admission("blocked");
                return Ok(Admission::Denied {
                    reason: DenialReason::Blocked,
                });
            }
        }

        let membership = MembershipRecord {
            membership_id: Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            participant_id: participant_id.to_string(),
            joined_at: Utc::now(),
            left_at: None,
            role,
        };
        let slot = ActiveSlot {
            membership_id: membership.membership_id.clone(),
            joined_at: membership.joined_at,
            role,
        };

        let denied = self
            .store
            .update_with(
                Table::Resources,
                &ResourceService::key(resource_id),
                |current: Option<&ResourceInstance>| {
                    let Some(resource) = current else {
                        return Decision::Abort(ServiceError::NotFound(format!(
                            "resource {}",
                            resource_id
                        )));
                    };
                    if let Some(reason) = denial_reason(resource, participant_id) {
                        return Decision::Keep(Some(reason));
                    }
                    let mut next = resource.clone();
                    next.active.insert(participant_id.to_string(), slot.clone());
                    Decision::Write {
                        value: next,
                        output: None,
                    }
                },
            )
            .await?;

        if let Some(reason) = denied {
            info!(resource_id = %resource_id, participant_id = %participant_id, reason = ?reason, "Admission denied");
            metrics::record_admission(reason.as_str());
            return Ok(Admission::Denied { reason });
        }
        self.invalidate(resource_id).await;

        if let Err(e) = self.ledger.record_join(&membership).await {
            warn!(
                resource_id = %resource_id,
                participant_id = %participant_id,
                membership_id = %membership.membership_id,
                error = %e,
                "Membership commit failed, releasing roster slot"
            );
            self.roll_back(&membership).await;
            return Err(e);
        }

        metrics::record_admission("admitted");
        info!(
            resource_id = %resource_id,
            participant_id = %participant_id,
            membership_id = %membership.membership_id,
            "Participant admitted"
        );
        Ok(Admission::Admitted { membership })
    }

    /// Leave a resource; leaving twice is a no-op that reports `AlreadyLeft`
    #[tracing::instrument(skip(self))]
    pub async fn leave(&self, resource_id: &str, membership_id: &str) -> ServiceResult<LeaveOutcome> {
        validate_id("resource_id", resource_id)?;
        validate_id("membership_id", membership_id)?;

        let outcome = self
            .ledger
            .mark_left(resource_id, membership_id, Utc::now())
            .await?;

        // Also runs on AlreadyLeft, finishing a leave that stopped after the stamp
        let membership = outcome.membership();
        self.release_slot(resource_id, &membership.participant_id, &membership.membership_id)
            .await?;
        self.invalidate(resource_id).await;

        match &outcome {
            LeaveOutcome::Left { membership } => {
                metrics::record_leave();
                info!(resource_id = %resource_id, participant_id = %membership.participant_id, "Participant left")
            }
            LeaveOutcome::AlreadyLeft { .. } => {
                info!(resource_id = %resource_id, membership_id = %membership_id, "Membership already left")
            }
        }
        Ok(outcome)
    }

    /// Add a participant to the block-list; blocking twice is a no-op
    ///
    /// An active membership of the blocked participant is left in place.
    #[tracing::instrument(skip(self))]
    pub async fn block(&self, resource_id: &str, participant_id: &str) -> ServiceResult<ResourceInstance> {
        validate_id("resource_id", resource_id)?;
        validate_id("participant_id", participant_id)?;

        let resource = self
            .store
            .update_with(
                Table::Resources,
                &ResourceService::key(resource_id),
                |current: Option<&ResourceInstance>| {
                    let Some(resource) = current else {
                        return Decision::Abort(ServiceError::NotFound(format!(
                            "resource {}",
                            resource_id
                        )));
                    };
                    if resource.is_blocked(participant_id) {
                        return Decision::Keep(resource.clone());
                    }
                    let mut next = resource.clone();
                    next.block_list.insert(participant_id.to_string());
                    Decision::Write {
                        output: next.clone(),
                        value: next,
                    }
                },
            )
            .await?;

        self.cache.invalidate(&CacheKey::resource(resource_id)).await;
        info!(
            resource_id = %resource_id,
            participant_id = %participant_id,
            still_active = resource.is_active(participant_id),
            "Participant blocked"
        );
        Ok(resource)
    }

    /// Remove the roster slot if it still belongs to `membership_id`
    async fn release_slot(
        &self,
        resource_id: &str,
        participant_id: &str,
        membership_id: &str,
    ) -> ServiceResult<()> {
        self.store
            .update_with(
                Table::Resources,
                &ResourceService::key(resource_id),
                |current: Option<&ResourceInstance>| {
                    // Torn-down resources have no roster left to clean
                    let Some(resource) = current else {
                        return Decision::<_, _, ServiceError>::Keep(());
                    };
                    match resource.active.get(participant_id) {
                        Some(slot) if slot.membership_id == membership_id => {
                            let mut next = resource.clone();
                            next.active.remove(participant_id);
                            Decision::Write {
                                value: next,
                                output: (),
                            }
                        }
                        _ => Decision::Keep(()),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn roll_back(&self, membership: &MembershipRecord) {
        let resource_id = &membership.resource_id;
        if let Err(e) = self
            .release_slot(resource_id, &membership.participant_id, &membership.membership_id)
            .await
        {
            error!(
                resource_id = %resource_id,
                membership_id = %membership.membership_id,
                error = %e,
                "Failed to release roster slot after aborted admission"
            );
        }
        if let Err(e) = self.ledger.discard(membership).await {
            error!(
                resource_id = %resource_id,
                membership_id = %membership.membership_id,
                error = %e,
                "Failed to discard membership record after aborted admission"
            );
        }
        self.invalidate(resource_id).await;
    }

    async fn invalidate(&self, resource_id: &str) {
        self.cache.invalidate(&CacheKey::resource(resource_id)).await;
        self.cache
            .invalidate(&CacheKey::active_count(resource_id))
            .await;
    }
}
