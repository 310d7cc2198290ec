//! Monetization ledger
//!
//! Entries are appended as their own rows; the aggregate is advanced with a
//! compare-and-swap per entry so concurrent writers never lose an amount.

use crate::domain::validation::{validate_amount, validate_id};
use crate::domain::{time_sort_key, AggregateStats, LeaderboardEntry, LedgerEntry, LedgerMetadata};
use crate::error::{ServiceError, ServiceResult};
use crate::metrics;
use crate::services::resources::ResourceService;
use chrono::Utc;
use session_cache::{ttl, CacheKey, SessionCache};
use session_store::{Condition, Decision, ItemKey, Store, Table};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct MonetizationLedger {
    store: Store,
    cache: SessionCache,
    resources: ResourceService,
}

impl MonetizationLedger {
    pub fn new(store: Store, cache: SessionCache, resources: ResourceService) -> Self {
        Self {
            store,
            cache,
            resources,
        }
    }

    fn stats_key(resource_id: &str) -> ItemKey {
        ItemKey::new(resource_id)
    }

    #[tracing::instrument(skip(self, metadata))]
    pub async fn record_entry(
        &self,
        resource_id: &str,
        participant_id: &str,
        amount: f64,
        metadata: LedgerMetadata,
    ) -> ServiceResult<LedgerEntry> {
        validate_id("resource_id", resource_id)?;
        validate_id("participant_id", participant_id)?;
        validate_amount(amount)?;
        self.resources.get(resource_id).await?;

        let entry = LedgerEntry {
            entry_id: Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            participant_id: participant_id.to_string(),
            amount,
            metadata,
            timestamp: Utc::now(),
        };
        let entry_key = ItemKey::with_sort(resource_id, time_sort_key(entry.timestamp, &entry.entry_id));

        self.store
            .insert(Table::LedgerEntries, &entry_key, &entry)
            .await?;

        let applied = self
            .store
            .update_with(
                Table::AggregateStats,
                &Self::stats_key(resource_id),
                |current: Option<&AggregateStats>| {
                    let mut stats = current
                        .cloned()
                        .unwrap_or_else(|| AggregateStats::empty(resource_id, entry.timestamp));
                    stats.apply(&entry);
                    if !stats.is_finite() {
                        return Decision::Abort(ServiceError::Validation(format!(
                            "amount {} would overflow the totals of resource {}",
                            amount, resource_id
                        )));
                    }
                    Decision::<_, _, ServiceError>::Write {
                        output: stats.total,
                        value: stats,
                    }
                },
            )
            .await;

        let total = match applied {
            Ok(total) => total,
            Err(e) => {
                let e = ServiceError::from(e);
                warn!(resource_id = %resource_id, entry_id = %entry.entry_id, error = %e, "Aggregate update failed, removing entry");
                if let Err(cleanup) = self
                    .store
                    .retry_transient(|| self.store.delete(Table::LedgerEntries, &entry_key, Condition::None))
                    .await
                {
                    error!(
                        resource_id = %resource_id,
                        entry_id = %entry.entry_id,
                        error = %cleanup,
                        "Orphaned ledger entry, reconcile required"
                    );
                }
                return Err(e);
            }
        };

        self.cache.invalidate(&CacheKey::leaderboard(resource_id)).await;
        metrics::record_ledger_entry();
        info!(resource_id = %resource_id, participant_id = %participant_id, amount, total, "Ledger entry recorded");
        Ok(entry)
    }

    /// Participants by total, highest first
    pub async fn leaderboard(&self, resource_id: &str) -> ServiceResult<Vec<LeaderboardEntry>> {
        validate_id("resource_id", resource_id)?;
        let rows = self
            .cache
            .read_through(&CacheKey::leaderboard(resource_id), ttl::LEADERBOARD, || async {
                let stats = self.stats(resource_id).await?;
                Ok::<_, ServiceError>(Some(stats.leaderboard()))
            })
            .await?;
        Ok(rows.unwrap_or_default())
    }

    /// Current aggregate; empty until the first entry
    pub async fn stats(&self, resource_id: &str) -> ServiceResult<AggregateStats> {
        validate_id("resource_id", resource_id)?;
        self.resources.get(resource_id).await?;

        let key = Self::stats_key(resource_id);
        let stored = self
            .store
            .retry_transient(|| self.store.get::<AggregateStats>(Table::AggregateStats, &key))
            .await?;
        Ok(stored
            .map(|v| v.value)
            .unwrap_or_else(|| AggregateStats::empty(resource_id, Utc::now())))
    }

    /// Every entry of a resource, oldest first
    pub async fn entries(&self, resource_id: &str) -> ServiceResult<Vec<LedgerEntry>> {
        validate_id("resource_id", resource_id)?;
        self.resources.get(resource_id).await?;

        let rows = self
            .store
            .retry_transient(|| {
                self.store
                    .scan_all::<LedgerEntry>(Table::LedgerEntries, resource_id)
            })
            .await?;
        Ok(rows.into_iter().map(|r| r.value).collect())
    }

    /// Rebuild the aggregate from the entry rows and swap it in
    ///
    /// Must not run while entries are being recorded for the same resource:
    /// an entry written but not yet folded would be counted twice.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self, resource_id: &str) -> ServiceResult<AggregateStats> {
        let entries = self.entries(resource_id).await?;
        let rebuilt = AggregateStats::fold(resource_id, Utc::now(), &entries);
        if !rebuilt.is_finite() {
            return Err(ServiceError::Internal(format!(
                "entries of resource {} do not sum to a finite total",
                resource_id
            )));
        }

        let previous = self
            .store
            .update_with(
                Table::AggregateStats,
                &Self::stats_key(resource_id),
                |current: Option<&AggregateStats>| Decision::<_, _, ServiceError>::Write {
                    output: current.map(|s| (s.total, s.entry_count)),
                    value: rebuilt.clone(),
                },
            )
            .await?;

        self.cache.invalidate(&CacheKey::leaderboard(resource_id)).await;
        match previous {
            Some((total, count)) if total != rebuilt.total || count != rebuilt.entry_count => {
                warn!(
                    resource_id = %resource_id,
                    previous_total = total,
                    previous_count = count,
                    total = rebuilt.total,
                    count = rebuilt.entry_count,
                    "Aggregate repaired"
                );
            }
            _ => info!(resource_id = %resource_id, total = rebuilt.total, "Aggregate reconciled"),
        }
        Ok(rebuilt)
    }
}
