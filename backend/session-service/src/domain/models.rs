use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Kind of capacity-bounded session a participant can join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Meeting,
    Stream,
}

/// Role a member holds inside a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    Participant,
    Moderator,
    Collaborator,
}

/// A currently admitted member, indexed by participant id on the resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSlot {
    pub membership_id: String,
    pub joined_at: DateTime<Utc>,
    pub role: Role,
}

/// Resource instance - a meeting or stream
///
/// The active roster is persisted next to the block-list so admission, block
/// and leave all compare-and-swap the same versioned record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub id: String,
    pub kind: ResourceKind,
    pub owner_id: String,
    pub capacity: u32,
    pub is_open: bool,
    pub block_list: BTreeSet<String>,
    pub provider_session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub active: BTreeMap<String, ActiveSlot>,
}

impl ResourceInstance {
    pub fn is_blocked(&self, participant_id: &str) -> bool {
        self.block_list.contains(participant_id)
    }

    pub fn is_active(&self, participant_id: &str) -> bool {
        self.active.contains_key(participant_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn has_room(&self) -> bool {
        self.active.len() < self.capacity as usize
    }
}

/// Membership record, one per admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
    pub membership_id: String,
    pub resource_id: String,
    pub participant_id: String,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub role: Role,
}

impl MembershipRecord {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipEventType {
    Join,
    Leave,
}

/// Append-only join/leave log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipEvent {
    pub event_id: String,
    pub participant_id: String,
    pub resource_id: String,
    pub membership_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: MembershipEventType,
}

/// Current member as exposed by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveMember {
    pub participant_id: String,
    pub membership_id: String,
    pub joined_at: DateTime<Utc>,
    pub role: Role,
}

/// One page of a participant's join/leave history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPage {
    pub events: Vec<MembershipEvent>,
    /// Pass back to continue after the last event; absent on the final page
    pub next_cursor: Option<String>,
}

/// Sort key ordering rows of a partition by time, then id
pub fn time_sort_key(timestamp: DateTime<Utc>, id: &str) -> String {
    format!("{:020}#{}", timestamp.timestamp_micros().max(0), id)
}

/// Reason an admission was refused, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    Blocked,
    AlreadyActive,
    CapacityExceeded,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Blocked => "blocked",
            DenialReason::AlreadyActive => "already_active",
            DenialReason::CapacityExceeded => "capacity_exceeded",
        }
    }
}

/// Outcome of an admission attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Admission {
    Admitted { membership: MembershipRecord },
    Denied { reason: DenialReason },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }

    pub fn denial(&self) -> Option<DenialReason> {
        match self {
            Admission::Denied { reason } => Some(*reason),
            Admission::Admitted { .. } => None,
        }
    }
}

/// Outcome of a leave request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LeaveOutcome {
    Left { membership: MembershipRecord },
    AlreadyLeft { membership: MembershipRecord },
}

impl LeaveOutcome {
    pub fn membership(&self) -> &MembershipRecord {
        match self {
            LeaveOutcome::Left { membership } | LeaveOutcome::AlreadyLeft { membership } => {
                membership
            }
        }
    }
}

/// Optional annotation on a ledger entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerMetadata {
    pub message: Option<String>,
    pub category: Option<String>,
}

/// One monetary/point event (tip, revenue entry)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub resource_id: String,
    pub participant_id: String,
    pub amount: f64,
    #[serde(default)]
    pub metadata: LedgerMetadata,
    pub timestamp: DateTime<Utc>,
}

/// Running total of one participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantTotal {
    pub total: f64,
    pub first_contribution_at: DateTime<Utc>,
    /// Position of the participant's first entry in commit order
    pub first_seq: u64,
}

/// Derived aggregate over every ledger entry of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub resource_id: String,
    pub total: f64,
    pub entry_count: u64,
    pub per_participant: BTreeMap<String, ParticipantTotal>,
    pub top_contributor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub participant_id: String,
    pub total: f64,
}

impl AggregateStats {
    pub fn empty(resource_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            total: 0.0,
            entry_count: 0,
            per_participant: BTreeMap::new(),
            top_contributor: None,
            updated_at: now,
        }
    }

    /// Fold one entry into the aggregate
    ///
    /// The top contributor only changes hands on a strictly greater total, so
    /// the first participant to reach the maximum keeps the spot until
    /// overtaken.
    pub fn apply(&mut self, entry: &LedgerEntry) {
        let seq = self.entry_count;
        self.total += entry.amount;
        self.entry_count += 1;
        self.updated_at = entry.timestamp;

        let participant = self
            .per_participant
            .entry(entry.participant_id.clone())
            .or_insert_with(|| ParticipantTotal {
                total: 0.0,
                first_contribution_at: entry.timestamp,
                first_seq: seq,
            });
        participant.total += entry.amount;
        let new_total = participant.total;

        let overtakes = match &self.top_contributor {
            None => true,
            Some(top) if *top == entry.participant_id => false,
            Some(top) => self
                .per_participant
                .get(top)
                .map_or(true, |current| new_total > current.total),
        };
        if overtakes {
            self.top_contributor = Some(entry.participant_id.clone());
        }
    }

    /// Whether every running total is still representable
    pub fn is_finite(&self) -> bool {
        self.total.is_finite() && self.per_participant.values().all(|p| p.total.is_finite())
    }

    /// Rebuild an aggregate from entries in commit order
    pub fn fold<'a>(
        resource_id: &str,
        now: DateTime<Utc>,
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Self {
        let mut stats = Self::empty(resource_id, now);
        for entry in entries {
            stats.apply(entry);
        }
        stats
    }

    /// Participants by total descending; ties go to the earliest first contribution
    pub fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<(&String, &ParticipantTotal)> = self.per_participant.iter().collect();
        rows.sort_by(|(_, a), (_, b)| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a.first_contribution_at.cmp(&b.first_contribution_at))
                .then_with(|| a.first_seq.cmp(&b.first_seq))
        });
        rows.into_iter()
            .map(|(participant_id, t)| LeaderboardEntry {
                participant_id: participant_id.clone(),
                total: t.total,
            })
            .collect()
    }
}
