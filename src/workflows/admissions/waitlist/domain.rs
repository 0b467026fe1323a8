use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{ApplicationId, CohortKey, WaitlistEntryId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Medium,
    Low,
}

impl PriorityTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Sort key; lower ranks ahead.
    pub(crate) const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistStatus {
    Active,
    OfferedAdmission,
    AcceptedOffer,
    DeclinedOffer,
    Expired,
    Removed,
}

impl WaitlistStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::OfferedAdmission => "Offered Admission",
            Self::AcceptedOffer => "Accepted Offer",
            Self::DeclinedOffer => "Declined Offer",
            Self::Expired => "Expired",
            Self::Removed => "Removed",
        }
    }

    /// Whether the entry still occupies a rank. An outstanding offer keeps
    /// its position until the applicant responds or the offer lapses.
    pub const fn is_ranked(self) -> bool {
        matches!(self, Self::Active | Self::OfferedAdmission)
    }

    /// Whether the entry blocks the application from being re-added.
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Active | Self::OfferedAdmission | Self::AcceptedOffer
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: WaitlistEntryId,
    pub application_id: ApplicationId,
    pub program_id: String,
    pub start_date: NaiveDate,
    pub priority_tier: PriorityTier,
    /// Dense rank within the partition, absent once the entry stops being
    /// ranked.
    pub position: Option<u32>,
    pub status: WaitlistStatus,
    pub interest_confirmed: bool,
    pub offer_deadline: Option<DateTime<Utc>>,
    pub notes: Vec<String>,
    pub added_at: DateTime<Utc>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistEntry {
    pub fn cohort_key(&self) -> CohortKey {
        CohortKey {
            program_id: self.program_id.clone(),
            start_date: self.start_date,
        }
    }
}

/// Reassigns positions for one partition: ranked entries sorted by tier then
/// arrival get 1..N, everything else loses its position. Callers hold the
/// partition lock and write the result back as one unit.
pub(crate) fn rank_partition(entries: &mut [WaitlistEntry]) {
    entries.sort_by(|a, b| {
        a.priority_tier
            .rank()
            .cmp(&b.priority_tier.rank())
            .then_with(|| a.added_at.cmp(&b.added_at))
            .then_with(|| a.id.0.cmp(&b.id.0))
    });

    let mut next = 1u32;
    for entry in entries.iter_mut() {
        entry.position = if entry.status.is_ranked() {
            let assigned = next;
            next += 1;
            Some(assigned)
        } else {
            None
        };
    }
}

/// Per-tier counts of entries still waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TierCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

impl TierCounts {
    pub(crate) fn record(&mut self, tier: PriorityTier) {
        match tier {
            PriorityTier::High => self.high += 1,
            PriorityTier::Medium => self.medium += 1,
            PriorityTier::Low => self.low += 1,
        }
    }
}

/// Aggregated view of one waitlist partition.
#[derive(Debug, Clone, Serialize)]
pub struct WaitlistStatistics {
    pub program_id: String,
    pub start_date: NaiveDate,
    pub active: usize,
    pub offered: usize,
    pub accepted: usize,
    pub declined: usize,
    pub expired: usize,
    pub removed: usize,
    pub active_by_tier: TierCounts,
    pub interest_confirmed: usize,
    /// Accepted offers over all offers that reached a response window.
    pub conversion_rate: f32,
}
