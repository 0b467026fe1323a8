use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{AlertId, CohortKey};

/// Utilization at or above this percentage is over capacity.
pub const OVER_CAPACITY_THRESHOLD: f32 = 100.0;
/// Utilization at or above this percentage (but under over-capacity) is near
/// capacity.
pub const NEAR_CAPACITY_THRESHOLD: f32 = 85.0;
/// Utilization at or below this percentage is under capacity.
pub const UNDER_CAPACITY_THRESHOLD: f32 = 50.0;
/// Active waitlist size from which the waitlist counts as growing.
pub const WAITLIST_GROWING_THRESHOLD: usize = 10;

/// Volume deviation is clamped to this band around 1.0.
pub const VOLUME_DEVIATION_FLOOR: f32 = 0.8;
pub const VOLUME_DEVIATION_CEILING: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    OverCapacity,
    NearCapacity,
    UnderCapacity,
    WaitlistGrowing,
}

impl AlertKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OverCapacity => "Over Capacity",
            Self::NearCapacity => "Near Capacity",
            Self::UnderCapacity => "Under Capacity",
            Self::WaitlistGrowing => "Waitlist Growing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

/// Persisted capacity alert. One unacknowledged row exists per partition and
/// kind; re-evaluation refreshes it in place, acknowledgement closes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityAlertRecord {
    pub id: AlertId,
    pub program_id: String,
    pub start_date: NaiveDate,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub utilization_rate: f32,
    pub waitlist_size: usize,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl CapacityAlertRecord {
    pub fn cohort_key(&self) -> CohortKey {
        CohortKey {
            program_id: self.program_id.clone(),
            start_date: self.start_date,
        }
    }
}

/// Point-in-time utilization view for one partition. Derived on demand, never
/// the source of truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapacitySnapshot {
    pub program_id: String,
    pub start_date: NaiveDate,
    pub total_capacity: u32,
    pub confirmed_count: usize,
    pub pending_count: usize,
    pub waitlist_size: usize,
    pub utilization_rate: f32,
    pub projected_final_enrollment: f32,
    pub generated_at: DateTime<Utc>,
}

/// Blended enrollment forecast for one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrollmentProjection {
    pub program_id: String,
    pub start_date: NaiveDate,
    pub total_capacity: u32,
    pub projected_enrollment: f32,
    pub historical_yield_rate: f32,
    pub volume_deviation_factor: f32,
    pub waitlist_conversion_rate: f32,
    pub confidence: f32,
    pub recommended_actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// Final numbers for one past cohort, fed in from registrar exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortOutcome {
    pub program_id: String,
    pub start_date: NaiveDate,
    pub applications: u32,
    pub offers_extended: u32,
    pub confirmed: u32,
}

impl CohortOutcome {
    /// Fraction of extended offers that converted, absent when no offers
    /// went out.
    pub fn yield_rate(&self) -> Option<f32> {
        if self.offers_extended == 0 {
            return None;
        }
        Some(self.confirmed as f32 / self.offers_extended as f32)
    }
}
