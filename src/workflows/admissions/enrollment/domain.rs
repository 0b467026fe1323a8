use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{ApplicationId, ConditionId, EnrollmentId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    PendingConfirmation,
    Confirmed,
    Enrolled,
    Expired,
    Withdrawn,
}

impl EnrollmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingConfirmation => "Pending Confirmation",
            Self::Confirmed => "Confirmed",
            Self::Enrolled => "Enrolled",
            Self::Expired => "Expired",
            Self::Withdrawn => "Withdrawn",
        }
    }

    /// Whether the record still reserves a seat and blocks re-creation.
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::PendingConfirmation | Self::Confirmed | Self::Enrolled
        )
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Enrolled | Self::Expired | Self::Withdrawn)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    AcademicTranscript,
    FinancialDocumentation,
    LanguageProficiency,
    HealthClearance,
    Other,
}

impl ConditionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AcademicTranscript => "Academic Transcript",
            Self::FinancialDocumentation => "Financial Documentation",
            Self::LanguageProficiency => "Language Proficiency",
            Self::HealthClearance => "Health Clearance",
            Self::Other => "Other",
        }
    }
}

/// One admission condition attached to an enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentCondition {
    pub id: ConditionId,
    pub kind: ConditionKind,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
    pub fulfilled: bool,
    pub evidence: Vec<String>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    pub id: EnrollmentId,
    pub application_id: ApplicationId,
    pub status: EnrollmentStatus,
    pub deposit_amount: u32,
    pub deposit_paid: bool,
    pub conditions: Vec<EnrollmentCondition>,
    pub enrollment_deadline: DateTime<Utc>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl EnrollmentRecord {
    pub fn all_conditions_fulfilled(&self) -> bool {
        self.conditions.iter().all(|condition| condition.fulfilled)
    }

    /// ENROLLED is derived, never written directly: a confirmed record with
    /// the deposit paid and every condition fulfilled is promoted, anything
    /// else keeps its status. Deposit and condition updates may land in any
    /// order and commute through this.
    pub(crate) fn recompute_status(&mut self) {
        if self.status == EnrollmentStatus::Confirmed
            && self.deposit_paid
            && self.all_conditions_fulfilled()
        {
            self.status = EnrollmentStatus::Enrolled;
        }
    }
}

/// Condition descriptor supplied when the enrollment record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionRequest {
    pub kind: ConditionKind,
    pub description: String,
    pub deadline: Option<DateTime<Utc>>,
}

/// Input for `create_enrollment_confirmation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRequest {
    pub application_id: ApplicationId,
    pub enrollment_deadline: DateTime<Utc>,
    pub deposit_amount: u32,
    pub conditions: Vec<ConditionRequest>,
}
