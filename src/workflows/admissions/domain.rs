use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for admission applications. Minted by the upstream
/// intake collaborator, never generated here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for decision records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(format!("dec-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for appeal records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppealId(pub String);

impl AppealId {
    pub fn generate() -> Self {
        Self(format!("apl-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for reviewer assignments on an appeal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReviewerId(pub String);

impl ReviewerId {
    pub fn generate() -> Self {
        Self(format!("rev-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for waitlist entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitlistEntryId(pub String);

impl WaitlistEntryId {
    pub fn generate() -> Self {
        Self(format!("wle-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for enrollment records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnrollmentId(pub String);

impl EnrollmentId {
    pub fn generate() -> Self {
        Self(format!("enr-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for enrollment conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConditionId(pub String);

impl ConditionId {
    pub fn generate() -> Self {
        Self(format!("cond-{}", Uuid::new_v4()))
    }
}

/// Identifier wrapper for persisted capacity alerts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertId(pub String);

impl AlertId {
    pub fn generate() -> Self {
        Self(format!("alert-{}", Uuid::new_v4()))
    }
}

/// Grouping key for waitlist ordering and capacity aggregation. Every
/// partitioned computation in the crate is scoped to one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    pub program_id: String,
    pub start_date: NaiveDate,
}

impl CohortKey {
    pub fn new(program_id: impl Into<String>, start_date: NaiveDate) -> Self {
        Self {
            program_id: program_id.into(),
            start_date,
        }
    }

    pub fn label(&self) -> String {
        format!("{} / {}", self.program_id, self.start_date)
    }
}

/// Outcome recorded by the upstream adjudicator, later amended only by an
/// approved appeal overturn or a waitlist offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Rejected,
    Waitlisted,
}

impl Decision {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Waitlisted => "Waitlisted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Submitted,
    Accepted,
    Rejected,
    Waitlisted,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::Waitlisted => "Waitlisted",
        }
    }
}

impl From<Decision> for ApplicationStatus {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Accepted => Self::Accepted,
            Decision::Rejected => Self::Rejected,
            Decision::Waitlisted => Self::Waitlisted,
        }
    }
}

/// Application snapshot supplied by the intake collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub id: ApplicationId,
    pub applicant_id: String,
    pub program_id: String,
    pub intended_start_date: NaiveDate,
    pub status: ApplicationStatus,
    pub submitted_at: DateTime<Utc>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn cohort_key(&self) -> CohortKey {
        CohortKey {
            program_id: self.program_id.clone(),
            start_date: self.intended_start_date,
        }
    }
}

/// The single decision row for an application. Keeps no history beyond the
/// latest value; the pre-appeal decision is retained on the appeal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: DecisionId,
    pub application_id: ApplicationId,
    pub decision: Decision,
    pub decided_at: DateTime<Utc>,
    pub decided_by: String,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}
