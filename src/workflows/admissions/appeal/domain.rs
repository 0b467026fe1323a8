use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{AppealId, ApplicationId, Decision, ReviewerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealStatus {
    Submitted,
    UnderReview,
    AdditionalInfoRequested,
    CommitteeReview,
    DecisionPending,
    Approved,
    Denied,
    Withdrawn,
}

impl AppealStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::AdditionalInfoRequested => "Additional Info Requested",
            Self::CommitteeReview => "Committee Review",
            Self::DecisionPending => "Decision Pending",
            Self::Approved => "Approved",
            Self::Denied => "Denied",
            Self::Withdrawn => "Withdrawn",
        }
    }

    /// A rendered committee outcome. Withdrawal is not a decision.
    pub const fn is_decided(self) -> bool {
        matches!(self, Self::Approved | Self::Denied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealReason {
    Discrimination,
    MedicalCircumstances,
    ProceduralError,
    NewEvidence,
    Other,
}

impl AppealReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Discrimination => "Discrimination",
            Self::MedicalCircumstances => "Medical Circumstances",
            Self::ProceduralError => "Procedural Error",
            Self::NewEvidence => "New Evidence",
            Self::Other => "Other",
        }
    }

    /// Specialist seat on the review panel. A generalist admissions officer
    /// is always assigned alongside.
    pub const fn specialist_role(self) -> ReviewerRole {
        match self {
            Self::Discrimination => ReviewerRole::DiversityOfficer,
            Self::MedicalCircumstances => ReviewerRole::StudentServicesLead,
            Self::ProceduralError => ReviewerRole::AcademicDean,
            Self::NewEvidence | Self::Other => ReviewerRole::SeniorAdmissionsOfficer,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRole {
    AdmissionsOfficer,
    SeniorAdmissionsOfficer,
    DiversityOfficer,
    StudentServicesLead,
    AcademicDean,
}

impl ReviewerRole {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AdmissionsOfficer => "Admissions Officer",
            Self::SeniorAdmissionsOfficer => "Senior Admissions Officer",
            Self::DiversityOfficer => "Diversity Officer",
            Self::StudentServicesLead => "Student Services Lead",
            Self::AcademicDean => "Academic Dean",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerRecommendation {
    UpholdDecision,
    OverturnDecision,
    Escalate,
}

impl ReviewerRecommendation {
    pub const fn label(self) -> &'static str {
        match self {
            Self::UpholdDecision => "Uphold Decision",
            Self::OverturnDecision => "Overturn Decision",
            Self::Escalate => "Escalate",
        }
    }
}

/// One seat on an appeal's review panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerAssignment {
    pub reviewer_id: ReviewerId,
    pub role: ReviewerRole,
    pub recommendation: Option<ReviewerRecommendation>,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ReviewerAssignment {
    pub fn assigned(role: ReviewerRole) -> Self {
        Self {
            reviewer_id: ReviewerId::generate(),
            role,
            recommendation: None,
            notes: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppealDecisionType {
    OverturnAccept,
    OverturnWaitlist,
    UpholdOriginal,
    DeferDecision,
}

impl AppealDecisionType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OverturnAccept => "Overturn (Accept)",
            Self::OverturnWaitlist => "Overturn (Waitlist)",
            Self::UpholdOriginal => "Uphold Original",
            Self::DeferDecision => "Defer Decision",
        }
    }

    /// The decision value an overturn writes, if this outcome is one.
    pub const fn overturned_decision(self) -> Option<Decision> {
        match self {
            Self::OverturnAccept => Some(Decision::Accepted),
            Self::OverturnWaitlist => Some(Decision::Waitlisted),
            Self::UpholdOriginal | Self::DeferDecision => None,
        }
    }
}

/// Committee outcome, present on the appeal only once rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealDecision {
    pub decision_type: AppealDecisionType,
    pub reasoning: String,
    pub decision_makers: Vec<String>,
    pub conditions: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

/// Append-only audit log line on an appeal. `actor` names who acted: the
/// applicant id, a reviewer id, the committee, or the workflow itself for
/// automatic transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: DateTime<Utc>,
    pub event: String,
    pub actor: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealRecord {
    pub id: AppealId,
    pub application_id: ApplicationId,
    pub reason: AppealReason,
    pub statement: String,
    pub supporting_documents: Vec<String>,
    pub status: AppealStatus,
    /// Decision value in force when the appeal was filed, kept for audit.
    pub original_decision: Decision,
    pub reviewers: Vec<ReviewerAssignment>,
    pub decision: Option<AppealDecision>,
    pub timeline: Vec<TimelineEntry>,
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl AppealRecord {
    pub(crate) fn push_timeline(
        &mut self,
        at: DateTime<Utc>,
        event: impl Into<String>,
        actor: impl Into<String>,
        detail: Option<String>,
    ) {
        self.timeline.push(TimelineEntry {
            at,
            event: event.into(),
            actor: actor.into(),
            detail,
        });
    }

    pub fn all_reviewers_completed(&self) -> bool {
        self.reviewers
            .iter()
            .all(|reviewer| reviewer.completed_at.is_some())
    }
}

/// Applicant-supplied appeal submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealRequest {
    pub application_id: ApplicationId,
    pub reason: AppealReason,
    pub statement: String,
    pub supporting_documents: Vec<String>,
}

/// Committee-supplied decision input for `process_appeal_decision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealDecisionRequest {
    pub decision_type: AppealDecisionType,
    pub reasoning: String,
    pub decision_makers: Vec<String>,
    pub conditions: Vec<String>,
}
