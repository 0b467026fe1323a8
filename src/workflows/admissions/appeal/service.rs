use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use tracing::{error, info};

use crate::error::AdmissionsError;

use super::super::clock::Clock;
use super::super::domain::{
    AppealId, ApplicationId, ApplicationRecord, ApplicationStatus, Decision, DecisionRecord,
    ReviewerId,
};
use super::super::events::{dispatch_event, AdmissionsEvent, EventKind, NotificationDispatcher};
use super::super::locks::KeyedLocks;
use super::super::store::{AppealStore, DecisionStore, StoreError};
use super::domain::{
    AppealDecision, AppealDecisionRequest, AppealDecisionType, AppealRecord, AppealRequest,
    AppealStatus, ReviewerAssignment, ReviewerRecommendation, ReviewerRole,
};

/// Workflow adjudicating disputes over a rendered decision.
///
/// Every mutation of an existing appeal runs under that appeal's lock, so the
/// last-reviewer advance to committee review fires exactly once even when
/// recommendations race.
pub struct AppealWorkflow<S, N> {
    store: Arc<S>,
    dispatcher: Arc<N>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<AppealId>,
}

impl<S, N> AppealWorkflow<S, N>
where
    S: DecisionStore + AppealStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(store: Arc<S>, dispatcher: Arc<N>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            dispatcher,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    /// File an appeal against a rejected or waitlisted decision. The review
    /// panel (a generalist plus the reason's specialist) is assigned
    /// immediately and the appeal lands in under-review.
    pub fn submit_appeal(&self, request: AppealRequest) -> Result<AppealRecord, AdmissionsError> {
        let application = self.load_application(&request.application_id)?;
        let decision = self
            .store
            .decision_for_application(&request.application_id)?
            .ok_or_else(|| {
                AdmissionsError::not_found("decision", request.application_id.0.clone())
            })?;
        if decision.decision == Decision::Accepted {
            return Err(AdmissionsError::invalid_state(
                "decision",
                decision.id.0.clone(),
                "accepted decisions cannot be appealed",
            ));
        }
        if let Some(existing) = self.store.appeal_for_application(&request.application_id)? {
            if existing.status != AppealStatus::Withdrawn {
                return Err(AdmissionsError::already_exists("appeal", existing.id.0));
            }
        }

        let now = self.clock.now();
        let reviewers = vec![
            ReviewerAssignment::assigned(ReviewerRole::AdmissionsOfficer),
            ReviewerAssignment::assigned(request.reason.specialist_role()),
        ];
        let mut record = AppealRecord {
            id: AppealId::generate(),
            application_id: request.application_id.clone(),
            reason: request.reason,
            statement: request.statement,
            supporting_documents: request.supporting_documents,
            status: AppealStatus::Submitted,
            original_decision: decision.decision,
            reviewers,
            decision: None,
            timeline: Vec::new(),
            version: 0,
            updated_at: now,
        };
        record.push_timeline(
            now,
            "appeal submitted",
            application.applicant_id.clone(),
            Some(request.reason.label().to_string()),
        );
        let panel = record
            .reviewers
            .iter()
            .map(|reviewer| reviewer.role.label())
            .collect::<Vec<_>>()
            .join(", ");
        record.status = AppealStatus::UnderReview;
        record.push_timeline(now, "review panel assigned", "appeal workflow", Some(panel));

        let stored = match self.store.insert_appeal(record) {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => {
                return Err(AdmissionsError::already_exists(
                    "appeal",
                    request.application_id.0.clone(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        let mut details = BTreeMap::new();
        details.insert("appeal_id".to_string(), stored.id.0.clone());
        details.insert("reason".to_string(), request.reason.label().to_string());
        dispatch_event(
            self.dispatcher.as_ref(),
            AdmissionsEvent {
                kind: EventKind::AppealSubmitted,
                application_id: stored.application_id.clone(),
                details,
            },
        );
        for reviewer in &stored.reviewers {
            let mut details = BTreeMap::new();
            details.insert("appeal_id".to_string(), stored.id.0.clone());
            details.insert("reviewer_id".to_string(), reviewer.reviewer_id.0.clone());
            details.insert("role".to_string(), reviewer.role.label().to_string());
            dispatch_event(
                self.dispatcher.as_ref(),
                AdmissionsEvent {
                    kind: EventKind::ReviewerAssigned,
                    application_id: stored.application_id.clone(),
                    details,
                },
            );
        }

        info!(
            appeal = %stored.id.0,
            application = %stored.application_id.0,
            reason = request.reason.label(),
            "appeal submitted for review"
        );
        Ok(stored)
    }

    /// Record one panel member's recommendation. When the last outstanding
    /// reviewer completes, the appeal advances to committee review.
    pub fn submit_reviewer_recommendation(
        &self,
        appeal_id: &AppealId,
        reviewer_id: &ReviewerId,
        recommendation: ReviewerRecommendation,
        notes: Option<String>,
    ) -> Result<AppealRecord, AdmissionsError> {
        let lock = self.locks.acquire(appeal_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut appeal = self.load_appeal(appeal_id)?;
        if !matches!(
            appeal.status,
            AppealStatus::UnderReview | AppealStatus::AdditionalInfoRequested
        ) {
            return Err(AdmissionsError::invalid_state(
                "appeal",
                appeal.id.0.clone(),
                format!(
                    "recommendations are not accepted while {}",
                    appeal.status.label()
                ),
            ));
        }

        let now = self.clock.now();
        let reviewer = appeal
            .reviewers
            .iter_mut()
            .find(|reviewer| &reviewer.reviewer_id == reviewer_id)
            .ok_or_else(|| {
                AdmissionsError::Validation(format!(
                    "reviewer {} is not assigned to appeal {}",
                    reviewer_id.0, appeal_id.0
                ))
            })?;
        if reviewer.completed_at.is_some() {
            return Err(AdmissionsError::invalid_state(
                "reviewer",
                reviewer_id.0.clone(),
                "recommendation already submitted",
            ));
        }
        reviewer.recommendation = Some(recommendation);
        reviewer.notes = notes;
        reviewer.completed_at = Some(now);
        let role = reviewer.role;

        appeal.push_timeline(
            now,
            "reviewer recommendation recorded",
            reviewer_id.0.clone(),
            Some(format!("{}: {}", role.label(), recommendation.label())),
        );

        let advanced = appeal.all_reviewers_completed();
        if advanced {
            appeal.status = AppealStatus::CommitteeReview;
            appeal.push_timeline(now, "advanced to committee review", "appeal workflow", None);
        }
        appeal.updated_at = now;
        let stored = self.store.update_appeal(appeal)?;

        if advanced {
            info!(
                appeal = %stored.id.0,
                "all reviewers complete, appeal advanced to committee review"
            );
        }
        Ok(stored)
    }

    /// Render the committee's ruling. An overturn amends the decision row and
    /// the application status together with the appeal; if any write in that
    /// sequence fails, the earlier ones are rolled back before the error
    /// surfaces.
    pub fn process_appeal_decision(
        &self,
        appeal_id: &AppealId,
        request: AppealDecisionRequest,
    ) -> Result<AppealRecord, AdmissionsError> {
        let lock = self.locks.acquire(appeal_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut appeal = self.load_appeal(appeal_id)?;
        if !matches!(
            appeal.status,
            AppealStatus::CommitteeReview | AppealStatus::DecisionPending
        ) {
            return Err(AdmissionsError::invalid_state(
                "appeal",
                appeal.id.0.clone(),
                format!(
                    "decisions are rendered from committee review, current status is {}",
                    appeal.status.label()
                ),
            ));
        }
        if request.decision_makers.is_empty() {
            return Err(AdmissionsError::Validation(
                "at least one decision maker is required".to_string(),
            ));
        }

        let now = self.clock.now();

        // Cross-record writes go first so they can be compensated before the
        // appeal itself changes.
        let mut rollback: Option<(DecisionRecord, ApplicationRecord)> = None;
        if let Some(new_decision) = request.decision_type.overturned_decision() {
            let decision = self
                .store
                .decision_for_application(&appeal.application_id)?
                .ok_or_else(|| {
                    AdmissionsError::not_found("decision", appeal.application_id.0.clone())
                })?;
            let application = self.load_application(&appeal.application_id)?;
            let decision_snapshot = decision.clone();
            let application_snapshot = application.clone();

            let mut amended = decision;
            amended.decision = new_decision;
            amended.decided_at = now;
            amended.decided_by = "appeal committee".to_string();
            amended.updated_at = now;
            self.store.update_decision(amended)?;

            let mut amended_application = application;
            amended_application.status = ApplicationStatus::from(new_decision);
            amended_application.updated_at = now;
            if let Err(err) = self.store.update_application(amended_application) {
                self.restore_decision(&decision_snapshot);
                return Err(err.into());
            }

            rollback = Some((decision_snapshot, application_snapshot));
        }

        appeal.status = match request.decision_type {
            AppealDecisionType::DeferDecision => AppealStatus::DecisionPending,
            AppealDecisionType::UpholdOriginal => AppealStatus::Denied,
            AppealDecisionType::OverturnAccept | AppealDecisionType::OverturnWaitlist => {
                AppealStatus::Approved
            }
        };
        if request.decision_type == AppealDecisionType::DeferDecision {
            appeal.push_timeline(
                now,
                "decision deferred",
                "appeal committee",
                Some(request.reasoning.clone()),
            );
        } else {
            appeal.decision = Some(AppealDecision {
                decision_type: request.decision_type,
                reasoning: request.reasoning.clone(),
                decision_makers: request.decision_makers.clone(),
                conditions: request.conditions.clone(),
                decided_at: now,
            });
            appeal.push_timeline(
                now,
                "appeal decided",
                "appeal committee",
                Some(request.decision_type.label().to_string()),
            );
        }
        appeal.updated_at = now;

        let stored = match self.store.update_appeal(appeal) {
            Ok(stored) => stored,
            Err(err) => {
                if let Some((decision_snapshot, application_snapshot)) = rollback {
                    self.restore_application(&application_snapshot);
                    self.restore_decision(&decision_snapshot);
                }
                return Err(err.into());
            }
        };

        let mut details = BTreeMap::new();
        details.insert("appeal_id".to_string(), stored.id.0.clone());
        details.insert(
            "decision_type".to_string(),
            request.decision_type.label().to_string(),
        );
        details.insert("status".to_string(), stored.status.label().to_string());
        dispatch_event(
            self.dispatcher.as_ref(),
            AdmissionsEvent {
                kind: EventKind::AppealDecided,
                application_id: stored.application_id.clone(),
                details,
            },
        );

        info!(
            appeal = %stored.id.0,
            application = %stored.application_id.0,
            outcome = request.decision_type.label(),
            status = stored.status.label(),
            "appeal decision processed"
        );
        Ok(stored)
    }

    /// Ask the applicant for more material. Review resumes when the panel
    /// finishes; the appeal advances to committee review from here once the
    /// last reviewer completes.
    pub fn request_additional_information(
        &self,
        appeal_id: &AppealId,
        note: &str,
    ) -> Result<AppealRecord, AdmissionsError> {
        let lock = self.locks.acquire(appeal_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut appeal = self.load_appeal(appeal_id)?;
        if appeal.status != AppealStatus::UnderReview {
            return Err(AdmissionsError::invalid_state(
                "appeal",
                appeal.id.0.clone(),
                format!(
                    "additional information can only be requested while {}",
                    AppealStatus::UnderReview.label()
                ),
            ));
        }

        let now = self.clock.now();
        appeal.status = AppealStatus::AdditionalInfoRequested;
        appeal.push_timeline(
            now,
            "additional information requested",
            "review panel",
            (!note.is_empty()).then(|| note.to_string()),
        );
        appeal.updated_at = now;
        Ok(self.store.update_appeal(appeal)?)
    }

    pub fn withdraw_appeal(&self, appeal_id: &AppealId) -> Result<AppealRecord, AdmissionsError> {
        let lock = self.locks.acquire(appeal_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut appeal = self.load_appeal(appeal_id)?;
        if appeal.status.is_decided() {
            return Err(AdmissionsError::invalid_state(
                "appeal",
                appeal.id.0.clone(),
                "decided appeals cannot be withdrawn",
            ));
        }
        if appeal.status == AppealStatus::Withdrawn {
            return Err(AdmissionsError::invalid_state(
                "appeal",
                appeal.id.0.clone(),
                "appeal is already withdrawn",
            ));
        }

        let application = self.load_application(&appeal.application_id)?;
        let now = self.clock.now();
        appeal.status = AppealStatus::Withdrawn;
        appeal.push_timeline(now, "appeal withdrawn", application.applicant_id, None);
        appeal.updated_at = now;
        let stored = self.store.update_appeal(appeal)?;

        info!(
            appeal = %stored.id.0,
            application = %stored.application_id.0,
            "appeal withdrawn"
        );
        Ok(stored)
    }

    pub fn appeal(&self, appeal_id: &AppealId) -> Result<AppealRecord, AdmissionsError> {
        self.load_appeal(appeal_id)
    }

    pub fn appeal_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<AppealRecord>, AdmissionsError> {
        Ok(self.store.appeal_for_application(application_id)?)
    }

    fn load_appeal(&self, appeal_id: &AppealId) -> Result<AppealRecord, AdmissionsError> {
        self.store
            .appeal(appeal_id)?
            .ok_or_else(|| AdmissionsError::not_found("appeal", appeal_id.0.clone()))
    }

    fn load_application(&self, id: &ApplicationId) -> Result<ApplicationRecord, AdmissionsError> {
        self.store
            .application(id)?
            .ok_or_else(|| AdmissionsError::not_found("application", id.0.clone()))
    }

    fn restore_decision(&self, snapshot: &DecisionRecord) {
        let current = match self.store.decision_for_application(&snapshot.application_id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                error!(
                    application = %snapshot.application_id.0,
                    "decision row missing while rolling back an overturn"
                );
                return;
            }
            Err(err) => {
                error!(
                    application = %snapshot.application_id.0,
                    error = %err,
                    "decision fetch failed while rolling back an overturn"
                );
                return;
            }
        };
        let mut restored = snapshot.clone();
        restored.version = current.version;
        if let Err(err) = self.store.update_decision(restored) {
            error!(
                application = %snapshot.application_id.0,
                error = %err,
                "failed to restore decision after an aborted overturn"
            );
        }
    }

    fn restore_application(&self, snapshot: &ApplicationRecord) {
        let current = match self.store.application(&snapshot.id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                error!(
                    application = %snapshot.id.0,
                    "application row missing while rolling back an overturn"
                );
                return;
            }
            Err(err) => {
                error!(
                    application = %snapshot.id.0,
                    error = %err,
                    "application fetch failed while rolling back an overturn"
                );
                return;
            }
        };
        let mut restored = snapshot.clone();
        restored.version = current.version;
        if let Err(err) = self.store.update_application(restored) {
            error!(
                application = %snapshot.id.0,
                error = %err,
                "failed to restore application after an aborted overturn"
            );
        }
    }
}
