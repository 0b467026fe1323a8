use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use chrono::Duration;
use tracing::info;

use crate::error::AdmissionsError;

use super::super::clock::Clock;
use super::super::domain::{ApplicationId, ConditionId, Decision, EnrollmentId};
use super::super::events::{dispatch_event, AdmissionsEvent, EventKind, NotificationDispatcher};
use super::super::locks::KeyedLocks;
use super::super::store::{DecisionStore, EnrollmentStore, StoreError};
use super::domain::{EnrollmentCondition, EnrollmentRecord, EnrollmentRequest, EnrollmentStatus};

/// Confirmation, deposit, and condition tracking for accepted applicants.
///
/// Mutations of one enrollment serialize on a per-application lock, and
/// ENROLLED is always derived from deposit-paid plus conditions-fulfilled, so
/// payment callbacks and manual condition updates may land in either order.
pub struct EnrollmentManager<S, N> {
    store: Arc<S>,
    dispatcher: Arc<N>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<ApplicationId>,
}

impl<S, N> EnrollmentManager<S, N>
where
    S: DecisionStore + EnrollmentStore + 'static,
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

    /// Open the confirmation window for an accepted application.
    pub fn create_enrollment_confirmation(
        &self,
        request: EnrollmentRequest,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        self.store
            .application(&request.application_id)?
            .ok_or_else(|| {
                AdmissionsError::not_found("application", request.application_id.0.clone())
            })?;
        let decision = self
            .store
            .decision_for_application(&request.application_id)?
            .ok_or_else(|| {
                AdmissionsError::not_found("decision", request.application_id.0.clone())
            })?;
        if decision.decision != Decision::Accepted {
            return Err(AdmissionsError::invalid_state(
                "decision",
                decision.id.0.clone(),
                "enrollment requires an accepted decision",
            ));
        }

        let lock = self.locks.acquire(&request.application_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = self
            .store
            .enrollment_for_application(&request.application_id)?
        {
            if existing.status.is_live() {
                return Err(AdmissionsError::already_exists("enrollment", existing.id.0));
            }
        }

        let now = self.clock.now();
        let conditions = request
            .conditions
            .into_iter()
            .map(|condition| EnrollmentCondition {
                id: ConditionId::generate(),
                kind: condition.kind,
                description: condition.description,
                deadline: condition.deadline,
                fulfilled: false,
                evidence: Vec::new(),
                fulfilled_at: None,
            })
            .collect();
        let record = EnrollmentRecord {
            id: EnrollmentId::generate(),
            application_id: request.application_id.clone(),
            status: EnrollmentStatus::PendingConfirmation,
            deposit_amount: request.deposit_amount,
            deposit_paid: false,
            conditions,
            enrollment_deadline: request.enrollment_deadline,
            version: 0,
            updated_at: now,
        };

        let stored = match self.store.insert_enrollment(record) {
            Ok(stored) => stored,
            Err(StoreError::Conflict) => {
                return Err(AdmissionsError::already_exists(
                    "enrollment",
                    request.application_id.0.clone(),
                ))
            }
            Err(err) => return Err(err.into()),
        };

        info!(
            enrollment = %stored.id.0,
            application = %stored.application_id.0,
            deadline = %stored.enrollment_deadline,
            conditions = stored.conditions.len(),
            "enrollment confirmation created"
        );
        Ok(stored)
    }

    /// Confirm intent to enroll. The deadline is checked first and a late
    /// confirmation fails without touching the record.
    pub fn confirm_enrollment(
        &self,
        application_id: &ApplicationId,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        let lock = self.locks.acquire(application_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.load_enrollment(application_id)?;
        let now = self.clock.now();
        if now > record.enrollment_deadline {
            return Err(AdmissionsError::DeadlineExceeded {
                deadline: record.enrollment_deadline,
            });
        }
        if record.status != EnrollmentStatus::PendingConfirmation {
            return Err(AdmissionsError::invalid_state(
                "enrollment",
                record.id.0.clone(),
                format!("cannot confirm while {}", record.status.label()),
            ));
        }

        record.status = EnrollmentStatus::Confirmed;
        record.recompute_status();
        record.updated_at = now;
        let stored = self.store.update_enrollment(record)?;

        let mut details = BTreeMap::new();
        details.insert("enrollment_id".to_string(), stored.id.0.clone());
        details.insert("status".to_string(), stored.status.label().to_string());
        dispatch_event(
            self.dispatcher.as_ref(),
            AdmissionsEvent {
                kind: EventKind::EnrollmentConfirmed,
                application_id: stored.application_id.clone(),
                details,
            },
        );

        info!(
            enrollment = %stored.id.0,
            application = %stored.application_id.0,
            status = stored.status.label(),
            "enrollment confirmed"
        );
        Ok(stored)
    }

    /// Apply an authoritative payment confirmation. Re-processing a payment
    /// for a record whose deposit is already settled is a no-op.
    pub fn process_deposit_payment(
        &self,
        application_id: &ApplicationId,
        amount: u32,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        let lock = self.locks.acquire(application_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.load_enrollment(application_id)?;
        if record.deposit_paid {
            return Ok(record);
        }
        if matches!(
            record.status,
            EnrollmentStatus::Expired | EnrollmentStatus::Withdrawn
        ) {
            return Err(AdmissionsError::invalid_state(
                "enrollment",
                record.id.0.clone(),
                format!("cannot take a deposit while {}", record.status.label()),
            ));
        }
        if amount < record.deposit_amount {
            return Err(AdmissionsError::InsufficientPayment {
                required: record.deposit_amount,
                received: amount,
            });
        }

        record.deposit_paid = true;
        record.recompute_status();
        record.updated_at = self.clock.now();
        let stored = self.store.update_enrollment(record)?;

        info!(
            enrollment = %stored.id.0,
            application = %stored.application_id.0,
            amount,
            status = stored.status.label(),
            "deposit payment recorded"
        );
        Ok(stored)
    }

    /// Mark one admission condition fulfilled. Re-fulfilling an already
    /// fulfilled condition is a no-op; the first evidence set stands.
    pub fn fulfill_condition(
        &self,
        application_id: &ApplicationId,
        condition_id: &ConditionId,
        evidence: Vec<String>,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        let lock = self.locks.acquire(application_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.load_enrollment(application_id)?;
        if matches!(
            record.status,
            EnrollmentStatus::Expired | EnrollmentStatus::Withdrawn
        ) {
            return Err(AdmissionsError::invalid_state(
                "enrollment",
                record.id.0.clone(),
                format!("cannot fulfill conditions while {}", record.status.label()),
            ));
        }

        let now = self.clock.now();
        let condition = record
            .conditions
            .iter_mut()
            .find(|condition| &condition.id == condition_id)
            .ok_or_else(|| AdmissionsError::not_found("condition", condition_id.0.clone()))?;
        if condition.fulfilled {
            return Ok(record);
        }
        condition.fulfilled = true;
        condition.evidence.extend(evidence);
        condition.fulfilled_at = Some(now);

        record.recompute_status();
        record.updated_at = now;
        let stored = self.store.update_enrollment(record)?;

        info!(
            enrollment = %stored.id.0,
            application = %stored.application_id.0,
            condition = %condition_id.0,
            status = stored.status.label(),
            "enrollment condition fulfilled"
        );
        Ok(stored)
    }

    /// Expire every pending confirmation whose deadline has elapsed. Safe to
    /// run repeatedly and concurrently with itself; each candidate is
    /// re-read under its application lock and skipped once processed.
    pub fn check_enrollment_deadlines(&self) -> Result<Vec<EnrollmentRecord>, AdmissionsError> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for candidate in self.store.pending_enrollments()? {
            if now <= candidate.enrollment_deadline {
                continue;
            }

            let lock = self.locks.acquire(&candidate.application_id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            let Some(mut record) = self
                .store
                .enrollment_for_application(&candidate.application_id)?
            else {
                continue;
            };
            if record.id != candidate.id
                || record.status != EnrollmentStatus::PendingConfirmation
                || now <= record.enrollment_deadline
            {
                continue;
            }

            record.status = EnrollmentStatus::Expired;
            record.updated_at = now;
            let stored = self.store.update_enrollment(record)?;

            self.dispatch_seat_released(&stored, "confirmation deadline elapsed");
            info!(
                enrollment = %stored.id.0,
                application = %stored.application_id.0,
                deadline = %stored.enrollment_deadline,
                "enrollment confirmation expired"
            );
            expired.push(stored);
        }

        Ok(expired)
    }

    /// Withdraw an enrollment that has not reached a terminal state, freeing
    /// the reserved seat.
    pub fn withdraw_enrollment(
        &self,
        application_id: &ApplicationId,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        let lock = self.locks.acquire(application_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.load_enrollment(application_id)?;
        if record.status.is_terminal() {
            return Err(AdmissionsError::invalid_state(
                "enrollment",
                record.id.0.clone(),
                format!("cannot withdraw while {}", record.status.label()),
            ));
        }

        record.status = EnrollmentStatus::Withdrawn;
        record.updated_at = self.clock.now();
        let stored = self.store.update_enrollment(record)?;

        self.dispatch_seat_released(&stored, "enrollment withdrawn");
        info!(
            enrollment = %stored.id.0,
            application = %stored.application_id.0,
            "enrollment withdrawn"
        );
        Ok(stored)
    }

    /// Dispatch a warning for every pending confirmation whose deadline falls
    /// inside the window. Returns the number of warnings sent.
    pub fn notify_approaching_confirmation_deadlines(
        &self,
        window: Duration,
    ) -> Result<usize, AdmissionsError> {
        let now = self.clock.now();
        let horizon = now + window;
        let mut sent = 0usize;

        for record in self.store.pending_enrollments()? {
            if record.enrollment_deadline <= now || record.enrollment_deadline > horizon {
                continue;
            }
            let mut details = BTreeMap::new();
            details.insert("enrollment_id".to_string(), record.id.0.clone());
            details.insert(
                "deadline".to_string(),
                record.enrollment_deadline.to_rfc3339(),
            );
            details.insert(
                "subject".to_string(),
                "enrollment confirmation".to_string(),
            );
            dispatch_event(
                self.dispatcher.as_ref(),
                AdmissionsEvent {
                    kind: EventKind::DeadlineApproaching,
                    application_id: record.application_id.clone(),
                    details,
                },
            );
            sent += 1;
        }

        Ok(sent)
    }

    pub fn enrollment_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<EnrollmentRecord>, AdmissionsError> {
        Ok(self.store.enrollment_for_application(application_id)?)
    }

    fn load_enrollment(
        &self,
        application_id: &ApplicationId,
    ) -> Result<EnrollmentRecord, AdmissionsError> {
        self.store
            .enrollment_for_application(application_id)?
            .ok_or_else(|| AdmissionsError::not_found("enrollment", application_id.0.clone()))
    }

    fn dispatch_seat_released(&self, record: &EnrollmentRecord, reason: &str) {
        let mut details = BTreeMap::new();
        details.insert("enrollment_id".to_string(), record.id.0.clone());
        details.insert("reason".to_string(), reason.to_string());
        dispatch_event(
            self.dispatcher.as_ref(),
            AdmissionsEvent {
                kind: EventKind::SeatReleased,
                application_id: record.application_id.clone(),
                details,
            },
        );
    }
}
