use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info};

use crate::error::AdmissionsError;

use super::super::clock::Clock;
use super::super::domain::{
    ApplicationId, ApplicationRecord, ApplicationStatus, CohortKey, Decision, DecisionRecord,
    WaitlistEntryId,
};
use super::super::events::{dispatch_event, AdmissionsEvent, EventKind, NotificationDispatcher};
use super::super::locks::KeyedLocks;
use super::super::store::{DecisionStore, StoreError, WaitlistStore};
use super::domain::{
    rank_partition, PriorityTier, TierCounts, WaitlistEntry, WaitlistStatistics, WaitlistStatus,
};

/// Per-cohort waitlist with dense priority ranking and the offer lifecycle.
///
/// Every mutation of a partition happens under that partition's lock: the
/// partition is loaded, resorted in memory, and written back as one unit, so
/// positions always form the dense permutation 1..N.
pub struct WaitlistRegistry<S, N> {
    store: Arc<S>,
    dispatcher: Arc<N>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<CohortKey>,
}

impl<S, N> WaitlistRegistry<S, N>
where
    S: DecisionStore + WaitlistStore + 'static,
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

    /// Place a waitlisted application on its cohort's list. The partition is
    /// resorted immediately, so the returned entry carries its position.
    pub fn add_to_waitlist(
        &self,
        application_id: &ApplicationId,
        priority_tier: PriorityTier,
        notes: Vec<String>,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let application = self.load_application(application_id)?;
        let decision = self.load_decision(application_id)?;
        if decision.decision != Decision::Waitlisted {
            return Err(AdmissionsError::invalid_state(
                "decision",
                decision.id.0.clone(),
                "only waitlisted applications join the waitlist",
            ));
        }

        let key = application.cohort_key();
        let lock = self.locks.acquire(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = self.store.entry_for_application(application_id)? {
            if existing.status.is_live() {
                return Err(AdmissionsError::already_exists(
                    "waitlist entry",
                    existing.id.0,
                ));
            }
        }

        let now = self.clock.now();
        let record = WaitlistEntry {
            id: WaitlistEntryId::generate(),
            application_id: application_id.clone(),
            program_id: key.program_id.clone(),
            start_date: key.start_date,
            priority_tier,
            position: None,
            status: WaitlistStatus::Active,
            interest_confirmed: false,
            offer_deadline: None,
            notes,
            added_at: now,
            version: 0,
            updated_at: now,
        };
        let entry_id = record.id.clone();
        match self.store.insert_entry(record) {
            Ok(_) => {}
            Err(StoreError::Conflict) => {
                return Err(AdmissionsError::already_exists(
                    "waitlist entry",
                    application_id.0.clone(),
                ))
            }
            Err(err) => return Err(err.into()),
        }

        let stored = self.rewrite_partition(&key, &entry_id, now, |_| {})?;

        info!(
            entry = %stored.id.0,
            application = %application_id.0,
            cohort = %key.label(),
            tier = priority_tier.label(),
            position = ?stored.position,
            "application added to waitlist"
        );
        Ok(stored)
    }

    /// Extend an admission offer to an active entry. The decision row and the
    /// application flip to accepted together with the entry; any failure in
    /// that sequence rolls the earlier writes back. The entry keeps its rank
    /// until the offer is resolved.
    pub fn offer_admission_from_waitlist(
        &self,
        application_id: &ApplicationId,
        deadline: DateTime<Utc>,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let key = self.entry_cohort(application_id)?;
        let lock = self.locks.acquire(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = self.load_live_entry(application_id)?;
        if entry.status != WaitlistStatus::Active {
            return Err(AdmissionsError::invalid_state(
                "waitlist entry",
                entry.id.0.clone(),
                "only active entries can receive offers",
            ));
        }

        let now = self.clock.now();
        let decision = self.load_decision(application_id)?;
        let application = self.load_application(application_id)?;
        let decision_snapshot = decision.clone();
        let application_snapshot = application.clone();

        let mut amended = decision;
        amended.decision = Decision::Accepted;
        amended.decided_at = now;
        amended.decided_by = "waitlist offer".to_string();
        amended.updated_at = now;
        self.store.update_decision(amended)?;

        let mut amended_application = application;
        amended_application.status = ApplicationStatus::Accepted;
        amended_application.updated_at = now;
        if let Err(err) = self.store.update_application(amended_application) {
            self.restore_decision(&decision_snapshot);
            return Err(err.into());
        }

        let offered = match self.rewrite_partition(&key, &entry.id, now, |entry| {
            entry.status = WaitlistStatus::OfferedAdmission;
            entry.offer_deadline = Some(deadline);
        }) {
            Ok(offered) => offered,
            Err(err) => {
                self.restore_application(&application_snapshot);
                self.restore_decision(&decision_snapshot);
                return Err(err);
            }
        };

        let mut details = BTreeMap::new();
        details.insert("entry_id".to_string(), offered.id.0.clone());
        details.insert("offer_deadline".to_string(), deadline.to_rfc3339());
        if let Some(position) = offered.position {
            details.insert("position".to_string(), position.to_string());
        }
        dispatch_event(
            self.dispatcher.as_ref(),
            AdmissionsEvent {
                kind: EventKind::OfferMade,
                application_id: application_id.clone(),
                details,
            },
        );

        info!(
            entry = %offered.id.0,
            application = %application_id.0,
            deadline = %deadline,
            "admission offered from waitlist"
        );
        Ok(offered)
    }

    /// Record the applicant's response to an outstanding offer. Accepting
    /// after the deadline fails without mutating anything; declining frees
    /// the position and reverts the offer-written acceptance.
    pub fn respond_to_waitlist_offer(
        &self,
        application_id: &ApplicationId,
        accepted: bool,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let key = self.entry_cohort(application_id)?;
        let lock = self.locks.acquire(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = self.load_live_entry(application_id)?;
        if entry.status != WaitlistStatus::OfferedAdmission {
            return Err(AdmissionsError::invalid_state(
                "waitlist entry",
                entry.id.0.clone(),
                "no outstanding offer to respond to",
            ));
        }

        let now = self.clock.now();
        let updated = if accepted {
            if let Some(deadline) = entry.offer_deadline {
                if now > deadline {
                    return Err(AdmissionsError::DeadlineExceeded { deadline });
                }
            }
            self.rewrite_partition(&key, &entry.id, now, |entry| {
                entry.status = WaitlistStatus::AcceptedOffer;
            })?
        } else {
            self.close_offer(application_id, &entry, WaitlistStatus::DeclinedOffer, now)?
        };

        info!(
            entry = %updated.id.0,
            application = %application_id.0,
            accepted,
            "waitlist offer response recorded"
        );
        Ok(updated)
    }

    /// Mark that the applicant still wants their place.
    pub fn confirm_waitlist_interest(
        &self,
        application_id: &ApplicationId,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let key = self.entry_cohort(application_id)?;
        let lock = self.locks.acquire(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = self.load_live_entry(application_id)?;
        if entry.status != WaitlistStatus::Active {
            return Err(AdmissionsError::invalid_state(
                "waitlist entry",
                entry.id.0.clone(),
                "interest can only be confirmed while active",
            ));
        }

        let now = self.clock.now();
        self.rewrite_partition(&key, &entry.id, now, |entry| {
            entry.interest_confirmed = true;
        })
    }

    /// Take an entry off the list. Removing one that holds an outstanding
    /// offer also reverts the offer-written acceptance.
    pub fn remove_from_waitlist(
        &self,
        application_id: &ApplicationId,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let key = self.entry_cohort(application_id)?;
        let lock = self.locks.acquire(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let entry = self.load_live_entry(application_id)?;
        let removed = match entry.status {
            WaitlistStatus::Active => {
                let now = self.clock.now();
                self.rewrite_partition(&key, &entry.id, now, |entry| {
                    entry.status = WaitlistStatus::Removed;
                })?
            }
            WaitlistStatus::OfferedAdmission => {
                let now = self.clock.now();
                self.close_offer(application_id, &entry, WaitlistStatus::Removed, now)?
            }
            _ => {
                return Err(AdmissionsError::invalid_state(
                    "waitlist entry",
                    entry.id.0.clone(),
                    "only waiting entries can be removed",
                ))
            }
        };

        info!(
            entry = %removed.id.0,
            application = %application_id.0,
            "entry removed from waitlist"
        );
        Ok(removed)
    }

    /// Expire every outstanding offer whose deadline has elapsed. Safe to run
    /// repeatedly and concurrently with itself: entries already expired by a
    /// racing sweep are re-read under the partition lock and skipped.
    pub fn check_waitlist_deadlines(&self) -> Result<Vec<WaitlistEntry>, AdmissionsError> {
        let now = self.clock.now();
        let mut expired = Vec::new();

        for candidate in self.store.offered_entries()? {
            let elapsed = candidate
                .offer_deadline
                .map(|deadline| now > deadline)
                .unwrap_or(false);
            if !elapsed {
                continue;
            }

            let key = candidate.cohort_key();
            let lock = self.locks.acquire(&key);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            // Re-read under the lock; a racing sweep or response may have
            // resolved the offer already.
            let Some(entry) = self.store.entry_for_application(&candidate.application_id)? else {
                continue;
            };
            if entry.id != candidate.id
                || entry.status != WaitlistStatus::OfferedAdmission
                || !entry.offer_deadline.map(|d| now > d).unwrap_or(false)
            {
                continue;
            }

            let lapsed =
                self.close_offer(&entry.application_id, &entry, WaitlistStatus::Expired, now)?;
            info!(
                entry = %lapsed.id.0,
                application = %lapsed.application_id.0,
                "waitlist offer expired"
            );
            expired.push(lapsed);
        }

        Ok(expired)
    }

    /// Dispatch a warning for every outstanding offer whose deadline falls
    /// inside the window. Returns the number of warnings sent.
    pub fn notify_approaching_offer_deadlines(
        &self,
        window: chrono::Duration,
    ) -> Result<usize, AdmissionsError> {
        let now = self.clock.now();
        let horizon = now + window;
        let mut sent = 0usize;

        for entry in self.store.offered_entries()? {
            let Some(deadline) = entry.offer_deadline else {
                continue;
            };
            if deadline <= now || deadline > horizon {
                continue;
            }
            let mut details = BTreeMap::new();
            details.insert("entry_id".to_string(), entry.id.0.clone());
            details.insert("deadline".to_string(), deadline.to_rfc3339());
            details.insert("subject".to_string(), "waitlist offer".to_string());
            dispatch_event(
                self.dispatcher.as_ref(),
                AdmissionsEvent {
                    kind: EventKind::DeadlineApproaching,
                    application_id: entry.application_id.clone(),
                    details,
                },
            );
            sent += 1;
        }

        Ok(sent)
    }

    /// Aggregate view of one partition.
    pub fn waitlist_statistics(
        &self,
        program_id: &str,
        start_date: NaiveDate,
    ) -> Result<WaitlistStatistics, AdmissionsError> {
        let key = CohortKey::new(program_id, start_date);
        let entries = self.store.partition_entries(&key)?;

        let mut active = 0usize;
        let mut offered = 0usize;
        let mut accepted = 0usize;
        let mut declined = 0usize;
        let mut expired = 0usize;
        let mut removed = 0usize;
        let mut active_by_tier = TierCounts::default();
        let mut interest_confirmed = 0usize;

        for entry in &entries {
            match entry.status {
                WaitlistStatus::Active => {
                    active += 1;
                    active_by_tier.record(entry.priority_tier);
                    if entry.interest_confirmed {
                        interest_confirmed += 1;
                    }
                }
                WaitlistStatus::OfferedAdmission => offered += 1,
                WaitlistStatus::AcceptedOffer => accepted += 1,
                WaitlistStatus::DeclinedOffer => declined += 1,
                WaitlistStatus::Expired => expired += 1,
                WaitlistStatus::Removed => removed += 1,
            }
        }

        let responded = offered + accepted + declined;
        let conversion_rate = if responded == 0 {
            0.0
        } else {
            accepted as f32 / responded as f32
        };

        Ok(WaitlistStatistics {
            program_id: key.program_id,
            start_date: key.start_date,
            active,
            offered,
            accepted,
            declined,
            expired,
            removed,
            active_by_tier,
            interest_confirmed,
            conversion_rate,
        })
    }

    /// Entries of one partition, ranked entries first in position order.
    pub fn partition(
        &self,
        program_id: &str,
        start_date: NaiveDate,
    ) -> Result<Vec<WaitlistEntry>, AdmissionsError> {
        let key = CohortKey::new(program_id, start_date);
        let mut entries = self.store.partition_entries(&key)?;
        entries.sort_by_key(|entry| (entry.position.unwrap_or(u32::MAX), entry.added_at));
        Ok(entries)
    }

    pub fn entry_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Option<WaitlistEntry>, AdmissionsError> {
        Ok(self.store.entry_for_application(application_id)?)
    }

    /// Load the partition, mutate the target entry, resort, and write the
    /// whole partition back as one unit. Callers hold the partition lock.
    fn rewrite_partition<F>(
        &self,
        key: &CohortKey,
        entry_id: &WaitlistEntryId,
        now: DateTime<Utc>,
        mutate: F,
    ) -> Result<WaitlistEntry, AdmissionsError>
    where
        F: FnOnce(&mut WaitlistEntry),
    {
        let mut entries = self.store.partition_entries(key)?;
        let target = entries
            .iter_mut()
            .find(|entry| &entry.id == entry_id)
            .ok_or_else(|| AdmissionsError::not_found("waitlist entry", entry_id.0.clone()))?;
        mutate(target);
        rank_partition(&mut entries);
        for entry in entries.iter_mut() {
            entry.updated_at = now;
        }
        let saved = self.store.save_partition(key, entries)?;
        saved
            .into_iter()
            .find(|entry| &entry.id == entry_id)
            .ok_or_else(|| AdmissionsError::not_found("waitlist entry", entry_id.0.clone()))
    }

    /// Resolve an outstanding offer without an acceptance: revert the
    /// offer-written decision, then rewrite the partition with the entry in
    /// its terminal status, compensating the decision writes if that fails.
    fn close_offer(
        &self,
        application_id: &ApplicationId,
        entry: &WaitlistEntry,
        outcome: WaitlistStatus,
        now: DateTime<Utc>,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        let key = entry.cohort_key();
        let decision = self.load_decision(application_id)?;
        let application = self.load_application(application_id)?;

        let mut rollback: Option<(DecisionRecord, ApplicationRecord)> = None;
        if decision.decision == Decision::Accepted {
            let decision_snapshot = decision.clone();
            let application_snapshot = application.clone();

            let mut reverted = decision;
            reverted.decision = Decision::Waitlisted;
            reverted.decided_at = now;
            reverted.decided_by = "waitlist registry".to_string();
            reverted.updated_at = now;
            self.store.update_decision(reverted)?;

            let mut reverted_application = application;
            reverted_application.status = ApplicationStatus::Waitlisted;
            reverted_application.updated_at = now;
            if let Err(err) = self.store.update_application(reverted_application) {
                self.restore_decision(&decision_snapshot);
                return Err(err.into());
            }

            rollback = Some((decision_snapshot, application_snapshot));
        }

        match self.rewrite_partition(&key, &entry.id, now, |entry| {
            entry.status = outcome;
        }) {
            Ok(saved) => Ok(saved),
            Err(err) => {
                if let Some((decision_snapshot, application_snapshot)) = rollback {
                    self.restore_application(&application_snapshot);
                    self.restore_decision(&decision_snapshot);
                }
                Err(err)
            }
        }
    }

    fn entry_cohort(&self, application_id: &ApplicationId) -> Result<CohortKey, AdmissionsError> {
        let entry = self.load_live_entry(application_id)?;
        Ok(entry.cohort_key())
    }

    fn load_live_entry(
        &self,
        application_id: &ApplicationId,
    ) -> Result<WaitlistEntry, AdmissionsError> {
        self.store
            .entry_for_application(application_id)?
            .ok_or_else(|| AdmissionsError::not_found("waitlist entry", application_id.0.clone()))
    }

    fn load_application(&self, id: &ApplicationId) -> Result<ApplicationRecord, AdmissionsError> {
        self.store
            .application(id)?
            .ok_or_else(|| AdmissionsError::not_found("application", id.0.clone()))
    }

    fn load_decision(&self, id: &ApplicationId) -> Result<DecisionRecord, AdmissionsError> {
        self.store
            .decision_for_application(id)?
            .ok_or_else(|| AdmissionsError::not_found("decision", id.0.clone()))
    }

    fn restore_decision(&self, snapshot: &DecisionRecord) {
        let current = match self.store.decision_for_application(&snapshot.application_id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                error!(
                    application = %snapshot.application_id.0,
                    "decision row missing while rolling back a waitlist transition"
                );
                return;
            }
            Err(err) => {
                error!(
                    application = %snapshot.application_id.0,
                    error = %err,
                    "decision fetch failed while rolling back a waitlist transition"
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
                "failed to restore decision after an aborted waitlist transition"
            );
        }
    }

    fn restore_application(&self, snapshot: &ApplicationRecord) {
        let current = match self.store.application(&snapshot.id) {
            Ok(Some(current)) => current,
            Ok(None) => {
                error!(
                    application = %snapshot.id.0,
                    "application row missing while rolling back a waitlist transition"
                );
                return;
            }
            Err(err) => {
                error!(
                    application = %snapshot.id.0,
                    error = %err,
                    "application fetch failed while rolling back a waitlist transition"
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
                "failed to restore application after an aborted waitlist transition"
            );
        }
    }
}
