use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::super::appeal::domain::{AppealRecord, AppealStatus};
use super::super::capacity::domain::{AlertKind, CapacityAlertRecord};
use super::super::domain::{
    AlertId, AppealId, ApplicationId, ApplicationRecord, CohortKey, DecisionRecord, WaitlistEntryId,
};
use super::super::enrollment::domain::{EnrollmentRecord, EnrollmentStatus};
use super::super::waitlist::domain::{WaitlistEntry, WaitlistStatus};
use super::{AlertStore, AppealStore, DecisionStore, EnrollmentStore, StoreError, WaitlistStore};

/// In-memory store backing all five storage traits behind one mutex, so each
/// trait method is atomic. Serves as the embeddable default and as the test
/// double.
///
/// Uniqueness rules live here, not in the services: one non-withdrawn appeal
/// per application, one live waitlist entry per application, one live
/// enrollment per application. Historic appeal and waitlist rows are retained
/// when a replacement is filed.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    applications: HashMap<ApplicationId, ApplicationRecord>,
    decisions: HashMap<ApplicationId, DecisionRecord>,
    appeals: HashMap<AppealId, AppealRecord>,
    appeal_index: HashMap<ApplicationId, AppealId>,
    entries: HashMap<WaitlistEntryId, WaitlistEntry>,
    entry_index: HashMap<ApplicationId, WaitlistEntryId>,
    enrollments: HashMap<ApplicationId, EnrollmentRecord>,
    alerts: HashMap<AlertId, CapacityAlertRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DecisionStore for MemoryStore {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut inner = self.guard();
        if inner.applications.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        inner.applications.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_application(
        &self,
        mut record: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        let mut inner = self.guard();
        let stored = inner
            .applications
            .get(&record.id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("application"));
        }
        record.version += 1;
        inner.applications.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        Ok(self.guard().applications.get(id).cloned())
    }

    fn insert_decision(&self, record: DecisionRecord) -> Result<DecisionRecord, StoreError> {
        let mut inner = self.guard();
        if inner.decisions.contains_key(&record.application_id) {
            return Err(StoreError::Conflict);
        }
        inner
            .decisions
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update_decision(&self, mut record: DecisionRecord) -> Result<DecisionRecord, StoreError> {
        let mut inner = self.guard();
        let stored = inner
            .decisions
            .get(&record.application_id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("decision"));
        }
        record.version += 1;
        inner
            .decisions
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn decision_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<DecisionRecord>, StoreError> {
        Ok(self.guard().decisions.get(id).cloned())
    }

    fn cohorts(&self) -> Result<Vec<CohortKey>, StoreError> {
        let inner = self.guard();
        let mut keys: Vec<CohortKey> = Vec::new();
        for application in inner.applications.values() {
            let key = application.cohort_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys.sort_by(|a, b| {
            a.program_id
                .cmp(&b.program_id)
                .then_with(|| a.start_date.cmp(&b.start_date))
        });
        Ok(keys)
    }

    fn cohorts_for_program(&self, program_id: &str) -> Result<Vec<CohortKey>, StoreError> {
        Ok(self
            .cohorts()?
            .into_iter()
            .filter(|key| key.program_id == program_id)
            .collect())
    }

    fn application_count(&self, key: &CohortKey) -> Result<usize, StoreError> {
        let inner = self.guard();
        Ok(inner
            .applications
            .values()
            .filter(|application| &application.cohort_key() == key)
            .count())
    }
}

impl AppealStore for MemoryStore {
    fn insert_appeal(&self, record: AppealRecord) -> Result<AppealRecord, StoreError> {
        let mut inner = self.guard();
        if let Some(existing_id) = inner.appeal_index.get(&record.application_id) {
            if let Some(existing) = inner.appeals.get(existing_id) {
                if existing.status != AppealStatus::Withdrawn {
                    return Err(StoreError::Conflict);
                }
            }
        }
        inner
            .appeal_index
            .insert(record.application_id.clone(), record.id.clone());
        inner.appeals.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_appeal(&self, mut record: AppealRecord) -> Result<AppealRecord, StoreError> {
        let mut inner = self.guard();
        let stored = inner.appeals.get(&record.id).ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("appeal"));
        }
        record.version += 1;
        inner.appeals.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn appeal(&self, id: &AppealId) -> Result<Option<AppealRecord>, StoreError> {
        Ok(self.guard().appeals.get(id).cloned())
    }

    fn appeal_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<AppealRecord>, StoreError> {
        let inner = self.guard();
        Ok(inner
            .appeal_index
            .get(id)
            .and_then(|appeal_id| inner.appeals.get(appeal_id))
            .cloned())
    }
}

impl WaitlistStore for MemoryStore {
    fn insert_entry(&self, record: WaitlistEntry) -> Result<WaitlistEntry, StoreError> {
        let mut inner = self.guard();
        if let Some(existing_id) = inner.entry_index.get(&record.application_id) {
            if let Some(existing) = inner.entries.get(existing_id) {
                if existing.status.is_live() {
                    return Err(StoreError::Conflict);
                }
            }
        }
        inner
            .entry_index
            .insert(record.application_id.clone(), record.id.clone());
        inner.entries.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_entry(&self, mut record: WaitlistEntry) -> Result<WaitlistEntry, StoreError> {
        let mut inner = self.guard();
        let stored = inner.entries.get(&record.id).ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("waitlist entry"));
        }
        record.version += 1;
        inner.entries.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn entry_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<WaitlistEntry>, StoreError> {
        let inner = self.guard();
        Ok(inner
            .entry_index
            .get(id)
            .and_then(|entry_id| inner.entries.get(entry_id))
            .cloned())
    }

    fn partition_entries(&self, key: &CohortKey) -> Result<Vec<WaitlistEntry>, StoreError> {
        let inner = self.guard();
        let mut entries: Vec<WaitlistEntry> = inner
            .entries
            .values()
            .filter(|entry| &entry.cohort_key() == key)
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.0.cmp(&b.id.0)));
        Ok(entries)
    }

    fn save_partition(
        &self,
        key: &CohortKey,
        entries: Vec<WaitlistEntry>,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        let mut inner = self.guard();
        for entry in &entries {
            if &entry.cohort_key() != key {
                return Err(StoreError::Unavailable(format!(
                    "entry {} does not belong to partition {}",
                    entry.id.0,
                    key.label()
                )));
            }
            let stored = inner.entries.get(&entry.id).ok_or(StoreError::NotFound)?;
            if stored.version != entry.version {
                return Err(StoreError::VersionConflict("waitlist entry"));
            }
        }

        let mut saved = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.version += 1;
            inner.entries.insert(entry.id.clone(), entry.clone());
            saved.push(entry);
        }
        Ok(saved)
    }

    fn offered_entries(&self) -> Result<Vec<WaitlistEntry>, StoreError> {
        let inner = self.guard();
        let mut offered: Vec<WaitlistEntry> = inner
            .entries
            .values()
            .filter(|entry| entry.status == WaitlistStatus::OfferedAdmission)
            .cloned()
            .collect();
        offered.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(offered)
    }
}

impl EnrollmentStore for MemoryStore {
    fn insert_enrollment(
        &self,
        record: EnrollmentRecord,
    ) -> Result<EnrollmentRecord, StoreError> {
        let mut inner = self.guard();
        if let Some(existing) = inner.enrollments.get(&record.application_id) {
            if existing.status.is_live() {
                return Err(StoreError::Conflict);
            }
        }
        inner
            .enrollments
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn update_enrollment(
        &self,
        mut record: EnrollmentRecord,
    ) -> Result<EnrollmentRecord, StoreError> {
        let mut inner = self.guard();
        let stored = inner
            .enrollments
            .get(&record.application_id)
            .ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("enrollment"));
        }
        record.version += 1;
        inner
            .enrollments
            .insert(record.application_id.clone(), record.clone());
        Ok(record)
    }

    fn enrollment_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        Ok(self.guard().enrollments.get(id).cloned())
    }

    fn pending_enrollments(&self) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let inner = self.guard();
        let mut pending: Vec<EnrollmentRecord> = inner
            .enrollments
            .values()
            .filter(|record| record.status == EnrollmentStatus::PendingConfirmation)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(pending)
    }

    fn enrollments_for_cohort(
        &self,
        key: &CohortKey,
    ) -> Result<Vec<EnrollmentRecord>, StoreError> {
        let inner = self.guard();
        let mut records: Vec<EnrollmentRecord> = inner
            .enrollments
            .values()
            .filter(|record| {
                inner
                    .applications
                    .get(&record.application_id)
                    .map(|application| &application.cohort_key() == key)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(records)
    }
}

impl AlertStore for MemoryStore {
    fn insert_alert(&self, record: CapacityAlertRecord) -> Result<CapacityAlertRecord, StoreError> {
        let mut inner = self.guard();
        if inner.alerts.contains_key(&record.id) {
            return Err(StoreError::Conflict);
        }
        inner.alerts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn update_alert(
        &self,
        mut record: CapacityAlertRecord,
    ) -> Result<CapacityAlertRecord, StoreError> {
        let mut inner = self.guard();
        let stored = inner.alerts.get(&record.id).ok_or(StoreError::NotFound)?;
        if stored.version != record.version {
            return Err(StoreError::VersionConflict("capacity alert"));
        }
        record.version += 1;
        inner.alerts.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn alert(&self, id: &AlertId) -> Result<Option<CapacityAlertRecord>, StoreError> {
        Ok(self.guard().alerts.get(id).cloned())
    }

    fn open_alert(
        &self,
        key: &CohortKey,
        kind: AlertKind,
    ) -> Result<Option<CapacityAlertRecord>, StoreError> {
        let inner = self.guard();
        Ok(inner
            .alerts
            .values()
            .find(|alert| !alert.acknowledged && alert.kind == kind && &alert.cohort_key() == key)
            .cloned())
    }

    fn open_alerts(&self) -> Result<Vec<CapacityAlertRecord>, StoreError> {
        let inner = self.guard();
        let mut open: Vec<CapacityAlertRecord> = inner
            .alerts
            .values()
            .filter(|alert| !alert.acknowledged)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.id.0.cmp(&b.id.0));
        Ok(open)
    }
}
