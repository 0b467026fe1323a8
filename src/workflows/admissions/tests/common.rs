use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::workflows::admissions::appeal::{
    AppealReason, AppealRecord, AppealRequest, AppealWorkflow,
};
use crate::workflows::admissions::capacity::CapacityMonitor;
use crate::workflows::admissions::clock::ManualClock;
use crate::workflows::admissions::domain::{
    AppealId, ApplicationId, ApplicationRecord, ApplicationStatus, CohortKey, Decision, DecisionId,
    DecisionRecord, EnrollmentId, WaitlistEntryId,
};
use crate::workflows::admissions::enrollment::{
    ConditionKind, ConditionRequest, EnrollmentManager, EnrollmentRecord, EnrollmentRequest,
    EnrollmentStatus,
};
use crate::workflows::admissions::events::{
    AdmissionsEvent, DispatchError, EventKind, NotificationDispatcher,
};
use crate::workflows::admissions::store::{
    AppealStore, DecisionStore, MemoryStore, StoreError, WaitlistStore,
};
use crate::workflows::admissions::waitlist::{
    PriorityTier, WaitlistEntry, WaitlistRegistry, WaitlistStatus,
};

pub(super) fn start_of_term() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date")
}

pub(super) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_at(base_time()))
}

#[derive(Default)]
pub(super) struct RecordingDispatcher {
    events: Mutex<Vec<AdmissionsEvent>>,
}

impl RecordingDispatcher {
    pub(super) fn events(&self) -> Vec<AdmissionsEvent> {
        self.events.lock().expect("dispatcher mutex poisoned").clone()
    }

    pub(super) fn kinds(&self) -> Vec<EventKind> {
        self.events().into_iter().map(|event| event.kind).collect()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, event: AdmissionsEvent) -> Result<(), DispatchError> {
        self.events
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct FailingDispatcher;

impl NotificationDispatcher for FailingDispatcher {
    fn dispatch(&self, _event: AdmissionsEvent) -> Result<(), DispatchError> {
        Err(DispatchError::Transport("smtp relay offline".to_string()))
    }
}

pub(super) fn seed_application(
    store: &impl DecisionStore,
    id: &str,
    program_id: &str,
    decision: Decision,
) -> ApplicationId {
    seed_application_for_term(store, id, program_id, start_of_term(), decision)
}

pub(super) fn seed_application_for_term(
    store: &impl DecisionStore,
    id: &str,
    program_id: &str,
    start_date: NaiveDate,
    decision: Decision,
) -> ApplicationId {
    let application_id = ApplicationId(id.to_string());
    let now = base_time();
    store
        .insert_application(ApplicationRecord {
            id: application_id.clone(),
            applicant_id: format!("applicant-{id}"),
            program_id: program_id.to_string(),
            intended_start_date: start_date,
            status: ApplicationStatus::from(decision),
            submitted_at: now - Duration::days(30),
            version: 0,
            updated_at: now,
        })
        .expect("seed application");
    store
        .insert_decision(DecisionRecord {
            id: DecisionId::generate(),
            application_id: application_id.clone(),
            decision,
            decided_at: now,
            decided_by: "admissions committee".to_string(),
            version: 0,
            updated_at: now,
        })
        .expect("seed decision");
    application_id
}

pub(super) fn seed_application_without_decision(
    store: &impl DecisionStore,
    id: &str,
    program_id: &str,
    start_date: NaiveDate,
) -> ApplicationId {
    let application_id = ApplicationId(id.to_string());
    let now = base_time();
    store
        .insert_application(ApplicationRecord {
            id: application_id.clone(),
            applicant_id: format!("applicant-{id}"),
            program_id: program_id.to_string(),
            intended_start_date: start_date,
            status: ApplicationStatus::Submitted,
            submitted_at: now - Duration::days(30),
            version: 0,
            updated_at: now,
        })
        .expect("seed application");
    application_id
}

pub(super) fn appeal_request(
    application_id: &ApplicationId,
    reason: AppealReason,
) -> AppealRequest {
    AppealRequest {
        application_id: application_id.clone(),
        reason,
        statement: "The committee overlooked my revised transcript.".to_string(),
        supporting_documents: vec!["transcript-v2.pdf".to_string()],
    }
}

pub(super) fn enrollment_request(
    application_id: &ApplicationId,
    deadline: DateTime<Utc>,
    deposit_amount: u32,
    conditions: Vec<ConditionRequest>,
) -> EnrollmentRequest {
    EnrollmentRequest {
        application_id: application_id.clone(),
        enrollment_deadline: deadline,
        deposit_amount,
        conditions,
    }
}

pub(super) fn transcript_condition() -> ConditionRequest {
    ConditionRequest {
        kind: ConditionKind::AcademicTranscript,
        description: "Final undergraduate transcript".to_string(),
        deadline: None,
    }
}

/// Enrollment row seeded directly, for aggregate tests that do not exercise
/// the enrollment flow itself.
pub(super) fn enrollment_row(
    application_id: &ApplicationId,
    status: EnrollmentStatus,
) -> EnrollmentRecord {
    let now = base_time();
    EnrollmentRecord {
        id: EnrollmentId::generate(),
        application_id: application_id.clone(),
        status,
        deposit_amount: 500,
        deposit_paid: !matches!(status, EnrollmentStatus::PendingConfirmation),
        conditions: Vec::new(),
        enrollment_deadline: now + Duration::days(30),
        version: 0,
        updated_at: now,
    }
}

/// Waitlist row seeded directly, for aggregate tests that do not exercise
/// the registry flow itself.
pub(super) fn waitlist_row(
    application_id: &ApplicationId,
    program_id: &str,
    start_date: NaiveDate,
    tier: PriorityTier,
    status: WaitlistStatus,
) -> WaitlistEntry {
    let now = base_time();
    WaitlistEntry {
        id: WaitlistEntryId::generate(),
        application_id: application_id.clone(),
        program_id: program_id.to_string(),
        start_date,
        priority_tier: tier,
        position: None,
        status,
        interest_confirmed: false,
        offer_deadline: None,
        notes: Vec::new(),
        added_at: now,
        version: 0,
        updated_at: now,
    }
}

pub(super) fn appeal_workflow() -> (
    AppealWorkflow<MemoryStore, RecordingDispatcher>,
    Arc<MemoryStore>,
    Arc<RecordingDispatcher>,
    Arc<ManualClock>,
) {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let clock = manual_clock();
    let workflow = AppealWorkflow::new(store.clone(), dispatcher.clone(), clock.clone());
    (workflow, store, dispatcher, clock)
}

pub(super) fn waitlist_registry() -> (
    WaitlistRegistry<MemoryStore, RecordingDispatcher>,
    Arc<MemoryStore>,
    Arc<RecordingDispatcher>,
    Arc<ManualClock>,
) {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let clock = manual_clock();
    let registry = WaitlistRegistry::new(store.clone(), dispatcher.clone(), clock.clone());
    (registry, store, dispatcher, clock)
}

pub(super) fn enrollment_manager() -> (
    EnrollmentManager<MemoryStore, RecordingDispatcher>,
    Arc<MemoryStore>,
    Arc<RecordingDispatcher>,
    Arc<ManualClock>,
) {
    let store = Arc::new(MemoryStore::new());
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let clock = manual_clock();
    let manager = EnrollmentManager::new(store.clone(), dispatcher.clone(), clock.clone());
    (manager, store, dispatcher, clock)
}

pub(super) fn capacity_monitor() -> (
    CapacityMonitor<MemoryStore>,
    Arc<MemoryStore>,
    Arc<ManualClock>,
) {
    let store = Arc::new(MemoryStore::new());
    let clock = manual_clock();
    let monitor = CapacityMonitor::new(store.clone(), clock.clone(), 0.6);
    (monitor, store, clock)
}

/// Store wrapper whose application updates can be switched off, for
/// exercising the compensating rollback paths.
pub(super) struct FailingStore {
    inner: MemoryStore,
    fail_updates: AtomicBool,
}

impl FailingStore {
    pub(super) fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            fail_updates: AtomicBool::new(false),
        }
    }

    pub(super) fn fail_application_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub(super) fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

impl DecisionStore for FailingStore {
    fn insert_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        self.inner.insert_application(record)
    }

    fn update_application(
        &self,
        record: ApplicationRecord,
    ) -> Result<ApplicationRecord, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "application writes disabled".to_string(),
            ));
        }
        self.inner.update_application(record)
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError> {
        self.inner.application(id)
    }

    fn insert_decision(&self, record: DecisionRecord) -> Result<DecisionRecord, StoreError> {
        self.inner.insert_decision(record)
    }

    fn update_decision(&self, record: DecisionRecord) -> Result<DecisionRecord, StoreError> {
        self.inner.update_decision(record)
    }

    fn decision_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<DecisionRecord>, StoreError> {
        self.inner.decision_for_application(id)
    }

    fn cohorts(&self) -> Result<Vec<CohortKey>, StoreError> {
        self.inner.cohorts()
    }

    fn cohorts_for_program(&self, program_id: &str) -> Result<Vec<CohortKey>, StoreError> {
        self.inner.cohorts_for_program(program_id)
    }

    fn application_count(&self, key: &CohortKey) -> Result<usize, StoreError> {
        self.inner.application_count(key)
    }
}

impl AppealStore for FailingStore {
    fn insert_appeal(&self, record: AppealRecord) -> Result<AppealRecord, StoreError> {
        self.inner.insert_appeal(record)
    }

    fn update_appeal(&self, record: AppealRecord) -> Result<AppealRecord, StoreError> {
        self.inner.update_appeal(record)
    }

    fn appeal(&self, id: &AppealId) -> Result<Option<AppealRecord>, StoreError> {
        self.inner.appeal(id)
    }

    fn appeal_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<AppealRecord>, StoreError> {
        self.inner.appeal_for_application(id)
    }
}

impl WaitlistStore for FailingStore {
    fn insert_entry(&self, record: WaitlistEntry) -> Result<WaitlistEntry, StoreError> {
        self.inner.insert_entry(record)
    }

    fn update_entry(&self, record: WaitlistEntry) -> Result<WaitlistEntry, StoreError> {
        self.inner.update_entry(record)
    }

    fn entry_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<WaitlistEntry>, StoreError> {
        self.inner.entry_for_application(id)
    }

    fn partition_entries(&self, key: &CohortKey) -> Result<Vec<WaitlistEntry>, StoreError> {
        self.inner.partition_entries(key)
    }

    fn save_partition(
        &self,
        key: &CohortKey,
        entries: Vec<WaitlistEntry>,
    ) -> Result<Vec<WaitlistEntry>, StoreError> {
        self.inner.save_partition(key, entries)
    }

    fn offered_entries(&self) -> Result<Vec<WaitlistEntry>, StoreError> {
        self.inner.offered_entries()
    }
}
