//! Storage seams for the admissions lifecycle.
//!
//! Each entity family gets its own trait so a service can be exercised with
//! exactly the storage surface it needs. Records carry a `version` field;
//! updates compare it against the stored row and fail with `VersionConflict`
//! on mismatch, bumping it on success.

pub mod memory;

use super::appeal::domain::AppealRecord;
use super::capacity::domain::{AlertKind, CapacityAlertRecord};
use super::domain::{AlertId, AppealId, ApplicationId, ApplicationRecord, CohortKey, DecisionRecord};
use super::enrollment::domain::EnrollmentRecord;
use super::waitlist::domain::WaitlistEntry;

pub use memory::MemoryStore;

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale version for {0}")]
    VersionConflict(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Applications and their single decision row, as written by the upstream
/// adjudicator and amended by overturns and waitlist offers.
pub trait DecisionStore: Send + Sync {
    fn insert_application(&self, record: ApplicationRecord)
        -> Result<ApplicationRecord, StoreError>;
    fn update_application(&self, record: ApplicationRecord)
        -> Result<ApplicationRecord, StoreError>;
    fn application(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, StoreError>;
    fn insert_decision(&self, record: DecisionRecord) -> Result<DecisionRecord, StoreError>;
    fn update_decision(&self, record: DecisionRecord) -> Result<DecisionRecord, StoreError>;
    fn decision_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<DecisionRecord>, StoreError>;
    /// Distinct (program, start date) pairs across all applications.
    fn cohorts(&self) -> Result<Vec<CohortKey>, StoreError>;
    fn cohorts_for_program(&self, program_id: &str) -> Result<Vec<CohortKey>, StoreError>;
    fn application_count(&self, key: &CohortKey) -> Result<usize, StoreError>;
}

/// Appeals indexed by application. The store enforces the at-most-one
/// non-withdrawn appeal rule; inserting a second yields `Conflict`.
pub trait AppealStore: Send + Sync {
    fn insert_appeal(&self, record: AppealRecord) -> Result<AppealRecord, StoreError>;
    fn update_appeal(&self, record: AppealRecord) -> Result<AppealRecord, StoreError>;
    fn appeal(&self, id: &AppealId) -> Result<Option<AppealRecord>, StoreError>;
    /// Latest appeal filed for the application, regardless of status.
    fn appeal_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<AppealRecord>, StoreError>;
}

/// Waitlist entries indexed by application and partition. `save_partition`
/// writes a resorted partition back as one unit; the store enforces the
/// at-most-one live entry per application rule on insert.
pub trait WaitlistStore: Send + Sync {
    fn insert_entry(&self, record: WaitlistEntry) -> Result<WaitlistEntry, StoreError>;
    fn update_entry(&self, record: WaitlistEntry) -> Result<WaitlistEntry, StoreError>;
    /// Latest entry for the application, regardless of status.
    fn entry_for_application(&self, id: &ApplicationId)
        -> Result<Option<WaitlistEntry>, StoreError>;
    fn partition_entries(&self, key: &CohortKey) -> Result<Vec<WaitlistEntry>, StoreError>;
    fn save_partition(
        &self,
        key: &CohortKey,
        entries: Vec<WaitlistEntry>,
    ) -> Result<Vec<WaitlistEntry>, StoreError>;
    /// Entries currently holding an outstanding offer, for the deadline sweep.
    fn offered_entries(&self) -> Result<Vec<WaitlistEntry>, StoreError>;
}

/// Enrollment records, at most one per application. A live record blocks a
/// second insert with `Conflict`; a terminal one is replaced.
pub trait EnrollmentStore: Send + Sync {
    fn insert_enrollment(&self, record: EnrollmentRecord)
        -> Result<EnrollmentRecord, StoreError>;
    fn update_enrollment(&self, record: EnrollmentRecord)
        -> Result<EnrollmentRecord, StoreError>;
    fn enrollment_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<EnrollmentRecord>, StoreError>;
    /// Records still awaiting confirmation, for the deadline sweep.
    fn pending_enrollments(&self) -> Result<Vec<EnrollmentRecord>, StoreError>;
    fn enrollments_for_cohort(&self, key: &CohortKey)
        -> Result<Vec<EnrollmentRecord>, StoreError>;
}

/// Capacity alerts persisted as first-class rows so acknowledgement operates
/// on real records.
pub trait AlertStore: Send + Sync {
    fn insert_alert(&self, record: CapacityAlertRecord)
        -> Result<CapacityAlertRecord, StoreError>;
    fn update_alert(&self, record: CapacityAlertRecord)
        -> Result<CapacityAlertRecord, StoreError>;
    fn alert(&self, id: &AlertId) -> Result<Option<CapacityAlertRecord>, StoreError>;
    /// The unacknowledged alert for a partition and kind, if one is open.
    fn open_alert(
        &self,
        key: &CohortKey,
        kind: AlertKind,
    ) -> Result<Option<CapacityAlertRecord>, StoreError>;
    fn open_alerts(&self) -> Result<Vec<CapacityAlertRecord>, StoreError>;
}
