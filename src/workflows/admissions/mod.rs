//! Post-decision admissions workflows.
//!
//! Everything in this tree runs after an admission decision has been
//! released: appeals against the decision, the ranked waitlist, enrollment
//! confirmation with deposits and conditions, and capacity monitoring over
//! the confirmed cohorts. Services are generic over the storage traits in
//! [`store`] and the [`events::NotificationDispatcher`] seam so tests and
//! callers can supply their own backends.

pub mod appeal;
pub mod capacity;
pub mod clock;
pub mod domain;
pub mod enrollment;
pub mod events;
pub(crate) mod locks;
pub mod store;
pub mod sweep;
pub mod waitlist;

#[cfg(test)]
mod tests;

pub use appeal::AppealWorkflow;
pub use capacity::CapacityMonitor;
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::{
    AlertId, AppealId, ApplicationId, ApplicationRecord, ApplicationStatus, CohortKey,
    ConditionId, Decision, DecisionId, DecisionRecord, EnrollmentId, ReviewerId, WaitlistEntryId,
};
pub use enrollment::EnrollmentManager;
pub use events::{AdmissionsEvent, DispatchError, EventKind, NotificationDispatcher};
pub use store::{
    AlertStore, AppealStore, DecisionStore, EnrollmentStore, MemoryStore, StoreError,
    WaitlistStore,
};
pub use sweep::{DeadlineSweeper, SweepReport};
pub use waitlist::WaitlistRegistry;
