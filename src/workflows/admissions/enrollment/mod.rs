//! Enrollment confirmation workflow for accepted applicants.
//!
//! A record opens in pending-confirmation, is confirmed before its deadline,
//! and becomes enrolled only once the deposit is settled and every admission
//! condition is fulfilled. The enrolled status is derived, never written
//! directly.

pub mod domain;
pub mod service;

pub use domain::{
    ConditionKind, ConditionRequest, EnrollmentCondition, EnrollmentRecord, EnrollmentRequest,
    EnrollmentStatus,
};
pub use service::EnrollmentManager;
