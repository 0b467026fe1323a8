//! Capacity monitoring and enrollment projection.
//!
//! Derives utilization snapshots per (program, start date) partition from
//! enrollment and waitlist state, evaluates fixed alert thresholds into
//! persisted alert rows, and blends historical yield with volume deviation
//! and waitlist conversion into a forecast.

pub mod domain;
pub mod monitor;

pub use domain::{
    AlertKind, AlertSeverity, CapacityAlertRecord, CapacitySnapshot, CohortOutcome,
    EnrollmentProjection, NEAR_CAPACITY_THRESHOLD, OVER_CAPACITY_THRESHOLD,
    UNDER_CAPACITY_THRESHOLD, WAITLIST_GROWING_THRESHOLD,
};
pub use monitor::CapacityMonitor;
