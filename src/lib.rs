//! Post-decision admissions processing for university enrollment management.
//!
//! The crate covers the stretch between a released admission decision and a
//! settled cohort: appeal workflows, ranked waitlists with admission offers,
//! enrollment confirmation with deposits and conditions, and capacity
//! monitoring with alerting and projections. See
//! [`workflows::admissions`] for the service surface and
//! [`workflows::registrar`] for historical outcome imports.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
