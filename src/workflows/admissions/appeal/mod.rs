//! Appeal adjudication workflow.
//!
//! An appeal disputes a rejected or waitlisted decision: a review panel is
//! assigned on submission, recommendations accumulate until the panel
//! completes, and the committee then upholds, overturns, or defers. An
//! approved overturn rewrites the decision row and the application status
//! together with the appeal.

pub mod domain;
pub mod service;

pub use domain::{
    AppealDecision, AppealDecisionRequest, AppealDecisionType, AppealReason, AppealRecord,
    AppealRequest, AppealStatus, ReviewerAssignment, ReviewerRecommendation, ReviewerRole,
    TimelineEntry,
};
pub use service::AppealWorkflow;
