use std::sync::Arc;
use std::time::Duration as TickInterval;

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::AdmissionsError;

use super::enrollment::EnrollmentManager;
use super::events::NotificationDispatcher;
use super::store::{DecisionStore, EnrollmentStore, WaitlistStore};
use super::waitlist::WaitlistRegistry;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired_offers: usize,
    pub expired_enrollments: usize,
    pub deadline_warnings: usize,
}

/// Periodic deadline sweep over waitlist offers and enrollment
/// confirmations. Each pass is idempotent, so overlapping or repeated runs
/// cannot double-expire anything.
pub struct DeadlineSweeper<S, N> {
    waitlist: Arc<WaitlistRegistry<S, N>>,
    enrollment: Arc<EnrollmentManager<S, N>>,
    interval: TickInterval,
    warning_window: Duration,
}

impl<S, N> DeadlineSweeper<S, N>
where
    S: DecisionStore + WaitlistStore + EnrollmentStore + 'static,
    N: NotificationDispatcher + 'static,
{
    pub fn new(
        waitlist: Arc<WaitlistRegistry<S, N>>,
        enrollment: Arc<EnrollmentManager<S, N>>,
        interval: TickInterval,
        warning_window: Duration,
    ) -> Self {
        Self {
            waitlist,
            enrollment,
            interval,
            warning_window,
        }
    }

    /// One synchronous pass: expire lapsed offers and confirmations, then
    /// warn about deadlines falling inside the warning window.
    pub fn tick(&self) -> Result<SweepReport, AdmissionsError> {
        let expired_offers = self.waitlist.check_waitlist_deadlines()?.len();
        let expired_enrollments = self.enrollment.check_enrollment_deadlines()?.len();
        let deadline_warnings = self
            .waitlist
            .notify_approaching_offer_deadlines(self.warning_window)?
            + self
                .enrollment
                .notify_approaching_confirmation_deadlines(self.warning_window)?;

        let report = SweepReport {
            expired_offers,
            expired_enrollments,
            deadline_warnings,
        };
        info!(
            expired_offers = report.expired_offers,
            expired_enrollments = report.expired_enrollments,
            deadline_warnings = report.deadline_warnings,
            "deadline sweep complete"
        );
        Ok(report)
    }

    /// Run the sweep on a fixed interval until the owning task is dropped. A
    /// failed pass is logged and the next tick proceeds.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick() {
                warn!(error = %err, "deadline sweep failed");
            }
        }
    }
}
