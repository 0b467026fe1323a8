use std::sync::Arc;
use std::time::Duration as TickInterval;

use chrono::Duration;

use super::common::*;
use crate::workflows::admissions::clock::{Clock, ManualClock};
use crate::workflows::admissions::domain::{ApplicationId, Decision};
use crate::workflows::admissions::enrollment::{EnrollmentManager, EnrollmentStatus};
use crate::workflows::admissions::store::MemoryStore;
use crate::workflows::admissions::sweep::{DeadlineSweeper, SweepReport};
use crate::workflows::admissions::waitlist::{PriorityTier, WaitlistRegistry, WaitlistStatus};

struct SweepFixture {
    waitlist: Arc<WaitlistRegistry<MemoryStore, RecordingDispatcher>>,
    enrollment: Arc<EnrollmentManager<MemoryStore, RecordingDispatcher>>,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
}

impl SweepFixture {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let clock = manual_clock();
        let waitlist = Arc::new(WaitlistRegistry::new(
            store.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let enrollment = Arc::new(EnrollmentManager::new(
            store.clone(),
            dispatcher,
            clock.clone(),
        ));
        Self {
            waitlist,
            enrollment,
            store,
            clock,
        }
    }

    fn sweeper(&self, interval: TickInterval) -> DeadlineSweeper<MemoryStore, RecordingDispatcher> {
        DeadlineSweeper::new(
            self.waitlist.clone(),
            self.enrollment.clone(),
            interval,
            Duration::hours(48),
        )
    }

    fn seed_offer(&self, id: &str, deadline_in: Duration) -> ApplicationId {
        let application_id =
            seed_application(self.store.as_ref(), id, "MSCS", Decision::Waitlisted);
        self.waitlist
            .add_to_waitlist(&application_id, PriorityTier::Medium, Vec::new())
            .expect("waitlist add");
        let deadline = self.clock.now() + deadline_in;
        self.waitlist
            .offer_admission_from_waitlist(&application_id, deadline)
            .expect("offer");
        application_id
    }

    fn seed_pending_enrollment(&self, id: &str, deadline_in: Duration) -> ApplicationId {
        let application_id =
            seed_application(self.store.as_ref(), id, "MSCS", Decision::Accepted);
        let deadline = self.clock.now() + deadline_in;
        self.enrollment
            .create_enrollment_confirmation(enrollment_request(
                &application_id,
                deadline,
                500,
                Vec::new(),
            ))
            .expect("enrollment created");
        application_id
    }
}

#[test]
fn tick_expires_both_families_and_counts_warnings() {
    let fixture = SweepFixture::new();
    let lapsed_offer = fixture.seed_offer("app-500", Duration::days(1));
    let lapsed_enrollment = fixture.seed_pending_enrollment("app-501", Duration::days(1));
    fixture.seed_offer("app-502", Duration::days(4));
    fixture.seed_pending_enrollment("app-503", Duration::days(3));

    fixture.clock.advance(Duration::days(2));
    let sweeper = fixture.sweeper(TickInterval::from_secs(300));
    let report = sweeper.tick().expect("sweep pass");
    assert_eq!(
        report,
        SweepReport {
            expired_offers: 1,
            expired_enrollments: 1,
            deadline_warnings: 2,
        }
    );

    let offer = fixture
        .waitlist
        .entry_for_application(&lapsed_offer)
        .expect("entry fetch")
        .expect("entry present");
    assert_eq!(offer.status, WaitlistStatus::Expired);
    let enrollment = fixture
        .enrollment
        .enrollment_for_application(&lapsed_enrollment)
        .expect("enrollment fetch")
        .expect("enrollment present");
    assert_eq!(enrollment.status, EnrollmentStatus::Expired);

    // Nothing left to expire; the outstanding deadlines are still warned.
    let repeat = sweeper.tick().expect("repeat pass");
    assert_eq!(
        repeat,
        SweepReport {
            expired_offers: 0,
            expired_enrollments: 0,
            deadline_warnings: 2,
        }
    );
}

#[tokio::test]
async fn run_loop_sweeps_in_the_background() {
    let fixture = SweepFixture::new();
    let lapsed = fixture.seed_offer("app-504", Duration::hours(1));
    fixture.clock.advance(Duration::hours(2));

    let sweeper = Arc::new(fixture.sweeper(TickInterval::from_millis(5)));
    let handle = tokio::spawn({
        let sweeper = sweeper.clone();
        async move { sweeper.run().await }
    });
    tokio::time::sleep(TickInterval::from_millis(50)).await;
    handle.abort();

    let entry = fixture
        .waitlist
        .entry_for_application(&lapsed)
        .expect("entry fetch")
        .expect("entry present");
    assert_eq!(entry.status, WaitlistStatus::Expired);
}
