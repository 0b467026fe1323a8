//! Integration scenarios for capacity monitoring.
//!
//! Exercises the alert thresholds and enrollment projections over seeded
//! cohort state, including historical yields imported from a registrar CSV
//! export.

mod common {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

    use admissions_core::workflows::admissions::capacity::CapacityMonitor;
    use admissions_core::workflows::admissions::clock::ManualClock;
    use admissions_core::workflows::admissions::domain::{
        ApplicationId, ApplicationRecord, ApplicationStatus, Decision, DecisionId, DecisionRecord,
        EnrollmentId, WaitlistEntryId,
    };
    use admissions_core::workflows::admissions::enrollment::{EnrollmentRecord, EnrollmentStatus};
    use admissions_core::workflows::admissions::store::{
        DecisionStore, EnrollmentStore, MemoryStore, WaitlistStore,
    };
    use admissions_core::workflows::admissions::waitlist::{
        PriorityTier, WaitlistEntry, WaitlistStatus,
    };

    pub(super) fn start_of_term() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 9, 1).expect("valid date")
    }

    pub(super) fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    pub(super) fn build_monitor() -> (
        CapacityMonitor<MemoryStore>,
        Arc<MemoryStore>,
        Arc<ManualClock>,
    ) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::starting_at(base_time()));
        let monitor = CapacityMonitor::new(store.clone(), clock.clone(), 0.6);
        (monitor, store, clock)
    }

    fn seed_application(
        store: &MemoryStore,
        id: &str,
        program_id: &str,
        decision: Decision,
    ) -> ApplicationId {
        let application_id = ApplicationId(id.to_string());
        let now = base_time();
        store
            .insert_application(ApplicationRecord {
                id: application_id.clone(),
                applicant_id: format!("applicant-{id}"),
                program_id: program_id.to_string(),
                intended_start_date: start_of_term(),
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

    pub(super) fn seed_enrollment_rows(
        store: &MemoryStore,
        program_id: &str,
        prefix: &str,
        count: usize,
        status: EnrollmentStatus,
    ) {
        for index in 0..count {
            let id = format!("{prefix}-{index}");
            let application_id = seed_application(store, &id, program_id, Decision::Accepted);
            let now = base_time();
            store
                .insert_enrollment(EnrollmentRecord {
                    id: EnrollmentId::generate(),
                    application_id,
                    status,
                    deposit_amount: 500,
                    deposit_paid: !matches!(status, EnrollmentStatus::PendingConfirmation),
                    conditions: Vec::new(),
                    enrollment_deadline: now + Duration::days(30),
                    version: 0,
                    updated_at: now,
                })
                .expect("seed enrollment");
        }
    }

    pub(super) fn seed_waitlist_rows(
        store: &MemoryStore,
        program_id: &str,
        prefix: &str,
        count: usize,
        status: WaitlistStatus,
    ) {
        for index in 0..count {
            let id = format!("{prefix}-{index}");
            let application_id = seed_application(store, &id, program_id, Decision::Waitlisted);
            let now = base_time();
            store
                .insert_entry(WaitlistEntry {
                    id: WaitlistEntryId::generate(),
                    application_id,
                    program_id: program_id.to_string(),
                    start_date: start_of_term(),
                    priority_tier: PriorityTier::Medium,
                    position: None,
                    status,
                    interest_confirmed: false,
                    offer_deadline: None,
                    notes: Vec::new(),
                    added_at: now,
                    version: 0,
                    updated_at: now,
                })
                .expect("seed waitlist entry");
        }
    }
}

mod thresholds {
    use admissions_core::workflows::admissions::capacity::{AlertKind, AlertSeverity};
    use admissions_core::workflows::admissions::enrollment::EnrollmentStatus;

    use super::common::*;

    #[test]
    fn near_capacity_fires_exactly_at_whole_ratios() {
        let (monitor, store, _clock) = build_monitor();
        seed_enrollment_rows(store.as_ref(), "MSDS", "app", 46, EnrollmentStatus::Confirmed);

        let alerts = monitor
            .update_capacity_limit("MSDS", 50)
            .expect("limit configured");
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::NearCapacity);
        assert_eq!(alerts[0].severity, AlertSeverity::High);
        assert_eq!(alerts[0].utilization_rate, 92.0);
    }

    #[test]
    fn acknowledged_alerts_reopen_as_fresh_rows() {
        let (monitor, store, clock) = build_monitor();
        seed_enrollment_rows(store.as_ref(), "MSDS", "app", 3, EnrollmentStatus::Confirmed);

        let raised = monitor
            .update_capacity_limit("MSDS", 10)
            .expect("limit configured");
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].kind, AlertKind::UnderCapacity);

        monitor
            .acknowledge_alert(&raised[0].id, "registrar ops")
            .expect("acknowledgement");
        assert!(monitor.open_alerts().expect("open alerts").is_empty());

        clock.advance(chrono::Duration::hours(6));
        let reopened = monitor.check_capacity_alerts().expect("re-evaluation");
        assert_eq!(reopened.len(), 1);
        assert_ne!(reopened[0].id, raised[0].id);

        let open = monitor.open_alerts().expect("open alerts");
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, reopened[0].id);
    }
}

mod projections {
    use std::io::Cursor;

    use admissions_core::workflows::admissions::enrollment::EnrollmentStatus;
    use admissions_core::workflows::admissions::waitlist::WaitlistStatus;
    use admissions_core::workflows::registrar::RegistrarHistoryImporter;

    use super::common::*;

    #[test]
    fn registrar_history_drives_the_projection() {
        let (monitor, store, _clock) = build_monitor();
        seed_enrollment_rows(store.as_ref(), "MSDS", "app-conf", 2, EnrollmentStatus::Confirmed);
        seed_enrollment_rows(
            store.as_ref(),
            "MSDS",
            "app-pend",
            2,
            EnrollmentStatus::PendingConfirmation,
        );

        let export = "Program,Start Date,Applications,Offers Extended,Confirmed\n\
                      MSDS,2025-09-01,20,10,6\n\
                      MSDS,09/01/2024,10,5,2\n";
        let outcomes =
            RegistrarHistoryImporter::from_reader(Cursor::new(export)).expect("import succeeds");
        assert_eq!(outcomes.len(), 2);
        monitor.set_history(outcomes);
        assert_eq!(monitor.history().len(), 2);

        monitor
            .update_capacity_limit("MSDS", 10)
            .expect("limit configured");
        let projection = monitor
            .enrollment_projection("MSDS", start_of_term())
            .expect("projection");

        // Imported yields average to 0.5; four current applications against
        // a historical mean of fifteen clamps the volume factor at 0.8.
        assert!((projection.historical_yield_rate - 0.5).abs() < 1e-4);
        assert!((projection.volume_deviation_factor - 0.8).abs() < 1e-4);
        assert!((projection.projected_enrollment - 2.8).abs() < 1e-4);
        assert!((projection.confidence - 0.5).abs() < 1e-4);
        assert!(projection
            .recommended_actions
            .iter()
            .any(|action| action.contains("recruitment push")));
    }

    #[test]
    fn waitlist_conversion_lifts_the_projection() {
        let (monitor, store, _clock) = build_monitor();
        seed_enrollment_rows(store.as_ref(), "MSDS", "app-conf", 4, EnrollmentStatus::Confirmed);
        seed_waitlist_rows(store.as_ref(), "MSDS", "app-wl", 2, WaitlistStatus::Active);
        seed_waitlist_rows(store.as_ref(), "MSDS", "app-acc", 1, WaitlistStatus::AcceptedOffer);
        seed_waitlist_rows(store.as_ref(), "MSDS", "app-dec", 1, WaitlistStatus::DeclinedOffer);
        monitor
            .update_capacity_limit("MSDS", 10)
            .expect("limit configured");

        let projection = monitor
            .enrollment_projection("MSDS", start_of_term())
            .expect("projection");

        // No history, so the configured default yield applies; half of the
        // resolved offers converted, pulling one of two active entries in.
        assert!((projection.historical_yield_rate - 0.6).abs() < 1e-4);
        assert!((projection.volume_deviation_factor - 1.0).abs() < 1e-4);
        assert!((projection.waitlist_conversion_rate - 0.5).abs() < 1e-4);
        assert!((projection.projected_enrollment - 5.0).abs() < 1e-4);
        assert!((projection.confidence - 0.6).abs() < 1e-4);
    }
}
