use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::error::AdmissionsError;

use super::super::clock::Clock;
use super::super::domain::{AlertId, CohortKey};
use super::super::enrollment::domain::EnrollmentStatus;
use super::super::store::{AlertStore, DecisionStore, EnrollmentStore, WaitlistStore};
use super::super::waitlist::domain::WaitlistStatus;
use super::domain::{
    AlertKind, AlertSeverity, CapacityAlertRecord, CapacitySnapshot, CohortOutcome,
    EnrollmentProjection, NEAR_CAPACITY_THRESHOLD, OVER_CAPACITY_THRESHOLD,
    UNDER_CAPACITY_THRESHOLD, VOLUME_DEVIATION_CEILING, VOLUME_DEVIATION_FLOOR,
    WAITLIST_GROWING_THRESHOLD,
};

/// Aggregated utilization, alerting, and projection over enrollment and
/// waitlist state. Capacity limits are configured per program and applied to
/// every cohort of that program; programs without a limit are not monitored.
pub struct CapacityMonitor<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    limits: Mutex<HashMap<String, u32>>,
    history: Mutex<Vec<CohortOutcome>>,
    default_yield_rate: f32,
}

struct PartitionCounts {
    confirmed: usize,
    pending: usize,
    waitlist: usize,
    offered: usize,
    accepted: usize,
    declined: usize,
}

impl<S> CapacityMonitor<S>
where
    S: DecisionStore + WaitlistStore + EnrollmentStore + AlertStore + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, default_yield_rate: f32) -> Self {
        Self {
            store,
            clock,
            limits: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            default_yield_rate,
        }
    }

    /// Configure a program's seat count and re-evaluate alerts for every
    /// cohort of that program. Returns the alerts raised or refreshed.
    pub fn update_capacity_limit(
        &self,
        program_id: &str,
        new_limit: u32,
    ) -> Result<Vec<CapacityAlertRecord>, AdmissionsError> {
        if new_limit == 0 {
            return Err(AdmissionsError::Validation(
                "capacity limit must be positive".to_string(),
            ));
        }
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(program_id.to_string(), new_limit);

        let now = self.clock.now();
        let mut alerts = Vec::new();
        for key in self.store.cohorts_for_program(program_id)? {
            alerts.extend(self.evaluate_partition(&key, new_limit, now)?);
        }

        info!(
            program = program_id,
            limit = new_limit,
            alerts = alerts.len(),
            "capacity limit updated"
        );
        Ok(alerts)
    }

    /// Point-in-time utilization for one partition. Fails with NotFound when
    /// the program has no configured limit.
    pub fn current_capacity(
        &self,
        program_id: &str,
        start_date: NaiveDate,
    ) -> Result<CapacitySnapshot, AdmissionsError> {
        let limit = self.limit_for(program_id)?;
        let key = CohortKey::new(program_id, start_date);
        let counts = self.partition_counts(&key)?;

        let utilization_rate = utilization(counts.confirmed, limit);
        let yield_rate = self.historical_yield_rate(program_id);
        let projected_final_enrollment =
            counts.confirmed as f32 + counts.pending as f32 * yield_rate;

        Ok(CapacitySnapshot {
            program_id: key.program_id,
            start_date: key.start_date,
            total_capacity: limit,
            confirmed_count: counts.confirmed,
            pending_count: counts.pending,
            waitlist_size: counts.waitlist,
            utilization_rate,
            projected_final_enrollment,
            generated_at: self.clock.now(),
        })
    }

    /// Evaluate the fixed thresholds for every monitored partition, raising
    /// or refreshing one persisted alert per (partition, kind). Re-running
    /// against unchanged state yields the same alerts again.
    pub fn check_capacity_alerts(&self) -> Result<Vec<CapacityAlertRecord>, AdmissionsError> {
        let now = self.clock.now();
        let mut alerts = Vec::new();
        for key in self.store.cohorts()? {
            let Some(limit) = self.configured_limit(&key.program_id) else {
                continue;
            };
            alerts.extend(self.evaluate_partition(&key, limit, now)?);
        }
        Ok(alerts)
    }

    /// Blend historical yield, the application-volume deviation, and the
    /// waitlist conversion rate into a forecast for one partition.
    pub fn enrollment_projection(
        &self,
        program_id: &str,
        start_date: NaiveDate,
    ) -> Result<EnrollmentProjection, AdmissionsError> {
        let limit = self.limit_for(program_id)?;
        let key = CohortKey::new(program_id, start_date);
        let counts = self.partition_counts(&key)?;
        let applications = self.store.application_count(&key)?;

        let historical_yield_rate = self.historical_yield_rate(program_id);
        let volume_deviation_factor = self.volume_deviation_factor(program_id, applications);
        let responded = counts.offered + counts.accepted + counts.declined;
        let waitlist_conversion_rate = if responded == 0 {
            0.0
        } else {
            counts.accepted as f32 / responded as f32
        };

        let projected_enrollment = counts.confirmed as f32
            + counts.pending as f32 * historical_yield_rate * volume_deviation_factor
            + counts.waitlist as f32 * waitlist_conversion_rate;

        let history_depth = self.program_history(program_id).len().min(3);
        let mut confidence = 0.5 + 0.1 * history_depth as f32
            - (volume_deviation_factor - 1.0).abs();
        if waitlist_conversion_rate > 0.0 {
            confidence += 0.1;
        }
        let confidence = confidence.clamp(0.1, 0.95);

        let mut recommended_actions = Vec::new();
        if projected_enrollment > limit as f32 {
            recommended_actions.push(
                "projected enrollment exceeds capacity; consider opening an additional cohort"
                    .to_string(),
            );
        }
        if projected_enrollment < 0.7 * limit as f32 {
            recommended_actions.push(
                "projected enrollment is below 70% of capacity; consider a recruitment push"
                    .to_string(),
            );
        }

        Ok(EnrollmentProjection {
            program_id: key.program_id,
            start_date: key.start_date,
            total_capacity: limit,
            projected_enrollment,
            historical_yield_rate,
            volume_deviation_factor,
            waitlist_conversion_rate,
            confidence,
            recommended_actions,
            generated_at: self.clock.now(),
        })
    }

    /// Close an open alert. Acknowledged alerts are immutable; a later
    /// re-evaluation of the same condition opens a fresh row.
    pub fn acknowledge_alert(
        &self,
        alert_id: &AlertId,
        acknowledged_by: &str,
    ) -> Result<CapacityAlertRecord, AdmissionsError> {
        let mut alert = self
            .store
            .alert(alert_id)?
            .ok_or_else(|| AdmissionsError::not_found("alert", alert_id.0.clone()))?;
        if alert.acknowledged {
            return Err(AdmissionsError::invalid_state(
                "alert",
                alert.id.0.clone(),
                "alert is already acknowledged",
            ));
        }

        let now = self.clock.now();
        alert.acknowledged = true;
        alert.acknowledged_by = Some(acknowledged_by.to_string());
        alert.acknowledged_at = Some(now);
        alert.updated_at = now;
        let stored = self.store.update_alert(alert)?;

        info!(
            alert = %stored.id.0,
            kind = stored.kind.label(),
            by = acknowledged_by,
            "capacity alert acknowledged"
        );
        Ok(stored)
    }

    pub fn open_alerts(&self) -> Result<Vec<CapacityAlertRecord>, AdmissionsError> {
        Ok(self.store.open_alerts()?)
    }

    /// Replace the historical cohort outcomes feeding yield and volume
    /// statistics, typically from a registrar export.
    pub fn set_history(&self, outcomes: Vec<CohortOutcome>) {
        let count = outcomes.len();
        *self.history.lock().unwrap_or_else(PoisonError::into_inner) = outcomes;
        info!(cohorts = count, "historical cohort outcomes loaded");
    }

    pub fn history(&self) -> Vec<CohortOutcome> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn evaluate_partition(
        &self,
        key: &CohortKey,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CapacityAlertRecord>, AdmissionsError> {
        let counts = self.partition_counts(key)?;
        let utilization_rate = utilization(counts.confirmed, limit);

        let mut findings: Vec<(AlertKind, AlertSeverity, String)> = Vec::new();
        if utilization_rate >= OVER_CAPACITY_THRESHOLD {
            findings.push((
                AlertKind::OverCapacity,
                AlertSeverity::Critical,
                format!(
                    "{} is at {utilization_rate:.0}% of capacity ({} confirmed of {} seats)",
                    key.label(),
                    counts.confirmed,
                    limit
                ),
            ));
        } else if utilization_rate >= NEAR_CAPACITY_THRESHOLD {
            findings.push((
                AlertKind::NearCapacity,
                AlertSeverity::High,
                format!(
                    "{} is at {utilization_rate:.0}% of capacity ({} confirmed of {} seats)",
                    key.label(),
                    counts.confirmed,
                    limit
                ),
            ));
        } else if utilization_rate <= UNDER_CAPACITY_THRESHOLD {
            findings.push((
                AlertKind::UnderCapacity,
                AlertSeverity::Medium,
                format!(
                    "{} is at {utilization_rate:.0}% of capacity ({} confirmed of {} seats)",
                    key.label(),
                    counts.confirmed,
                    limit
                ),
            ));
        }
        if counts.waitlist >= WAITLIST_GROWING_THRESHOLD {
            findings.push((
                AlertKind::WaitlistGrowing,
                AlertSeverity::Medium,
                format!(
                    "waitlist for {} has grown to {} active entries",
                    key.label(),
                    counts.waitlist
                ),
            ));
        }

        let mut alerts = Vec::with_capacity(findings.len());
        for (kind, severity, message) in findings {
            let draft = CapacityAlertRecord {
                id: AlertId::generate(),
                program_id: key.program_id.clone(),
                start_date: key.start_date,
                kind,
                severity,
                message,
                utilization_rate,
                waitlist_size: counts.waitlist,
                raised_at: now,
                acknowledged: false,
                acknowledged_by: None,
                acknowledged_at: None,
                version: 0,
                updated_at: now,
            };
            let alert = self.upsert_alert(key, draft)?;
            if alert.kind == AlertKind::OverCapacity {
                warn!(
                    cohort = %key.label(),
                    utilization = utilization_rate,
                    "cohort is over capacity"
                );
            }
            alerts.push(alert);
        }
        Ok(alerts)
    }

    /// Refresh the open row for this partition and kind if one exists,
    /// keeping its id and raised-at; otherwise persist the draft.
    fn upsert_alert(
        &self,
        key: &CohortKey,
        draft: CapacityAlertRecord,
    ) -> Result<CapacityAlertRecord, AdmissionsError> {
        if let Some(mut open) = self.store.open_alert(key, draft.kind)? {
            open.severity = draft.severity;
            open.message = draft.message;
            open.utilization_rate = draft.utilization_rate;
            open.waitlist_size = draft.waitlist_size;
            open.updated_at = draft.updated_at;
            return Ok(self.store.update_alert(open)?);
        }
        Ok(self.store.insert_alert(draft)?)
    }

    fn partition_counts(&self, key: &CohortKey) -> Result<PartitionCounts, AdmissionsError> {
        let mut counts = PartitionCounts {
            confirmed: 0,
            pending: 0,
            waitlist: 0,
            offered: 0,
            accepted: 0,
            declined: 0,
        };

        for record in self.store.enrollments_for_cohort(key)? {
            match record.status {
                EnrollmentStatus::Confirmed | EnrollmentStatus::Enrolled => counts.confirmed += 1,
                EnrollmentStatus::PendingConfirmation => counts.pending += 1,
                EnrollmentStatus::Expired | EnrollmentStatus::Withdrawn => {}
            }
        }
        for entry in self.store.partition_entries(key)? {
            match entry.status {
                WaitlistStatus::Active => counts.waitlist += 1,
                WaitlistStatus::OfferedAdmission => counts.offered += 1,
                WaitlistStatus::AcceptedOffer => counts.accepted += 1,
                WaitlistStatus::DeclinedOffer => counts.declined += 1,
                WaitlistStatus::Expired | WaitlistStatus::Removed => {}
            }
        }

        Ok(counts)
    }

    fn program_history(&self, program_id: &str) -> Vec<CohortOutcome> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|outcome| outcome.program_id == program_id)
            .cloned()
            .collect()
    }

    fn historical_yield_rate(&self, program_id: &str) -> f32 {
        let rates: Vec<f32> = self
            .program_history(program_id)
            .iter()
            .filter_map(CohortOutcome::yield_rate)
            .collect();
        if rates.is_empty() {
            return self.default_yield_rate;
        }
        rates.iter().sum::<f32>() / rates.len() as f32
    }

    fn volume_deviation_factor(&self, program_id: &str, current_applications: usize) -> f32 {
        let history = self.program_history(program_id);
        if history.is_empty() {
            return 1.0;
        }
        let mean = history
            .iter()
            .map(|outcome| outcome.applications as f32)
            .sum::<f32>()
            / history.len() as f32;
        if mean <= 0.0 {
            return 1.0;
        }
        (current_applications as f32 / mean).clamp(VOLUME_DEVIATION_FLOOR, VOLUME_DEVIATION_CEILING)
    }

    fn configured_limit(&self, program_id: &str) -> Option<u32> {
        self.limits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(program_id)
            .copied()
    }

    fn limit_for(&self, program_id: &str) -> Result<u32, AdmissionsError> {
        self.configured_limit(program_id)
            .ok_or_else(|| AdmissionsError::not_found("capacity limit", program_id.to_string()))
    }
}

/// Multiply before dividing so whole-number scenarios come out exact.
fn utilization(confirmed: usize, limit: u32) -> f32 {
    confirmed as f32 * 100.0 / limit as f32
}
