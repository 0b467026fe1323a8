use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::ApplicationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AppealSubmitted,
    ReviewerAssigned,
    AppealDecided,
    OfferMade,
    DeadlineApproaching,
    EnrollmentConfirmed,
    SeatReleased,
}

impl EventKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::AppealSubmitted => "appeal_submitted",
            Self::ReviewerAssigned => "reviewer_assigned",
            Self::AppealDecided => "appeal_decided",
            Self::OfferMade => "offer_made",
            Self::DeadlineApproaching => "deadline_approaching",
            Self::EnrollmentConfirmed => "enrollment_confirmed",
            Self::SeatReleased => "seat_released",
        }
    }
}

/// Payload handed to the notification collaborator. Delivery and retry are
/// owned entirely by that collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionsEvent {
    pub kind: EventKind,
    pub application_id: ApplicationId,
    pub details: BTreeMap<String, String>,
}

/// Trait describing the outbound notification hook (e-mail, SMS, or portal
/// adapters live behind it).
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, event: AdmissionsEvent) -> Result<(), DispatchError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Fire-and-forget send. A failed dispatch is logged with its full payload
/// and never rolls back the state transition that produced it.
pub(crate) fn dispatch_event<N: NotificationDispatcher>(dispatcher: &N, event: AdmissionsEvent) {
    if let Err(err) = dispatcher.dispatch(event.clone()) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        tracing::warn!(
            event = event.kind.label(),
            application_id = %event.application_id.0,
            payload = %payload,
            error = %err,
            "notification dispatch failed"
        );
    }
}
