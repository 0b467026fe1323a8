//! Shared error taxonomy for the admissions workflows.

use chrono::{DateTime, Utc};

use crate::workflows::admissions::store::StoreError;

/// Error raised by the appeal, waitlist, enrollment and capacity services.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionsError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{entity} {id} already exists")]
    AlreadyExists { entity: &'static str, id: String },
    #[error("{entity} {id} is in an invalid state: {detail}")]
    InvalidState {
        entity: &'static str,
        id: String,
        detail: String,
    },
    #[error("deadline {deadline} has passed")]
    DeadlineExceeded { deadline: DateTime<Utc> },
    #[error("deposit of {required} required, received {received}")]
    InsufficientPayment { required: u32, received: u32 },
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AdmissionsError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_state(
        entity: &'static str,
        id: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            entity,
            id: id.into(),
            detail: detail.into(),
        }
    }
}
