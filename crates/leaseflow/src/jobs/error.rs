use chrono::{DateTime, Utc};

use crate::jobs::error_codes::{ErrorClass, ErrorCode};

/// Failures raised by the durable row store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("job store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Startup-time misconfiguration of the [`JobRegistry`](crate::jobs::JobRegistry).
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler for job type {0:?} is already registered")]
    DuplicateHandler(String),

    #[error("invalid job handler: {0}")]
    InvalidHandler(String),

    #[error("no handler registered for job type {0:?}")]
    HandlerNotFound(String),
}

impl RegistryError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RegistryError::HandlerNotFound(_) => ErrorClass::Permanent,
            _ => ErrorClass::Configuration,
        }
    }
}

/// The terminal error of one job's processing attempt.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid job record: {0}")]
    InvalidRecord(String),

    #[error("job {id} is reserved until {until}")]
    AlreadyReserved { id: String, until: DateTime<Utc> },

    #[error("failed to reserve job {id}")]
    Reservation {
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("job {0} not found")]
    NotFound(String),

    #[error("malformed payload for job {id}: {reason}")]
    MalformedPayload { id: String, reason: String },

    #[error("payload for job {0} has no `type` string")]
    MissingType(String),

    #[error("payload for job {id} has a `{field}` member that is not an object")]
    InvalidPayloadShape { id: String, field: &'static str },

    #[error("no handler registered for job type {0:?}")]
    HandlerNotFound(String),

    /// The handler returned an error or panicked.
    #[error("{0:#}")]
    Handler(anyhow::Error),

    #[error("failed to delete completed job {id}")]
    Completion {
        id: String,
        #[source]
        source: StoreError,
    },

    /// Processing panicked outside the handler, e.g. inside a store call.
    /// The row is left as it was, possibly still leased.
    #[error("processing of job {id} aborted: {reason}")]
    Aborted { id: String, reason: String },
}

impl JobError {
    pub fn code(&self) -> ErrorCode {
        match self {
            JobError::InvalidRecord(_) => ErrorCode::InvalidRecord,
            JobError::AlreadyReserved { .. } => ErrorCode::AlreadyReserved,
            JobError::Reservation { .. } => ErrorCode::ReservationFailed,
            JobError::NotFound(_) => ErrorCode::NotFound,
            JobError::MalformedPayload { .. } => ErrorCode::BadPayload,
            JobError::MissingType(_) => ErrorCode::MissingType,
            JobError::InvalidPayloadShape { .. } => ErrorCode::BadPayloadShape,
            JobError::HandlerNotFound(_) => ErrorCode::UnknownJobType,
            JobError::Handler(_) => ErrorCode::HandlerFailed,
            JobError::Completion { .. } => ErrorCode::CompletionFailed,
            JobError::Aborted { .. } => ErrorCode::WorkerAborted,
        }
    }

    pub fn class(&self) -> ErrorClass {
        self.code().class()
    }

    /// Whether the failure went through the fail path, bumping `attempts`
    /// and releasing the lease.
    pub fn counts_as_attempt(&self) -> bool {
        matches!(
            self,
            JobError::MalformedPayload { .. }
                | JobError::MissingType(_)
                | JobError::InvalidPayloadShape { .. }
                | JobError::HandlerNotFound(_)
                | JobError::Handler(_)
        )
    }

    /// The record vanished between polling and processing, most likely
    /// because another worker completed it.
    pub fn is_not_found(&self) -> bool {
        match self {
            JobError::NotFound(_) => true,
            JobError::Completion { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}
