// crates/leaseflow/src/jobs/error_codes.rs

/// How a caller should treat a job outcome when aggregating a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Bad startup wiring. Fatal, never retried.
    Configuration,
    /// The record or payload is defective and will fail the same way again.
    Permanent,
    /// Another worker owns or already finished the job. Skip it.
    Conflict,
    /// The handler failed. The job is requeued for the next poll.
    Recoverable,
    /// The row store rejected a write.
    Storage,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Permanent => "permanent",
            Self::Conflict => "conflict",
            Self::Recoverable => "recoverable",
            Self::Storage => "storage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidRecord,
    AlreadyReserved,
    ReservationFailed,
    NotFound,
    BadPayload,
    MissingType,
    BadPayloadShape,
    UnknownJobType,
    HandlerFailed,
    CompletionFailed,
    WorkerAborted,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRecord => "INVALID_RECORD",
            Self::AlreadyReserved => "ALREADY_RESERVED",
            Self::ReservationFailed => "RESERVATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::BadPayload => "BAD_PAYLOAD",
            Self::MissingType => "MISSING_TYPE",
            Self::BadPayloadShape => "BAD_PAYLOAD_SHAPE",
            Self::UnknownJobType => "UNKNOWN_JOB_TYPE",
            Self::HandlerFailed => "HANDLER_FAILED",
            Self::CompletionFailed => "COMPLETION_FAILED",
            Self::WorkerAborted => "WORKER_ABORTED",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRecord
            | Self::BadPayload
            | Self::MissingType
            | Self::BadPayloadShape
            | Self::UnknownJobType => ErrorClass::Permanent,
            Self::AlreadyReserved | Self::NotFound => ErrorClass::Conflict,
            Self::HandlerFailed | Self::WorkerAborted => ErrorClass::Recoverable,
            Self::ReservationFailed | Self::CompletionFailed => ErrorClass::Storage,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn suggested_action(code: ErrorCode) -> &'static str {
    match code {
        ErrorCode::InvalidRecord => "Row is missing its id or has negative attempts. Fix the producer.",
        ErrorCode::AlreadyReserved => "Another worker holds the lease. Nothing to do.",
        ErrorCode::ReservationFailed => {
            "Row store rejected the lease write. Check database health; the row is retried next poll."
        }
        ErrorCode::NotFound => "Row was deleted before it could be leased, usually by another worker.",
        ErrorCode::BadPayload => "Payload is not a JSON object. Fix the producer; this job will keep failing.",
        ErrorCode::MissingType => "Payload lacks a non-empty `type`. Fix the producer; this job will keep failing.",
        ErrorCode::BadPayloadShape => {
            "`data` or `options` must be objects. Fix the producer; this job will keep failing."
        }
        ErrorCode::UnknownJobType => "No handler is registered for this type. Register one or delete the row.",
        ErrorCode::HandlerFailed => "Inspect the handler error and logs. The job is requeued with attempts + 1.",
        ErrorCode::CompletionFailed => {
            "Job ran but its row could not be deleted. It will run again; the handler must be idempotent."
        }
        ErrorCode::WorkerAborted => {
            "Processing stopped outside the handler. The row stays leased until the lease expires."
        }
    }
}
