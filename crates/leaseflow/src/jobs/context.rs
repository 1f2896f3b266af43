use chrono::{DateTime, Utc};
use tracing::Span;

use crate::jobs::model::JobData;

/// Per-attempt context handed to a [`JobHandler`](crate::jobs::JobHandler).
///
/// Progress reported here is emitted as structured `tracing` events inside
/// the job's span; the core has no other reporting channel.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    job_id: String,
    job_type: String,
    attempt: i32,
    started_at: DateTime<Utc>,
    span: Span,
}

impl ExecutionContext {
    pub(crate) fn new(job: &JobData, span: Span) -> Self {
        Self {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            attempt: job.attempts.saturating_add(1),
            started_at: Utc::now(),
            span,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// 1-based number of this attempt.
    pub fn attempt(&self) -> i32 {
        self.attempt
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn progress(&self, message: &str) {
        tracing::info!(parent: &self.span, attempt = self.attempt, "{message}");
    }

    pub fn progress_step(&self, message: &str, done: u64, total: u64) {
        tracing::info!(parent: &self.span, attempt = self.attempt, done, total, "{message}");
    }
}
