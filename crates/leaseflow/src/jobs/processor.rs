use anyhow::anyhow;
use chrono::Utc;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info_span, warn, Instrument, Span};

use crate::jobs::adapter::{self, lease_expires_at, lease_is_active, parse_reserved_at};
use crate::jobs::context::ExecutionContext;
use crate::jobs::error::JobError;
use crate::jobs::model::{JobData, JobRecord, JobState};
use crate::jobs::pool::{JobOutcome, WorkerPool};
use crate::jobs::registry::{JobHandler, JobRegistry};
use crate::jobs::store::JobStore;

pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MAX_WORKERS: usize = 5;

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub lease_timeout: Duration,
    pub max_workers: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            lease_timeout: DEFAULT_LEASE_TIMEOUT,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

/// Runs single jobs through reserve → dispatch → complete/fail.
///
/// Cheap to clone; construct one at startup and share it.
#[derive(Clone)]
pub struct JobProcessor {
    registry: Arc<JobRegistry>,
    store: Arc<dyn JobStore>,
    config: ProcessorConfig,
}

impl std::fmt::Debug for JobProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobProcessor")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobProcessor {
    pub fn new(registry: Arc<JobRegistry>, store: Arc<dyn JobStore>) -> Self {
        Self {
            registry,
            store,
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Whether `record` is leased by someone else right now.
    pub fn is_reserved(&self, record: &JobRecord) -> bool {
        lease_is_active(
            parse_reserved_at(&record.reserved_at),
            Utc::now(),
            self.config.lease_timeout,
        )
    }

    /// Processes one job to a terminal state.
    ///
    /// `Ok(())` means the handler succeeded and the row was deleted.
    /// [`JobError::AlreadyReserved`] means another worker holds the lease and
    /// nothing was touched.
    pub async fn process_job(&self, record: &JobRecord) -> Result<(), JobError> {
        let span = info_span!(
            "job",
            job.id = %record.id,
            job.type = tracing::field::Empty,
            job.attempts = record.attempts,
        );
        self.run_lifecycle(record, span.clone()).instrument(span).await
    }

    /// Drains `records` through a pool of `max_workers` workers and returns
    /// one outcome per record. A worker count of zero is treated as one.
    pub async fn process_jobs_concurrently(
        &self,
        records: Vec<JobRecord>,
        max_workers: usize,
    ) -> Vec<JobOutcome> {
        WorkerPool::new(self.clone(), max_workers)
            .process_jobs(records)
            .await
    }

    /// [`JobProcessor::process_jobs_concurrently`] with the configured
    /// worker count.
    pub async fn process_batch(&self, records: Vec<JobRecord>) -> Vec<JobOutcome> {
        self.process_jobs_concurrently(records, self.config.max_workers)
            .await
    }

    async fn run_lifecycle(&self, record: &JobRecord, span: Span) -> Result<(), JobError> {
        transition(JobState::Pending, JobState::Validating);
        validate_record(record)?;

        let now = Utc::now();
        if let Some(reserved_at) = parse_reserved_at(&record.reserved_at) {
            if lease_is_active(Some(reserved_at), now, self.config.lease_timeout) {
                debug!("Job is leased by another worker, skipping…");
                return Err(JobError::AlreadyReserved {
                    id: record.id.clone(),
                    until: lease_expires_at(reserved_at, self.config.lease_timeout),
                });
            }
        }

        transition(JobState::Validating, JobState::Reserving);
        self.store
            .reserve(&record.id, now)
            .await
            .map_err(|source| {
                if source.is_not_found() {
                    JobError::NotFound(record.id.clone())
                } else {
                    JobError::Reservation {
                        id: record.id.clone(),
                        source,
                    }
                }
            })?;

        let job = match parse_and_validate(record) {
            Ok(job) => job,
            Err(err) => return Err(self.fail_job(record, err).await),
        };
        span.record("job.type", job.job_type.as_str());

        let handler = match self.registry.get_handler(&job.job_type) {
            Ok(handler) => handler,
            Err(_) => {
                let err = JobError::HandlerNotFound(job.job_type.clone());
                return Err(self.fail_job(record, err).await);
            }
        };

        transition(JobState::Reserving, JobState::Dispatching);
        let ctx = ExecutionContext::new(&job, span);
        match dispatch(handler.as_ref(), &ctx, &job).await {
            Ok(()) => self.complete_job(record).await,
            Err(err) => Err(self.fail_job(record, err).await),
        }
    }

    async fn complete_job(&self, record: &JobRecord) -> Result<(), JobError> {
        debug!("Deleting successful job…");
        match self.store.delete(&record.id).await {
            Ok(()) => {
                transition(JobState::Dispatching, JobState::Completed);
                Ok(())
            }
            Err(source) => {
                error!("Failed to delete completed job, it will run again: {source}");
                Err(JobError::Completion {
                    id: record.id.clone(),
                    source,
                })
            }
        }
    }

    /// Bumps `attempts`, releases the lease, and hands back `err`. A failure
    /// to persist is only logged; the caller still sees the original error.
    async fn fail_job(&self, record: &JobRecord, err: JobError) -> JobError {
        warn!(code = %err.code(), "Failed to run job: {err}");
        let attempts = record.attempts.saturating_add(1);
        if let Err(store_err) = self.store.release_failed(&record.id, attempts).await {
            warn!("Failed to release job after failure: {store_err}");
        }
        debug!(state = %JobState::Failed, attempts, "job state changed");
        err
    }
}

fn transition(from: JobState, to: JobState) {
    debug!(from = %from, to = %to, "job state changed");
}

fn validate_record(record: &JobRecord) -> Result<(), JobError> {
    if record.id.trim().is_empty() {
        return Err(JobError::InvalidRecord("record has no id".to_string()));
    }
    if record.attempts < 0 {
        return Err(JobError::InvalidRecord(format!(
            "record {} has negative attempts ({})",
            record.id, record.attempts
        )));
    }
    Ok(())
}

fn parse_and_validate(record: &JobRecord) -> Result<JobData, JobError> {
    let job = adapter::parse(record)?;
    adapter::validate(&job.id, &job.payload)?;
    Ok(job)
}

/// Runs the handler, turning a panic anywhere inside it into an ordinary
/// handler error.
async fn dispatch(
    handler: &dyn JobHandler,
    ctx: &ExecutionContext,
    job: &JobData,
) -> Result<(), JobError> {
    debug!("Running job…");
    AssertUnwindSafe(async { handler.handle(ctx, job).await })
        .catch_unwind()
        .await
        .map_err(|panic| try_to_extract_panic_info(panic.as_ref()))
        .and_then(std::convert::identity)
        .map_err(JobError::Handler)
}

fn try_to_extract_panic_info(info: &(dyn Any + Send + 'static)) -> anyhow::Error {
    anyhow!("job handler panicked: {}", panic_message(info))
}

pub(crate) fn panic_message<'a>(info: &'a (dyn Any + Send + 'static)) -> &'a str {
    if let Some(message) = info.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = info.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
