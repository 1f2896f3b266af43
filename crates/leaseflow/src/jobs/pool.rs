use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::jobs::error::JobError;
use crate::jobs::model::JobRecord;
use crate::jobs::processor::{panic_message, JobProcessor};

/// The terminal result of one record in a batch.
#[derive(Debug)]
pub struct JobOutcome {
    pub job_id: String,
    pub result: Result<(), JobError>,
}

impl JobOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs batches of jobs on a fixed number of concurrent workers.
///
/// There is no backpressure beyond the worker count and no way to cancel a
/// running handler. A batch takes roughly
/// `ceil(batch_len / workers) * slowest_job`.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    processor: JobProcessor,
    workers: usize,
}

impl WorkerPool {
    /// `workers == 0` is treated as one worker.
    pub fn new(processor: JobProcessor, workers: usize) -> Self {
        Self {
            processor,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Blocks until every record has been attempted. Returns exactly one
    /// outcome per record, in completion order. A failing job never stops
    /// its siblings, and a panic anywhere in processing becomes
    /// [`JobError::Aborted`] for that record.
    pub async fn process_jobs(&self, records: Vec<JobRecord>) -> Vec<JobOutcome> {
        if records.is_empty() {
            return Vec::new();
        }

        let total = records.len();
        let concurrency = self.workers.min(total);
        debug!(jobs = total, workers = concurrency, "Processing job batch…");

        let (work_tx, work_rx) = mpsc::channel::<JobRecord>(total);
        for record in records {
            // Capacity covers the whole batch and the receiver is alive.
            let _ = work_tx.send(record).await;
        }
        drop(work_tx);

        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<JobOutcome>(total);

        let mut workers = JoinSet::new();
        for worker in 0..concurrency {
            let processor = self.processor.clone();
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();

            workers.spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some(record) = next else {
                        break;
                    };

                    let result = AssertUnwindSafe(processor.process_job(&record))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            let reason = panic_message(panic.as_ref()).to_string();
                            error!(job.id = %record.id, "job processing panicked: {reason}");
                            Err(JobError::Aborted {
                                id: record.id.clone(),
                                reason,
                            })
                        });
                    let outcome = JobOutcome {
                        job_id: record.id,
                        result,
                    };
                    if result_tx.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!(worker, "worker drained");
            });
        }
        drop(result_tx);

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!("job worker task failed: {err}");
            }
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = result_rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}
