#![allow(dead_code)]

use anyhow::anyhow;
use chrono::{Duration as ChronoDuration, Utc};
use leaseflow::jobs::adapter::format_reserved_at;
use leaseflow::jobs::{
    boxed, BoxFuture, ExecutionContext, JobData, JobHandler, JobPayload, JobProcessor, JobRecord,
    JobRegistry, JobStore, MemoryJobStore, NewJob, StoreError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub fn envelope(job_type: &str) -> JobPayload {
    JobPayload::new(job_type)
        .with_data(json!({}))
        .and_then(|payload| payload.with_options(json!({})))
        .unwrap()
}

pub fn payload(job_type: &str) -> Value {
    envelope(job_type).into()
}

pub fn enqueue(store: &MemoryJobStore, job_type: &str) -> JobRecord {
    store.insert(NewJob::typed(format!("{job_type} job"), envelope(job_type)))
}

pub fn enqueue_raw(store: &MemoryJobStore, payload: Value) -> JobRecord {
    store.insert(NewJob::new("raw job", payload))
}

/// Rewrites the stored row as if a worker reserved it `ago` in the past.
pub fn reserve_ago(store: &MemoryJobStore, record: &JobRecord, ago: ChronoDuration) -> JobRecord {
    let mut leased = record.clone();
    leased.reserved_at = format_reserved_at(Utc::now() - ago);
    store.put(leased.clone());
    leased
}

pub fn processor(registry: JobRegistry, store: Arc<dyn JobStore>) -> JobProcessor {
    JobProcessor::new(Arc::new(registry), store)
}

/// Counts calls and either succeeds or fails with a fixed message.
pub struct CountingHandler {
    job_type: String,
    calls: Arc<AtomicUsize>,
    fail_with: Option<String>,
}

impl CountingHandler {
    pub fn ok(job_type: &str) -> Self {
        Self {
            job_type: job_type.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
        }
    }

    pub fn failing(job_type: &str, message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::ok(job_type)
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl JobHandler for CountingHandler {
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle<'a>(
        &'a self,
        _ctx: &'a ExecutionContext,
        _job: &'a JobData,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        boxed(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.fail_with {
                Some(message) => Err(anyhow!("{message}")),
                None => Ok(()),
            }
        })
    }
}

pub struct PanickingHandler {
    pub job_type: &'static str,
    pub message: &'static str,
}

impl JobHandler for PanickingHandler {
    fn job_type(&self) -> &str {
        self.job_type
    }

    fn handle<'a>(
        &'a self,
        _ctx: &'a ExecutionContext,
        _job: &'a JobData,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        boxed(async move {
            if !self.message.is_empty() {
                panic!("{}", self.message);
            }
            Ok(())
        })
    }
}

/// A [`MemoryJobStore`] whose writes can be switched to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryJobStore,
    pub fail_reserve: AtomicBool,
    pub fail_release: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyStore {
    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{what} rejected")));
        }
        Ok(())
    }
}

impl JobStore for FlakyStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JobRecord, StoreError>> {
        self.inner.get(id)
    }

    fn reserve<'a>(
        &'a self,
        id: &'a str,
        at: chrono::DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            Self::check(&self.fail_reserve, "reserve")?;
            self.inner.reserve(id, at).await
        })
    }

    fn release_failed<'a>(
        &'a self,
        id: &'a str,
        attempts: i32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            Self::check(&self.fail_release, "release")?;
            self.inner.release_failed(id, attempts).await
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            Self::check(&self.fail_delete, "delete")?;
            self.inner.delete(id).await
        })
    }
}

/// A [`MemoryJobStore`] that panics when asked to reserve one given job.
pub struct PanickingStore {
    pub inner: MemoryJobStore,
    pub panic_on: String,
}

impl JobStore for PanickingStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JobRecord, StoreError>> {
        self.inner.get(id)
    }

    fn reserve<'a>(
        &'a self,
        id: &'a str,
        at: chrono::DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            if id == self.panic_on {
                panic!("connection pool poisoned");
            }
            self.inner.reserve(id, at).await
        })
    }

    fn release_failed<'a>(
        &'a self,
        id: &'a str,
        attempts: i32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        self.inner.release_failed(id, attempts)
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        self.inner.delete(id)
    }
}
