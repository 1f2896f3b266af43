use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::jobs::adapter::{format_reserved_at, lease_is_active, parse_reserved_at};
use crate::jobs::error::StoreError;
use crate::jobs::model::{JobRecord, NewJob};
use crate::jobs::{boxed, BoxFuture};

/// The durable row store the processor reads and writes.
///
/// Only two columns are ever mutated: `reserved_at` and `attempts`. None of
/// the writes are conditional, so two processes that both see an expired
/// lease can both reserve the same row; the last write wins.
pub trait JobStore: Send + Sync {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JobRecord, StoreError>>;

    /// Sets `reserved_at` to `at`.
    fn reserve<'a>(
        &'a self,
        id: &'a str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Stores the new `attempts` count and clears `reserved_at`.
    fn release_failed<'a>(
        &'a self,
        id: &'a str,
        attempts: i32,
    ) -> BoxFuture<'a, Result<(), StoreError>>;

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// In-process [`JobStore`] for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    rows: RwLock<HashMap<String, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: NewJob) -> JobRecord {
        let now = Utc::now();
        let record = JobRecord {
            id: Uuid::new_v4().to_string(),
            name: job.name,
            description: job.description,
            payload: job.payload,
            attempts: 0,
            reserved_at: String::new(),
            created: now,
            updated: now,
        };
        self.put(record.clone());
        record
    }

    /// Inserts or replaces a row verbatim.
    pub fn put(&self, record: JobRecord) {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        rows.insert(record.id.clone(), record);
    }

    pub fn find(&self, id: &str) -> Option<JobRecord> {
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        rows.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rows that are unreserved or whose lease has expired, oldest first.
    pub fn eligible(&self, lease_timeout: Duration, limit: usize) -> Vec<JobRecord> {
        let now = Utc::now();
        let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
        let mut eligible: Vec<JobRecord> = rows
            .values()
            .filter(|row| !lease_is_active(parse_reserved_at(&row.reserved_at), now, lease_timeout))
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.id.cmp(&b.id)));
        eligible.truncate(limit);
        eligible
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut JobRecord),
    {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        apply(row);
        row.updated = Utc::now();
        Ok(())
    }
}

impl JobStore for MemoryJobStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JobRecord, StoreError>> {
        boxed(async move { self.find(id).ok_or_else(|| StoreError::NotFound(id.to_string())) })
    }

    fn reserve<'a>(
        &'a self,
        id: &'a str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move { self.update(id, |row| row.reserved_at = format_reserved_at(at)) })
    }

    fn release_failed<'a>(
        &'a self,
        id: &'a str,
        attempts: i32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            self.update(id, |row| {
                row.attempts = attempts;
                row.reserved_at.clear();
            })
        })
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(async move {
            let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
            rows.remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
    }
}
