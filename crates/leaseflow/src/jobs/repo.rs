// crates/leaseflow/src/jobs/repo.rs

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::jobs::adapter::format_reserved_at;
use crate::jobs::error::StoreError;
use crate::jobs::model::{JobRecord, NewJob};
use crate::jobs::store::JobStore;
use crate::jobs::{boxed, BoxFuture};

const JOB_COLUMNS: &str =
    "id::text AS id, name, description, payload, attempts, reserved_at, created, updated";

/// POSIX regex for `reserved_at` as written by [`format_reserved_at`].
const CANONICAL_RESERVED_AT: &str =
    r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}\.[0-9]{3}Z$";

/// [`JobStore`] backed by the Postgres `jobs` table.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ----------------------------
    // Enqueue / reads
    // ----------------------------

    pub async fn enqueue(&self, job: NewJob) -> Result<JobRecord, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO jobs (id, name, description, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING {JOB_COLUMNS}
            "#
        );
        let record = sqlx::query_as::<_, JobRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(job.name)
            .bind(job.description)
            .bind(job.payload)
            .fetch_one(&self.pool)
            .await?;

        Ok(record)
    }

    pub async fn find(&self, id: &str) -> Result<JobRecord, StoreError> {
        let uuid = parse_id(id)?;
        let sql = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, JobRecord>(&sql)
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    /// The poller's batch query: rows that are unreserved or whose lease is
    /// older than `lease_timeout`, oldest first.
    ///
    /// `reserved_at` is compared as text. Every value this crate writes is
    /// fixed-width RFC 3339 UTC, so text order matches time order.
    pub async fn fetch_eligible(
        &self,
        lease_timeout: Duration,
        limit: i64,
    ) -> Result<Vec<JobRecord>, StoreError> {
        let cutoff = lease_cutoff(Utc::now(), lease_timeout);
        // Text order only matches time order for the fixed-width form this
        // crate writes. Anything else is handed to the processor's lease check.
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE reserved_at = ''
               OR reserved_at !~ $3
               OR reserved_at < $1
            ORDER BY created ASC, id ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, JobRecord>(&sql)
            .bind(format_reserved_at(cutoff))
            .bind(limit.clamp(1, 10_000))
            .bind(CANONICAL_RESERVED_AT)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    // ----------------------------
    // Lease writes
    // ----------------------------

    async fn set_reserved_at(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let uuid = parse_id(id)?;
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET reserved_at = $2,
                updated = now()
            WHERE id = $1
            "#,
        )
        .bind(uuid)
        .bind(format_reserved_at(at))
        .execute(&self.pool)
        .await?;

        expect_row(res.rows_affected(), id)
    }

    async fn mark_failed(&self, id: &str, attempts: i32) -> Result<(), StoreError> {
        let uuid = parse_id(id)?;
        let res = sqlx::query(
            r#"
            UPDATE jobs
            SET attempts = $2,
                reserved_at = '',
                updated = now()
            WHERE id = $1
            "#,
        )
        .bind(uuid)
        .bind(attempts)
        .execute(&self.pool)
        .await?;

        expect_row(res.rows_affected(), id)
    }

    async fn delete_job(&self, id: &str) -> Result<(), StoreError> {
        let uuid = parse_id(id)?;
        let res = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(uuid)
            .execute(&self.pool)
            .await?;

        expect_row(res.rows_affected(), id)
    }
}

impl JobStore for PgJobStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<JobRecord, StoreError>> {
        boxed(self.find(id))
    }

    fn reserve<'a>(
        &'a self,
        id: &'a str,
        at: DateTime<Utc>,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(self.set_reserved_at(id, at))
    }

    fn release_failed<'a>(
        &'a self,
        id: &'a str,
        attempts: i32,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(self.mark_failed(id, attempts))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        boxed(self.delete_job(id))
    }
}

/// Ids are opaque to the core; a string that is not a UUID cannot name a row.
fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::NotFound(id.to_string()))
}

fn expect_row(rows_affected: u64, id: &str) -> Result<(), StoreError> {
    if rows_affected == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

fn lease_cutoff(now: DateTime<Utc>, lease_timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lease_timeout)
        .ok()
        .and_then(|lease| now.checked_sub_signed(lease))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
