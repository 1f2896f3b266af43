use std::time::Duration;

use crate::jobs::processor::{ProcessorConfig, DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_WORKERS};

/// Runtime configuration, read from the environment (and `.env` if present).
///
/// Every `LEASEFLOW_*` key falls back to its un-prefixed name.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub worker_id: String,
    pub lease_timeout: Duration,
    pub max_workers: usize,
    pub batch_size: i64,
    pub poll_interval: Duration,
    pub migrate_on_startup: bool,
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |primary: &str, fallback: &str| {
            lookup(primary)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| lookup(fallback).filter(|s| !s.trim().is_empty()))
        };

        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let worker_id = get("LEASEFLOW_WORKER_ID", "WORKER_ID")
            .or_else(|| lookup("HOSTNAME"))
            .unwrap_or_else(|| "worker-1".to_string());

        let lease_timeout = get("LEASEFLOW_LEASE_SECONDS", "LEASE_SECONDS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LEASE_TIMEOUT);

        let max_workers = get("LEASEFLOW_MAX_WORKERS", "MAX_WORKERS")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MAX_WORKERS)
            .max(1);

        let batch_size = get("LEASEFLOW_BATCH_SIZE", "BATCH_SIZE")
            .and_then(|s| s.trim().parse::<i64>().ok())
            .unwrap_or(50)
            .clamp(1, 10_000);

        let poll_interval = get("LEASEFLOW_POLL_INTERVAL_MS", "POLL_INTERVAL_MS")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(1));

        let migrate_on_startup = get("LEASEFLOW_MIGRATE_ON_STARTUP", "MIGRATE_ON_STARTUP")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        let log_json = get("LEASEFLOW_LOG_JSON", "LOG_JSON")
            .map(|v| is_truthy(&v))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            worker_id,
            lease_timeout,
            max_workers,
            batch_size,
            poll_interval,
            migrate_on_startup,
            log_json,
        })
    }

    pub fn processor(&self) -> ProcessorConfig {
        ProcessorConfig {
            lease_timeout: self.lease_timeout,
            max_workers: self.max_workers,
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
