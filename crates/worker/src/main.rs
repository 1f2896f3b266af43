use leaseflow::config::Config;
use leaseflow::db;
use leaseflow::jobs::error_codes::suggested_action;
use leaseflow::jobs::{ErrorClass, JobOutcome, JobProcessor, PgJobStore};

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod handlers;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    init_tracing(cfg.log_json);

    info!(
        worker_id = %cfg.worker_id,
        lease_secs = cfg.lease_timeout.as_secs(),
        max_workers = cfg.max_workers,
        batch_size = cfg.batch_size,
        poll_interval_ms = cfg.poll_interval.as_millis() as u64,
        migrate_on_startup = cfg.migrate_on_startup,
        "leaseflow worker starting…"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let store = Arc::new(PgJobStore::new(pool));
    let registry = Arc::new(handlers::build_registry()?);
    let mut job_types = registry.list_handlers();
    job_types.sort();
    info!(?job_types, "registered job handlers");

    let processor = JobProcessor::new(registry, store.clone()).with_config(cfg.processor());

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let batch = tokio::select! {
            res = &mut shutdown => {
                res?;
                info!("shutdown requested, stopping worker");
                break;
            }
            batch = store.fetch_eligible(cfg.lease_timeout, cfg.batch_size) => batch,
        };

        let batch = match batch {
            Ok(batch) => batch,
            Err(err) => {
                error!("Failed to fetch jobs: {err}");
                tokio::time::sleep(cfg.poll_interval).await;
                continue;
            }
        };

        if batch.is_empty() {
            debug!(
                "No pending jobs found. Polling again in {:?}…",
                cfg.poll_interval
            );
            tokio::time::sleep(cfg.poll_interval).await;
            continue;
        }

        // A batch runs to completion; Ctrl-C is honoured between batches.
        let outcomes = processor.process_batch(batch).await;
        report(&cfg.worker_id, &outcomes);
    }

    Ok(())
}

fn report(worker_id: &str, outcomes: &[JobOutcome]) {
    let mut by_class: HashMap<&'static str, usize> = HashMap::new();
    let mut succeeded = 0;

    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => succeeded += 1,
            Err(err) => {
                let class = err.class();
                *by_class.entry(class.as_str()).or_default() += 1;
                if matches!(class, ErrorClass::Permanent | ErrorClass::Storage) {
                    warn!(
                        job.id = %outcome.job_id,
                        code = %err.code(),
                        action = suggested_action(err.code()),
                        "{err}"
                    );
                }
            }
        }
    }

    info!(
        worker_id,
        total = outcomes.len(),
        succeeded,
        failed = ?by_class,
        "batch finished"
    );
}
