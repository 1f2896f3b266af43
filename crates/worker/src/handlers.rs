use leaseflow::jobs::{
    boxed, BoxFuture, ExecutionContext, JobData, JobHandler, JobRegistry, RegistryError,
};
use serde::Deserialize;
use std::time::Duration;

pub const EXPORT_CSV: &str = "export.csv";
pub const BATCH_DELETE: &str = "batch.delete";

#[derive(Debug, Deserialize)]
struct ExportData {
    resource: String,
    #[serde(default)]
    columns: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportOptions {
    #[serde(default)]
    include_header: bool,
}

/// Demo exporter. Replace with a real one.
#[derive(Debug, Default)]
pub struct ExportCsvHandler;

impl JobHandler for ExportCsvHandler {
    fn job_type(&self) -> &str {
        EXPORT_CSV
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        job: &'a JobData,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        boxed(async move {
            let data: ExportData = job.data_as()?;
            let options: ExportOptions = job.options_as()?;
            if data.resource.trim().is_empty() {
                anyhow::bail!("export resource must not be empty");
            }

            ctx.progress(&format!(
                "exporting {} ({} columns, header={})",
                data.resource,
                data.columns.len(),
                options.include_header
            ));
            tokio::time::sleep(Duration::from_millis(300)).await;
            let elapsed = chrono::Utc::now() - ctx.started_at();
            ctx.progress(&format!("export finished in {}ms", elapsed.num_milliseconds()));
            Ok(())
        })
    }
}

#[derive(Debug, Deserialize)]
struct BatchDeleteData {
    ids: Vec<String>,
}

const DELETE_CHUNK: usize = 100;

pub fn build_registry() -> Result<JobRegistry, RegistryError> {
    let registry = JobRegistry::new();

    registry.register(ExportCsvHandler)?;

    // Closure handlers work too.
    registry.register_fn(BATCH_DELETE, |ctx, job| {
        boxed(async move {
            let data: BatchDeleteData = job.data_as()?;
            let total = data.ids.len() as u64;
            let mut done = 0;
            for chunk in data.ids.chunks(DELETE_CHUNK) {
                tokio::time::sleep(Duration::from_millis(50)).await;
                done += chunk.len() as u64;
                ctx.progress_step("deleted chunk", done, total);
            }
            Ok(())
        })
    })?;

    Ok(registry)
}
