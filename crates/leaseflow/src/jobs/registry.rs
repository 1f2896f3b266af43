use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::jobs::context::ExecutionContext;
use crate::jobs::error::RegistryError;
use crate::jobs::model::JobData;
use crate::jobs::BoxFuture;

/// Business logic for one job type.
///
/// Handlers may be invoked concurrently for different jobs and must be
/// idempotent: a job whose row cannot be deleted after success runs again.
pub trait JobHandler: Send + Sync {
    /// The payload `type` this handler serves.
    fn job_type(&self) -> &str;

    fn handle<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        job: &'a JobData,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Adapts a closure into a [`JobHandler`].
pub struct FnHandler<F> {
    job_type: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: for<'a> Fn(&'a ExecutionContext, &'a JobData) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
{
    pub fn new(job_type: impl Into<String>, handler: F) -> Self {
        Self {
            job_type: job_type.into(),
            handler,
        }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: for<'a> Fn(&'a ExecutionContext, &'a JobData) -> BoxFuture<'a, anyhow::Result<()>>
        + Send
        + Sync,
{
    fn job_type(&self) -> &str {
        &self.job_type
    }

    fn handle<'a>(
        &'a self,
        ctx: &'a ExecutionContext,
        job: &'a JobData,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        (self.handler)(ctx, job)
    }
}

/// Maps job types to handlers.
///
/// Populated once at startup and read concurrently while jobs dispatch.
/// Entries are never replaced or removed.
#[derive(Default)]
pub struct JobRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRegistry")
            .field("job_types", &self.list_handlers())
            .finish()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: JobHandler + 'static>(&self, handler: H) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(handler))
    }

    pub fn register_fn<F>(&self, job_type: &str, handler: F) -> Result<(), RegistryError>
    where
        F: for<'a> Fn(&'a ExecutionContext, &'a JobData) -> BoxFuture<'a, anyhow::Result<()>>
            + Send
            + Sync
            + 'static,
    {
        self.register(FnHandler::new(job_type, handler))
    }

    /// Binds `handler` to its job type. The first registration of a type
    /// stays active; later ones are rejected.
    pub fn register_arc(&self, handler: Arc<dyn JobHandler>) -> Result<(), RegistryError> {
        let job_type = handler.job_type().trim().to_string();
        if job_type.is_empty() {
            return Err(RegistryError::InvalidHandler(
                "job type must not be empty".to_string(),
            ));
        }

        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if handlers.contains_key(&job_type) {
            return Err(RegistryError::DuplicateHandler(job_type));
        }
        tracing::debug!(job.type = %job_type, "registered job handler");
        handlers.insert(job_type, handler);
        Ok(())
    }

    pub fn get_handler(&self, job_type: &str) -> Result<Arc<dyn JobHandler>, RegistryError> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers
            .get(job_type)
            .cloned()
            .ok_or_else(|| RegistryError::HandlerNotFound(job_type.to_string()))
    }

    /// Registered job types, in no particular order.
    pub fn list_handlers(&self) -> Vec<String> {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
