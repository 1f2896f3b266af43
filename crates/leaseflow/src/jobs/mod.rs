pub mod adapter;
pub mod context;
pub mod error;
pub mod error_codes;
pub mod model;
pub mod pool;
pub mod processor;
pub mod registry;
pub mod repo;
pub mod store;

use std::{future::Future, pin::Pin};

pub use context::ExecutionContext;
pub use error::{JobError, RegistryError, StoreError};
pub use error_codes::{ErrorClass, ErrorCode};
pub use model::{JobData, JobPayload, JobRecord, JobState, NewJob};
pub use pool::{JobOutcome, WorkerPool};
pub use processor::{JobProcessor, ProcessorConfig, DEFAULT_LEASE_TIMEOUT, DEFAULT_MAX_WORKERS};
pub use registry::{FnHandler, JobHandler, JobRegistry};
pub use repo::PgJobStore;
pub use store::{JobStore, MemoryJobStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Pins a future so it can be returned from a [`JobHandler`] or [`JobStore`].
pub fn boxed<'a, T>(fut: impl Future<Output = T> + Send + 'a) -> BoxFuture<'a, T> {
    Box::pin(fut)
}
