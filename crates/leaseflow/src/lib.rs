//! Lease-based background job consumer.
//!
//! Jobs live as plain rows in a durable store. A poller hands batches of
//! eligible rows to a [`JobProcessor`](jobs::JobProcessor), which leases,
//! dispatches, and then deletes or requeues each one through a fixed-size
//! [`WorkerPool`](jobs::WorkerPool).

pub mod config;
pub mod db;
pub mod jobs;
