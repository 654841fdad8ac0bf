//! qrush-sqs: durable job queue over a hosted message-queue service.
//!
//! - [`SqsQueue`] adapts the push / pop / delete contract (plus batch
//!   variants) to a [`Transport`], taking care of the 10-entry batch limit,
//!   FIFO grouping and deduplication, and job metadata.
//! - [`SqsWorker`] runs one popped job and deletes it on success, leaves it
//!   for redelivery on failure, and re-raises queue-service errors.
//! - [`WorkerController`] is the driver used by the CLI and the HTTP route.
//!
//! Transports: [`MemoryTransport`] (in-process) and [`RedisTransport`].

pub mod builtin;
pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod job_metadata;
pub mod options;
pub mod queue;
pub mod registry;
pub mod routes;
pub mod services;
pub mod transport;
pub mod utils;
pub mod worker;

pub use config::{QueueConfig, QueueManager, Settings};
pub use controller::{format_output, ProcessParams, WorkerController};
pub use error::{QueueError, QueueResult, TransportError, WorkerProcessError};
pub use job::{Job, QueuedJob};
pub use job_metadata::JobMetadata;
pub use options::{BatchPopOptions, PopOptions, PushOptions};
pub use queue::{BatchEntryFailure, BatchResult, Deletable, Queue, QueueEndpoint, SqsQueue};
pub use registry::{register_job, JobRegistry};
pub use transport::{MemoryTransport, RedisTransport, RedisTransportConfig, Transport};
pub use utils::constants;
pub use worker::{JobStatus, SqsWorker};

// Re-export async_trait for job implementors
pub use async_trait::async_trait;
