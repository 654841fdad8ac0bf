// src/worker.rs
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::error::{QueueError, QueueResult, TransportError};
use crate::job::QueuedJob;
use crate::options::{BatchPopOptions, PopOptions};
use crate::queue::Queue;


/// Outcome of processing one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    /// The queue cannot delete jobs, so the job was not run.
    Unknown,
    /// Ran and was deleted from the queue.
    Success,
    /// Failed; left on the queue for redelivery.
    FailureRecoverable,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Success => "success",
            Self::FailureRecoverable => "failure (recoverable)",
        })
    }
}


/// Runs jobs pulled from a queue and decides what happens to them afterwards.
#[derive(Debug, Clone)]
pub struct SqsWorker {
    batch_size: u32,
}

impl Default for SqsWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl SqsWorker {
    pub fn new() -> Self {
        Self { batch_size: 1 }
    }

    /// Jobs fetched per polling cycle (1..=10).
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Execute one job and apply the delete/retain policy.
    ///
    /// Errors raised by the queue service, either while deleting or from
    /// inside the job itself, are returned as-is rather than classified.
    pub async fn process_job(&self, job: &QueuedJob, queue: &dyn Queue) -> QueueResult<JobStatus> {
        let Some(deletable) = queue.as_deletable() else {
            warn!(queue = queue.name(), job = job.name(), "queue cannot delete jobs, skipping");
            return Ok(JobStatus::Unknown);
        };

        let inner = job.job();
        let outcome = match inner.before().await {
            Ok(()) => inner.perform().await,
            Err(err) => Err(err),
        };

        let status = match outcome {
            Ok(()) => {
                inner.after().await;
                inner.always().await;
                deletable.delete(job).await?;
                info!(queue = queue.name(), job = job.name(), id = ?job.metadata().id(), "job succeeded");
                JobStatus::Success
            }
            Err(err) => {
                inner.on_error(&err).await;
                inner.always().await;
                match transport_cause(err) {
                    Ok(transport_err) => {
                        error!(queue = queue.name(), job = job.name(), error = %transport_err, "queue service failed during job");
                        return Err(QueueError::Transport(transport_err));
                    }
                    Err(err) => {
                        warn!(queue = queue.name(), job = job.name(), error = %format!("{err:#}"), "job failed, leaving it for redelivery");
                        JobStatus::FailureRecoverable
                    }
                }
            }
        };

        Ok(status)
    }

    /// One polling cycle: fetch up to the batch size and process each job.
    ///
    /// Returns one status line per processed job.
    pub async fn process_queue(
        &self,
        queue: &dyn Queue,
        options: &PopOptions,
    ) -> QueueResult<Vec<String>> {
        let request = BatchPopOptions {
            max_number_of_messages: Some(self.batch_size),
            visibility_timeout: options.visibility_timeout,
            wait_time_seconds: options.wait_time_seconds,
        };
        let jobs = queue.batch_pop(&request).await?;
        debug!(queue = queue.name(), fetched = jobs.len(), "polling cycle");

        let mut lines = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let status = self.process_job(job, queue).await?;
            lines.push(format!(
                "job '{}' ({}): {status}",
                job.metadata().id().unwrap_or("-"),
                job.name()
            ));
        }
        Ok(lines)
    }
}

/// Pull a queue-service error out of a job error, if that is what it is.
fn transport_cause(err: anyhow::Error) -> Result<TransportError, anyhow::Error> {
    let err = match err.downcast::<TransportError>() {
        Ok(transport_err) => return Ok(transport_err),
        Err(err) => err,
    };
    match err.downcast::<QueueError>() {
        Ok(QueueError::Transport(transport_err)) => Ok(transport_err),
        Ok(other) => Err(other.into()),
        Err(err) => Err(err),
    }
}
