// src/queue.rs
//! Job queue contract and its hosted-queue adapter.
//!
//! [`Queue`] is the generic push/pop contract. Deleting a delivered job is a
//! separate capability, [`Deletable`], which a queue advertises through
//! [`Queue::as_deletable`]. [`SqsQueue`] implements both on top of a
//! [`Transport`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::QueuedJob;
use crate::job_metadata::JobMetadata;
use crate::options::{BatchPopOptions, PopOptions, PushOptions};
use crate::registry::JobRegistry;
use crate::transport::{
    BatchFailure, DeleteBatchEntry, ReceiveRequest, ReceivedMessage, SendBatchEntry,
    SendMessageRequest, Transport,
};
use crate::utils::constants::{
    FIFO_QUEUE_SUFFIX, MAX_BATCH_SIZE, METADATA_ID, METADATA_MD5, METADATA_RECEIPT_HANDLE,
};
use crate::utils::md5_hex;

/// Generic durable job queue.
#[async_trait]
pub trait Queue: Send + Sync {
    fn name(&self) -> &str;

    /// Send one job. On success the job carries `__id__` and `md5` metadata.
    async fn push(&self, job: &mut QueuedJob, options: &PushOptions) -> QueueResult<()>;

    /// Receive at most one job.
    async fn pop(&self, options: &PopOptions) -> QueueResult<Option<QueuedJob>>;

    /// Send many jobs. `options` is keyed by position in `jobs`; missing
    /// positions use the defaults.
    ///
    /// Every entry is checked before anything is sent: one invalid entry
    /// (e.g. no message group on a FIFO queue) fails the whole call and no
    /// job is enqueued.
    async fn batch_push(
        &self,
        jobs: &mut [QueuedJob],
        options: &HashMap<usize, PushOptions>,
    ) -> QueueResult<BatchResult>;

    /// Receive up to `max_number_of_messages` jobs. Messages that do not
    /// decode to a registered job are skipped and logged.
    async fn batch_pop(&self, options: &BatchPopOptions) -> QueueResult<Vec<QueuedJob>>;

    /// Delete capability, when the queue has one.
    fn as_deletable(&self) -> Option<&dyn Deletable> {
        None
    }
}

/// Queues that can remove a delivered job for good.
#[async_trait]
pub trait Deletable: Send + Sync {
    /// Delete a popped job by its receipt handle.
    async fn delete(&self, job: &QueuedJob) -> QueueResult<()>;

    async fn batch_delete(&self, jobs: &[QueuedJob]) -> QueueResult<BatchResult>;
}

/// Entry of a logical batch the service refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntryFailure {
    /// Position in the caller's slice.
    pub index: usize,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

/// Per-entry outcome of a logical batch, whatever the number of physical calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Positions in the caller's slice, in service order.
    pub successful: Vec<usize>,
    pub failed: Vec<BatchEntryFailure>,
}

pub type BatchPushResult = BatchResult;
pub type BatchDeleteResult = BatchResult;

impl BatchResult {
    /// True when no entry was refused.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn record_failures(&mut self, offset: usize, chunk_len: usize, failures: Vec<BatchFailure>) {
        for failure in failures {
            match local_index(&failure.id, chunk_len) {
                Some(local) => self.failed.push(BatchEntryFailure {
                    index: offset + local,
                    code: failure.code,
                    message: failure.message,
                    sender_fault: failure.sender_fault,
                }),
                None => tracing::warn!(id = %failure.id, "batch failure for unknown entry id"),
            }
        }
    }
}

/// Resolved location of a queue. Fixed for the adapter's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    pub name: String,
    pub url: String,
}

impl QueueEndpoint {
    pub fn is_fifo(&self) -> bool {
        self.url.ends_with(FIFO_QUEUE_SUFFIX)
    }
}

/// [`Queue`] adapter over a hosted message-queue [`Transport`].
pub struct SqsQueue {
    transport: Arc<dyn Transport>,
    endpoint: QueueEndpoint,
    registry: JobRegistry,
}

impl SqsQueue {
    /// Build the adapter, resolving the queue URL by name unless the config
    /// already carries one. This is the only lookup the adapter ever does.
    pub async fn connect(
        transport: Arc<dyn Transport>,
        config: QueueConfig,
        registry: JobRegistry,
    ) -> QueueResult<Self> {
        let url = match config.queue_url {
            Some(url) => url,
            None => transport.resolve(&config.name).await?,
        };
        tracing::debug!(queue = %config.name, %url, "queue endpoint resolved");

        Ok(Self {
            transport,
            endpoint: QueueEndpoint {
                name: config.name,
                url,
            },
            registry,
        })
    }

    pub fn endpoint(&self) -> &QueueEndpoint {
        &self.endpoint
    }

    pub fn url(&self) -> &str {
        &self.endpoint.url
    }

    pub fn is_fifo(&self) -> bool {
        self.endpoint.is_fifo()
    }

    /// Serialize a job and derive its send parameters. No network access.
    fn build_message(
        &self,
        job: &QueuedJob,
        options: &PushOptions,
    ) -> QueueResult<SendMessageRequest> {
        options.validate()?;
        let body = job.to_body()?;

        let mut message = SendMessageRequest {
            delay_seconds: options.delay_seconds,
            ..SendMessageRequest::default()
        };

        if self.is_fifo() {
            let (group_id, dedup_id) = fifo_parameters(&body, options)?;
            message.message_group_id = Some(group_id);
            message.message_deduplication_id = dedup_id;
        }

        message.body = body;
        Ok(message)
    }

    fn decode(&self, message: ReceivedMessage) -> QueueResult<QueuedJob> {
        let mut delivery = JobMetadata::new();
        delivery.attach([
            (METADATA_ID, message.message_id),
            (METADATA_RECEIPT_HANDLE, message.receipt_handle),
            (METADATA_MD5, message.md5_of_body),
        ]);
        self.registry.decode(&message.body, delivery)
    }
}

/// `MessageGroupId` and optional `MessageDeduplicationId` for a FIFO send.
fn fifo_parameters(body: &str, options: &PushOptions) -> QueueResult<(String, Option<String>)> {
    let group_id = options
        .message_group_id
        .as_deref()
        .filter(|group| !group.is_empty())
        .ok_or(QueueError::MissingMessageGroup)?;

    let dedup_id = match &options.message_deduplication_id {
        Some(id) => Some(id.clone()),
        None if options.enable_auto_deduplication => Some(md5_hex(body)),
        None => None,
    };

    Ok((group_id.to_owned(), dedup_id))
}

/// Map a per-call entry id back to its position inside the chunk.
fn local_index(id: &str, chunk_len: usize) -> Option<usize> {
    id.parse::<usize>().ok().filter(|index| *index < chunk_len)
}

fn receipt_handle(job: &QueuedJob) -> QueueResult<&str> {
    job.metadata()
        .receipt_handle()
        .ok_or(QueueError::MissingReceiptHandle)
}

#[async_trait]
impl Queue for SqsQueue {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn push(&self, job: &mut QueuedJob, options: &PushOptions) -> QueueResult<()> {
        let message = self.build_message(job, options)?;
        let sent = self.transport.send(self.url(), message).await?;

        tracing::info!(
            queue = %self.endpoint.name,
            message_id = %sent.message_id,
            job = job.name(),
            "enqueued job"
        );

        job.metadata_mut().attach([
            (METADATA_ID, sent.message_id),
            (METADATA_MD5, sent.md5_of_body),
        ]);
        Ok(())
    }

    async fn pop(&self, options: &PopOptions) -> QueueResult<Option<QueuedJob>> {
        let mut jobs = self.batch_pop(&BatchPopOptions::from(*options)).await?;

        match jobs.len() {
            0 | 1 => Ok(jobs.pop()),
            count => Err(QueueError::UnexpectedMessageCount { count }),
        }
    }

    async fn batch_push(
        &self,
        jobs: &mut [QueuedJob],
        options: &HashMap<usize, PushOptions>,
    ) -> QueueResult<BatchResult> {
        let defaults = PushOptions::default();

        // Every entry is validated before the first chunk goes out.
        let mut messages = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().enumerate() {
            let entry_options = options.get(&index).unwrap_or(&defaults);
            messages.push(self.build_message(job, entry_options)?);
        }

        let mut result = BatchResult::default();
        let mut messages = messages.into_iter();

        for (chunk_number, chunk) in jobs.chunks_mut(MAX_BATCH_SIZE).enumerate() {
            let offset = chunk_number * MAX_BATCH_SIZE;
            let entries: Vec<SendBatchEntry> = messages
                .by_ref()
                .take(chunk.len())
                .enumerate()
                .map(|(local, message)| SendBatchEntry {
                    id: local.to_string(),
                    message,
                })
                .collect();

            tracing::debug!(
                queue = %self.endpoint.name,
                offset,
                entries = entries.len(),
                "sending message batch"
            );
            let output = self.transport.send_batch(self.url(), entries).await?;

            for success in output.successful {
                let Some(local) = local_index(&success.id, chunk.len()) else {
                    tracing::warn!(id = %success.id, "batch success for unknown entry id");
                    continue;
                };
                chunk[local].metadata_mut().attach([
                    (METADATA_ID, success.message_id),
                    (METADATA_MD5, success.md5_of_body),
                ]);
                result.successful.push(offset + local);
            }
            result.record_failures(offset, chunk.len(), output.failed);
        }

        if !result.is_complete() {
            tracing::warn!(
                queue = %self.endpoint.name,
                failed = result.failed.len(),
                "some batch entries were not sent"
            );
        }
        Ok(result)
    }

    async fn batch_pop(&self, options: &BatchPopOptions) -> QueueResult<Vec<QueuedJob>> {
        options.validate()?;

        let request = ReceiveRequest {
            max_number_of_messages: options.max_number_of_messages,
            visibility_timeout: options.visibility_timeout,
            wait_time_seconds: options.wait_time_seconds,
        };
        let messages = self.transport.receive(self.url(), request).await?;
        tracing::debug!(queue = %self.endpoint.name, received = messages.len(), "received messages");

        let mut jobs = Vec::with_capacity(messages.len());
        for message in messages {
            let message_id = message.message_id.clone();
            match self.decode(message) {
                Ok(job) => jobs.push(job),
                // Left in flight; it comes back after the visibility timeout.
                Err(err) => tracing::warn!(
                    queue = %self.endpoint.name,
                    %message_id,
                    error = %err,
                    "skipping message that does not decode to a registered job"
                ),
            }
        }
        Ok(jobs)
    }

    fn as_deletable(&self) -> Option<&dyn Deletable> {
        Some(self)
    }
}

#[async_trait]
impl Deletable for SqsQueue {
    async fn delete(&self, job: &QueuedJob) -> QueueResult<()> {
        let handle = receipt_handle(job)?;
        self.transport.delete(self.url(), handle).await?;
        tracing::debug!(queue = %self.endpoint.name, id = ?job.metadata().id(), "deleted job");
        Ok(())
    }

    async fn batch_delete(&self, jobs: &[QueuedJob]) -> QueueResult<BatchResult> {
        let handles = jobs
            .iter()
            .map(receipt_handle)
            .collect::<QueueResult<Vec<&str>>>()?;

        let mut result = BatchResult::default();
        for (chunk_number, chunk) in handles.chunks(MAX_BATCH_SIZE).enumerate() {
            let offset = chunk_number * MAX_BATCH_SIZE;
            let entries = chunk
                .iter()
                .enumerate()
                .map(|(local, handle)| DeleteBatchEntry {
                    id: local.to_string(),
                    receipt_handle: (*handle).to_owned(),
                })
                .collect();

            let output = self.transport.delete_batch(self.url(), entries).await?;

            for id in output.successful {
                match local_index(&id, chunk.len()) {
                    Some(local) => result.successful.push(offset + local),
                    None => tracing::warn!(%id, "batch success for unknown entry id"),
                }
            }
            result.record_failures(offset, chunk.len(), output.failed);
        }
        Ok(result)
    }
}
