//! Transport layer: the hosted queue service the adapter talks to.
//!
//! [`Transport`] mirrors the service's RPCs one to one. Implementations must
//! reject empty batches and batches longer than
//! [`MAX_BATCH_SIZE`](crate::utils::constants::MAX_BATCH_SIZE); chunking is
//! the adapter's job, not the transport's.

mod memory;
mod redis_transport;

pub use memory::MemoryTransport;
pub use redis_transport::{RedisTransport, RedisTransportConfig};

use async_trait::async_trait;

use crate::error::{TransportError, TransportResult};
use crate::utils::constants::MAX_BATCH_SIZE;

/// A single message to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendMessageRequest {
    pub body: String,
    pub delay_seconds: Option<u32>,
    pub message_group_id: Option<String>,
    pub message_deduplication_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessageOutput {
    pub message_id: String,
    pub md5_of_body: String,
}

/// One entry of a send batch. `id` is unique within the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBatchEntry {
    pub id: String,
    pub message: SendMessageRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendBatchSuccess {
    pub id: String,
    pub message_id: String,
    pub md5_of_body: String,
}

/// Entry the service refused, as reported inside a successful batch call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    pub id: String,
    pub code: String,
    pub message: String,
    /// The request itself was at fault; resending unchanged will fail again.
    pub sender_fault: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendBatchOutput {
    pub successful: Vec<SendBatchSuccess>,
    pub failed: Vec<BatchFailure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub max_number_of_messages: Option<u32>,
    pub visibility_timeout: Option<u32>,
    pub wait_time_seconds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub body: String,
    pub message_id: String,
    pub receipt_handle: String,
    pub md5_of_body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBatchEntry {
    pub id: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteBatchOutput {
    /// Ids of the entries that were deleted.
    pub successful: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

/// Hosted message-queue service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Look a queue up by name. Idempotent.
    async fn resolve(&self, queue_name: &str) -> TransportResult<String>;

    async fn send(
        &self,
        queue_url: &str,
        message: SendMessageRequest,
    ) -> TransportResult<SendMessageOutput>;

    async fn send_batch(
        &self,
        queue_url: &str,
        entries: Vec<SendBatchEntry>,
    ) -> TransportResult<SendBatchOutput>;

    /// Empty result is not an error.
    async fn receive(
        &self,
        queue_url: &str,
        request: ReceiveRequest,
    ) -> TransportResult<Vec<ReceivedMessage>>;

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> TransportResult<()>;

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteBatchEntry>,
    ) -> TransportResult<DeleteBatchOutput>;
}

/// Shared entry-count check for batch calls.
pub(crate) fn check_batch_len(len: usize) -> TransportResult<()> {
    match len {
        0 => Err(TransportError::empty_batch()),
        n if n > MAX_BATCH_SIZE => Err(TransportError::too_many_entries(n, MAX_BATCH_SIZE)),
        _ => Ok(()),
    }
}

/// Message ids and receipt handles.
pub(crate) fn new_token() -> String {
    nanoid::nanoid!(24)
}
