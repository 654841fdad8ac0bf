//! In-process transport with the service's delivery semantics.
//!
//! Used by the test-suite and for local runs without Redis. Queues must be
//! created up front with [`MemoryTransport::create_queue`]; FIFO queues fall
//! back to content-based deduplication when no deduplication id is sent.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::{
    check_batch_len, new_token, BatchFailure, DeleteBatchEntry, DeleteBatchOutput,
    ReceiveRequest, ReceivedMessage, SendBatchEntry, SendBatchOutput, SendBatchSuccess,
    SendMessageOutput, SendMessageRequest, Transport,
};
use crate::error::{TransportError, TransportResult};
use crate::utils::constants::{
    DEDUPLICATION_WINDOW_SECS, DEFAULT_VISIBILITY_TIMEOUT, FIFO_QUEUE_SUFFIX,
};
use crate::utils::md5_hex;

const URL_PREFIX: &str = "memory://queues/";
const LONG_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// Receipt handles are `{message id}.{nonce}`; tokens never contain a dot.
const RECEIPT_SEPARATOR: char = '.';

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    md5_of_body: String,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

#[derive(Debug, Default)]
struct QueueState {
    fifo: bool,
    /// Oldest first.
    messages: Vec<StoredMessage>,
    /// Deduplication id -> (message id, window end).
    dedup: HashMap<String, (String, Instant)>,
}

impl QueueState {
    fn enqueue(&mut self, message: SendMessageRequest) -> TransportResult<SendMessageOutput> {
        let md5_of_body = md5_hex(&message.body);
        let now = Instant::now();

        if self.fifo {
            if message.message_group_id.as_deref().map_or(true, str::is_empty) {
                return Err(TransportError::new(
                    "MissingParameter",
                    "the request must contain the parameter MessageGroupId",
                ));
            }

            let dedup_id = message
                .message_deduplication_id
                .clone()
                .unwrap_or_else(|| md5_of_body.clone());

            self.dedup.retain(|_, (_, until)| *until > now);
            if let Some((message_id, _)) = self.dedup.get(&dedup_id) {
                tracing::debug!(%dedup_id, "duplicate send inside deduplication window");
                return Ok(SendMessageOutput {
                    message_id: message_id.clone(),
                    md5_of_body,
                });
            }

            let message_id = new_token();
            self.dedup.insert(
                dedup_id,
                (
                    message_id.clone(),
                    now + Duration::from_secs(DEDUPLICATION_WINDOW_SECS),
                ),
            );
            self.push_stored(message_id, message, md5_of_body, now)
        } else {
            self.push_stored(new_token(), message, md5_of_body, now)
        }
    }

    fn push_stored(
        &mut self,
        message_id: String,
        message: SendMessageRequest,
        md5_of_body: String,
        now: Instant,
    ) -> TransportResult<SendMessageOutput> {
        let delay = Duration::from_secs(u64::from(message.delay_seconds.unwrap_or(0)));
        self.messages.push(StoredMessage {
            message_id: message_id.clone(),
            body: message.body,
            md5_of_body: md5_of_body.clone(),
            visible_at: now + delay,
            receipt_handle: None,
        });
        Ok(SendMessageOutput {
            message_id,
            md5_of_body,
        })
    }

    fn take_visible(&mut self, max: usize, visibility: Duration) -> Vec<ReceivedMessage> {
        let now = Instant::now();
        let mut received = Vec::new();

        for stored in self.messages.iter_mut().filter(|m| m.visible_at <= now) {
            if received.len() == max {
                break;
            }
            let receipt_handle = format!("{}{RECEIPT_SEPARATOR}{}", stored.message_id, new_token());
            stored.visible_at = now + visibility;
            stored.receipt_handle = Some(receipt_handle.clone());

            received.push(ReceivedMessage {
                body: stored.body.clone(),
                message_id: stored.message_id.clone(),
                receipt_handle,
                md5_of_body: stored.md5_of_body.clone(),
            });
        }

        received
    }

    /// Handles from an earlier delivery, or for a message that is already
    /// gone, are accepted and change nothing.
    fn remove(&mut self, receipt_handle: &str) -> TransportResult<()> {
        let message_id = receipt_message_id(receipt_handle).ok_or_else(|| {
            TransportError::new(
                "ReceiptHandleIsInvalid",
                format!("the receipt handle '{receipt_handle}' is not valid for this queue"),
            )
        })?;

        self.messages.retain(|m| {
            m.message_id != message_id || m.receipt_handle.as_deref() != Some(receipt_handle)
        });
        Ok(())
    }
}

/// In-memory [`Transport`].
#[derive(Clone, Default)]
pub struct MemoryTransport {
    queues: Arc<Mutex<HashMap<String, QueueState>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue (no-op if it exists) and return its URL.
    pub async fn create_queue(&self, name: &str) -> String {
        let url = queue_url(name);
        let mut queues = self.queues.lock().await;
        queues.entry(url.clone()).or_insert_with(|| QueueState {
            fifo: name.ends_with(FIFO_QUEUE_SUFFIX),
            ..QueueState::default()
        });
        url
    }

    /// Messages stored in the queue, in flight or not.
    pub async fn len(&self, name: &str) -> usize {
        let queues = self.queues.lock().await;
        queues
            .get(&queue_url(name))
            .map_or(0, |state| state.messages.len())
    }

    pub async fn is_empty(&self, name: &str) -> bool {
        self.len(name).await == 0
    }
}

fn queue_url(name: &str) -> String {
    format!("{URL_PREFIX}{name}")
}

fn non_existent(queue_url: &str) -> TransportError {
    TransportError::new(
        "AWS.SimpleQueueService.NonExistentQueue",
        format!("the specified queue does not exist: {queue_url}"),
    )
}

fn receipt_message_id(receipt_handle: &str) -> Option<&str> {
    match receipt_handle.split_once(RECEIPT_SEPARATOR) {
        Some((message_id, nonce)) if !message_id.is_empty() && !nonce.is_empty() => {
            Some(message_id)
        }
        _ => None,
    }
}

fn check_distinct_ids<'a>(ids: impl Iterator<Item = &'a str>) -> TransportResult<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(TransportError::new(
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                format!("two or more batch entries have the id '{id}'"),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn resolve(&self, queue_name: &str) -> TransportResult<String> {
        let url = queue_url(queue_name);
        let queues = self.queues.lock().await;
        if queues.contains_key(&url) {
            Ok(url)
        } else {
            Err(non_existent(&url))
        }
    }

    async fn send(
        &self,
        queue_url: &str,
        message: SendMessageRequest,
    ) -> TransportResult<SendMessageOutput> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_url)
            .ok_or_else(|| non_existent(queue_url))?;
        state.enqueue(message)
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        entries: Vec<SendBatchEntry>,
    ) -> TransportResult<SendBatchOutput> {
        check_batch_len(entries.len())?;
        check_distinct_ids(entries.iter().map(|e| e.id.as_str()))?;

        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_url)
            .ok_or_else(|| non_existent(queue_url))?;

        let mut output = SendBatchOutput::default();
        for entry in entries {
            match state.enqueue(entry.message) {
                Ok(sent) => output.successful.push(SendBatchSuccess {
                    id: entry.id,
                    message_id: sent.message_id,
                    md5_of_body: sent.md5_of_body,
                }),
                Err(err) => output.failed.push(BatchFailure {
                    id: entry.id,
                    code: err.code,
                    message: err.message,
                    sender_fault: true,
                }),
            }
        }
        Ok(output)
    }

    async fn receive(
        &self,
        queue_url: &str,
        request: ReceiveRequest,
    ) -> TransportResult<Vec<ReceivedMessage>> {
        let max = request.max_number_of_messages.unwrap_or(1) as usize;
        let visibility = Duration::from_secs(u64::from(
            request
                .visibility_timeout
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT),
        ));
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(request.wait_time_seconds.unwrap_or(0)));

        loop {
            {
                let mut queues = self.queues.lock().await;
                let state = queues
                    .get_mut(queue_url)
                    .ok_or_else(|| non_existent(queue_url))?;
                let received = state.take_visible(max, visibility);
                if !received.is_empty() || Instant::now() >= deadline {
                    return Ok(received);
                }
            }
            sleep(LONG_POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> TransportResult<()> {
        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_url)
            .ok_or_else(|| non_existent(queue_url))?;
        state.remove(receipt_handle)
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteBatchEntry>,
    ) -> TransportResult<DeleteBatchOutput> {
        check_batch_len(entries.len())?;
        check_distinct_ids(entries.iter().map(|e| e.id.as_str()))?;

        let mut queues = self.queues.lock().await;
        let state = queues
            .get_mut(queue_url)
            .ok_or_else(|| non_existent(queue_url))?;

        let mut output = DeleteBatchOutput::default();
        for entry in entries {
            match state.remove(&entry.receipt_handle) {
                Ok(()) => output.successful.push(entry.id),
                Err(err) => output.failed.push(BatchFailure {
                    id: entry.id,
                    code: err.code,
                    message: err.message,
                    sender_fault: true,
                }),
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(body: &str) -> SendMessageRequest {
        SendMessageRequest {
            body: body.to_string(),
            ..SendMessageRequest::default()
        }
    }

    #[tokio::test]
    async fn resolve_requires_existing_queue() {
        let transport = MemoryTransport::new();
        let err = transport.resolve("jobs").await.unwrap_err();
        assert_eq!(err.code, "AWS.SimpleQueueService.NonExistentQueue");

        let url = transport.create_queue("jobs").await;
        assert_eq!(transport.resolve("jobs").await.unwrap(), url);
    }

    #[tokio::test]
    async fn empty_and_oversized_batches_are_rejected() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;

        let err = transport.send_batch(&url, Vec::new()).await.unwrap_err();
        assert_eq!(err.code, "AWS.SimpleQueueService.EmptyBatchRequest");

        let entries = (0..11)
            .map(|i| SendBatchEntry {
                id: i.to_string(),
                message: message("x"),
            })
            .collect();
        let err = transport.send_batch(&url, entries).await.unwrap_err();
        assert_eq!(err.code, "AWS.SimpleQueueService.TooManyEntriesInBatchRequest");

        let err = transport.delete_batch(&url, Vec::new()).await.unwrap_err();
        assert_eq!(err.code, "AWS.SimpleQueueService.EmptyBatchRequest");
    }

    #[tokio::test(start_paused = true)]
    async fn received_message_is_hidden_until_visibility_timeout() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;
        let sent = transport.send(&url, message("hello")).await.unwrap();
        assert_eq!(sent.md5_of_body, md5_hex("hello"));

        let request = ReceiveRequest {
            visibility_timeout: Some(10),
            ..ReceiveRequest::default()
        };
        let first = transport.receive(&url, request).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message_id, sent.message_id);

        assert!(transport.receive(&url, request).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(11)).await;
        let second = transport.receive(&url, request).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_ne!(second[0].receipt_handle, first[0].receipt_handle);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_message_waits() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;
        let mut delayed = message("later");
        delayed.delay_seconds = Some(5);
        transport.send(&url, delayed).await.unwrap();

        let request = ReceiveRequest::default();
        assert!(transport.receive(&url, request).await.unwrap().is_empty());

        let long_poll = ReceiveRequest {
            wait_time_seconds: Some(20),
            ..ReceiveRequest::default()
        };
        let received = transport.receive(&url, long_poll).await.unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].body, "later");
    }

    #[tokio::test]
    async fn delete_removes_message_and_rejects_unknown_handles() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;
        transport.send(&url, message("a")).await.unwrap();

        let received = transport
            .receive(&url, ReceiveRequest::default())
            .await
            .unwrap();
        transport
            .delete(&url, &received[0].receipt_handle)
            .await
            .unwrap();
        assert!(transport.is_empty("jobs").await);

        // Second delete of the same delivery is not an error.
        transport
            .delete(&url, &received[0].receipt_handle)
            .await
            .unwrap();

        let err = transport.delete(&url, "bogus").await.unwrap_err();
        assert_eq!(err.code, "ReceiptHandleIsInvalid");
    }

    #[tokio::test]
    async fn receive_delete_cycles_leave_no_bookkeeping_behind() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;

        for i in 0..1000 {
            transport.send(&url, message(&format!("job {i}"))).await.unwrap();
            let received = transport
                .receive(&url, ReceiveRequest::default())
                .await
                .unwrap();
            transport
                .delete(&url, &received[0].receipt_handle)
                .await
                .unwrap();
        }

        let queues = transport.queues.lock().await;
        let state = &queues[&url];
        assert!(state.messages.is_empty());
        assert!(state.dedup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_receipt_does_not_delete_redelivered_message() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("jobs").await;
        let sent = transport.send(&url, message("a")).await.unwrap();

        let request = ReceiveRequest {
            visibility_timeout: Some(1),
            ..ReceiveRequest::default()
        };
        let first = transport.receive(&url, request).await.unwrap();
        assert!(first[0].receipt_handle.starts_with(&sent.message_id));
        tokio::time::advance(Duration::from_secs(2)).await;
        let second = transport.receive(&url, request).await.unwrap();

        transport.delete(&url, &first[0].receipt_handle).await.unwrap();
        assert_eq!(transport.len("jobs").await, 1);

        transport.delete(&url, &second[0].receipt_handle).await.unwrap();
        assert!(transport.is_empty("jobs").await);
    }

    #[test]
    fn receipt_handles_must_name_a_message() {
        assert_eq!(receipt_message_id("abc.xyz"), Some("abc"));
        assert_eq!(receipt_message_id("bogus"), None);
        assert_eq!(receipt_message_id(".xyz"), None);
        assert_eq!(receipt_message_id("abc."), None);
    }

    #[tokio::test]
    async fn fifo_queue_deduplicates_within_window() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("orders.fifo").await;

        let mut first = message("order-1");
        first.message_group_id = Some("g".into());
        first.message_deduplication_id = Some("d-1".into());
        let a = transport.send(&url, first.clone()).await.unwrap();
        let b = transport.send(&url, first).await.unwrap();

        assert_eq!(a.message_id, b.message_id);
        assert_eq!(transport.len("orders.fifo").await, 1);
    }

    #[tokio::test]
    async fn fifo_batch_reports_missing_group_per_entry() {
        let transport = MemoryTransport::new();
        let url = transport.create_queue("orders.fifo").await;

        let mut grouped = message("a");
        grouped.message_group_id = Some("g".into());
        let output = transport
            .send_batch(
                &url,
                vec![
                    SendBatchEntry {
                        id: "0".into(),
                        message: grouped,
                    },
                    SendBatchEntry {
                        id: "1".into(),
                        message: message("b"),
                    },
                ],
            )
            .await
            .unwrap();

        assert_eq!(output.successful.len(), 1);
        assert_eq!(output.successful[0].id, "0");
        assert_eq!(output.failed.len(), 1);
        assert_eq!(output.failed[0].id, "1");
        assert_eq!(output.failed[0].code, "MissingParameter");
    }
}
