//! Shared fixtures: a scripted transport that records every call, and a few
//! job types.
#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use qrush_sqs::transport::{
    BatchFailure, DeleteBatchEntry, DeleteBatchOutput, ReceiveRequest, ReceivedMessage,
    SendBatchEntry, SendBatchOutput, SendBatchSuccess, SendMessageOutput, SendMessageRequest,
};
use qrush_sqs::utils::md5_hex;
use qrush_sqs::{Job, JobRegistry, QueueConfig, SqsQueue, Transport, TransportError};

/// One call made against [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Send(SendMessageRequest),
    SendBatch(Vec<SendBatchEntry>),
    Receive(ReceiveRequest),
    Delete(String),
    DeleteBatch(Vec<DeleteBatchEntry>),
}

/// Transport that records calls and answers from a script.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<Call>>,
    deliveries: Mutex<VecDeque<Vec<ReceivedMessage>>>,
    refused_ids: Mutex<HashSet<String>>,
    delete_error: Mutex<Option<TransportError>>,
    sequence: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than the initial resolve.
    pub fn network_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::Resolve(_)))
            .collect()
    }

    pub fn send_batches(&self) -> Vec<Vec<SendBatchEntry>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendBatch(entries) => Some(entries),
                _ => None,
            })
            .collect()
    }

    pub fn sends(&self) -> Vec<SendMessageRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    /// Queue up the answer to the next receive call.
    pub fn deliver(&self, messages: Vec<ReceivedMessage>) {
        self.deliveries.lock().unwrap().push_back(messages);
    }

    /// Refuse the entry with this per-call id in every batch call.
    pub fn refuse_entry(&self, id: &str) {
        self.refused_ids.lock().unwrap().insert(id.to_owned());
    }

    pub fn fail_deletes_with(&self, err: TransportError) {
        *self.delete_error.lock().unwrap() = Some(err);
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_id(&self) -> String {
        format!("msg-{}", self.sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn refused(&self, id: &str) -> Option<BatchFailure> {
        self.refused_ids
            .lock()
            .unwrap()
            .contains(id)
            .then(|| BatchFailure {
                id: id.to_owned(),
                code: "InvalidParameterValue".into(),
                message: "refused by test".into(),
                sender_fault: true,
            })
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn resolve(&self, queue_name: &str) -> Result<String, TransportError> {
        self.record(Call::Resolve(queue_name.to_owned()));
        Ok(format!("https://queue.test/000000000000/{queue_name}"))
    }

    async fn send(
        &self,
        _queue_url: &str,
        message: SendMessageRequest,
    ) -> Result<SendMessageOutput, TransportError> {
        let md5_of_body = md5_hex(&message.body);
        self.record(Call::Send(message));
        Ok(SendMessageOutput {
            message_id: self.next_id(),
            md5_of_body,
        })
    }

    async fn send_batch(
        &self,
        _queue_url: &str,
        entries: Vec<SendBatchEntry>,
    ) -> Result<SendBatchOutput, TransportError> {
        self.record(Call::SendBatch(entries.clone()));

        let mut output = SendBatchOutput::default();
        for entry in entries {
            match self.refused(&entry.id) {
                Some(failure) => output.failed.push(failure),
                None => output.successful.push(SendBatchSuccess {
                    id: entry.id,
                    message_id: self.next_id(),
                    md5_of_body: md5_hex(&entry.message.body),
                }),
            }
        }
        Ok(output)
    }

    async fn receive(
        &self,
        _queue_url: &str,
        request: ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, TransportError> {
        self.record(Call::Receive(request));
        Ok(self.deliveries.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn delete(&self, _queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        self.record(Call::Delete(receipt_handle.to_owned()));
        match self.delete_error.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn delete_batch(
        &self,
        _queue_url: &str,
        entries: Vec<DeleteBatchEntry>,
    ) -> Result<DeleteBatchOutput, TransportError> {
        self.record(Call::DeleteBatch(entries.clone()));

        let mut output = DeleteBatchOutput::default();
        for entry in entries {
            match self.refused(&entry.id) {
                Some(failure) => output.failed.push(failure),
                None => output.successful.push(entry.id),
            }
        }
        Ok(output)
    }
}

/// Job that succeeds and carries some text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Greeting {
    pub text: String,
}

#[async_trait]
impl Job for Greeting {
    async fn perform(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "greeting"
    }

    fn content(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

pub fn greeting(text: &str) -> Greeting {
    Greeting { text: text.into() }
}

/// What a [`Scripted`] job does when performed.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed,
    Fail(String),
    ServiceError(TransportError),
}

/// Job with a scripted outcome that counts its hook calls.
#[derive(Debug)]
pub struct Scripted {
    pub outcome: Outcome,
    pub performed: Arc<AtomicUsize>,
    pub always: Arc<AtomicUsize>,
}

impl Scripted {
    pub fn new(outcome: Outcome) -> Self {
        Self {
            outcome,
            performed: Arc::default(),
            always: Arc::default(),
        }
    }
}

#[async_trait]
impl Job for Scripted {
    async fn perform(&self) -> anyhow::Result<()> {
        self.performed.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail(reason) => Err(anyhow::anyhow!("{reason}")),
            Outcome::ServiceError(err) => Err(err.clone().into()),
        }
    }

    async fn always(&self) {
        self.always.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn content(&self) -> serde_json::Result<Value> {
        Ok(json!({}))
    }
}

pub fn registry() -> JobRegistry {
    let registry = JobRegistry::new();
    registry.register::<Greeting>("greeting");
    registry
}

pub async fn connect(transport: &Arc<RecordingTransport>, name: &str) -> SqsQueue {
    SqsQueue::connect(transport.clone(), QueueConfig::new(name), registry())
        .await
        .unwrap()
}

/// A delivery as the service would hand it out.
pub fn delivery(id: &str, handle: &str, text: &str) -> ReceivedMessage {
    let body = json!({
        "name": "greeting",
        "content": { "text": text },
        "metadata": { "tenant": "acme" },
    })
    .to_string();

    ReceivedMessage {
        md5_of_body: md5_hex(&body),
        body,
        message_id: id.to_owned(),
        receipt_handle: handle.to_owned(),
    }
}
