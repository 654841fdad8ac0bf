// src/error.rs
//! Error types for qrush-sqs.
//!
//! - [`TransportError`]: the remote queue service call itself failed
//! - [`QueueError`]: everything the adapter and worker can fail with
//! - [`WorkerProcessError`]: the driver's wrapper around a failed worker pass

use thiserror::Error;

/// Failure reported by (or while talking to) the queue service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("queue service error {code}: {message}")]
pub struct TransportError {
    /// Service error code, e.g. `AWS.SimpleQueueService.NonExistentQueue`.
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Entries list of a batch call was empty.
    pub fn empty_batch() -> Self {
        Self::new(
            "AWS.SimpleQueueService.EmptyBatchRequest",
            "batch request does not contain any entries",
        )
    }

    /// Entries list of a batch call was longer than the service accepts.
    pub fn too_many_entries(count: usize, max: usize) -> Self {
        Self::new(
            "AWS.SimpleQueueService.TooManyEntriesInBatchRequest",
            format!("batch request contains {count} entries, maximum is {max}"),
        )
    }
}

impl From<redis::RedisError> for TransportError {
    fn from(err: redis::RedisError) -> Self {
        TransportError::new(format!("Redis.{:?}", err.kind()), err.to_string())
    }
}

/// Errors raised by the queue adapter and the worker.
#[derive(Error, Debug)]
pub enum QueueError {
    /// FIFO queue push without a message group id
    #[error("a message group id is required when pushing to a FIFO queue")]
    MissingMessageGroup,

    /// Option failed boundary validation
    #[error("invalid option '{field}': {reason}")]
    InvalidOption { field: &'static str, reason: String },

    /// Job has no receipt handle, so it was not obtained from a pop
    #[error("job has no receipt handle; only popped jobs can be deleted")]
    MissingReceiptHandle,

    /// The service returned more messages than the request allows
    #[error("{count} jobs were popped while only one (or zero) were expected")]
    UnexpectedMessageCount { count: usize },

    /// Message body names a job that is not registered
    #[error("job '{name}' is not registered")]
    UnknownJob { name: String },

    /// A registered factory could not rebuild the job from its content
    #[error("failed to build job '{name}': {reason}")]
    JobBuild { name: String, reason: String },

    #[error("failed to serialize/deserialize job: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl QueueError {
    /// Service error code, if this error came from the transport.
    pub fn code(&self) -> Option<&str> {
        match self {
            QueueError::Transport(err) => Some(err.code.as_str()),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, QueueError::Transport(_))
    }
}

/// Raised by the driver when a worker pass over a queue fails.
#[derive(Error, Debug)]
#[error("caught error while processing queue '{queue}'")]
pub struct WorkerProcessError {
    pub queue: String,
    /// Transport error code of the cause, when there is one.
    pub code: Option<String>,
    #[source]
    pub source: QueueError,
}

impl WorkerProcessError {
    pub fn new(queue: impl Into<String>, source: QueueError) -> Self {
        Self {
            queue: queue.into(),
            code: source.code().map(str::to_owned),
            source,
        }
    }
}

/// Result type for adapter and worker operations
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Result type for transport calls
pub type TransportResult<T> = std::result::Result<T, TransportError>;
