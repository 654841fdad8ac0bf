// src/controller.rs
//! Driver side of the worker: turns route/CLI parameters into a polling
//! cycle and renders the result as text.

use std::sync::Arc;

use serde::Deserialize;

use crate::config::QueueManager;
use crate::error::WorkerProcessError;
use crate::options::PopOptions;
use crate::worker::SqsWorker;

/// Parameters of one `process` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessParams {
    pub queue: String,
    #[serde(default)]
    pub visibility_timeout: Option<u32>,
    #[serde(default)]
    pub wait_time: Option<u32>,
}

impl ProcessParams {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            ..Self::default()
        }
    }

    pub fn pop_options(&self) -> PopOptions {
        PopOptions {
            visibility_timeout: self.visibility_timeout,
            wait_time_seconds: self.wait_time,
        }
    }
}

pub struct WorkerController {
    worker: SqsWorker,
    queues: Arc<QueueManager>,
}

impl WorkerController {
    pub fn new(worker: SqsWorker, queues: Arc<QueueManager>) -> Self {
        Self { worker, queues }
    }

    /// Run one polling cycle against the named queue and render a report.
    pub async fn process(&self, params: &ProcessParams) -> Result<String, WorkerProcessError> {
        let wrap = |err| WorkerProcessError::new(params.queue.as_str(), err);

        let queue = self.queues.get(&params.queue).await.map_err(wrap)?;
        let messages = self
            .worker
            .process_queue(&*queue, &params.pop_options())
            .await
            .map_err(wrap)?;

        Ok(format_output(&params.queue, &messages))
    }
}

/// `Finished worker for queue '<name>':` followed by one ` - ` line per message.
pub fn format_output(queue_name: &str, messages: &[String]) -> String {
    let lines = messages
        .iter()
        .map(|message| format!(" - {message}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("Finished worker for queue '{queue_name}':\n{lines}\n")
}
