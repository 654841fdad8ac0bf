// src/job.rs
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job_metadata::JobMetadata;


/// A unit of work that can travel through a queue.
///
/// `name` must match the name the job type is registered under in the
/// [`JobRegistry`](crate::registry::JobRegistry), and `content` must produce
/// what the registered factory expects back.
#[async_trait]
pub trait Job: Send + Sync {
    async fn before(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn perform(&self) -> anyhow::Result<()>;

    async fn after(&self) {}
    async fn on_error(&self, _err: &anyhow::Error) {}
    async fn always(&self) {}

    fn name(&self) -> &'static str;

    fn content(&self) -> serde_json::Result<Value>;
}


/// Wire shape of a message body.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JobBody {
    pub name: String,
    pub content: Value,
    #[serde(default)]
    pub metadata: JobMetadata,
}


/// A job together with its metadata side-channel.
pub struct QueuedJob {
    job: Box<dyn Job>,
    metadata: JobMetadata,
}

impl QueuedJob {
    pub fn new<J: Job + 'static>(job: J) -> Self {
        Self::from_boxed(Box::new(job))
    }

    pub fn from_boxed(job: Box<dyn Job>) -> Self {
        Self {
            job,
            metadata: JobMetadata::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: JobMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn job(&self) -> &dyn Job {
        self.job.as_ref()
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn metadata(&self) -> &JobMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut JobMetadata {
        &mut self.metadata
    }

    /// Serialize into a message body.
    pub fn to_body(&self) -> serde_json::Result<String> {
        let body = JobBody {
            name: self.job.name().to_owned(),
            content: self.job.content()?,
            metadata: self.metadata.without_delivery_keys(),
        };
        serde_json::to_string(&body)
    }
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob")
            .field("name", &self.job.name())
            .field("metadata", &self.metadata)
            .finish()
    }
}
