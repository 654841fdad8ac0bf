// src/registry.rs
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{QueueError, QueueResult};
use crate::job::{Job, JobBody, QueuedJob};
use crate::job_metadata::JobMetadata;

/// Rebuilds a job from the `content` stored in a message body.
pub type JobFactory = fn(Value) -> anyhow::Result<Box<dyn Job>>;

static JOB_REGISTRY: Lazy<JobRegistry> = Lazy::new(JobRegistry::new);

/// Maps job names to the factories that rebuild them from message bodies.
///
/// Cloning is cheap and clones share the same table.
#[derive(Clone, Default)]
pub struct JobRegistry {
    factories: Arc<RwLock<HashMap<String, JobFactory>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry used by the binary and by [`register_job`].
    pub fn global() -> &'static JobRegistry {
        &JOB_REGISTRY
    }

    pub fn register_factory(&self, name: impl Into<String>, factory: JobFactory) {
        let name = name.into();
        tracing::debug!(job = %name, "registering job");
        self.factories
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name, factory);
    }

    /// Register a job type whose content is its serde representation.
    pub fn register<J>(&self, name: impl Into<String>)
    where
        J: Job + DeserializeOwned + 'static,
    {
        self.register_factory(name, build_from_content::<J>);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(name)
    }

    fn factory(&self, name: &str) -> Option<JobFactory> {
        self.factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .copied()
    }

    /// Build a registered job from its content.
    pub fn build(&self, name: &str, content: Value) -> QueueResult<Box<dyn Job>> {
        let factory = self.factory(name).ok_or_else(|| QueueError::UnknownJob {
            name: name.to_owned(),
        })?;

        factory(content).map_err(|err| QueueError::JobBuild {
            name: name.to_owned(),
            reason: format!("{err:#}"),
        })
    }

    /// Rebuild a job from a message body, then attach `delivery` metadata.
    pub fn decode(&self, body: &str, delivery: JobMetadata) -> QueueResult<QueuedJob> {
        let JobBody {
            name,
            content,
            mut metadata,
        } = serde_json::from_str(body)?;

        let job = self.build(&name, content)?;
        metadata.attach(delivery);
        Ok(QueuedJob::from_boxed(job).with_metadata(metadata))
    }
}

impl fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories = self
            .factories
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<&String> = factories.keys().collect();
        names.sort();
        f.debug_struct("JobRegistry").field("jobs", &names).finish()
    }
}

fn build_from_content<J>(content: Value) -> anyhow::Result<Box<dyn Job>>
where
    J: Job + DeserializeOwned + 'static,
{
    let job: J = serde_json::from_value(content)?;
    Ok(Box::new(job))
}

/// Register a job type with the global registry.
pub fn register_job<J>(name: &'static str)
where
    J: Job + DeserializeOwned + 'static,
{
    JobRegistry::global().register::<J>(name);
}
