// src/builtin.rs
//! Jobs shipped with the binary so a queue can be exercised without writing code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job::Job;
use crate::registry::JobRegistry;

pub const LOG_JOB: &str = "log";

/// Writes its message to the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogJob {
    pub message: String,
}

#[async_trait]
impl Job for LogJob {
    async fn perform(&self) -> anyhow::Result<()> {
        tracing::info!(message = %self.message, "log job");
        Ok(())
    }

    fn name(&self) -> &'static str {
        LOG_JOB
    }

    fn content(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

pub fn register_builtin_jobs(registry: &JobRegistry) {
    registry.register::<LogJob>(LOG_JOB);
}
