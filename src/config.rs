use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::QueueResult;
use crate::queue::SqsQueue;
use crate::registry::JobRegistry;
use crate::transport::{MemoryTransport, RedisTransport, RedisTransportConfig, Transport};
use crate::utils::constants::{DEFAULT_KEY_PREFIX, DEFAULT_REDIS_URL};


/// Adapter configuration for one queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueConfig {
    pub name: String,
    /// Use this URL instead of resolving `name` through the transport.
    pub queue_url: Option<String>,
}

impl QueueConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue_url: None,
        }
    }

    pub fn with_queue_url(mut self, url: impl Into<String>) -> Self {
        self.queue_url = Some(url.into());
        self
    }
}


/// Which transport backs the queues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Redis,
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Backend::Redis),
            "memory" => Ok(Backend::Memory),
            other => Err(anyhow!("unknown backend '{other}', expected 'redis' or 'memory'")),
        }
    }
}


/// Process settings, read from the environment.
///
/// - `QRUSH_SQS_BACKEND`: `redis` (default) or `memory`
/// - `REDIS_URL`: defaults to `redis://127.0.0.1:6379`
/// - `QRUSH_SQS_PREFIX`: key namespace, defaults to `qrush:sqs`
/// - `QRUSH_SQS_QUEUES`: comma-separated queues to create on the memory backend
#[derive(Clone, Debug)]
pub struct Settings {
    pub backend: Backend,
    pub redis_url: String,
    pub key_prefix: String,
    pub queues: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::Redis,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            queues: Vec::new(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let backend = match lookup("QRUSH_SQS_BACKEND") {
            Some(value) => value.parse()?,
            None => defaults.backend,
        };

        Ok(Self {
            backend,
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: lookup("QRUSH_SQS_PREFIX").unwrap_or(defaults.key_prefix),
            queues: lookup("QRUSH_SQS_QUEUES")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.queues),
        })
    }

    /// Build the configured transport.
    pub async fn transport(&self) -> Result<Arc<dyn Transport>> {
        match self.backend {
            Backend::Redis => {
                let config = RedisTransportConfig {
                    url: self.redis_url.clone(),
                    key_prefix: self.key_prefix.clone(),
                };
                Ok(Arc::new(RedisTransport::connect(config).await?))
            }
            Backend::Memory => {
                let transport = MemoryTransport::new();
                for name in &self.queues {
                    transport.create_queue(name).await;
                }
                info!(queues = ?self.queues, "using in-memory transport");
                Ok(Arc::new(transport))
            }
        }
    }
}


/// Hands out one [`SqsQueue`] per queue name.
///
/// Each adapter is built (and its URL resolved) on first request, then reused.
pub struct QueueManager {
    transport: Arc<dyn Transport>,
    registry: JobRegistry,
    configs: HashMap<String, QueueConfig>,
    queues: Mutex<HashMap<String, Arc<SqsQueue>>>,
}

impl QueueManager {
    pub fn new(transport: Arc<dyn Transport>, registry: JobRegistry) -> Self {
        Self {
            transport,
            registry,
            configs: HashMap::new(),
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Register explicit settings for a queue, e.g. a fixed URL.
    pub fn with_queue(mut self, config: QueueConfig) -> Self {
        self.configs.insert(config.name.clone(), config);
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub async fn get(&self, name: &str) -> QueueResult<Arc<SqsQueue>> {
        let mut queues = self.queues.lock().await;
        if let Some(queue) = queues.get(name) {
            return Ok(queue.clone());
        }

        let config = self
            .configs
            .get(name)
            .cloned()
            .unwrap_or_else(|| QueueConfig::new(name));
        let queue = Arc::new(
            SqsQueue::connect(self.transport.clone(), config, self.registry.clone()).await?,
        );
        info!(queue = name, url = queue.url(), "queue ready");

        queues.insert(name.to_string(), queue.clone());
        Ok(queue)
    }
}
