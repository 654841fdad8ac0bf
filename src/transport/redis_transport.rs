//! Redis-backed transport emulating the hosted queue service.
//!
//! Layout per queue (`{prefix}:{name}` is the queue URL):
//! - `{url}:visible`: sorted set, message id scored by visible-at (ms)
//! - `{url}:msg:{id}`: hash with `body`, `md5`, `receipt`
//! - `{url}:receipt:{handle}`: message id, expires after the longest visibility timeout
//! - `{url}:dedup:{dedup id}`: message id, expires after the deduplication window
//!
//! Send, receive and delete run as Lua scripts: a FIFO dedup id is claimed in
//! the same step that stores the message, and concurrent workers never share a
//! delivery. Message-group ordering is not emulated.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::MultiplexedConnection, Client, Script};
use tokio::time::{sleep, Instant};

use super::{
    check_batch_len, new_token, BatchFailure, DeleteBatchEntry, DeleteBatchOutput,
    ReceiveRequest, ReceivedMessage, SendBatchEntry, SendBatchOutput, SendBatchSuccess,
    SendMessageOutput, SendMessageRequest, Transport,
};
use crate::error::{TransportError, TransportResult};
use crate::utils::constants::{
    DEDUPLICATION_WINDOW_SECS, DEFAULT_KEY_PREFIX, DEFAULT_REDIS_URL, DEFAULT_VISIBILITY_TIMEOUT,
    FIFO_QUEUE_SUFFIX, MAX_VISIBILITY_TIMEOUT,
};
use crate::utils::md5_hex;

const LONG_POLL_INTERVAL: Duration = Duration::from_millis(200);

// Claims the dedup id (when ARGV[1] is '1') and stores the message in one
// step. Returns the id of the stored message, or of the earlier duplicate.
const ENQUEUE_SCRIPT: &str = r#"
if ARGV[1] == '1' then
  local existing = redis.call('GET', KEYS[1])
  if existing then
    return existing
  end
  redis.call('SET', KEYS[1], ARGV[2], 'EX', tonumber(ARGV[3]))
end
redis.call('HSET', KEYS[2], 'body', ARGV[4], 'md5', ARGV[5], 'receipt', '')
redis.call('ZADD', KEYS[3], ARGV[6], ARGV[2])
return ARGV[2]
"#;

const RECEIVE_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
local out = {}
for i, id in ipairs(ids) do
  local msg = ARGV[4] .. id
  local fields = redis.call('HMGET', msg, 'body', 'md5')
  if fields[1] then
    local handle = ARGV[6 + i]
    redis.call('ZADD', KEYS[1], ARGV[3], id)
    redis.call('HSET', msg, 'receipt', handle)
    redis.call('SET', ARGV[5] .. handle, id, 'EX', tonumber(ARGV[6]))
    table.insert(out, {id, handle, fields[1], fields[2]})
  else
    redis.call('ZREM', KEYS[1], id)
  end
end
return out
"#;

const DELETE_SCRIPT: &str = r#"
local id = redis.call('GET', KEYS[1])
if not id then
  return 0
end
local msg = ARGV[1] .. id
if redis.call('HGET', msg, 'receipt') == ARGV[2] then
  redis.call('DEL', msg)
  redis.call('ZREM', KEYS[2], id)
end
return 1
"#;

/// Configuration for [`RedisTransport`]
#[derive(Debug, Clone)]
pub struct RedisTransportConfig {
    /// Redis connection URL
    pub url: String,
    /// Namespace for every key the transport writes
    pub key_prefix: String,
}

impl Default for RedisTransportConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl RedisTransportConfig {
    /// Create config with custom Redis URL
    pub fn with_url(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }
}

/// Redis-backed [`Transport`].
pub struct RedisTransport {
    connection: MultiplexedConnection,
    config: RedisTransportConfig,
    enqueue_script: Script,
    receive_script: Script,
    delete_script: Script,
}

impl RedisTransport {
    pub async fn connect(config: RedisTransportConfig) -> TransportResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| {
            TransportError::new("Redis.ConnectionFailed", format!("{}: {e}", config.url))
        })?;
        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                TransportError::new("Redis.ConnectionFailed", format!("{}: {e}", config.url))
            })?;

        tracing::info!(url = %config.url, prefix = %config.key_prefix, "connected to redis transport");

        Ok(Self {
            connection,
            config,
            enqueue_script: Script::new(ENQUEUE_SCRIPT),
            receive_script: Script::new(RECEIVE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        })
    }

    fn conn(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    async fn enqueue(
        &self,
        queue_url: &str,
        message: SendMessageRequest,
    ) -> TransportResult<SendMessageOutput> {
        let mut conn = self.conn();
        let md5_of_body = md5_hex(&message.body);
        let plan = EnqueuePlan::new(queue_url, &message, &md5_of_body, new_token());
        let visible_at = Utc::now().timestamp_millis()
            + i64::from(message.delay_seconds.unwrap_or(0)) * 1000;

        let message_id: String = self
            .enqueue_script
            .key(&plan.dedup_key)
            .key(&plan.message_key)
            .key(format!("{queue_url}:visible"))
            .arg(if plan.deduplicate { "1" } else { "0" })
            .arg(&plan.message_id)
            .arg(DEDUPLICATION_WINDOW_SECS)
            .arg(&message.body)
            .arg(&md5_of_body)
            .arg(visible_at)
            .invoke_async(&mut conn)
            .await?;

        if message_id != plan.message_id {
            tracing::debug!(
                dedup_key = %plan.dedup_key,
                "duplicate send inside deduplication window"
            );
        }

        Ok(SendMessageOutput {
            message_id,
            md5_of_body,
        })
    }

    async fn remove(&self, queue_url: &str, receipt_handle: &str) -> TransportResult<()> {
        let mut conn = self.conn();
        let found: i64 = self
            .delete_script
            .key(format!("{queue_url}:receipt:{receipt_handle}"))
            .key(format!("{queue_url}:visible"))
            .arg(format!("{queue_url}:msg:"))
            .arg(receipt_handle)
            .invoke_async(&mut conn)
            .await?;

        if found == 0 {
            return Err(invalid_receipt(receipt_handle));
        }
        Ok(())
    }
}

/// Keys and flags for one run of the enqueue script.
#[derive(Debug, PartialEq, Eq)]
struct EnqueuePlan {
    message_id: String,
    message_key: String,
    dedup_key: String,
    deduplicate: bool,
}

impl EnqueuePlan {
    fn new(
        queue_url: &str,
        message: &SendMessageRequest,
        md5_of_body: &str,
        message_id: String,
    ) -> Self {
        let deduplicate = is_fifo(queue_url);
        let dedup_id = message
            .message_deduplication_id
            .as_deref()
            .unwrap_or(md5_of_body);

        Self {
            message_key: format!("{queue_url}:msg:{message_id}"),
            dedup_key: format!("{queue_url}:dedup:{dedup_id}"),
            message_id,
            deduplicate,
        }
    }
}

fn is_fifo(queue_url: &str) -> bool {
    queue_url.ends_with(FIFO_QUEUE_SUFFIX)
}

fn invalid_receipt(receipt_handle: &str) -> TransportError {
    TransportError::new(
        "ReceiptHandleIsInvalid",
        format!("the receipt handle '{receipt_handle}' is not valid for this queue"),
    )
}

/// Checks the service makes before accepting a message.
fn reject_reason(queue_url: &str, message: &SendMessageRequest) -> Option<TransportError> {
    if is_fifo(queue_url) && message.message_group_id.as_deref().map_or(true, str::is_empty) {
        return Some(TransportError::new(
            "MissingParameter",
            "the request must contain the parameter MessageGroupId",
        ));
    }
    None
}

#[async_trait]
impl Transport for RedisTransport {
    async fn resolve(&self, queue_name: &str) -> TransportResult<String> {
        Ok(format!("{}:{queue_name}", self.config.key_prefix))
    }

    async fn send(
        &self,
        queue_url: &str,
        message: SendMessageRequest,
    ) -> TransportResult<SendMessageOutput> {
        if let Some(err) = reject_reason(queue_url, &message) {
            return Err(err);
        }
        self.enqueue(queue_url, message).await
    }

    async fn send_batch(
        &self,
        queue_url: &str,
        entries: Vec<SendBatchEntry>,
    ) -> TransportResult<SendBatchOutput> {
        check_batch_len(entries.len())?;

        let mut output = SendBatchOutput::default();
        for entry in entries {
            if let Some(err) = reject_reason(queue_url, &entry.message) {
                output.failed.push(BatchFailure {
                    id: entry.id,
                    code: err.code,
                    message: err.message,
                    sender_fault: true,
                });
                continue;
            }
            let sent = self.enqueue(queue_url, entry.message).await?;
            output.successful.push(SendBatchSuccess {
                id: entry.id,
                message_id: sent.message_id,
                md5_of_body: sent.md5_of_body,
            });
        }
        Ok(output)
    }

    async fn receive(
        &self,
        queue_url: &str,
        request: ReceiveRequest,
    ) -> TransportResult<Vec<ReceivedMessage>> {
        let max = request.max_number_of_messages.unwrap_or(1).max(1);
        let visibility_ms = i64::from(
            request
                .visibility_timeout
                .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT),
        ) * 1000;
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(request.wait_time_seconds.unwrap_or(0)));

        loop {
            let mut conn = self.conn();
            let now = Utc::now().timestamp_millis();
            let handles: Vec<String> = (0..max).map(|_| new_token()).collect();

            let rows: Vec<(String, String, String, String)> = self
                .receive_script
                .key(format!("{queue_url}:visible"))
                .arg(now)
                .arg(max)
                .arg(now + visibility_ms)
                .arg(format!("{queue_url}:msg:"))
                .arg(format!("{queue_url}:receipt:"))
                .arg(MAX_VISIBILITY_TIMEOUT)
                .arg(handles)
                .invoke_async(&mut conn)
                .await?;

            if !rows.is_empty() || Instant::now() >= deadline {
                return Ok(rows
                    .into_iter()
                    .map(|(message_id, receipt_handle, body, md5_of_body)| ReceivedMessage {
                        body,
                        message_id,
                        receipt_handle,
                        md5_of_body,
                    })
                    .collect());
            }
            sleep(LONG_POLL_INTERVAL).await;
        }
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> TransportResult<()> {
        self.remove(queue_url, receipt_handle).await
    }

    async fn delete_batch(
        &self,
        queue_url: &str,
        entries: Vec<DeleteBatchEntry>,
    ) -> TransportResult<DeleteBatchOutput> {
        check_batch_len(entries.len())?;

        let mut output = DeleteBatchOutput::default();
        for entry in entries {
            match self.remove(queue_url, &entry.receipt_handle).await {
                Ok(()) => output.successful.push(entry.id),
                Err(err) if err.code == "ReceiptHandleIsInvalid" => {
                    output.failed.push(BatchFailure {
                        id: entry.id,
                        code: err.code,
                        message: err.message,
                        sender_fault: true,
                    })
                }
                Err(err) => return Err(err),
            }
        }
        Ok(output)
    }
}
