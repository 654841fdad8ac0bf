// src/options.rs
//! Per-operation options.
//!
//! Field names deserialize from the documented camelCase keys
//! (`delaySeconds`, `messageGroupId`, `waitTimeSeconds`, ...), so the same
//! structs can be filled from query strings or JSON. Every struct has a
//! `validate` that runs before any network call.

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};
use crate::utils::constants::{
    MAX_BATCH_SIZE, MAX_DELAY_SECONDS, MAX_VISIBILITY_TIMEOUT, MAX_WAIT_TIME_SECONDS,
};

/// Options for `push` and for each entry of `batch_push`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushOptions {
    /// Seconds before the message becomes visible.
    pub delay_seconds: Option<u32>,
    /// FIFO queues only. Required there.
    pub message_group_id: Option<String>,
    /// FIFO queues only. Used verbatim when set.
    pub message_deduplication_id: Option<String>,
    /// FIFO queues only. Derive the deduplication id from the body checksum.
    pub enable_auto_deduplication: bool,
}

impl PushOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn message_group_id(mut self, group: impl Into<String>) -> Self {
        self.message_group_id = Some(group.into());
        self
    }

    pub fn message_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.message_deduplication_id = Some(id.into());
        self
    }

    pub fn enable_auto_deduplication(mut self, enabled: bool) -> Self {
        self.enable_auto_deduplication = enabled;
        self
    }

    pub fn validate(&self) -> QueueResult<()> {
        check_range("delaySeconds", self.delay_seconds, 0, MAX_DELAY_SECONDS)
    }
}

/// Options for `pop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PopOptions {
    /// Seconds the delivered message stays hidden from other receivers.
    pub visibility_timeout: Option<u32>,
    /// Long-poll wait. `None` short-polls.
    pub wait_time_seconds: Option<u32>,
}

impl PopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn validate(&self) -> QueueResult<()> {
        check_polling(self.visibility_timeout, self.wait_time_seconds)
    }
}

/// Options for `batch_pop`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchPopOptions {
    /// Upper bound only: the service may return fewer.
    pub max_number_of_messages: Option<u32>,
    pub visibility_timeout: Option<u32>,
    pub wait_time_seconds: Option<u32>,
}

impl BatchPopOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_number_of_messages(mut self, max: u32) -> Self {
        self.max_number_of_messages = Some(max);
        self
    }

    pub fn visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn validate(&self) -> QueueResult<()> {
        check_range(
            "maxNumberOfMessages",
            self.max_number_of_messages,
            1,
            MAX_BATCH_SIZE as u32,
        )?;
        check_polling(self.visibility_timeout, self.wait_time_seconds)
    }
}

impl From<PopOptions> for BatchPopOptions {
    fn from(options: PopOptions) -> Self {
        Self {
            max_number_of_messages: Some(1),
            visibility_timeout: options.visibility_timeout,
            wait_time_seconds: options.wait_time_seconds,
        }
    }
}

fn check_polling(visibility_timeout: Option<u32>, wait_time_seconds: Option<u32>) -> QueueResult<()> {
    check_range(
        "visibilityTimeout",
        visibility_timeout,
        0,
        MAX_VISIBILITY_TIMEOUT,
    )?;
    check_range("waitTimeSeconds", wait_time_seconds, 0, MAX_WAIT_TIME_SECONDS)
}

fn check_range(field: &'static str, value: Option<u32>, min: u32, max: u32) -> QueueResult<()> {
    match value {
        Some(v) if v < min || v > max => Err(QueueError::InvalidOption {
            field,
            reason: format!("{v} is outside {min}..={max}"),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_options_read_documented_keys() {
        let options: PushOptions = serde_json::from_value(json!({
            "delaySeconds": 5,
            "messageGroupId": "g",
            "enableAutoDeduplication": true
        }))
        .unwrap();

        assert_eq!(
            options,
            PushOptions::new()
                .delay_seconds(5)
                .message_group_id("g")
                .enable_auto_deduplication(true)
        );
    }

    #[test]
    fn wait_time_above_twenty_is_rejected() {
        let err = PopOptions::new().wait_time_seconds(21).validate().unwrap_err();
        assert!(matches!(
            err,
            QueueError::InvalidOption { field: "waitTimeSeconds", .. }
        ));
        assert!(PopOptions::new().wait_time_seconds(20).validate().is_ok());
    }

    #[test]
    fn batch_size_must_be_one_to_ten() {
        assert!(BatchPopOptions::new().max_number_of_messages(0).validate().is_err());
        assert!(BatchPopOptions::new().max_number_of_messages(11).validate().is_err());
        assert!(BatchPopOptions::new().max_number_of_messages(10).validate().is_ok());
        assert!(BatchPopOptions::new().validate().is_ok());
    }

    #[test]
    fn delay_is_capped() {
        assert!(PushOptions::new().delay_seconds(901).validate().is_err());
        assert!(PushOptions::new().delay_seconds(900).validate().is_ok());
    }

    #[test]
    fn pop_converts_to_single_message_batch() {
        let batch = BatchPopOptions::from(PopOptions::new().visibility_timeout(60));
        assert_eq!(batch.max_number_of_messages, Some(1));
        assert_eq!(batch.visibility_timeout, Some(60));
        assert_eq!(batch.wait_time_seconds, None);
    }
}
