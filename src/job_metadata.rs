// src/job_metadata.rs
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::constants::{METADATA_ID, METADATA_MD5, METADATA_RECEIPT_HANDLE};

/// Side-channel key/value data carried by a job.
///
/// Ordered, so a job always serializes to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobMetadata(BTreeMap<String, Value>);

impl JobMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Merge `entries` in, overwriting keys that already exist.
    pub fn attach<K, V, I>(&mut self, entries: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in entries {
            self.set(key, value);
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Queue-assigned message id.
    pub fn id(&self) -> Option<&str> {
        self.get_str(METADATA_ID)
    }

    /// Body checksum reported by the queue.
    pub fn md5(&self) -> Option<&str> {
        self.get_str(METADATA_MD5)
    }

    /// Per-delivery token, present only on popped jobs.
    pub fn receipt_handle(&self) -> Option<&str> {
        self.get_str(METADATA_RECEIPT_HANDLE)
    }

    /// Copy without the keys the queue assigns per push or delivery.
    pub(crate) fn without_delivery_keys(&self) -> Self {
        let mut copy = self.clone();
        for key in [METADATA_ID, METADATA_MD5, METADATA_RECEIPT_HANDLE] {
            copy.0.remove(key);
        }
        copy
    }
}

impl IntoIterator for JobMetadata {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
