use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::errors::{CoreError, Result};

/// Internal property keys set by the broker or by the client decoding stage.
///
/// Application properties share the same attribute map, so the keys are prefixed
/// to stay out of the way of user-defined names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    // how many times the broker delivered this message, starting at 1
    Times,
    // position of the message in the consumer's pull sequence, assigned by the broker
    PullOffset,
    // set by the decoder when the payload could not be deserialized
    CorruptData,
    // the only consumer group allowed to see this message, if set
    ConsumerGroupName,
}

impl MessageKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKey::Times => "pullq_times",
            MessageKey::PullOffset => "pullq_pull_offset",
            MessageKey::CorruptData => "pullq_corrupt_data",
            MessageKey::ConsumerGroupName => "pullq_consumer_group_name",
        }
    }
}

/// A message as decoded from a pull response, before any filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseMessage {
    // unique id assigned by the producer
    pub message_id: String,
    // subject the message was published to
    pub subject: String,
    // the actual payload of the message
    pub payload: Vec<u8>,
    // user-defined properties plus the internal `MessageKey` properties
    pub attributes: HashMap<String, String>,
}

impl BaseMessage {
    pub fn new(message_id: impl Into<String>, subject: impl Into<String>) -> Self {
        BaseMessage {
            message_id: message_id.into(),
            subject: subject.into(),
            payload: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl ToString) {
        self.attributes.insert(key.into(), value.to_string());
    }

    pub fn set_key(&mut self, key: MessageKey, value: impl ToString) {
        self.set_property(key.as_str(), value);
    }

    pub fn get_string_property(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Absent or unparsable values read as `false`.
    pub fn get_boolean_property(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Delivery count of this message; a message without the property is a first delivery.
    pub fn times(&self) -> u32 {
        self.get_string_property(MessageKey::Times.as_str())
            .and_then(|v| v.parse().ok())
            .unwrap_or(1)
    }

    pub fn pull_offset(&self) -> Result<i64> {
        let key = MessageKey::PullOffset.as_str();
        let raw = self
            .get_string_property(key)
            .ok_or_else(|| CoreError::MissingProperty {
                message_id: self.message_id.clone(),
                key,
            })?;
        raw.parse().map_err(|_| CoreError::InvalidProperty {
            message_id: self.message_id.clone(),
            key,
            value: raw.to_string(),
        })
    }

    pub fn is_corrupted(&self) -> bool {
        self.get_boolean_property(MessageKey::CorruptData.as_str())
    }

    pub fn target_consumer_group(&self) -> Option<&str> {
        self.get_string_property(MessageKey::ConsumerGroupName.as_str())
            .filter(|group| !group.is_empty())
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

impl Display for BaseMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "subject:_{}_msg_id:_{}", self.subject, self.message_id)
    }
}
