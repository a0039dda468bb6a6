use pullq_core::consume_strategy::ConsumeStrategy;
use std::time::{SystemTime, UNIX_EPOCH};

/// Consumer-level parameters shared by every pull entry of one consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeParam {
    pub subject: String,
    pub consumer_group: String,
    pub consumer_id: String,
    // at-most-once delivery: redelivered messages are dropped instead of consumed again
    pub consume_most_once: bool,
    pub broadcast: bool,
    pub ordered: bool,
}

impl ConsumeParam {
    pub fn new(
        subject: impl Into<String>,
        consumer_group: impl Into<String>,
        consumer_id: impl Into<String>,
    ) -> Self {
        ConsumeParam {
            subject: subject.into(),
            consumer_group: consumer_group.into(),
            consumer_id: consumer_id.into(),
            consume_most_once: false,
            broadcast: false,
            ordered: false,
        }
    }

    pub fn with_consume_most_once(mut self, consume_most_once: bool) -> Self {
        self.consume_most_once = consume_most_once;
        self
    }
}

/// The (subject, consumer group, partition, broker group) a pull entry consumes.
///
/// Fixed for the lifetime of the entry; every pull and ack is attributed to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumptionAssignment {
    pub subject: String,
    pub consumer_group: String,
    pub partition_name: String,
    pub broker_group: String,
    pub consumer_id: String,
    pub consume_strategy: ConsumeStrategy,
    pub allocation_version: i32,
    pub broadcast: bool,
    pub ordered: bool,
    pub partition_set_version: i32,
    // millis since the epoch, 0 when the assignment never expires
    pub consumption_expired_time: u64,
}

impl ConsumptionAssignment {
    pub fn new(
        subject: impl Into<String>,
        consumer_group: impl Into<String>,
        partition_name: impl Into<String>,
        broker_group: impl Into<String>,
        consumer_id: impl Into<String>,
        consume_strategy: ConsumeStrategy,
    ) -> Self {
        ConsumptionAssignment {
            subject: subject.into(),
            consumer_group: consumer_group.into(),
            partition_name: partition_name.into(),
            broker_group: broker_group.into(),
            consumer_id: consumer_id.into(),
            broadcast: consume_strategy == ConsumeStrategy::Broadcast,
            ordered: consume_strategy == ConsumeStrategy::Ordered,
            consume_strategy,
            allocation_version: 0,
            partition_set_version: 0,
            consumption_expired_time: 0,
        }
    }

    pub fn with_allocation_version(mut self, allocation_version: i32) -> Self {
        self.allocation_version = allocation_version;
        self
    }

    pub fn with_partition_set_version(mut self, partition_set_version: i32) -> Self {
        self.partition_set_version = partition_set_version;
        self
    }

    pub fn with_consumption_expired_time(mut self, consumption_expired_time: u64) -> Self {
        self.consumption_expired_time = consumption_expired_time;
        self
    }

    /// A blank subject marks a placeholder assignment that must never be pulled.
    pub fn is_placeholder(&self) -> bool {
        self.subject.trim().is_empty()
    }

    /// True once the lock lease of an exclusive or ordered assignment has run out.
    pub fn is_consumption_expired(&self, now_millis: u64) -> bool {
        self.consume_strategy.requires_lock()
            && self.consumption_expired_time != 0
            && now_millis >= self.consumption_expired_time
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
