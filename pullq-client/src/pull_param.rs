use pullq_core::consume_strategy::ConsumeStrategy;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    ack_send_queue::AckWindow,
    assignment::ConsumeParam,
    broker_group::BrokerGroupInfo,
    errors::{ClientError, Result},
};

/// One pull request addressed to a broker group. Built fresh for every pull cycle.
#[derive(Debug, Clone)]
pub struct PullParam {
    consume_param: Arc<ConsumeParam>,
    broker_group: Arc<BrokerGroupInfo>,
    pull_batch_size: usize,
    // how long the broker may hold the request waiting for messages
    timeout: Duration,
    // how long the client waits for the response
    request_timeout: Duration,
    min_pull_offset: i64,
    max_pull_offset: i64,
    partition_name: String,
    consume_strategy: ConsumeStrategy,
    allocation_version: i32,
}

impl PullParam {
    pub fn builder() -> PullParamBuilder {
        PullParamBuilder::default()
    }

    pub fn consume_param(&self) -> &ConsumeParam {
        &self.consume_param
    }

    pub fn subject(&self) -> &str {
        &self.consume_param.subject
    }

    pub fn group(&self) -> &str {
        &self.consume_param.consumer_group
    }

    pub fn consumer_id(&self) -> &str {
        &self.consume_param.consumer_id
    }

    pub fn is_consume_most_once(&self) -> bool {
        self.consume_param.consume_most_once
    }

    pub fn broker_group(&self) -> &Arc<BrokerGroupInfo> {
        &self.broker_group
    }

    pub fn pull_batch_size(&self) -> usize {
        self.pull_batch_size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn min_pull_offset(&self) -> i64 {
        self.min_pull_offset
    }

    pub fn max_pull_offset(&self) -> i64 {
        self.max_pull_offset
    }

    pub fn partition_name(&self) -> &str {
        &self.partition_name
    }

    pub fn consume_strategy(&self) -> ConsumeStrategy {
        self.consume_strategy
    }

    pub fn allocation_version(&self) -> i32 {
        self.allocation_version
    }
}

/// PullParamBuilder collects the pieces of a pull request.
///
/// The consume param, the broker group, the partition name and the consume
/// strategy are required; the rest default to zero values.
#[derive(Debug, Clone, Default)]
pub struct PullParamBuilder {
    consume_param: Option<Arc<ConsumeParam>>,
    broker_group: Option<Arc<BrokerGroupInfo>>,
    pull_batch_size: usize,
    timeout: Duration,
    request_timeout: Duration,
    ack_window: AckWindow,
    partition_name: Option<String>,
    consume_strategy: Option<ConsumeStrategy>,
    allocation_version: i32,
}

impl PullParamBuilder {
    pub fn with_consume_param(mut self, consume_param: Arc<ConsumeParam>) -> Self {
        self.consume_param = Some(consume_param);
        self
    }

    pub fn with_broker_group(mut self, broker_group: Arc<BrokerGroupInfo>) -> Self {
        self.broker_group = Some(broker_group);
        self
    }

    pub fn with_pull_batch_size(mut self, pull_batch_size: usize) -> Self {
        self.pull_batch_size = pull_batch_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Sets the min/max pull offsets from an ack window snapshot.
    pub fn with_ack_window(mut self, ack_window: AckWindow) -> Self {
        self.ack_window = ack_window;
        self
    }

    pub fn with_partition_name(mut self, partition_name: impl Into<String>) -> Self {
        self.partition_name = Some(partition_name.into());
        self
    }

    pub fn with_consume_strategy(mut self, consume_strategy: ConsumeStrategy) -> Self {
        self.consume_strategy = Some(consume_strategy);
        self
    }

    pub fn with_allocation_version(mut self, allocation_version: i32) -> Self {
        self.allocation_version = allocation_version;
        self
    }

    pub fn build(self) -> Result<PullParam> {
        let consume_param = self.consume_param.ok_or_else(|| {
            ClientError::Unrecoverable("consume param is required to build a PullParam".into())
        })?;
        let broker_group = self.broker_group.ok_or_else(|| {
            ClientError::Unrecoverable("broker group is required to build a PullParam".into())
        })?;
        let partition_name = self.partition_name.ok_or_else(|| {
            ClientError::Unrecoverable("partition name is required to build a PullParam".into())
        })?;
        let consume_strategy = self.consume_strategy.ok_or_else(|| {
            ClientError::Unrecoverable("consume strategy is required to build a PullParam".into())
        })?;
        Ok(PullParam {
            consume_param,
            broker_group,
            pull_batch_size: self.pull_batch_size,
            timeout: self.timeout,
            request_timeout: self.request_timeout,
            min_pull_offset: self.ack_window.min_pull_offset,
            max_pull_offset: self.ack_window.max_pull_offset,
            partition_name,
            consume_strategy,
            allocation_version: self.allocation_version,
        })
    }
}
