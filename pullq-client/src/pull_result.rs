use pullq_core::message::BaseMessage;
use pullq_core::protocol::CommandCode;
use std::sync::Arc;

use crate::broker_group::BrokerGroupInfo;

/// One pull response, valid for a single pull cycle
#[derive(Debug, Clone)]
pub struct PullResult {
    response_code: CommandCode,
    // the broker group that answered
    broker_group: Arc<BrokerGroupInfo>,
    // decoded batch; a response without a batch is represented as empty
    messages: Vec<BaseMessage>,
}

impl PullResult {
    pub fn new(
        response_code: CommandCode,
        broker_group: Arc<BrokerGroupInfo>,
        messages: Vec<BaseMessage>,
    ) -> Self {
        PullResult {
            response_code,
            broker_group,
            messages,
        }
    }

    pub fn empty(response_code: CommandCode, broker_group: Arc<BrokerGroupInfo>) -> Self {
        Self::new(response_code, broker_group, Vec::new())
    }

    pub fn response_code(&self) -> CommandCode {
        self.response_code
    }

    pub fn broker_group(&self) -> &Arc<BrokerGroupInfo> {
        &self.broker_group
    }

    pub fn messages(&self) -> &[BaseMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<BaseMessage> {
        self.messages
    }
}
