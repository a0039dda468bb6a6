use async_trait::async_trait;
use pullq_core::consume_strategy::ConsumeStrategy;
use pullq_core::message::BaseMessage;
use std::sync::Arc;
use tracing::{trace, warn};

use crate::{
    ack_send_queue::AckSendQueue,
    errors::Result,
    message_filter::PulledMessageFilter,
    pull_param::PullParam,
    pull_result::PullResult,
    pulled_message::{AckHook, PulledMessage},
};

/// Acknowledgment of a contiguous range of pull offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckRequest {
    pub subject: String,
    pub consumer_group: String,
    pub partition_name: String,
    pub consumer_id: String,
    pub consume_strategy: ConsumeStrategy,
    pub allocation_version: i32,
    pub broadcast: bool,
    // inclusive range
    pub pull_offset_begin: i64,
    pub pull_offset_last: i64,
}

impl AckRequest {
    pub fn len(&self) -> usize {
        (self.pull_offset_last - self.pull_offset_begin + 1).max(0) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transmits acknowledgments to a broker group and turns pull responses into
/// deliverable messages.
#[async_trait]
pub trait AckService: Send + Sync {
    async fn send_ack(&self, broker_group: &str, request: AckRequest) -> Result<()>;

    /// Registers every message of the response with `ack_queue` and returns the
    /// ones accepted by `filter`.
    ///
    /// A rejected message is completed on the spot, so the broker sees it acked
    /// and never redelivers it. A message that cannot be registered is dropped
    /// unacknowledged and comes back on a later pull.
    fn build_pulled_messages(
        &self,
        pull_param: &PullParam,
        pull_result: PullResult,
        ack_queue: &AckSendQueue,
        ack_hook: Option<Arc<dyn AckHook>>,
        filter: &dyn PulledMessageFilter,
    ) -> Vec<PulledMessage> {
        let messages = pull_result.into_messages();
        let mut pulled = Vec::with_capacity(messages.len());
        for message in messages {
            let entry = match ack_queue.register(&message) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(
                        error = %e,
                        subject = %pull_param.subject(),
                        msg_id = %message.message_id,
                        "dropping message that cannot be registered for ack"
                    );
                    continue;
                }
            };
            if !filter.filter(&message) {
                trace!(subject = %pull_param.subject(), msg_id = %message.message_id, "message filtered out");
                entry.complete();
                continue;
            }
            pulled.push(PulledMessage::new(message, entry, ack_hook.clone()));
        }
        pulled
    }
}

/// Returns a message whose consumption failed to the broker for redelivery
#[async_trait]
pub trait SendMessageBack: Send + Sync {
    async fn send_back(&self, broker_group: &str, message: &BaseMessage) -> Result<()>;
}
