//! pullq-client
//!
//! pullq-client -- pull entry and acknowledgment pipeline of a pullq consumer.
//!
//! A [`PullEntry`] consumes one (subject, consumer group, partition, broker group)
//! assignment: it pulls batches through a [`PullService`], filters them, hands
//! the accepted messages to the application and reports acknowledgments back to
//! the broker through its [`AckSendQueue`].

mod assignment;
pub use assignment::{ConsumeParam, ConsumptionAssignment};

pub mod errors;

pub mod config;

pub mod client_metrics;

mod retry_manager;

mod broker_group;
pub use broker_group::{BrokerGroupInfo, BrokerGroupRegistry};

mod broker_service;
pub use broker_service::BrokerService;

mod pull_service;
pub use pull_service::PullService;

mod pull_param;
pub use pull_param::{PullParam, PullParamBuilder};

mod pull_result;
pub use pull_result::PullResult;

mod message_filter;
pub use message_filter::{AcceptAll, FilterRule, PulledMessageFilter, PulledMessageFilterImpl};

mod pulled_message;
pub use pulled_message::{AckEntry, AckHook, AckState, PulledMessage};

mod ack_service;
pub use ack_service::{AckRequest, AckService, SendMessageBack};

mod ack_send_queue;
pub use ack_send_queue::{AckSendQueue, AckWindow, DrainOutcome};

mod pull_entry;
pub use pull_entry::{PullContext, PullEntry};

pub use pullq_core::{
    consume_strategy::ConsumeStrategy,
    message::{BaseMessage, MessageKey},
    protocol::{ClientType, CommandCode},
};

#[cfg(test)]
mod config_test;
#[cfg(test)]
mod ack_send_queue_test;
