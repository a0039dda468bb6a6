use pullq_core::message::BaseMessage;

use crate::pull_param::PullParam;

/// Decides whether a pulled message is handed to the application.
///
/// Rejected messages are still acknowledged to the broker, they are dropped and
/// never redelivered.
pub trait PulledMessageFilter: Send + Sync {
    fn filter(&self, message: &BaseMessage) -> bool;
}

/// Accepts every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl PulledMessageFilter for AcceptAll {
    fn filter(&self, _message: &BaseMessage) -> bool {
        true
    }
}

/// One rejection rule of a pull cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterRule {
    // at-most-once: a message seen before is not delivered again
    SuppressRedelivery,
    // payload failed to decode upstream
    RejectCorrupt,
    // the message targets another consumer group
    RequireGroup(String),
}

impl FilterRule {
    fn accepts(&self, message: &BaseMessage) -> bool {
        match self {
            FilterRule::SuppressRedelivery => message.times() <= 1,
            FilterRule::RejectCorrupt => !message.is_corrupted(),
            FilterRule::RequireGroup(group) => message
                .target_consumer_group()
                .map_or(true, |target| target == group),
        }
    }
}

/// Filter bound to a single pull cycle, its rules derived from the pull param
#[derive(Debug, Clone)]
pub struct PulledMessageFilterImpl {
    rules: Vec<FilterRule>,
}

impl PulledMessageFilterImpl {
    pub fn new(pull_param: &PullParam) -> Self {
        let mut rules = Vec::with_capacity(3);
        if pull_param.is_consume_most_once() {
            rules.push(FilterRule::SuppressRedelivery);
        }
        rules.push(FilterRule::RejectCorrupt);
        rules.push(FilterRule::RequireGroup(pull_param.group().to_string()));
        PulledMessageFilterImpl { rules }
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }
}

impl PulledMessageFilter for PulledMessageFilterImpl {
    fn filter(&self, message: &BaseMessage) -> bool {
        self.rules.iter().all(|rule| rule.accepts(message))
    }
}
