use metrics::counter;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::errors::{ClientError, Result};

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 6] = [
    PULL_WORK_COUNT,
    PULL_FAIL_COUNT,
    PULL_MESSAGE_COUNT,
    ACK_SEND_COUNT,
    ACK_SEND_FAIL_COUNT,
    SEND_BACK_COUNT,
];

// PULL Metrics --------------------------

pub(crate) const PULL_WORK_COUNT: Metric = Metric {
    name: "pullq_pull_work_count",
    description: "Total number of pull requests issued by the consumer",
};

pub(crate) const PULL_FAIL_COUNT: Metric = Metric {
    name: "pullq_pull_fail_count",
    description: "Total number of pull requests that failed at the transport level",
};

pub(crate) const PULL_MESSAGE_COUNT: Metric = Metric {
    name: "pullq_pull_message_count",
    description: "Total number of messages received in pull responses",
};

// ACK Metrics --------------------------

pub(crate) const ACK_SEND_COUNT: Metric = Metric {
    name: "pullq_ack_send_count",
    description: "Total number of ack requests accepted by the broker",
};

pub(crate) const ACK_SEND_FAIL_COUNT: Metric = Metric {
    name: "pullq_ack_send_fail_count",
    description: "Total number of ack requests that failed and were kept for retry",
};

pub(crate) const SEND_BACK_COUNT: Metric = Metric {
    name: "pullq_send_back_count",
    description: "Total number of messages sent back to the broker for redelivery",
};

/// Register the counter descriptions with the installed recorder
pub fn describe_metrics() {
    for metric in COUNTERS {
        metrics::describe_counter!(metric.name, metric.description);
    }
}

/// Increment a subject/group labelled counter.
pub(crate) fn inc_subject_group(
    metric: &Metric,
    subject: &str,
    group: &str,
    value: u64,
) -> Result<()> {
    isolate_recorder(metric, || {
        counter!(metric.name, "subject" => subject.to_string(), "group" => group.to_string())
            .increment(value);
    })
}

/// Record the size of a pull response.
pub(crate) fn record_pulled_messages(
    subject: &str,
    group: &str,
    broker: &str,
    count: usize,
) -> Result<()> {
    isolate_recorder(&PULL_MESSAGE_COUNT, || {
        counter!(
            PULL_MESSAGE_COUNT.name,
            "subject" => subject.to_string(),
            "group" => group.to_string(),
            "broker" => broker.to_string()
        )
        .increment(count as u64);
    })
}

// The recorder is external code; a panic inside it becomes an error the caller
// logs before it keeps consuming.
fn isolate_recorder(metric: &Metric, emit: impl FnOnce()) -> Result<()> {
    catch_unwind(AssertUnwindSafe(emit))
        .map_err(|_| ClientError::MetricsRecorder(metric.name.to_string()))
}
