use pullq_core::protocol::{ClientType, CommandCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::{
    ack_send_queue::{AckSendQueue, AckWindow, DrainOutcome},
    ack_service::{AckService, SendMessageBack},
    assignment::{now_millis, ConsumeParam, ConsumptionAssignment},
    broker_group::{BrokerGroupInfo, BrokerGroupRegistry},
    broker_service::BrokerService,
    config::{ConfigCell, PullSubjectsConfig},
    errors::{best_effort, ClientError, Result},
    message_filter::PulledMessageFilterImpl,
    client_metrics::{inc_subject_group, record_pulled_messages, PULL_FAIL_COUNT, PULL_WORK_COUNT},
    pull_param::PullParam,
    pull_result::PullResult,
    pull_service::PullService,
    pulled_message::{AckHook, PulledMessage},
};

/// Deliveries above this count are logged as suspicious redelivery
const MAX_MESSAGE_RETRY_THRESHOLD: u32 = 5;

/// Collaborators shared by every pull entry of a client
#[derive(Clone)]
pub struct PullContext {
    pub pull_service: Arc<dyn PullService>,
    pub ack_service: Arc<dyn AckService>,
    pub broker_service: Arc<dyn BrokerService>,
    pub send_back: Arc<dyn SendMessageBack>,
    pub broker_groups: BrokerGroupRegistry,
    pub config: Arc<PullSubjectsConfig>,
}

/// PullEntry consumes one assignment: it builds pull requests, interprets the
/// broker answers, registers delivered messages for acknowledgment and gives
/// the partition back on teardown.
///
/// Pull cycles of one entry must not overlap; the caller's scheduler drives them.
pub struct PullEntry {
    assignment: Arc<ConsumptionAssignment>,
    consume_param: Arc<ConsumeParam>,
    pull_service: Arc<dyn PullService>,
    ack_service: Arc<dyn AckService>,
    broker_service: Arc<dyn BrokerService>,
    broker_groups: BrokerGroupRegistry,
    // absent for placeholder entries
    ack_send_queue: Option<Arc<AckSendQueue>>,
    pull_request_timeout: ConfigCell<Duration>,
    destroy_drain_timeout: Duration,
    offline_flush_timeout: Duration,
    destroyed: AtomicBool,
    lock_released: AtomicBool,
}

impl PullEntry {
    /// Creates the entry and starts its ack queue on the current tokio runtime;
    /// outside a runtime the queue cannot start and an error is returned.
    ///
    /// An assignment with a blank subject produces a placeholder entry without an
    /// ack queue; it refuses to pull.
    pub fn new(
        assignment: ConsumptionAssignment,
        consume_param: ConsumeParam,
        context: &PullContext,
    ) -> Result<Self> {
        let assignment = Arc::new(assignment);
        let client_config = context.config.client_config();

        let ack_send_queue = if assignment.is_placeholder() {
            None
        } else {
            let queue = AckSendQueue::new(
                Arc::clone(&assignment),
                Arc::clone(&context.ack_service),
                Arc::clone(&context.send_back),
                &client_config,
            );
            queue.init()?;
            Some(Arc::new(queue))
        };

        let pull_request_timeout = context.config.pull_request_timeout(&assignment.subject);

        Ok(PullEntry {
            assignment,
            consume_param: Arc::new(consume_param),
            pull_service: Arc::clone(&context.pull_service),
            ack_service: Arc::clone(&context.ack_service),
            broker_service: Arc::clone(&context.broker_service),
            broker_groups: context.broker_groups.clone(),
            ack_send_queue,
            pull_request_timeout,
            destroy_drain_timeout: client_config.destroy_drain_timeout(),
            offline_flush_timeout: client_config.offline_flush_timeout(),
            destroyed: AtomicBool::new(false),
            lock_released: AtomicBool::new(false),
        })
    }

    pub fn assignment(&self) -> &ConsumptionAssignment {
        &self.assignment
    }

    pub fn is_placeholder(&self) -> bool {
        self.ack_send_queue.is_none()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn ack_window(&self) -> AckWindow {
        self.ack_send_queue
            .as_ref()
            .map(|queue| queue.ack_window())
            .unwrap_or_default()
    }

    /// Runs one pull cycle against the assignment's broker group.
    ///
    /// An unavailable broker group or an expired consumption lease yields an
    /// empty cycle without contacting the broker. A transport failure marks the
    /// broker group failed and is returned.
    pub async fn pull_once(
        &self,
        pull_size: usize,
        pull_timeout: Duration,
        ack_hook: Option<Arc<dyn AckHook>>,
    ) -> Result<Vec<PulledMessage>> {
        if self.is_destroyed() {
            return Err(ClientError::EntryDestroyed);
        }
        let queue = self
            .ack_send_queue
            .as_ref()
            .ok_or(ClientError::PlaceholderEntry)?;

        if self.assignment.is_consumption_expired(now_millis()) {
            debug!(
                subject = %self.assignment.subject,
                partition = %self.assignment.partition_name,
                "consumption lease expired, skipping pull"
            );
            return Ok(Vec::new());
        }

        let broker_group = self.broker_groups.get_or_insert(&self.assignment.broker_group);
        if !broker_group.is_available() {
            debug!(broker_group = %broker_group.group_name(), "broker group unavailable, skipping pull");
            return Ok(Vec::new());
        }

        best_effort(
            "count pull work",
            inc_subject_group(
                &PULL_WORK_COUNT,
                &self.assignment.subject,
                &self.assignment.consumer_group,
                1,
            ),
        );
        let pull_param = self.build_pull_param(
            Arc::clone(&self.consume_param),
            broker_group,
            queue.ack_window(),
            pull_size,
            pull_timeout,
        )?;

        let pull_result = match tokio::time::timeout(
            pull_param.request_timeout(),
            self.pull_service.pull(&pull_param),
        )
        .await
        {
            Ok(Ok(pull_result)) => pull_result,
            Ok(Err(e)) => {
                self.mark_failed(pull_param.broker_group());
                return Err(e);
            }
            Err(_) => {
                self.mark_failed(pull_param.broker_group());
                return Err(ClientError::Transport(format!(
                    "pull request to {} timed out after {}ms",
                    pull_param.broker_group().group_name(),
                    pull_param.request_timeout().as_millis()
                )));
            }
        };

        Ok(self.handle_pull_result(&pull_param, pull_result, ack_hook))
    }

    /// Records a transport-level pull failure against `group`.
    pub fn mark_failed(&self, group: &BrokerGroupInfo) {
        best_effort(
            "count pull failure",
            inc_subject_group(
                &PULL_FAIL_COUNT,
                &self.assignment.subject,
                &self.assignment.consumer_group,
                1,
            ),
        );
        group.mark_failed();
    }

    /// Builds the pull request of one cycle; reads the live request timeout.
    pub fn build_pull_param(
        &self,
        consume_param: Arc<ConsumeParam>,
        pull_broker_group: Arc<BrokerGroupInfo>,
        ack_window: AckWindow,
        pull_size: usize,
        pull_timeout: Duration,
    ) -> Result<PullParam> {
        PullParam::builder()
            .with_consume_param(consume_param)
            .with_broker_group(pull_broker_group)
            .with_pull_batch_size(pull_size)
            .with_timeout(pull_timeout)
            .with_request_timeout(self.pull_request_timeout.get())
            .with_ack_window(ack_window)
            .with_partition_name(self.assignment.partition_name.clone())
            .with_consume_strategy(self.assignment.consume_strategy)
            .with_allocation_version(self.assignment.allocation_version)
            .build()
    }

    /// Interprets a broker answer and returns the messages to hand to the application.
    ///
    /// A broker reject marks the answering group unavailable and schedules a
    /// metadata refresh. A failed lock acquisition delivers nothing, even if the
    /// response carries messages. Delivered messages are registered with the ack
    /// queue; filtered ones are acknowledged right away.
    pub fn handle_pull_result(
        &self,
        pull_param: &PullParam,
        pull_result: PullResult,
        ack_hook: Option<Arc<dyn AckHook>>,
    ) -> Vec<PulledMessage> {
        match pull_result.response_code() {
            CommandCode::BrokerReject => {
                pull_result.broker_group().set_available(false);
                self.spawn_refresh_meta_info(pull_param);
                return Vec::new();
            }
            CommandCode::AcquireLockFailed => {
                error!(
                    subject = %self.assignment.subject,
                    partition = %self.assignment.partition_name,
                    consumer_group = %self.assignment.consumer_group,
                    broker_group = %self.assignment.broker_group,
                    "failed to acquire consumption lock"
                );
                return Vec::new();
            }
            _ => {}
        }

        if pull_result.messages().is_empty() {
            return Vec::new();
        }
        let Some(queue) = self.ack_send_queue.as_deref() else {
            warn!(
                count = pull_result.messages().len(),
                "placeholder pull entry received messages, dropping them"
            );
            return Vec::new();
        };

        best_effort(
            "record pulled message count",
            record_pulled_messages(
                pull_param.subject(),
                pull_param.group(),
                pull_param.broker_group().group_name(),
                pull_result.messages().len(),
            ),
        );

        let filter = PulledMessageFilterImpl::new(pull_param);
        let pulled_messages =
            self.ack_service
                .build_pulled_messages(pull_param, pull_result, queue, ack_hook, &filter);
        log_times(&pulled_messages);
        pulled_messages
    }

    /// Tears the entry down: no more pulls, bounded ack drain, lock release.
    ///
    /// The lock is released even when the drain fails, panics or times out;
    /// unflushed acks fall back to broker redelivery.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(queue) = self.ack_send_queue.clone() else {
            return;
        };

        let timeout = self.destroy_drain_timeout;
        match tokio::spawn(async move { queue.destroy(timeout).await }).await {
            Ok(outcome) => debug!(subject = %self.assignment.subject, ?outcome, "ack queue drained"),
            Err(e) => error!(error = %e, subject = %self.assignment.subject, "ack queue drain aborted"),
        }

        best_effort("release consumption lock", self.release_lock().await);
    }

    /// Gives the assignment back during a rebalance: bounded ack flush, lock
    /// release. Failures are logged and never reach the caller.
    pub async fn after_offline(&self) {
        let Some(queue) = self.ack_send_queue.clone() else {
            return;
        };

        let timeout = self.offline_flush_timeout;
        match tokio::spawn(async move { queue.try_send_ack(timeout).await }).await {
            Ok(DrainOutcome::Drained) | Ok(DrainOutcome::Outstanding(_)) => {}
            Ok(outcome) => warn!(subject = %self.assignment.subject, ?outcome, "offline ack flush incomplete"),
            Err(e) => error!(error = %e, subject = %self.assignment.subject, "offline error"),
        }

        if let Err(e) = self.release_lock().await {
            error!(error = %e, subject = %self.assignment.subject, "offline error");
        }
    }

    // issues the release call at most once per entry, whatever its outcome
    async fn release_lock(&self) -> Result<()> {
        if self.lock_released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.broker_service
            .release_lock(
                &self.assignment.subject,
                &self.assignment.consumer_group,
                &self.assignment.partition_name,
                &self.assignment.broker_group,
                self.assignment.consume_strategy,
            )
            .await
    }

    fn spawn_refresh_meta_info(&self, pull_param: &PullParam) {
        let broker_service = Arc::clone(&self.broker_service);
        let subject = pull_param.subject().to_string();
        let group = pull_param.group().to_string();
        tokio::spawn(async move {
            best_effort(
                "refresh broker metadata",
                broker_service
                    .refresh_meta_info(ClientType::Consumer, &subject, &group)
                    .await,
            );
        });
    }
}

fn log_times(pulled_messages: &[PulledMessage]) {
    for pulled_message in pulled_messages {
        let times = pulled_message.times();
        if times > MAX_MESSAGE_RETRY_THRESHOLD {
            warn!(
                times,
                subject = %pulled_message.subject(),
                msg_id = %pulled_message.message_id(),
                "message received repeatedly, check the consumer logic"
            );
        }
    }
}
