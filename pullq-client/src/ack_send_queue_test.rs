//! # Ack Send Queue Tests
//!
//! - **Window**: registration advances `max_pull_offset`, acks advance `min_pull_offset`
//! - **Ordering**: only the resolved prefix of the queue is acknowledged
//! - **Failure**: failed transmissions keep their entries for the next flush
//! - **Send back**: nacked messages go back to the broker before their range is acked
//! - **Scheduling**: interval and batch-size triggered background flushes, surviving a panicking transport
//! - **Teardown**: bounded destroy

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing_test::traced_test;

use pullq_core::consume_strategy::ConsumeStrategy;
use pullq_core::message::{BaseMessage, MessageKey};
use pullq_core::protocol::CommandCode;

use crate::ack_send_queue::{AckSendQueue, AckWindow, DrainOutcome};
use crate::ack_service::{AckRequest, AckService, SendMessageBack};
use crate::assignment::{ConsumeParam, ConsumptionAssignment};
use crate::broker_group::BrokerGroupInfo;
use crate::config::ClientConfig;
use crate::errors::{ClientError, Result};
use crate::message_filter::{AcceptAll, PulledMessageFilter};
use crate::pull_param::PullParam;
use crate::pull_result::PullResult;
use crate::pulled_message::{AckHook, AckState, PulledMessage};

#[derive(Default)]
struct RecordingAckService {
    requests: Mutex<Vec<AckRequest>>,
    fail: AtomicBool,
    hang: AtomicBool,
    panic_once: AtomicBool,
}

impl RecordingAckService {
    fn ranges(&self) -> Vec<(i64, i64)> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| (r.pull_offset_begin, r.pull_offset_last))
            .collect()
    }
}

#[async_trait]
impl AckService for RecordingAckService {
    async fn send_ack(&self, _broker_group: &str, request: AckRequest) -> Result<()> {
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("ack transport bug");
        }
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::AckSend("broker unavailable".into()));
        }
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingSendBack {
    sent: Mutex<Vec<String>>,
    fail: AtomicBool,
}

#[async_trait]
impl SendMessageBack for RecordingSendBack {
    async fn send_back(&self, _broker_group: &str, message: &BaseMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ClientError::SendBack("broker unavailable".into()));
        }
        self.sent.lock().unwrap().push(message.message_id.clone());
        Ok(())
    }
}

/// Rejects messages by id.
struct RejectIds(Vec<&'static str>);

impl PulledMessageFilter for RejectIds {
    fn filter(&self, message: &BaseMessage) -> bool {
        !self.0.contains(&message.message_id.as_str())
    }
}

fn assignment() -> Arc<ConsumptionAssignment> {
    Arc::new(ConsumptionAssignment::new(
        "orders",
        "billing",
        "orders#1",
        "bg-1",
        "consumer-1",
        ConsumeStrategy::Shared,
    ))
}

fn make_msg(id: &str, pull_offset: i64) -> BaseMessage {
    let mut msg = BaseMessage::new(id, "orders");
    msg.set_key(MessageKey::PullOffset, pull_offset);
    msg
}

fn make_queue(
    config: &ClientConfig,
) -> (AckSendQueue, Arc<RecordingAckService>, Arc<RecordingSendBack>) {
    let ack_service = Arc::new(RecordingAckService::default());
    let send_back = Arc::new(RecordingSendBack::default());
    let queue = AckSendQueue::new(assignment(), ack_service.clone(), send_back.clone(), config);
    (queue, ack_service, send_back)
}

fn make_param() -> PullParam {
    PullParam::builder()
        .with_consume_param(Arc::new(ConsumeParam::new("orders", "billing", "consumer-1")))
        .with_broker_group(Arc::new(BrokerGroupInfo::new("bg-1")))
        .with_partition_name("orders#1")
        .with_consume_strategy(ConsumeStrategy::Shared)
        .build()
        .expect("pull param")
}

fn pull(
    ack_service: &RecordingAckService,
    queue: &AckSendQueue,
    messages: Vec<BaseMessage>,
    filter: &dyn PulledMessageFilter,
    ack_hook: Option<Arc<dyn AckHook>>,
) -> Vec<PulledMessage> {
    let param = make_param();
    let result = PullResult::new(CommandCode::Success, Arc::clone(param.broker_group()), messages);
    ack_service.build_pulled_messages(&param, result, queue, ack_hook, filter)
}

async fn wait_for_ranges(ack_service: &RecordingAckService, expected: Vec<(i64, i64)>) {
    timeout(Duration::from_secs(2), async {
        while ack_service.ranges() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("ack ranges in time");
}

#[tokio::test]
async fn registration_advances_window_and_rejects_regression() {
    let (queue, _, _) = make_queue(&ClientConfig::default());
    assert_eq!(queue.ack_window(), AckWindow::default());

    for offset in [3, 4, 9] {
        queue.register(&make_msg("m", offset)).expect("register");
        let window = queue.ack_window();
        assert!(window.min_pull_offset <= window.max_pull_offset);
        assert_eq!(window.max_pull_offset, offset);
    }

    let err = queue.register(&make_msg("dup", 9)).unwrap_err();
    assert!(matches!(err, ClientError::OffsetRegression { offset: 9, max: 9 }));
    let err = queue.register(&make_msg("old", 5)).unwrap_err();
    assert!(matches!(err, ClientError::OffsetRegression { offset: 5, max: 9 }));

    let err = queue.register(&BaseMessage::new("no-offset", "orders")).unwrap_err();
    assert!(matches!(err, ClientError::InvalidMessage(_)));
    assert_eq!(queue.outstanding(), 3);
}

#[tokio::test]
async fn only_resolved_prefix_is_acknowledged() {
    let (queue, ack_service, _) = make_queue(&ClientConfig::default());
    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("a", 1), make_msg("b", 2), make_msg("c", 3)],
        &AcceptAll,
        None,
    );
    assert_eq!(pulled.len(), 3);

    pulled[1].ack();
    pulled[2].ack();
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Outstanding(3));
    assert!(ack_service.ranges().is_empty());

    pulled[0].ack();
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Drained);
    assert_eq!(ack_service.ranges(), vec![(1, 3)]);
    assert_eq!(
        queue.ack_window(),
        AckWindow {
            min_pull_offset: 3,
            max_pull_offset: 3
        }
    );
}

#[tokio::test]
async fn failed_transmission_keeps_entries_for_retry() {
    let (queue, ack_service, _) = make_queue(&ClientConfig::default());
    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("a", 10), make_msg("b", 11)],
        &AcceptAll,
        None,
    );
    pulled.iter().for_each(PulledMessage::ack);

    ack_service.fail.store(true, Ordering::SeqCst);
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Failed(2));
    assert_eq!(queue.outstanding(), 2);
    assert_eq!(queue.ack_window().min_pull_offset, -1);

    ack_service.fail.store(false, Ordering::SeqCst);
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Drained);
    assert_eq!(ack_service.ranges(), vec![(10, 11)]);
    assert_eq!(queue.ack_window().min_pull_offset, 11);
}

#[tokio::test]
async fn filtered_messages_are_acknowledged_without_delivery() {
    let (queue, ack_service, _) = make_queue(&ClientConfig::default());
    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("keep", 1), make_msg("drop", 2)],
        &RejectIds(vec!["drop"]),
        None,
    );
    assert_eq!(pulled.len(), 1);
    assert_eq!(pulled[0].message_id(), "keep");
    // the dropped message is registered too, and already resolved
    assert_eq!(queue.outstanding(), 2);

    pulled[0].ack();
    assert_eq!(
        queue.try_send_ack(Duration::from_secs(1)).await,
        DrainOutcome::Drained
    );
    assert_eq!(ack_service.ranges(), vec![(1, 2)]);
}

#[tokio::test]
async fn nacked_messages_are_sent_back_before_ack() {
    let (queue, ack_service, send_back) = make_queue(&ClientConfig::default());
    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("ok", 1), make_msg("failed", 2), make_msg("late", 3)],
        &AcceptAll,
        None,
    );
    pulled[0].ack();
    pulled[1].nack();
    pulled[2].ack();
    // a second resolution is ignored
    pulled[1].ack();
    assert!(matches!(pulled[1].ack_state(), AckState::NeedRetry(_)));

    send_back.fail.store(true, Ordering::SeqCst);
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Failed(2));
    assert_eq!(ack_service.ranges(), vec![(1, 1)]);

    send_back.fail.store(false, Ordering::SeqCst);
    let outcome = queue.try_send_ack(Duration::from_secs(1)).await;
    assert_eq!(outcome, DrainOutcome::Drained);
    assert_eq!(*send_back.sent.lock().unwrap(), vec!["failed".to_string()]);
    assert_eq!(ack_service.ranges(), vec![(1, 1), (2, 3)]);
}

/// Defers every ack until `release` is called.
#[derive(Default)]
struct DeferringHook {
    deferred: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
}

impl DeferringHook {
    fn release(&self) {
        for ack in self.deferred.lock().unwrap().drain(..) {
            ack();
        }
    }
}

impl AckHook for DeferringHook {
    fn call(&self, _message: &PulledMessage, ack: Box<dyn FnOnce() + Send>) {
        self.deferred.lock().unwrap().push(ack);
    }
}

#[tokio::test]
async fn ack_hook_controls_completion() {
    let (queue, ack_service, _) = make_queue(&ClientConfig::default());
    let hook = Arc::new(DeferringHook::default());
    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("a", 1)],
        &AcceptAll,
        Some(hook.clone() as Arc<dyn AckHook>),
    );

    pulled[0].ack();
    assert_eq!(pulled[0].ack_state(), AckState::Pending);
    assert_eq!(
        queue.try_send_ack(Duration::from_secs(1)).await,
        DrainOutcome::Outstanding(1)
    );

    hook.release();
    assert_eq!(pulled[0].ack_state(), AckState::Completed);
    assert_eq!(
        queue.try_send_ack(Duration::from_secs(1)).await,
        DrainOutcome::Drained
    );
}

#[tokio::test]
async fn background_task_flushes_on_interval() {
    let config = ClientConfig {
        ack_flush_interval_ms: 20,
        ..ClientConfig::default()
    };
    let (queue, ack_service, _) = make_queue(&config);
    queue.init().expect("init");

    let pulled = pull(&ack_service, &queue, vec![make_msg("a", 1)], &AcceptAll, None);
    pulled[0].ack();

    wait_for_ranges(&ack_service, vec![(1, 1)]).await;
}

#[tokio::test]
async fn background_task_flushes_early_on_full_batch() {
    let config = ClientConfig {
        ack_flush_interval_ms: 60_000,
        ack_batch_size: 2,
        ..ClientConfig::default()
    };
    let (queue, ack_service, _) = make_queue(&config);
    queue.init().expect("init");

    let pulled = pull(
        &ack_service,
        &queue,
        vec![make_msg("a", 1), make_msg("b", 2)],
        &AcceptAll,
        None,
    );
    pulled.iter().for_each(PulledMessage::ack);

    wait_for_ranges(&ack_service, vec![(1, 2)]).await;
}

#[tokio::test]
#[traced_test]
async fn background_task_survives_panicking_ack_service() {
    let config = ClientConfig {
        ack_flush_interval_ms: 20,
        retry_base_backoff_ms: 10,
        retry_max_backoff_ms: 20,
        ..ClientConfig::default()
    };
    let (queue, ack_service, _) = make_queue(&config);
    ack_service.panic_once.store(true, Ordering::SeqCst);
    queue.init().expect("init");

    let pulled = pull(&ack_service, &queue, vec![make_msg("a", 1)], &AcceptAll, None);
    pulled[0].ack();

    wait_for_ranges(&ack_service, vec![(1, 1)]).await;
    assert!(logs_contain("scheduled ack flush aborted"));

    // later completions are still flushed on schedule
    let pulled = pull(&ack_service, &queue, vec![make_msg("b", 2)], &AcceptAll, None);
    pulled[0].ack();
    wait_for_ranges(&ack_service, vec![(1, 1), (2, 2)]).await;
}

#[test]
fn init_outside_runtime_is_an_error() {
    let (queue, _, _) = make_queue(&ClientConfig::default());
    assert!(matches!(queue.init(), Err(ClientError::Unrecoverable(_))));
}

#[tokio::test]
async fn destroy_is_bounded_and_final() {
    let (queue, ack_service, _) = make_queue(&ClientConfig::default());
    queue.init().expect("init");
    let pulled = pull(&ack_service, &queue, vec![make_msg("a", 1)], &AcceptAll, None);
    pulled[0].ack();
    ack_service.hang.store(true, Ordering::SeqCst);

    let outcome = timeout(Duration::from_secs(2), queue.destroy(Duration::from_millis(50)))
        .await
        .expect("destroy returns within its deadline");
    assert_eq!(outcome, DrainOutcome::TimedOut);
    assert!(queue.is_destroyed());

    let err = queue.register(&make_msg("late", 2)).unwrap_err();
    assert!(matches!(err, ClientError::EntryDestroyed));
    // second destroy does nothing
    assert_eq!(
        queue.destroy(Duration::from_millis(50)).await,
        DrainOutcome::Drained
    );
}
