//! Asynchronous acknowledgment queue of one pull entry.
//!
//! Every message returned by a pull is registered here under its pull offset.
//! The application resolves messages in any order, while the broker is told
//! about them strictly in offset order: a flush takes the longest resolved
//! prefix of the queue, sends back the messages whose consumption failed, and
//! acknowledges the prefix with a single range request.
//!
//! Flushing happens on a background task (fixed interval, or early once
//! `ack_batch_size` entries completed), on demand through `try_send_ack`, and one
//! last time in `destroy`. A failed transmission leaves the entries in place for
//! the next flush; only `destroy` gives up on them.

use pullq_core::message::BaseMessage;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use crate::{
    ack_service::{AckRequest, AckService, SendMessageBack},
    assignment::ConsumptionAssignment,
    config::ClientConfig,
    client_metrics::{inc_subject_group, Metric, ACK_SEND_COUNT, ACK_SEND_FAIL_COUNT, SEND_BACK_COUNT},
    errors::{best_effort, ClientError, Result},
    pulled_message::{AckEntry, AckSignal, AckState},
    retry_manager::RetryManager,
};

/// Outstanding pull offset range of an assignment.
///
/// `max_pull_offset` is the highest offset registered, `min_pull_offset` the
/// highest offset the broker accepted an ack for; `-1` means none yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckWindow {
    pub min_pull_offset: i64,
    pub max_pull_offset: i64,
}

impl Default for AckWindow {
    fn default() -> Self {
        AckWindow {
            min_pull_offset: -1,
            max_pull_offset: -1,
        }
    }
}

/// Result of a bounded flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    // nothing left in the queue
    Drained,
    // everything resolved was sent, these entries still wait for the application
    Outstanding(usize),
    // a transmission failed, the entries stay queued
    Failed(usize),
    // the deadline hit before the flush finished
    TimedOut,
}

#[derive(Debug, Default)]
struct QueueState {
    entries: VecDeque<Arc<AckEntry>>,
    window: AckWindow,
}

struct AckSendInner {
    assignment: Arc<ConsumptionAssignment>,
    ack_service: Arc<dyn AckService>,
    send_back: Arc<dyn SendMessageBack>,
    state: Mutex<QueueState>,
    // serializes transmissions so a range is never sent twice concurrently
    send_lock: tokio::sync::Mutex<()>,
    signal: Arc<AckSignal>,
    flush_interval: Duration,
    retry_manager: RetryManager,
}

/// AckSendQueue buffers acknowledgments of one assignment and reports them to the broker
pub struct AckSendQueue {
    inner: Arc<AckSendInner>,
    task: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl AckSendQueue {
    pub fn new(
        assignment: Arc<ConsumptionAssignment>,
        ack_service: Arc<dyn AckService>,
        send_back: Arc<dyn SendMessageBack>,
        config: &ClientConfig,
    ) -> Self {
        let inner = AckSendInner {
            assignment,
            ack_service,
            send_back,
            state: Mutex::new(QueueState::default()),
            send_lock: tokio::sync::Mutex::new(()),
            signal: Arc::new(AckSignal::new(config.ack_batch_size)),
            flush_interval: config.ack_flush_interval(),
            retry_manager: RetryManager::new(
                config.retry_base_backoff_ms,
                config.retry_max_backoff_ms,
            ),
        };
        AckSendQueue {
            inner: Arc::new(inner),
            task: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Starts the background flush task on the current tokio runtime.
    ///
    /// Each scheduled flush runs on its own task, so a panicking collaborator
    /// is logged and retried with backoff instead of ending the schedule.
    pub fn init(&self) -> Result<()> {
        let handle = Handle::try_current().map_err(|e| {
            ClientError::Unrecoverable(format!("ack send queue needs a tokio runtime: {e}"))
        })?;
        let mut task = lock(&self.task);
        if task.is_some() || self.destroyed.load(Ordering::Acquire) {
            warn!(subject = %self.inner.assignment.subject, "ack send queue already initialized");
            return Ok(());
        }
        *task = Some(handle.spawn(Arc::clone(&self.inner).run_flush_loop()));
        Ok(())
    }

    /// Registers a pulled message under its pull offset, advancing `max_pull_offset`.
    pub fn register(&self, message: &BaseMessage) -> Result<Arc<AckEntry>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ClientError::EntryDestroyed);
        }
        let offset = message.pull_offset()?;
        let mut state = lock(&self.inner.state);
        if offset <= state.window.max_pull_offset {
            return Err(ClientError::OffsetRegression {
                offset,
                max: state.window.max_pull_offset,
            });
        }
        let entry = Arc::new(AckEntry::new(offset, Arc::clone(&self.inner.signal)));
        state.entries.push_back(Arc::clone(&entry));
        state.window.max_pull_offset = offset;
        debug_assert!(state.window.min_pull_offset <= state.window.max_pull_offset);
        Ok(entry)
    }

    pub fn ack_window(&self) -> AckWindow {
        lock(&self.inner.state).window
    }

    /// Number of registered entries not yet acknowledged to the broker
    pub fn outstanding(&self) -> usize {
        lock(&self.inner.state).entries.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Sends everything currently resolved, giving up once `timeout` elapsed.
    pub async fn try_send_ack(&self, timeout: Duration) -> DrainOutcome {
        match tokio::time::timeout(timeout, self.inner.flush_all()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    subject = %self.inner.assignment.subject,
                    partition = %self.inner.assignment.partition_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "ack flush timed out"
                );
                DrainOutcome::TimedOut
            }
        }
    }

    /// Stops the background task and performs a final flush bounded by `timeout`.
    ///
    /// Entries still queued afterwards are abandoned; the broker redelivers them.
    /// Only the first call does anything.
    pub async fn destroy(&self, timeout: Duration) -> DrainOutcome {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            warn!(subject = %self.inner.assignment.subject, "ack send queue already destroyed");
            return DrainOutcome::Drained;
        }
        let task = lock(&self.task).take();
        if let Some(task) = task {
            task.abort();
        }
        let outcome = self.try_send_ack(timeout).await;
        let abandoned = self.outstanding();
        if abandoned > 0 {
            warn!(
                subject = %self.inner.assignment.subject,
                partition = %self.inner.assignment.partition_name,
                abandoned,
                ?outcome,
                "ack send queue destroyed with unacknowledged entries"
            );
        }
        outcome
    }
}

impl Drop for AckSendQueue {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
    }
}

impl AckSendInner {
    async fn run_flush_loop(self: Arc<Self>) {
        let mut failures = 0usize;
        loop {
            if failures == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(self.flush_interval) => {}
                    _ = self.signal.notified() => {}
                }
            } else {
                tokio::time::sleep(self.retry_manager.calculate_backoff(failures - 1)).await;
            }

            let inner = Arc::clone(&self);
            let outcome = match tokio::spawn(async move { inner.flush_all().await }).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        error = %e,
                        subject = %self.assignment.subject,
                        partition = %self.assignment.partition_name,
                        "scheduled ack flush aborted"
                    );
                    DrainOutcome::Failed(self.outstanding())
                }
            };
            match outcome {
                DrainOutcome::Failed(remaining) => {
                    failures += 1;
                    debug!(
                        subject = %self.assignment.subject,
                        remaining,
                        failures,
                        "scheduled ack flush failed, backing off"
                    );
                }
                _ => failures = 0,
            }
        }
    }

    async fn flush_all(&self) -> DrainOutcome {
        loop {
            match self.send_ready().await {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(
                        error = %e,
                        subject = %self.assignment.subject,
                        partition = %self.assignment.partition_name,
                        broker_group = %self.assignment.broker_group,
                        "ack transmission failed, entries kept for retry"
                    );
                    return DrainOutcome::Failed(self.outstanding());
                }
            }
        }
        match self.outstanding() {
            0 => DrainOutcome::Drained,
            remaining => DrainOutcome::Outstanding(remaining),
        }
    }

    /// Sends the resolved prefix of the queue; returns how many entries were acknowledged.
    async fn send_ready(&self) -> Result<usize> {
        let _guard = self.send_lock.lock().await;

        let batch: Vec<Arc<AckEntry>> = lock(&self.state)
            .entries
            .iter()
            .take_while(|entry| !entry.is_pending())
            .cloned()
            .collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let mut ready = 0;
        let mut send_back_error = None;
        for entry in &batch {
            if let AckState::NeedRetry(message) = entry.state() {
                match self
                    .send_back
                    .send_back(&self.assignment.broker_group, &message)
                    .await
                {
                    Ok(()) => {
                        entry.mark_sent_back();
                        self.count(&SEND_BACK_COUNT);
                    }
                    Err(e) => {
                        send_back_error = Some(e);
                        break;
                    }
                }
            }
            ready += 1;
        }

        if ready == 0 {
            return Err(send_back_error
                .unwrap_or_else(|| ClientError::SendBack("nothing could be sent back".into())));
        }
        if let Some(e) = send_back_error {
            warn!(error = %e, subject = %self.assignment.subject, "send back failed, acking the prefix before it");
        }

        let request = self.ack_request(batch[0].pull_offset(), batch[ready - 1].pull_offset());
        let last = request.pull_offset_last;
        if let Err(e) = self
            .ack_service
            .send_ack(&self.assignment.broker_group, request)
            .await
        {
            self.count(&ACK_SEND_FAIL_COUNT);
            return Err(e);
        }

        {
            let mut state = lock(&self.state);
            // registration only appends, so the acknowledged entries are still at the front
            state.entries.drain(..ready);
            state.window.min_pull_offset = state.window.min_pull_offset.max(last);
        }
        self.signal.reset(ready);
        self.count(&ACK_SEND_COUNT);
        trace!(subject = %self.assignment.subject, last, acked = ready, "ack range sent");
        Ok(ready)
    }

    fn ack_request(&self, pull_offset_begin: i64, pull_offset_last: i64) -> AckRequest {
        AckRequest {
            subject: self.assignment.subject.clone(),
            consumer_group: self.assignment.consumer_group.clone(),
            partition_name: self.assignment.partition_name.clone(),
            consumer_id: self.assignment.consumer_id.clone(),
            consume_strategy: self.assignment.consume_strategy,
            allocation_version: self.assignment.allocation_version,
            broadcast: self.assignment.broadcast,
            pull_offset_begin,
            pull_offset_last,
        }
    }

    fn outstanding(&self) -> usize {
        lock(&self.state).entries.len()
    }

    fn count(&self, metric: &Metric) {
        best_effort(
            "count ack pipeline event",
            inc_subject_group(
                metric,
                &self.assignment.subject,
                &self.assignment.consumer_group,
                1,
            ),
        );
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // guarded values stay consistent across a panic, keep going with them
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
