use pullq_core::message::BaseMessage;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Progress of one registered pull offset
#[derive(Debug, Clone, PartialEq)]
pub enum AckState {
    // delivered, the application has not acked yet
    Pending,
    // acked by the application, or dropped by the filter
    Completed,
    // consume failed, the message goes back to the broker before it counts as completed
    NeedRetry(BaseMessage),
}

/// Wakes the ack queue when enough entries completed to send a batch.
#[derive(Debug)]
pub(crate) struct AckSignal {
    notify: Notify,
    completed: AtomicUsize,
    batch_size: usize,
}

impl AckSignal {
    pub(crate) fn new(batch_size: usize) -> Self {
        AckSignal {
            notify: Notify::new(),
            completed: AtomicUsize::new(0),
            batch_size: batch_size.max(1),
        }
    }

    fn on_completed(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if completed >= self.batch_size {
            self.notify.notify_one();
        }
    }

    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }

    /// Forget completions that were just flushed.
    pub(crate) fn reset(&self, flushed: usize) {
        let _ = self
            .completed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
                Some(c.saturating_sub(flushed))
            });
    }
}

/// Bookkeeping record for one pull offset held by the ack queue
#[derive(Debug)]
pub struct AckEntry {
    pull_offset: i64,
    state: Mutex<AckState>,
    signal: Arc<AckSignal>,
}

impl AckEntry {
    pub(crate) fn new(pull_offset: i64, signal: Arc<AckSignal>) -> Self {
        AckEntry {
            pull_offset,
            state: Mutex::new(AckState::Pending),
            signal,
        }
    }

    pub fn pull_offset(&self) -> i64 {
        self.pull_offset
    }

    pub fn state(&self) -> AckState {
        self.lock_state().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.lock_state(), AckState::Pending)
    }

    /// Moves a pending entry to `Completed`; returns false if it was already resolved.
    pub fn complete(&self) -> bool {
        self.transition(AckState::Completed)
    }

    /// Moves a pending entry to `NeedRetry`; returns false if it was already resolved.
    pub fn need_retry(&self, message: BaseMessage) -> bool {
        self.transition(AckState::NeedRetry(message))
    }

    /// A sent-back entry is done from the queue's point of view.
    pub(crate) fn mark_sent_back(&self) {
        *self.lock_state() = AckState::Completed;
    }

    fn transition(&self, next: AckState) -> bool {
        {
            let mut state = self.lock_state();
            if *state != AckState::Pending {
                return false;
            }
            *state = next;
        }
        self.signal.on_completed();
        true
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, AckState> {
        // the state is a plain value, a poisoned lock still holds a consistent one
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Application hook wrapped around every ack.
///
/// The hook receives the message and a continuation that completes it; it may
/// run the continuation later, e.g. once a local transaction commits. A
/// continuation that is never run keeps the message pending.
pub trait AckHook: Send + Sync {
    fn call(&self, message: &PulledMessage, ack: Box<dyn FnOnce() + Send>);
}

/// A message accepted past filtering and handed to the application.
///
/// Every `PulledMessage` must be resolved with `ack` or `nack`: acknowledgments
/// are sent in pull offset order, so an unresolved message holds back the acks of
/// every message pulled after it.
pub struct PulledMessage {
    message: BaseMessage,
    entry: Arc<AckEntry>,
    ack_hook: Option<Arc<dyn AckHook>>,
}

impl PulledMessage {
    pub(crate) fn new(
        message: BaseMessage,
        entry: Arc<AckEntry>,
        ack_hook: Option<Arc<dyn AckHook>>,
    ) -> Self {
        PulledMessage {
            message,
            entry,
            ack_hook,
        }
    }

    pub fn times(&self) -> u32 {
        self.message.times()
    }

    pub fn subject(&self) -> &str {
        &self.message.subject
    }

    pub fn message_id(&self) -> &str {
        &self.message.message_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    pub fn pull_offset(&self) -> i64 {
        self.entry.pull_offset()
    }

    pub fn get_string_property(&self, key: &str) -> Option<&str> {
        self.message.get_string_property(key)
    }

    pub fn get_boolean_property(&self, key: &str) -> bool {
        self.message.get_boolean_property(key)
    }

    pub fn base_message(&self) -> &BaseMessage {
        &self.message
    }

    pub fn ack_state(&self) -> AckState {
        self.entry.state()
    }

    /// Acknowledge successful consumption, through the ack hook when one is set.
    pub fn ack(&self) {
        let entry = Arc::clone(&self.entry);
        let ack: Box<dyn FnOnce() + Send> = Box::new(move || {
            entry.complete();
        });
        match &self.ack_hook {
            Some(hook) => hook.call(self, ack),
            None => ack(),
        }
    }

    /// Report a failed consumption; the message is sent back to the broker for redelivery.
    pub fn nack(&self) {
        self.entry.need_retry(self.message.clone());
    }
}

impl fmt::Debug for PulledMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PulledMessage")
            .field("message", &self.message)
            .field("pull_offset", &self.entry.pull_offset())
            .field("has_ack_hook", &self.ack_hook.is_some())
            .finish()
    }
}
