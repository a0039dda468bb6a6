use pullq_core::errors::CoreError;
use thiserror::Error;
use tracing::warn;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("unable to send ack: {0}")]
    AckSend(String),

    #[error("unable to send message back for redelivery: {0}")]
    SendBack(String),

    #[error("unable to release consumption lock: {0}")]
    LockRelease(String),

    #[error("pull offset {offset} does not advance past {max}")]
    OffsetRegression { offset: i64, max: i64 },

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] CoreError),

    #[error("pull entry has been destroyed")]
    EntryDestroyed,

    #[error("placeholder pull entry has no subject")]
    PlaceholderEntry,

    #[error("metrics recorder failed: {0}")]
    MetricsRecorder(String),

    #[error("unable to parse the configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("unable to load the configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("unable to perform operation: {0}")]
    Unrecoverable(String),
}

impl ClientError {
    /// Failures of the pull request itself, as opposed to broker answers.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// Contract for side effects whose failure must never reach the caller:
/// the error is logged with `context` and discarded.
pub(crate) fn best_effort(context: &'static str, result: Result<()>) {
    if let Err(error) = result {
        warn!(error = %error, context, "best-effort operation failed");
    }
}
