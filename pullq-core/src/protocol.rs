use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Response code carried by a pull response.
///
/// Transports decode the numeric wire code with `CommandCode::from(i16)`; any code
/// this client does not interpret lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandCode {
    Success,
    // the client holds a stale view of the broker topology
    BrokerReject,
    // exclusive or ordered consumption could not obtain the partition lock
    AcquireLockFailed,
    Other(i16),
}

impl CommandCode {
    pub const SUCCESS: i16 = 0;
    pub const BROKER_REJECT: i16 = 4;
    pub const ACQUIRE_LOCK_FAILED: i16 = 12;

    pub fn code(&self) -> i16 {
        match self {
            CommandCode::Success => Self::SUCCESS,
            CommandCode::BrokerReject => Self::BROKER_REJECT,
            CommandCode::AcquireLockFailed => Self::ACQUIRE_LOCK_FAILED,
            CommandCode::Other(code) => *code,
        }
    }
}

impl From<i16> for CommandCode {
    fn from(code: i16) -> Self {
        match code {
            Self::SUCCESS => CommandCode::Success,
            Self::BROKER_REJECT => CommandCode::BrokerReject,
            Self::ACQUIRE_LOCK_FAILED => CommandCode::AcquireLockFailed,
            other => CommandCode::Other(other),
        }
    }
}

impl Display for CommandCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CommandCode::Success => write!(f, "SUCCESS"),
            CommandCode::BrokerReject => write!(f, "BROKER_REJECT"),
            CommandCode::AcquireLockFailed => write!(f, "ACQUIRE_LOCK_FAILED"),
            CommandCode::Other(code) => write!(f, "CODE_{}", code),
        }
    }
}

/// Kind of client asking the broker service for metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientType {
    Producer,
    Consumer,
}
