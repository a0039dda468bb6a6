use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use crate::errors::CoreError;

/// Represents how a partition is consumed by the members of a consumer group
///
/// Variants:
/// - `Exclusive`: a single consumer instance owns the partition, guarded by a broker lock.
/// - `Shared`: every consumer of the group pulls from the partition concurrently.
/// - `Broadcast`: every consumer instance receives every message.
/// - `Ordered`: like `Exclusive`, and messages are processed in pull offset order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeStrategy {
    Exclusive,
    Shared,
    Broadcast,
    Ordered,
}

impl ConsumeStrategy {
    /// Strategies under which the broker hands out a consumption lock on pull.
    pub fn requires_lock(&self) -> bool {
        matches!(self, ConsumeStrategy::Exclusive | ConsumeStrategy::Ordered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsumeStrategy::Exclusive => "exclusive",
            ConsumeStrategy::Shared => "shared",
            ConsumeStrategy::Broadcast => "broadcast",
            ConsumeStrategy::Ordered => "ordered",
        }
    }
}

impl Display for ConsumeStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsumeStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exclusive" => Ok(ConsumeStrategy::Exclusive),
            "shared" => Ok(ConsumeStrategy::Shared),
            "broadcast" => Ok(ConsumeStrategy::Broadcast),
            "ordered" => Ok(ConsumeStrategy::Ordered),
            other => Err(CoreError::UnknownStrategy(other.to_string())),
        }
    }
}
