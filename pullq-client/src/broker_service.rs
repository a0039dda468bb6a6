use async_trait::async_trait;
use pullq_core::consume_strategy::ConsumeStrategy;
use pullq_core::protocol::ClientType;

use crate::errors::Result;

/// Broker metadata and lock operations used by pull entries
#[async_trait]
pub trait BrokerService: Send + Sync {
    /// Re-resolve the broker groups serving (subject, group). Pull entries call
    /// it from a spawned task and never wait for it.
    async fn refresh_meta_info(
        &self,
        client_type: ClientType,
        subject: &str,
        consumer_group: &str,
    ) -> Result<()>;

    /// Give up the consumption lock held for the partition. Strategies without a
    /// lock may treat it as a no-op.
    async fn release_lock(
        &self,
        subject: &str,
        consumer_group: &str,
        partition_name: &str,
        broker_group: &str,
        consume_strategy: ConsumeStrategy,
    ) -> Result<()>;
}
