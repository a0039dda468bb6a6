use async_trait::async_trait;

use crate::{errors::Result, pull_param::PullParam, pull_result::PullResult};

/// Transport sending pull requests to a broker group.
///
/// Broker answers, rejections included, come back as `Ok`; `Err` means the
/// request itself failed (timeout, connection error).
#[async_trait]
pub trait PullService: Send + Sync {
    async fn pull(&self, pull_param: &PullParam) -> Result<PullResult>;
}
