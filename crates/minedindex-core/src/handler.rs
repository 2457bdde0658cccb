//! Hooks invoked by the orchestrator.

use async_trait::async_trait;

use crate::error::IndexerError;

/// Called after every catch-up pass that reached its target.
///
/// Hosts use this to refresh anything derived from the address statistics
/// (caches, rankings). An error is reported like a failed pass; the
/// checkpoint has already advanced by then.
#[async_trait]
pub trait PassObserver: Send + Sync {
    async fn on_pass_complete(&self, last_checked: u64) -> Result<(), IndexerError>;
}
