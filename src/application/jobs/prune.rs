use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::periodic::PeriodicJob;
use crate::cache::{CacheError, CommitteeCache};

/// Caps the number of persisted records at `retain`; zero disables pruning.
pub struct RetentionPruner {
    cache: Arc<CommitteeCache>,
    retain: usize,
}

impl RetentionPruner {
    pub fn new(cache: Arc<CommitteeCache>, retain: usize) -> Self {
        Self { cache, retain }
    }

    /// Run one prune, returning how many records were deleted.
    pub async fn prune(&self) -> Result<usize, CacheError> {
        if self.retain == 0 {
            return Ok(0);
        }
        self.cache.prune(self.retain).await
    }
}

#[async_trait]
impl PeriodicJob for RetentionPruner {
    fn name(&self) -> &'static str {
        "retention-pruner"
    }

    async fn tick(&mut self) {
        if self.retain == 0 {
            debug!(target = "beacon_cache_proxy::jobs::prune", "pruning disabled");
            return;
        }
        match self.prune().await {
            Ok(0) => {
                debug!(target = "beacon_cache_proxy::jobs::prune", retain = self.retain, "nothing to prune");
            }
            Ok(deleted) => {
                info!(
                    target = "beacon_cache_proxy::jobs::prune",
                    retain = self.retain,
                    deleted,
                    "pruned cached epochs"
                );
            }
            Err(err) => {
                warn!(target = "beacon_cache_proxy::jobs::prune", error = %err, "pruning failed");
            }
        }
    }
}
