//! Warming loop: follows upstream finality and stores each newly finalized
//! epoch's committees before any client asks for them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use metrics::gauge;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::periodic::PeriodicJob;
use crate::cache::{CacheError, CommitteeCache, EpochKey};
use crate::infra::http::COMMITTEES_PATH;
use crate::infra::upstream::{UpstreamError, UpstreamProxy};

pub const FINALITY_PATH: &str = "/eth/v1/beacon/states/head/finality_checkpoints";

#[derive(Debug, Error)]
pub enum WarmError {
    #[error("upstream request for `{path}` failed: {source}")]
    Upstream {
        path: String,
        #[source]
        source: UpstreamError,
    },
    #[error("upstream answered `{path}` with status {status}")]
    Status { path: String, status: StatusCode },
    #[error("malformed finality checkpoints: {0}")]
    Finality(String),
    #[error("refusing to cache empty committees for epoch {0}")]
    EmptyBody(EpochKey),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// What a single warming pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmOutcome {
    /// Committees for the epoch were fetched and persisted.
    Stored(EpochKey),
    /// The finalized epoch was already on disk; nothing fetched.
    AlreadyCached(EpochKey),
    /// The finalized epoch has not advanced past the last one stored.
    NotAdvanced(EpochKey),
}

#[derive(Debug, Deserialize)]
struct FinalityCheckpoints {
    data: FinalityData,
}

#[derive(Debug, Deserialize)]
struct FinalityData {
    finalized: Checkpoint,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    epoch: String,
}

pub struct CacheWarmer {
    cache: Arc<CommitteeCache>,
    upstream: Arc<UpstreamProxy>,
    last_finalized: Option<EpochKey>,
}

impl CacheWarmer {
    pub fn new(cache: Arc<CommitteeCache>, upstream: Arc<UpstreamProxy>) -> Self {
        Self {
            cache,
            upstream,
            last_finalized: None,
        }
    }

    /// Last finalized epoch this warmer stored (or found stored by a racing writer).
    pub fn last_finalized(&self) -> Option<EpochKey> {
        self.last_finalized
    }

    pub async fn warm(&mut self) -> Result<WarmOutcome, WarmError> {
        let finalized = self.finalized_epoch().await?;

        if self.last_finalized.is_some_and(|last| finalized <= last) {
            return Ok(WarmOutcome::NotAdvanced(finalized));
        }

        if self.cache.peek(finalized).await? {
            return Ok(WarmOutcome::AlreadyCached(finalized));
        }

        let path = format!("{COMMITTEES_PATH}?epoch={finalized}");
        debug!(target = "beacon_cache_proxy::jobs::warm", epoch = %finalized, path = %path, "warming committees");
        let body = self.get_ok(&path).await?;
        if body.is_empty() {
            return Err(WarmError::EmptyBody(finalized));
        }

        match self.cache.set(finalized, &body).await {
            Ok(()) => {}
            Err(err) if err.is_already_cached() => {
                debug!(target = "beacon_cache_proxy::jobs::warm", epoch = %finalized, "committees cached by another writer");
            }
            Err(err) => return Err(err.into()),
        }

        self.last_finalized = Some(finalized);
        gauge!("beacon_cache_warmed_epoch").set(finalized.get() as f64);
        Ok(WarmOutcome::Stored(finalized))
    }

    async fn finalized_epoch(&self) -> Result<EpochKey, WarmError> {
        let body = self.get_ok(FINALITY_PATH).await?;
        let checkpoints: FinalityCheckpoints =
            serde_json::from_slice(&body).map_err(|err| WarmError::Finality(err.to_string()))?;
        let raw = checkpoints.data.finalized.epoch;
        EpochKey::parse(&raw)
            .ok_or_else(|| WarmError::Finality(format!("epoch `{raw}` is not numeric")))
    }

    async fn get_ok(&self, path: &str) -> Result<Bytes, WarmError> {
        let captured = self
            .upstream
            .fetch(path)
            .await
            .map_err(|source| WarmError::Upstream {
                path: path.to_string(),
                source,
            })?;
        if captured.status != StatusCode::OK {
            return Err(WarmError::Status {
                path: path.to_string(),
                status: captured.status,
            });
        }
        Ok(captured.body)
    }
}

#[async_trait]
impl PeriodicJob for CacheWarmer {
    fn name(&self) -> &'static str {
        "cache-warmer"
    }

    async fn tick(&mut self) {
        match self.warm().await {
            Ok(WarmOutcome::Stored(epoch)) => {
                info!(target = "beacon_cache_proxy::jobs::warm", epoch = %epoch, "warmed finalized epoch");
            }
            Ok(WarmOutcome::AlreadyCached(epoch)) => {
                debug!(target = "beacon_cache_proxy::jobs::warm", epoch = %epoch, "finalized epoch already cached");
            }
            Ok(WarmOutcome::NotAdvanced(epoch)) => {
                debug!(target = "beacon_cache_proxy::jobs::warm", epoch = %epoch, "finalized epoch unchanged");
            }
            Err(err @ WarmError::Finality(_)) => {
                debug!(target = "beacon_cache_proxy::jobs::warm", error = %err, "warming skipped");
            }
            Err(err) => {
                warn!(target = "beacon_cache_proxy::jobs::warm", error = %err, "warming failed");
            }
        }
    }
}
