//! Committees cache: the disk store with the warm store layered in front,
//! plus content negotiation between the stored protobuf and JSON.

use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, header};
use bytes::Bytes;
use metrics::counter;
use tracing::debug;

use super::codec::{JSON_CONTENT_TYPE, PROTOBUF_CONTENT_TYPE, canonical_to_json};
use super::config::CacheConfig;
use super::error::CacheError;
use super::keys::EpochKey;
use super::store::DiskStore;
use super::warm::WarmStore;

const METRIC_HIT: &str = "beacon_cache_hit_total";
const METRIC_MISS: &str = "beacon_cache_miss_total";
const METRIC_STORE: &str = "beacon_cache_store_total";
const METRIC_CORRUPT: &str = "beacon_cache_corrupt_total";
const METRIC_WARM_READ: &str = "beacon_cache_warm_read_total";
const METRIC_PRUNED: &str = "beacon_cache_pruned_total";

/// A cache hit, already encoded for the requesting client.
#[derive(Debug, Clone)]
pub struct CachedCommittees {
    pub content_type: &'static str,
    pub body: Bytes,
}

impl CachedCommittees {
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_type),
        );
        headers
    }
}

/// Committees cache shared by the router, the warmer and the pruner.
pub struct CommitteeCache {
    config: CacheConfig,
    disk: Arc<DiskStore>,
    warm: Arc<WarmStore>,
}

impl CommitteeCache {
    /// Open the cache, creating the data directory if it does not exist.
    pub fn open(config: CacheConfig) -> Result<Self, CacheError> {
        let disk = DiskStore::open(&config.data_dir)?;
        let warm = WarmStore::new(&config);
        Ok(Self {
            config,
            disk: Arc::new(disk),
            warm: Arc::new(warm),
        })
    }

    /// Whether a record for `key` is persisted.
    pub async fn peek(&self, key: EpochKey) -> Result<bool, CacheError> {
        self.disk.peek(key).await
    }

    /// Fetch the record for `key`, encoded per the request's `Accept` header.
    ///
    /// A disk read schedules a background read-ahead of the following epochs.
    /// Records that fail to decode are deleted and reported as errors, so the
    /// caller can fall back to the upstream.
    pub async fn get(
        &self,
        request_headers: &HeaderMap,
        key: EpochKey,
    ) -> Result<Option<CachedCommittees>, CacheError> {
        let name = key.file_name();
        let canonical = match self.warm.peek(&name) {
            Some(bytes) => bytes,
            None => match self.disk.read(key).await? {
                Some(bytes) => {
                    self.schedule_read_ahead(key);
                    bytes
                }
                None => {
                    counter!(METRIC_MISS).increment(1);
                    return Ok(None);
                }
            },
        };

        if accepts_protobuf(request_headers) {
            counter!(METRIC_HIT).increment(1);
            return Ok(Some(CachedCommittees {
                content_type: PROTOBUF_CONTENT_TYPE,
                body: canonical,
            }));
        }

        match canonical_to_json(&canonical) {
            Ok(json) => {
                counter!(METRIC_HIT).increment(1);
                Ok(Some(CachedCommittees {
                    content_type: JSON_CONTENT_TYPE,
                    body: Bytes::from(json),
                }))
            }
            Err(source) => {
                counter!(METRIC_CORRUPT).increment(1);
                self.warm.remove(&name);
                self.disk.discard(key).await;
                Err(CacheError::Corrupt {
                    path: self.disk.record_path(key),
                    source,
                })
            }
        }
    }

    /// Persist an upstream JSON body for `key`. Never replaces an existing record.
    pub async fn set(&self, key: EpochKey, json: &[u8]) -> Result<(), CacheError> {
        self.disk.set(key, json).await?;
        counter!(METRIC_STORE).increment(1);
        Ok(())
    }

    /// Keep at most `retain` records; returns how many were deleted.
    ///
    /// Deleted records are evicted from the warm store after the files are
    /// gone. A concurrent read-ahead re-checks the disk after filling the warm
    /// store, so a pruned record is never left warm.
    pub async fn prune(&self, retain: usize) -> Result<usize, CacheError> {
        let deleted = self.disk.prune(retain).await?;
        for name in &deleted {
            self.warm.remove(name);
        }
        counter!(METRIC_PRUNED).increment(deleted.len() as u64);
        Ok(deleted.len())
    }

    /// Load the epochs following `key` into the warm store, skipping those
    /// already warm or not on disk. Returns how many were loaded.
    pub async fn read_ahead(&self, key: EpochKey) -> usize {
        read_ahead(&self.disk, &self.warm, key, self.config.read_ahead).await
    }

    fn schedule_read_ahead(&self, key: EpochKey) {
        if self.config.read_ahead == 0 {
            return;
        }
        let disk = Arc::clone(&self.disk);
        let warm = Arc::clone(&self.warm);
        let count = self.config.read_ahead;
        tokio::spawn(async move {
            let loaded = read_ahead(&disk, &warm, key, count).await;
            if loaded > 0 {
                debug!(epoch = %key, loaded, "read ahead cached epochs");
            }
        });
    }
}

async fn read_ahead(disk: &DiskStore, warm: &WarmStore, from: EpochKey, count: u64) -> usize {
    let mut loaded = 0;
    for key in from.following(count) {
        let name = key.file_name();
        if warm.contains(&name) {
            continue;
        }
        match disk.read(key).await {
            Ok(Some(bytes)) => {
                if admit(disk, warm, key, name, bytes).await {
                    loaded += 1;
                }
            }
            Ok(None) => {}
            Err(err) => debug!(epoch = %key, error = %err, "read-ahead skipped record"),
        }
    }
    if loaded > 0 {
        counter!(METRIC_WARM_READ).increment(loaded as u64);
    }
    loaded
}

/// Add a record read from disk to the warm store, then confirm it is still on
/// disk. A prune that deleted it between the read and the add has already
/// evicted, so the entry is dropped again here.
async fn admit(
    disk: &DiskStore,
    warm: &WarmStore,
    key: EpochKey,
    name: String,
    bytes: Bytes,
) -> bool {
    warm.add(name.clone(), bytes);
    if matches!(disk.peek(key).await, Ok(true)) {
        return true;
    }
    warm.remove(&name);
    false
}

/// Whether the `Accept` header explicitly lists the protobuf media type.
pub(crate) fn accepts_protobuf(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|entry| {
            let mut parts = entry.split(';').map(str::trim);
            let media = parts.next().unwrap_or_default();
            media.eq_ignore_ascii_case(PROTOBUF_CONTENT_TYPE) && !parts.any(is_zero_quality)
        })
}

fn is_zero_quality(param: &str) -> bool {
    let Some((name, value)) = param.split_once('=') else {
        return false;
    };
    name.trim().eq_ignore_ascii_case("q")
        && value.trim().parse::<f32>().is_ok_and(|q| q <= 0.0)
}

impl std::fmt::Debug for CommitteeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitteeCache")
            .field("data_dir", &self.config.data_dir)
            .field("warm_entries", &self.warm.len())
            .finish()
    }
}
