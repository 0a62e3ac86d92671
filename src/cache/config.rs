//! Cache configuration.
//!
//! Controls where records are persisted and how the warm store behaves.

use std::num::NonZeroUsize;
use std::path::PathBuf;

pub(crate) const DEFAULT_DATA_DIR: &str = "/tmp/treegen-proxy";
pub(crate) const DEFAULT_WARM_CAPACITY: usize = 256;
pub(crate) const DEFAULT_READ_AHEAD: u64 = 32;

/// Cache configuration derived from [`crate::config::CacheSettings`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding one `<epoch>.pb` file per cached epoch.
    pub data_dir: PathBuf,
    /// Maximum decoded records held in memory.
    pub warm_capacity: usize,
    /// Number of subsequent epochs pre-loaded after a disk read.
    pub read_ahead: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            warm_capacity: DEFAULT_WARM_CAPACITY,
            read_ahead: DEFAULT_READ_AHEAD,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            data_dir: settings.data_dir.clone(),
            warm_capacity: settings.warm_capacity.get(),
            read_ahead: settings.read_ahead,
        }
    }
}

impl CacheConfig {
    /// Configuration rooted at `data_dir` with default limits.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Returns the warm capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn warm_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.warm_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
