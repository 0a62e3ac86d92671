use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::codec::CodecError;
use super::keys::EpochKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o failed for `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cached record `{path}` is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("response for epoch {epoch} is not cacheable: {source}")]
    Conversion {
        epoch: EpochKey,
        #[source]
        source: CodecError,
    },
    #[error("epoch {0} is already cached")]
    AlreadyCached(EpochKey),
    #[error("`{0}` is not a directory")]
    NotADirectory(PathBuf),
    #[error("cache task failed: {0}")]
    Task(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// A losing writer in a same-key race; the record exists and is usable.
    pub fn is_already_cached(&self) -> bool {
        matches!(self, Self::AlreadyCached(_))
    }
}
