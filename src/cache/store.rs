//! Write-once disk store: one protobuf file per epoch under the data directory.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::fs;
use tracing::{debug, warn};

use super::codec::json_to_canonical;
use super::error::CacheError;
use super::keys::{EpochKey, is_record_name};

const TEMP_PREFIX: &str = ".tmp-";
const TEMP_SUFFIX: &str = ".partial";

/// Filesystem-backed record storage.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open the store rooted at `root`, creating the directory if necessary.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        match std::fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(CacheError::NotADirectory(root)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                std::fs::create_dir_all(&root).map_err(|err| CacheError::io(&root, err))?;
            }
            Err(err) => return Err(CacheError::io(&root, err)),
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the record for `key`.
    pub fn record_path(&self, key: EpochKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether a record exists. Missing records are not an error.
    pub async fn peek(&self, key: EpochKey) -> Result<bool, CacheError> {
        let path = self.record_path(key);
        match fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(CacheError::io(path, err)),
        }
    }

    /// Read the raw record bytes.
    ///
    /// A record that exists but cannot be read is removed so later requests
    /// fall through to the upstream instead of failing again.
    pub async fn read(&self, key: EpochKey) -> Result<Option<Bytes>, CacheError> {
        let path = self.record_path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                self.discard(key).await;
                Err(CacheError::io(path, err))
            }
        }
    }

    /// Convert an upstream JSON body and persist it as the record for `key`.
    ///
    /// Fails with [`CacheError::AlreadyCached`] when a record exists; an
    /// existing record is never replaced. The encoding is written to a hidden
    /// temporary file and published with a no-clobber rename, so a record is
    /// either absent or complete.
    pub async fn set(&self, key: EpochKey, json: &[u8]) -> Result<(), CacheError> {
        if self.peek(key).await? {
            return Err(CacheError::AlreadyCached(key));
        }

        let canonical = json_to_canonical(json)
            .map_err(|source| CacheError::Conversion { epoch: key, source })?;

        let root = self.root.clone();
        let target = self.record_path(key);
        tokio::task::spawn_blocking(move || publish(&root, &target, key, &canonical))
            .await
            .map_err(|err| CacheError::Task(err.to_string()))?
    }

    /// Remove the record for `key`, ignoring records that are already gone.
    pub async fn discard(&self, key: EpochKey) {
        let path = self.record_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(epoch = %key, "discarded cached record"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(
                epoch = %key,
                path = %path.display(),
                error = %err,
                "failed to discard cached record"
            ),
        }
    }

    /// Delete all but the `retain` records whose file names sort last.
    ///
    /// Names are compared byte-wise, not numerically: `"9.pb"` sorts after
    /// `"10.pb"`, so with mixed digit lengths a numerically recent epoch can
    /// be pruned before an older one. The on-disk naming is kept as is.
    ///
    /// Works on a single directory snapshot, so records created while the
    /// prune runs are left alone. Returns the names actually deleted.
    pub async fn prune(&self, retain: usize) -> Result<Vec<String>, CacheError> {
        let meta = fs::metadata(&self.root)
            .await
            .map_err(|err| CacheError::io(&self.root, err))?;
        if !meta.is_dir() {
            return Err(CacheError::NotADirectory(self.root.clone()));
        }

        let mut names = self.snapshot().await?;
        if names.len() <= retain {
            return Ok(Vec::new());
        }

        names.sort_unstable();
        names.truncate(names.len() - retain);

        Ok(self.remove_records(names).await)
    }

    /// Delete the named records, returning those this call removed. Records
    /// already gone are skipped without error.
    async fn remove_records(&self, names: Vec<String>) -> Vec<String> {
        let mut deleted = Vec::with_capacity(names.len());
        for name in names {
            let path = self.root.join(&name);
            match fs::remove_file(&path).await {
                Ok(()) => deleted.push(name),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to prune cached record"
                ),
            }
        }
        deleted
    }

    async fn snapshot(&self) -> Result<Vec<String>, CacheError> {
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|err| CacheError::io(&self.root, err))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|err| CacheError::io(&self.root, err))?
        {
            let is_file = entry
                .file_type()
                .await
                .map(|kind| kind.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string()
                && is_record_name(&name)
            {
                names.push(name);
            }
        }
        Ok(names)
    }
}

fn publish(root: &Path, target: &Path, key: EpochKey, canonical: &[u8]) -> Result<(), CacheError> {
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(root)
        .map_err(|err| CacheError::io(root, err))?;
    temp.write_all(canonical)
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|err| CacheError::io(temp.path(), err))?;

    match temp.persist_noclobber(target) {
        Ok(_) => Ok(()),
        Err(err) if err.error.kind() == ErrorKind::AlreadyExists => {
            Err(CacheError::AlreadyCached(key))
        }
        Err(err) => Err(CacheError::io(target, err.error)),
    }
}
