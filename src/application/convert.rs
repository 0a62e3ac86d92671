//! Offline conversion of a standalone JSON committees file into the record format.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::cache::{CodecError, RECORD_EXTENSION, json_to_canonical};

const LEGACY_EXTENSION: &str = "bin";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("failed to read `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to convert `{path}` to protobuf: {source}")]
    Codec {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error("failed to write `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Convert `input` and write the result next to it, returning the output path.
///
/// The output keeps the input's permissions.
pub async fn convert_file(input: &Path) -> Result<PathBuf, ConvertError> {
    let read_err = |source| ConvertError::Read {
        path: input.to_path_buf(),
        source,
    };
    let metadata = tokio::fs::metadata(input).await.map_err(read_err)?;
    let json = tokio::fs::read(input).await.map_err(read_err)?;

    let canonical = json_to_canonical(&json).map_err(|source| ConvertError::Codec {
        path: input.to_path_buf(),
        source,
    })?;

    let output = output_path(input);
    let write_err = |source| ConvertError::Write {
        path: output.clone(),
        source,
    };
    tokio::fs::write(&output, &canonical)
        .await
        .map_err(write_err)?;
    tokio::fs::set_permissions(&output, metadata.permissions())
        .await
        .map_err(write_err)?;

    info!(
        target = "beacon_cache_proxy::convert",
        input = %input.display(),
        output = %output.display(),
        bytes = canonical.len(),
        "converted committees file"
    );
    Ok(output)
}

/// `<stem>.pb` for `<stem>.bin`, otherwise `<input>.pb`.
pub fn output_path(input: &Path) -> PathBuf {
    if input.extension() == Some(OsStr::new(LEGACY_EXTENSION)) {
        return input.with_extension(RECORD_EXTENSION);
    }
    let mut name = input.as_os_str().to_owned();
    name.push(".");
    name.push(RECORD_EXTENSION);
    PathBuf::from(name)
}
