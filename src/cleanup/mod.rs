use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use thiserror::Error;

use crate::logging::LogSink;

#[derive(Debug, Error)]
#[error("unable to remove '{path}': {source}")]
pub struct CleanupError {
    path: String,
    source: std::io::Error,
}

/// What a cleanup left behind.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Removal {
    Removed,
    /// Someone else removed the file first; nothing is left on disk.
    AlreadyGone,
    /// The file is still in the staging directory.
    Failed,
}

/// Deletes staged archives after a confirmed upload.
pub struct Cleanup {
    sink: LogSink,
}

impl Cleanup {
    pub fn new(sink: LogSink) -> Cleanup {
        Cleanup { sink }
    }

    /// Never fails; every error, a missing file included, is logged and otherwise ignored.
    pub fn remove(&self, local_path: &Path) -> Removal {
        match Self::try_remove(local_path) {
            Ok(()) => {
                log_info!(self.sink, "removed {}", local_path.display());
                Removal::Removed
            }
            Err(err) => {
                log_error!(self.sink, "{}", err);
                if err.source.kind() == ErrorKind::NotFound {
                    Removal::AlreadyGone
                } else {
                    Removal::Failed
                }
            }
        }
    }

    fn try_remove(local_path: &Path) -> Result<(), CleanupError> {
        fs::remove_file(local_path).map_err(|source| CleanupError {
            path: local_path.display().to_string(),
            source,
        })
    }
}
