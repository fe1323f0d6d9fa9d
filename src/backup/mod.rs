use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;

use futures::FutureExt;

use crate::archiver::Archiver;
use crate::cleanup::{Cleanup, Removal};
use crate::configuration::BackupEntry;
use crate::logging::LogSink;
use crate::uploader::Uploader;

/// Terminal state of one configured backup.
#[derive(Debug, PartialEq)]
pub enum ItemOutcome {
    /// The entry was incomplete; nothing was archived.
    Skipped,
    ArchiveFailed,
    /// The archive stays in the staging directory.
    UploadFailed { archive: PathBuf },
    /// `leftover` is set when the uploaded archive could not be removed.
    Uploaded {
        remote_key: String,
        leftover: Option<PathBuf>,
    },
    /// Unclassified fault or panic while processing the item. `archive` is
    /// set once the archive was written, and it is left in place.
    Aborted { archive: Option<PathBuf> },
}

impl ItemOutcome {
    /// Archive this item left in the staging directory, if any.
    pub fn retained_archive(&self) -> Option<&PathBuf> {
        match self {
            ItemOutcome::UploadFailed { archive } => Some(archive),
            ItemOutcome::Uploaded { leftover, .. } => leftover.as_ref(),
            ItemOutcome::Aborted { archive } => archive.as_ref(),
            ItemOutcome::Skipped | ItemOutcome::ArchiveFailed => None,
        }
    }
}

/// One outcome per configured entry, in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl RunReport {
    pub fn uploaded(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Uploaded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| {
            matches!(
                o,
                ItemOutcome::ArchiveFailed
                    | ItemOutcome::UploadFailed { .. }
                    | ItemOutcome::Aborted { .. }
            )
        })
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == ItemOutcome::Skipped)
    }

    /// Archives still in the staging directory because of this run.
    pub fn leftovers(&self) -> usize {
        self.retained_archives().count()
    }

    pub fn retained_archives(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes.iter().filter_map(ItemOutcome::retained_archive)
    }

    pub fn remote_keys(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().filter_map(|o| match o {
            ItemOutcome::Uploaded { remote_key, .. } => Some(remote_key.as_str()),
            _ => None,
        })
    }

    fn count<F: Fn(&ItemOutcome) -> bool>(&self, predicate: F) -> usize {
        self.outcomes.iter().filter(|o| predicate(o)).count()
    }
}

/// Runs archive, upload and cleanup for every configured backup, one at a time.
///
/// A failing item never stops the run: every entry is attempted exactly once
/// and its fate is reported in the returned [`RunReport`] and the log.
pub struct Backup<U: Uploader> {
    archiver: Archiver,
    uploader: U,
    cleanup: Cleanup,
    sink: LogSink,
}

impl<U: Uploader> Backup<U> {
    pub fn new(archiver: Archiver, uploader: U, cleanup: Cleanup, sink: LogSink) -> Backup<U> {
        Backup {
            archiver,
            uploader,
            cleanup,
            sink,
        }
    }

    pub async fn run(&self, entries: &[BackupEntry], root_path: &str) -> RunReport {
        let mut report = RunReport::default();

        for (index, entry) in entries.iter().enumerate() {
            let number = index + 1;
            // set as soon as the archive exists, so a panic still reports it
            let mut staged = None;
            let result = AssertUnwindSafe(self.process(number, entry, root_path, &mut staged))
                .catch_unwind()
                .await;
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    log_error!(
                        self.sink,
                        "backup #{}: unexpected failure: {}",
                        number,
                        panic_message(panic.as_ref())
                    );
                    ItemOutcome::Aborted { archive: staged }
                }
            };
            log_debug!(self.sink, "backup #{}: {:?}", number, outcome);
            report.outcomes.push(outcome);
        }

        log_info!(
            self.sink,
            "backup run finished: {} uploaded, {} failed, {} skipped, {} left in staging",
            report.uploaded(),
            report.failed(),
            report.skipped(),
            report.leftovers()
        );
        report
    }

    async fn process(
        &self,
        number: usize,
        entry: &BackupEntry,
        root_path: &str,
        staged: &mut Option<PathBuf>,
    ) -> ItemOutcome {
        let spec = match entry.to_spec() {
            Ok(spec) => spec,
            Err(err) => {
                log_warn!(self.sink, "skipping backup #{}: {}", number, err);
                return ItemOutcome::Skipped;
            }
        };

        let source_path = spec.source_path(root_path);
        log_info!(
            self.sink,
            "backup #{}: making a backup of {} ({})",
            number,
            spec.source_name,
            source_path
        );

        let archive = match self.archiver.archive(&spec.source_name, &source_path) {
            Ok(archive) => archive,
            Err(err) => {
                log_error!(self.sink, "backup #{}: {}", number, err);
                return ItemOutcome::ArchiveFailed;
            }
        };
        *staged = Some(archive.clone());

        let file_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let remote_key = spec.remote_key(&file_name);

        match self
            .uploader
            .upload(&archive, &spec.destination_container, &remote_key)
            .await
        {
            Ok(true) => {
                let leftover = match self.cleanup.remove(&archive) {
                    Removal::Removed | Removal::AlreadyGone => None,
                    Removal::Failed => Some(archive),
                };
                ItemOutcome::Uploaded {
                    remote_key,
                    leftover,
                }
            }
            Ok(false) => {
                log_warn!(
                    self.sink,
                    "backup #{}: upload failed, keeping {}",
                    number,
                    archive.display()
                );
                ItemOutcome::UploadFailed { archive }
            }
            Err(err) => {
                log_error!(
                    self.sink,
                    "backup #{}: unexpected failure while uploading {}: {}",
                    number,
                    archive.display(),
                    err
                );
                ItemOutcome::Aborted {
                    archive: Some(archive),
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "panic"
    }
}
