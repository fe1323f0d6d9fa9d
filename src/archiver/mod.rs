use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::{write::GzEncoder, Compression};
use tar::Builder;
use thiserror::Error;

use crate::formatter::format_size;
use crate::logging::LogSink;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("source directory '{0}' doesn't exist")]
    SourceMissing(String),
    #[error("source '{0}' is not a directory")]
    NotADirectory(String),
    #[error("source '{path}' is unreadable: {source}")]
    Unreadable { path: String, source: io::Error },
    #[error("unable to create archive '{path}' => permission denied")]
    PermissionDenied { path: String },
    #[error("unable to create archive '{path}': {source}")]
    Create { path: String, source: io::Error },
    #[error("unable to append directory '{directory}' to '{path}': {source}")]
    Append {
        directory: String,
        path: String,
        source: io::Error,
    },
}

/// Writes `.tar.gz` archives of source directories into the staging directory.
pub struct Archiver {
    staging_dir: PathBuf,
    sink: LogSink,
}

impl Archiver {
    pub const EXTENSION: &'static str = "tar.gz";

    pub fn new<P: Into<PathBuf>>(staging_dir: P, sink: LogSink) -> Archiver {
        Archiver {
            staging_dir: staging_dir.into(),
            sink,
        }
    }

    pub fn archive(&self, logical_name: &str, source_dir: &str) -> Result<PathBuf, ArchiveError> {
        self.archive_at(logical_name, source_dir, Utc::now().timestamp())
    }

    /// Same as [`Archiver::archive`] with an explicit unix timestamp for the file name.
    ///
    /// Archiving the same name twice within one second overwrites the first file.
    pub fn archive_at(
        &self,
        logical_name: &str,
        source_dir: &str,
        timestamp: i64,
    ) -> Result<PathBuf, ArchiveError> {
        let source = Path::new(source_dir);
        match fs::metadata(source) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(ArchiveError::NotADirectory(source_dir.to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ArchiveError::SourceMissing(source_dir.to_string()))
            }
            Err(source) => {
                return Err(ArchiveError::Unreadable {
                    path: source_dir.to_string(),
                    source,
                })
            }
        }

        let archive_path = self.staging_dir.join(Self::file_name(logical_name, timestamp));
        let root_entry = Self::root_entry(source, logical_name);
        log_debug!(
            self.sink,
            "tar file: '{}' as '{}' into '{}' ...",
            source_dir,
            root_entry,
            archive_path.display()
        );

        if let Err(err) = Self::write_archive(&archive_path, &root_entry, source) {
            // an incomplete archive is never uploaded
            if archive_path.exists() {
                if let Err(remove_err) = fs::remove_file(&archive_path) {
                    log_error!(
                        self.sink,
                        "unable to remove incomplete archive '{}': {}",
                        archive_path.display(),
                        remove_err
                    );
                }
            }
            return Err(err);
        }

        let size = fs::metadata(&archive_path).map(|m| m.len()).unwrap_or(0);
        log_info!(
            self.sink,
            "created archive: {} ({})",
            archive_path.display(),
            format_size(size, 2)
        );

        Ok(archive_path)
    }

    /// `<logical name>-<unix seconds>.tar.gz`, the name flattened into one path component.
    pub fn file_name(logical_name: &str, timestamp: i64) -> String {
        let flattened = logical_name.trim_matches('/').replace('/', "-");
        format!(
            "{}-{}.{}",
            sanitize_filename::sanitize(flattened),
            timestamp,
            Self::EXTENSION
        )
    }

    fn root_entry(source: &Path, logical_name: &str) -> String {
        match source.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => sanitize_filename::sanitize(logical_name.trim_matches('/').replace('/', "-")),
        }
    }

    fn write_archive(
        archive_path: &Path,
        root_entry: &str,
        source_dir: &Path,
    ) -> Result<(), ArchiveError> {
        let path = archive_path.display().to_string();
        let file = File::create(archive_path).map_err(|source| match source.kind() {
            ErrorKind::PermissionDenied => ArchiveError::PermissionDenied { path: path.clone() },
            _ => ArchiveError::Create {
                path: path.clone(),
                source,
            },
        })?;

        let append_error = |source: io::Error| ArchiveError::Append {
            directory: source_dir.display().to_string(),
            path: path.clone(),
            source,
        };

        let mut tar = Builder::new(GzEncoder::new(file, Compression::default()));
        tar.follow_symlinks(false);
        tar.append_dir_all(root_entry, source_dir).map_err(append_error)?;
        tar.into_inner()
            .and_then(|gz| gz.finish())
            .and_then(|file| file.sync_all())
            .map_err(append_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;
    use log::Level;
    use tar::Archive;

    use super::*;
    use crate::logging::testing::MemoryLogger;

    fn source_tree(root: &Path, name: &str) -> PathBuf {
        let source = root.join(name);
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), "x").unwrap();
        fs::write(source.join("sub").join("b.txt"), "y").unwrap();
        source
    }

    #[test]
    fn archive_path_is_name_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("backups");
        fs::create_dir(&staging).unwrap();
        let source = source_tree(dir.path(), "foo");
        let (sink, _) = MemoryLogger::sink();

        let archive = Archiver::new(&staging, sink)
            .archive_at("foo", source.to_str().unwrap(), 1_700_000_000)
            .unwrap();

        assert_eq!(archive, staging.join("foo-1700000000.tar.gz"));
        assert!(archive.is_file());
    }

    #[test]
    fn archive_round_trips_under_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("backups");
        fs::create_dir(&staging).unwrap();
        let source = source_tree(&dir.path().join("srv"), "data");
        let (sink, _) = MemoryLogger::sink();

        let archive = Archiver::new(&staging, sink)
            .archive_at("/data", source.to_str().unwrap(), 42)
            .unwrap();
        assert_eq!(archive.file_name().unwrap(), "data-42.tar.gz");

        let extracted = dir.path().join("extracted");
        let mut tar = Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        tar.unpack(&extracted).unwrap();

        let mut contents = String::new();
        File::open(extracted.join("data").join("a.txt"))
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "x");
        assert_eq!(
            fs::read_to_string(extracted.join("data").join("sub").join("b.txt")).unwrap(),
            "y"
        );
    }

    #[test]
    fn root_entry_uses_last_path_component() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_tree(&dir.path().join("nested").join("deeper"), "photos");
        let (sink, _) = MemoryLogger::sink();

        let archive = Archiver::new(dir.path(), sink)
            .archive_at("pictures", source.to_str().unwrap(), 7)
            .unwrap();

        let mut tar = Archive::new(GzDecoder::new(File::open(&archive).unwrap()));
        let roots: Vec<String> = tar
            .entries()
            .unwrap()
            .map(|entry| {
                let entry = entry.unwrap();
                let path = entry.path().unwrap().into_owned();
                path.components()
                    .next()
                    .unwrap()
                    .as_os_str()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert!(!roots.is_empty());
        assert!(roots.iter().all(|root| root == "photos"));
    }

    #[test]
    fn missing_source_is_an_error_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let (sink, _) = MemoryLogger::sink();
        let missing = dir.path().join("nope");

        let result =
            Archiver::new(dir.path(), sink).archive_at("nope", missing.to_str().unwrap(), 1);

        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn file_as_source_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let (sink, _) = MemoryLogger::sink();

        let result =
            Archiver::new(dir.path(), sink).archive_at("plain", file.to_str().unwrap(), 1);

        assert!(matches!(result, Err(ArchiveError::NotADirectory(_))));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_loop_is_unreadable_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first");
        std::os::unix::fs::symlink(dir.path().join("second"), &first).unwrap();
        std::os::unix::fs::symlink(&first, dir.path().join("second")).unwrap();
        let (sink, _) = MemoryLogger::sink();

        let result =
            Archiver::new(dir.path(), sink).archive_at("first", first.to_str().unwrap(), 1);

        match result {
            Err(ArchiveError::Unreadable { path, .. }) => assert!(path.ends_with("first")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_removes_partial_archive() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("backups");
        fs::create_dir(&staging).unwrap();
        let source = source_tree(dir.path(), "live");
        // tar refuses to archive sockets, after the archive file was created
        let socket = source.join("control.sock");
        let _listener = std::os::unix::net::UnixListener::bind(&socket).unwrap();
        let (sink, _) = MemoryLogger::sink();

        let result = Archiver::new(&staging, sink).archive_at("live", source.to_str().unwrap(), 1);

        assert!(matches!(result, Err(ArchiveError::Append { .. })));
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[test]
    fn missing_staging_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_tree(dir.path(), "foo");
        let (sink, _) = MemoryLogger::sink();

        let result = Archiver::new(dir.path().join("no-staging"), sink)
            .archive_at("foo", source.to_str().unwrap(), 1);

        assert!(matches!(result, Err(ArchiveError::Create { .. })));
    }

    #[test]
    fn logs_archive_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = source_tree(dir.path(), "foo");
        let (sink, logger) = MemoryLogger::sink();

        Archiver::new(dir.path(), sink)
            .archive_at("foo", source.to_str().unwrap(), 1)
            .unwrap();

        let infos = logger.messages(Level::Info);
        assert_eq!(infos.len(), 1);
        assert!(infos[0].starts_with("created archive: "));
        assert!(infos[0].ends_with(" B)") || infos[0].ends_with(" KB)"));
    }

    #[test]
    fn file_name_flattens_nested_names() {
        assert_eq!(Archiver::file_name("/var/www/", 5), "var-www-5.tar.gz");
        assert_eq!(Archiver::file_name("data", 5), "data-5.tar.gz");
    }
}
