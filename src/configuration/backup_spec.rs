use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("backup entry is malformed: {0}")]
    Malformed(String),
    #[error("backup entry is missing `{0}`")]
    MissingField(&'static str),
}

/// One item of the `backups` list exactly as it appears in the YAML document.
///
/// Entries are kept as raw values so that a single incomplete or mistyped
/// entry is rejected on its own instead of failing the whole document.
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct BackupEntry(serde_yml::Value);

#[derive(Deserialize)]
struct RawEntry {
    backup: Option<RawBackup>,
}

#[derive(Deserialize)]
struct RawBackup {
    src: Option<String>,
    target: Option<RawTarget>,
}

#[derive(Deserialize)]
struct RawTarget {
    bucket: Option<String>,
    key: Option<String>,
}

impl BackupEntry {
    pub fn to_spec(&self) -> Result<BackupSpec, ConfigError> {
        let raw: RawEntry = serde_yml::from_value(self.0.clone())
            .map_err(|err| ConfigError::Malformed(err.to_string()))?;

        let backup = raw.backup.ok_or(ConfigError::MissingField("backup"))?;
        let source_name = non_empty(backup.src, "backup.src")?;
        let target = backup
            .target
            .ok_or(ConfigError::MissingField("backup.target"))?;
        let destination_container = non_empty(target.bucket, "backup.target.bucket")?;
        let destination_prefix = non_empty(target.key, "backup.target.key")?;

        Ok(BackupSpec {
            source_name,
            destination_container,
            destination_prefix,
        })
    }
}

fn non_empty(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingField(field)),
    }
}

/// A validated backup task: which directory to archive and where to upload it.
#[derive(Clone, Debug, PartialEq)]
pub struct BackupSpec {
    pub source_name: String,
    pub destination_container: String,
    pub destination_prefix: String,
}

impl BackupSpec {
    /// The root path is prepended verbatim, so `/srv` + `/data` is `/srv/data`.
    pub fn source_path(&self, root_path: &str) -> String {
        format!("{}{}", root_path, self.source_name)
    }

    /// Object key for an archive file name under this spec's prefix.
    pub fn remote_key(&self, archive_file_name: &str) -> String {
        format!(
            "{}/{}",
            self.destination_prefix.trim_end_matches('/'),
            archive_file_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(yaml: &str) -> Vec<BackupEntry> {
        serde_yml::from_str(yaml).unwrap()
    }

    #[test]
    fn complete_entry_becomes_spec() {
        let entries = entries(
            r#"
- backup:
    src: /data
    target:
      bucket: b1
      key: k1
"#,
        );
        let spec = entries[0].to_spec().unwrap();

        assert_eq!(spec.source_name, "/data");
        assert_eq!(spec.destination_container, "b1");
        assert_eq!(spec.destination_prefix, "k1");
        assert_eq!(spec.source_path("/srv"), "/srv/data");
        assert_eq!(spec.remote_key("data-1700000000.tar.gz"), "k1/data-1700000000.tar.gz");
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let entries = entries(
            r#"
- other: {}
- backup:
    target: { bucket: b1, key: k1 }
- backup:
    src: /data
- backup:
    src: /data
    target: { key: k1 }
- backup:
    src: /data
    target: { bucket: b1, key: "" }
"#,
        );
        let errors: Vec<ConfigError> = entries
            .iter()
            .map(|entry| entry.to_spec().unwrap_err())
            .collect();

        assert_eq!(
            errors,
            vec![
                ConfigError::MissingField("backup"),
                ConfigError::MissingField("backup.src"),
                ConfigError::MissingField("backup.target"),
                ConfigError::MissingField("backup.target.bucket"),
                ConfigError::MissingField("backup.target.key"),
            ]
        );
    }

    #[test]
    fn mistyped_entry_is_malformed() {
        let entries = entries(
            r#"
- just a string
- backup:
    src: [1, 2]
    target: { bucket: b1, key: k1 }
"#,
        );

        assert!(matches!(entries[0].to_spec(), Err(ConfigError::Malformed(_))));
        assert!(matches!(entries[1].to_spec(), Err(ConfigError::Malformed(_))));
    }

    #[test]
    fn prefix_with_trailing_slash_is_not_doubled() {
        let spec = BackupSpec {
            source_name: "/data".to_string(),
            destination_container: "b1".to_string(),
            destination_prefix: "hosts/web1/".to_string(),
        };

        assert_eq!(spec.remote_key("data-1.tar.gz"), "hosts/web1/data-1.tar.gz");
    }
}
