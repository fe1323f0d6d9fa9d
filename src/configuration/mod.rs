use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub mod backup_spec;
pub mod destination;

pub use backup_spec::BackupEntry;

/// Failures that stop the process before any backup is attempted.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("config file doesn't exist. tried: {0}")]
    ConfigNotFound(String),
    #[error("unable to read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to parse config file '{path}': {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },
    #[error("need to have a {0} in the config file")]
    MissingEnv(&'static str),
    #[error("invalid region value '{0}'")]
    InvalidRegion(String),
    #[error("unable to open log file '{path}': {source}")]
    LogFile {
        path: String,
        source: std::io::Error,
    },
    #[error("unable to configure logging: {0}")]
    Logger(String),
}

#[derive(Debug, Deserialize)]
pub struct Configuration {
    pub env: Env,
    #[serde(default)]
    backups: Option<Vec<BackupEntry>>,
}

#[derive(Debug, Deserialize)]
pub struct Env {
    #[serde(default)]
    pub root_path: String,
    #[serde(default)]
    pub logs: String,
    #[serde(default = "Env::default_staging_dir")]
    pub staging_dir: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
}

impl Env {
    pub const DEFAULT_STAGING_DIR: &'static str = "./backups";

    fn default_staging_dir() -> String {
        String::from(Self::DEFAULT_STAGING_DIR)
    }
}

impl Configuration {
    pub const DEFAULT_LOCATIONS: [&'static str; 3] =
        ["config.yml", "~/.backup-s3.yml", "/etc/backup-s3.yml"];

    pub fn load(filename: &str) -> Result<Configuration, SetupError> {
        let real_filename = expand_home(filename);
        let contents = fs::read_to_string(&real_filename).map_err(|source| SetupError::Read {
            path: real_filename.clone(),
            source,
        })?;

        Configuration::parse(&contents).map_err(|err| match err {
            SetupError::Parse { source, .. } => SetupError::Parse {
                path: real_filename,
                source,
            },
            err => err,
        })
    }

    pub fn parse(contents: &str) -> Result<Configuration, SetupError> {
        let mut configuration: Configuration =
            serde_yml::from_str(contents).map_err(|source| SetupError::Parse {
                path: String::new(),
                source,
            })?;

        if configuration.env.root_path.trim().is_empty() {
            return Err(SetupError::MissingEnv("root_path"));
        }
        if configuration.env.logs.trim().is_empty() {
            return Err(SetupError::MissingEnv("logs"));
        }
        configuration.env.logs = expand_home(&configuration.env.logs);
        configuration.env.staging_dir = expand_home(&configuration.env.staging_dir);

        Ok(configuration)
    }

    /// Picks the explicitly given file, or the first existing default location.
    pub fn find_file(explicit: Option<&str>) -> Result<String, SetupError> {
        if let Some(file) = explicit {
            if !Path::new(&expand_home(file)).exists() {
                return Err(SetupError::ConfigNotFound(file.to_string()));
            }
            return Ok(file.to_string());
        }

        Self::DEFAULT_LOCATIONS
            .iter()
            .find(|candidate| Path::new(&expand_home(candidate)).exists())
            .map(|candidate| candidate.to_string())
            .ok_or_else(|| SetupError::ConfigNotFound(Self::DEFAULT_LOCATIONS.join(", ")))
    }

    pub fn backups(&self) -> &[BackupEntry] {
        self.backups.as_deref().unwrap_or_default()
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home_dir)) => format!("{}{}", home_dir.display(), rest),
        _ => String::from(path),
    }
}
