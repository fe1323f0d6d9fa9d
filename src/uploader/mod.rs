use std::path::Path;

use rusoto_core::RusotoError;
use thiserror::Error;

pub mod s3;

pub use s3::S3Uploader;

/// Faults that point at a defect in the request or the client rather than at
/// the environment. These abort the current item.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("unparseable response: {0}")]
    MalformedResponse(String),
    #[error("storage client used from a blocking context")]
    Blocking,
}

/// Expected upload failures. These are logged and reported as an unsuccessful upload.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unable to read '{path}': {source}")]
    LocalRead {
        path: String,
        source: std::io::Error,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("credentials error: {0}")]
    Credentials(String),
    #[error("service error: {0}")]
    Service(String),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("remote object size {remote:?} doesn't match local size {local}")]
    Verification { local: u64, remote: Option<i64> },
    #[error(transparent)]
    Fatal(#[from] FatalError),
}

impl<E: std::error::Error + 'static> From<RusotoError<E>> for UploadError {
    fn from(err: RusotoError<E>) -> Self {
        match err {
            RusotoError::Service(err) => UploadError::Service(err.to_string()),
            RusotoError::HttpDispatch(err) => UploadError::Transport(err.to_string()),
            RusotoError::Credentials(err) => UploadError::Credentials(err.to_string()),
            RusotoError::Unknown(response) => UploadError::Rejected {
                status: response.status.as_u16(),
                body: response.body_as_str().to_string(),
            },
            RusotoError::Validation(message) => {
                UploadError::Fatal(FatalError::InvalidRequest(message))
            }
            RusotoError::ParseError(message) => {
                UploadError::Fatal(FatalError::MalformedResponse(message))
            }
            RusotoError::Blocking => UploadError::Fatal(FatalError::Blocking),
        }
    }
}

/// Transfers a local archive to object storage.
#[allow(async_fn_in_trait)]
pub trait Uploader {
    /// Returns `Ok(true)` once the object exists under `remote_key` in
    /// `container`, `Ok(false)` for transport, auth or service failures (already
    /// logged), and `Err` only for faults that indicate a defect.
    async fn upload(
        &self,
        local_path: &Path,
        container: &str,
        remote_key: &str,
    ) -> Result<bool, FatalError>;
}
